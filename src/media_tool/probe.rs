//! ffprobe output parsing and ffmpeg argument construction

use super::traits::StreamReport;
use serde::Deserialize;
use std::ffi::OsString;
use std::path::Path;

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    streams: Vec<ProbeStream>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    codec_type: Option<String>,
    codec_name: Option<String>,
}

/// Parse `ffprobe -v quiet -show_streams -of json` output
pub(crate) fn parse_stream_report(stdout: &[u8]) -> crate::Result<StreamReport> {
    let output: ProbeOutput = serde_json::from_slice(stdout)?;
    let mut report = StreamReport::default();

    for stream in output.streams {
        match stream.codec_type.as_deref() {
            Some("video") => {
                report.has_video = true;
                if report.video_codec.is_none() {
                    report.video_codec = stream.codec_name;
                }
            }
            Some("audio") => {
                report.has_audio = true;
                if report.audio_codec.is_none() {
                    report.audio_codec = stream.codec_name;
                }
            }
            _ => {}
        }
    }

    Ok(report)
}

/// Parse `-show_entries stream=codec_type -of csv=p=0` output (one type per line)
pub(crate) fn parse_codec_types(stdout: &str) -> Vec<String> {
    stdout
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

/// Parse `-select_streams v:0 -show_entries stream=codec_name -of csv=p=0` output
pub(crate) fn parse_video_codec(stdout: &str) -> Option<String> {
    stdout
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .map(str::to_string)
}

/// Arguments for muxing a video and an audio file into `output`
///
/// mp4 needs AAC audio, everything else is stream-copied.
pub(crate) fn merge_args(video: &Path, audio: &Path, output: &Path, format: &str) -> Vec<OsString> {
    let mut args: Vec<OsString> = vec![
        "-i".into(),
        video.into(),
        "-i".into(),
        audio.into(),
    ];

    let codec: &[&str] = if format.eq_ignore_ascii_case("mp4") {
        &["-c:v", "copy", "-c:a", "aac", "-b:a", "192k"]
    } else {
        &["-c", "copy"]
    };
    args.extend(codec.iter().map(OsString::from));
    args.push("-y".into());
    args.push(output.into());
    args
}

/// Arguments for re-encoding the video stream to H.264
pub(crate) fn reencode_args(input: &Path, output: &Path) -> Vec<OsString> {
    let mut args: Vec<OsString> = vec!["-i".into(), input.into()];
    args.extend(
        [
            "-c:v", "libx264", "-preset", "fast", "-crf", "23", "-c:a", "copy", "-y",
        ]
        .iter()
        .map(OsString::from),
    );
    args.push(output.into());
    args
}
