//! Media tool (ffmpeg/ffprobe) integration
//!
//! Stream probing, fallback merging and codec repair go through the
//! [`MediaTool`] trait so the pipeline never shells out directly. Two
//! implementations are provided:
//!
//! - [`FfmpegCli`]: runs the external `ffmpeg`/`ffprobe` binaries
//! - [`NoOpMediaTool`]: stub used when ffmpeg is not installed
//!
//! ## Usage
//!
//! ```no_run
//! use media_fetch::media_tool::{FfmpegCli, MediaTool};
//! use std::path::Path;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let tool = FfmpegCli::from_path().expect("ffmpeg not found");
//!
//!     let report = tool.probe_streams(Path::new("clip.mp4")).await?;
//!     if !report.is_complete() {
//!         println!("missing streams: video={} audio={}", report.has_video, report.has_audio);
//!     }
//!
//!     Ok(())
//! }
//! ```

mod cli;
mod noop;
pub(crate) mod probe;
mod traits;

pub use cli::FfmpegCli;
pub use noop::NoOpMediaTool;
pub use traits::{MediaTool, MediaToolCapabilities, StreamClass, StreamReport};
