//! Source URL normalization

use regex::Regex;
use std::sync::OnceLock;
use url::Url;

// Stops at whitespace, CJK ideographs and full-width forms, which share text
// commonly glues to the end of a link.
const URL_PATTERN: &str = r"https?://[^\s\u{4e00}-\u{9fff}\u{ff00}-\u{ffef}]+";
const TRAILING_PUNCTUATION: &str = r"[,;!?）)》」』\]]+$";

#[allow(clippy::expect_used)] // literal patterns
fn url_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(URL_PATTERN).expect("URL pattern is valid"))
}

#[allow(clippy::expect_used)] // literal patterns
fn trailing_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(TRAILING_PUNCTUATION).expect("punctuation pattern is valid"))
}

/// Turn a raw reference (a URL, or share text containing one) into a canonical URL
///
/// The first `http(s)://` URL in `text` is taken, trailing punctuation is
/// stripped and the result is re-serialized through [`url::Url`]. Text that
/// contains no URL is returned trimmed.
///
/// # Examples
///
/// ```
/// use media_fetch::extraction::normalize_url;
///
/// assert_eq!(
///     normalize_url("look at this https://Example.com/v/42!! so good"),
///     "https://example.com/v/42"
/// );
/// ```
pub fn normalize_url(text: &str) -> String {
    let Some(found) = url_regex().find(text) else {
        return text.trim().to_string();
    };

    let candidate = trailing_regex().replace(found.as_str(), "");
    match Url::parse(&candidate) {
        Ok(url) => url.to_string(),
        Err(_) => candidate.into_owned(),
    }
}
