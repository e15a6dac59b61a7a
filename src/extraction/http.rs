//! HTTP-based extraction strategies (oEmbed and embedded page JSON)

use super::json_search;
use super::strategy::ExtractionStrategy;
use crate::types::MediaMetadata;
use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;
use std::sync::OnceLock;
use std::time::Duration;

const USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko)";

fn build_client(timeout: Duration) -> crate::Result<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .timeout(timeout)
        .build()?)
}

#[derive(Debug, Deserialize)]
struct OEmbedResponse {
    title: Option<String>,
    author_name: Option<String>,
    thumbnail_url: Option<String>,
}

/// Strategy that queries an oEmbed endpoint
///
/// oEmbed exposes title, author and thumbnail for most platforms without
/// authentication, which makes it a cheap first attempt.
pub struct OEmbedStrategy {
    endpoint: String,
    client: reqwest::Client,
}

impl OEmbedStrategy {
    /// Create a strategy for an oEmbed endpoint (e.g. `https://www.example.com/oembed`)
    pub fn new(endpoint: impl Into<String>) -> crate::Result<Self> {
        Ok(Self {
            endpoint: endpoint.into(),
            client: build_client(Duration::from_secs(10))?,
        })
    }
}

#[async_trait]
impl ExtractionStrategy for OEmbedStrategy {
    async fn extract(&self, url: &str) -> crate::Result<Option<MediaMetadata>> {
        let request_url = format!(
            "{}?url={}&format=json",
            self.endpoint,
            urlencoding::encode(url)
        );
        let response = self.client.get(&request_url).send().await?;
        if !response.status().is_success() {
            tracing::debug!(status = %response.status(), url, "oEmbed lookup returned no data");
            return Ok(None);
        }

        let body: OEmbedResponse = response.json().await?;
        Ok(Some(MediaMetadata {
            title: body.title,
            uploader: body.author_name,
            thumbnail: body.thumbnail_url,
            ..Default::default()
        }))
    }

    fn name(&self) -> &'static str {
        "oembed"
    }
}

#[allow(clippy::expect_used)] // literal pattern
fn script_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r#"(?is)<script[^>]*type\s*=\s*["']application/(?:ld\+)?json["'][^>]*>(.*?)</script>"#,
        )
        .expect("script pattern is valid")
    })
}

/// Strategy that fetches the page and searches its embedded JSON blobs
pub struct EmbeddedJsonStrategy {
    client: reqwest::Client,
}

impl EmbeddedJsonStrategy {
    /// Create the strategy with a default HTTP client
    pub fn new() -> crate::Result<Self> {
        Ok(Self {
            client: build_client(Duration::from_secs(15))?,
        })
    }
}

#[async_trait]
impl ExtractionStrategy for EmbeddedJsonStrategy {
    async fn extract(&self, url: &str) -> crate::Result<Option<MediaMetadata>> {
        let response = self.client.get(url).send().await?;
        if !response.status().is_success() {
            return Ok(None);
        }
        let html = response.text().await?;
        Ok(metadata_from_html(&html))
    }

    fn name(&self) -> &'static str {
        "embedded-json"
    }
}

/// Search every JSON script blob in `html` for a video node
pub(crate) fn metadata_from_html(html: &str) -> Option<MediaMetadata> {
    script_regex()
        .captures_iter(html)
        .filter_map(|caps| caps.get(1))
        .filter_map(|blob| serde_json::from_str::<Value>(blob.as_str().trim()).ok())
        .find_map(|root| json_search::find_first(&root, is_video_node).map(metadata_from_node))
}

fn is_video_node(node: &Value) -> bool {
    let Some(map) = node.as_object() else {
        return false;
    };
    if map.get("@type").and_then(Value::as_str) == Some("VideoObject") {
        return true;
    }
    map.contains_key("video_url") && (map.contains_key("title") || map.contains_key("caption"))
}

fn metadata_from_node(node: &Value) -> MediaMetadata {
    let text = |keys: &[&str]| {
        keys.iter()
            .find_map(|k| node.get(*k).and_then(Value::as_str))
            .map(str::to_string)
    };

    let thumbnail = match node.get("thumbnailUrl") {
        Some(Value::Array(items)) => items.first().and_then(Value::as_str).map(str::to_string),
        _ => text(&["thumbnailUrl", "thumbnail_url", "display_url"]),
    };
    let uploader = json_search::find_key(node, "author")
        .and_then(|author| author.get("name").or(Some(author)))
        .and_then(Value::as_str)
        .map(str::to_string)
        .or_else(|| text(&["owner_username"]));
    let duration = match node.get("duration") {
        Some(Value::String(iso)) => parse_iso8601_duration(iso),
        Some(other) => other.as_f64(),
        None => node.get("video_duration").and_then(Value::as_f64),
    };

    MediaMetadata {
        media_id: text(&["identifier", "shortcode", "id", "contentUrl", "url"]),
        title: text(&["name", "title", "caption"]),
        duration,
        thumbnail,
        uploader,
        image_urls: Vec::new(),
        formats: Vec::new(),
    }
}

/// Parse the `PT#H#M#S` subset of ISO 8601 durations
fn parse_iso8601_duration(value: &str) -> Option<f64> {
    let rest = value.strip_prefix("PT")?;
    let mut total = 0.0;
    let mut number = String::new();
    for c in rest.chars() {
        match c {
            '0'..='9' | '.' => number.push(c),
            'H' | 'M' | 'S' => {
                let n: f64 = number.parse().ok()?;
                total += match c {
                    'H' => n * 3600.0,
                    'M' => n * 60.0,
                    _ => n,
                };
                number.clear();
            }
            _ => return None,
        }
    }
    number.is_empty().then_some(total)
}
