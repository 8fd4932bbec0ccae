use async_trait::async_trait;
use regex::Regex;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;
use std::time::Duration;

use super::{Strategy, StrategyOutcome, TranscriptArtifact, VideoId};
use crate::context::RunContext;
use crate::ExtractionError;

const USER_AGENT: &str =
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36";

/// Fetches caption entries straight from the platform's timed-text endpoint
pub struct ApiStrategy {
    client: Client,
    request_timeout: Duration,
}

/// Caption track advertised in the watch page's player response
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptionTrack {
    pub base_url: String,
    pub language_code: String,
    #[serde(default)]
    pub kind: Option<String>,
}

/// One timed caption line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptionEntry {
    pub text: String,
    pub start: f64,
    pub duration: f64,
}

impl ApiStrategy {
    pub fn new(request_timeout: Duration) -> Self {
        Self::with_client(Client::new(), request_timeout)
    }

    pub fn with_client(client: Client, request_timeout: Duration) -> Self {
        Self { client, request_timeout }
    }

    async fn fetch_text(&self, url: &str) -> Result<String, ExtractionError> {
        let response = self
            .client
            .get(url)
            .timeout(self.request_timeout)
            .header(reqwest::header::USER_AGENT, USER_AGENT)
            .header(reqwest::header::ACCEPT_LANGUAGE, "en-US,en;q=0.9")
            .send()
            .await
            .map_err(|e| ExtractionError::ApiUnavailable(format!("request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(ExtractionError::ApiUnavailable(format!(
                "HTTP {} from {}",
                response.status(),
                response.url().host_str().unwrap_or("caption endpoint")
            )));
        }

        response
            .text()
            .await
            .map_err(|e| ExtractionError::ApiUnavailable(format!("failed to read response: {}", e)))
    }

    async fn fetch_entries(&self, video_id: &VideoId, ctx: &RunContext) -> Result<Vec<CaptionEntry>, ExtractionError> {
        let source = &ctx.config().source;
        let page = self.fetch_text(&video_id.watch_url(&source.watch_url)).await?;

        let tracks = extract_caption_tracks(&page)?;
        let track = select_track(&tracks, &source.languages)
            .ok_or_else(|| ExtractionError::ApiUnavailable(format!("no captions available for {}", video_id)))?;

        tracing::debug!(
            "Using caption track '{}'{}",
            track.language_code,
            if track.kind.as_deref() == Some("asr") { " (auto-generated)" } else { "" }
        );

        let xml = self.fetch_text(&track.base_url).await?;
        let entries = parse_timed_text(&xml);
        if entries.is_empty() {
            return Err(ExtractionError::ApiUnavailable(format!("empty transcript for {}", video_id)));
        }

        Ok(entries)
    }
}

impl Default for ApiStrategy {
    fn default() -> Self {
        Self::new(Duration::from_secs(30))
    }
}

#[async_trait]
impl Strategy for ApiStrategy {
    fn name(&self) -> &'static str {
        "caption-api"
    }

    async fn attempt(&self, video_id: &VideoId, ctx: &RunContext) -> StrategyOutcome {
        let result = self.fetch_entries(video_id, ctx).await.and_then(|entries| {
            serde_json::to_value(&entries)
                .map(|value| TranscriptArtifact::structured(self.name(), value))
                .map_err(|e| ExtractionError::ApiUnavailable(format!("failed to encode captions: {}", e)))
        });

        result.into()
    }
}

/// Pull the `captionTracks` array out of the player response embedded in a watch page
pub fn extract_caption_tracks(page: &str) -> Result<Vec<CaptionTrack>, ExtractionError> {
    const MARKER: &str = "\"captionTracks\":";

    let start = page
        .find(MARKER)
        .map(|idx| idx + MARKER.len())
        .ok_or_else(|| ExtractionError::ApiUnavailable("no captions available".to_string()))?;

    // Only the first JSON value after the marker is read; the rest of the page is ignored.
    serde_json::Deserializer::from_str(&page[start..])
        .into_iter::<Vec<CaptionTrack>>()
        .next()
        .ok_or_else(|| ExtractionError::ApiUnavailable("caption track list is truncated".to_string()))?
        .map_err(|e| ExtractionError::ApiUnavailable(format!("malformed caption track list: {}", e)))
}

/// First track in a preferred language, falling back to the first track listed
pub fn select_track<'a>(tracks: &'a [CaptionTrack], languages: &[String]) -> Option<&'a CaptionTrack> {
    languages
        .iter()
        .find_map(|lang| tracks.iter().find(|track| &track.language_code == lang))
        .or_else(|| tracks.first())
}

fn cue_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r#"(?s)<text start="([\d.]+)"(?: dur="([\d.]+)")?[^>]*>(.*?)</text>"#)
            .expect("cue pattern is valid")
    })
}

fn tag_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"<[^>]*>").expect("tag pattern is valid"))
}

/// Parse timed-text XML into caption entries, skipping cues with no text
pub fn parse_timed_text(xml: &str) -> Vec<CaptionEntry> {
    cue_pattern()
        .captures_iter(xml)
        .filter_map(|cap| {
            let start = cap.get(1)?.as_str().parse::<f64>().ok()?;
            let duration = cap
                .get(2)
                .and_then(|d| d.as_str().parse::<f64>().ok())
                .unwrap_or(0.0);

            // Cue text is escaped twice: once for XML and once for HTML.
            let text = decode_entities(&decode_entities(cap.get(3)?.as_str()));
            let text = tag_pattern().replace_all(&text, "").trim().to_string();

            (!text.is_empty()).then_some(CaptionEntry { text, start, duration })
        })
        .collect()
}

fn decode_entities(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        rest = &rest[amp..];

        let decoded = rest.find(';').filter(|&end| end <= 10).and_then(|end| {
            let entity = &rest[1..end];
            let ch = match entity {
                "amp" => Some('&'),
                "lt" => Some('<'),
                "gt" => Some('>'),
                "quot" => Some('"'),
                "apos" => Some('\''),
                "nbsp" => Some(' '),
                _ if entity.starts_with("#x") || entity.starts_with("#X") => {
                    u32::from_str_radix(&entity[2..], 16).ok().and_then(char::from_u32)
                }
                _ if entity.starts_with('#') => entity[1..].parse::<u32>().ok().and_then(char::from_u32),
                _ => None,
            };
            ch.map(|c| (c, end))
        });

        match decoded {
            Some((ch, end)) => {
                out.push(ch);
                rest = &rest[end + 1..];
            }
            None => {
                out.push('&');
                rest = &rest[1..];
            }
        }
    }

    out.push_str(rest);
    out
}
