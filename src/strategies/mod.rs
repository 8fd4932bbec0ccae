use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub mod api;
pub mod browser;
pub mod download_tool;

use crate::context::RunContext;
use crate::ExtractionError;

pub use api::ApiStrategy;
pub use browser::{BrowserAutomationStrategy, BrowserDriver, BrowserSession, ChromeDriver};
pub use download_tool::DownloadToolStrategy;

/// Opaque identifier of a video on the source platform
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VideoId(String);

impl VideoId {
    pub fn new(id: impl Into<String>) -> Result<Self, ExtractionError> {
        let id = id.into();
        let id = id.trim();
        if id.is_empty() {
            return Err(ExtractionError::NoIdentifierFound);
        }
        Ok(Self(id.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Canonical watch URL for this video under the given base (e.g. `https://www.youtube.com/watch`)
    pub fn watch_url(&self, base: &str) -> String {
        format!("{}?v={}", base, urlencoding::encode(&self.0))
    }
}

impl std::fmt::Display for VideoId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Content format tag of a transcript artifact
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ContentFormat {
    StructuredCaptions,
    RawMarkup,
}

impl ContentFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentFormat::StructuredCaptions => "structured-captions",
            ContentFormat::RawMarkup => "raw-markup",
        }
    }
}

impl std::fmt::Display for ContentFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raw transcript content as produced by a strategy
#[derive(Debug, Clone, PartialEq)]
pub enum TranscriptContent {
    /// Caption entries or caption track metadata
    Structured(Value),
    /// Rendered page markup
    Markup(String),
}

/// Transcript produced by a single strategy. Fields are private so it stays immutable.
#[derive(Debug, Clone)]
pub struct TranscriptArtifact {
    content: TranscriptContent,
    strategy: String,
    captured_at: DateTime<Utc>,
}

impl TranscriptArtifact {
    pub fn structured(strategy: &str, content: Value) -> Self {
        Self {
            content: TranscriptContent::Structured(content),
            strategy: strategy.to_string(),
            captured_at: Utc::now(),
        }
    }

    pub fn markup(strategy: &str, markup: impl Into<String>) -> Self {
        Self {
            content: TranscriptContent::Markup(markup.into()),
            strategy: strategy.to_string(),
            captured_at: Utc::now(),
        }
    }

    pub fn format(&self) -> ContentFormat {
        match self.content {
            TranscriptContent::Structured(_) => ContentFormat::StructuredCaptions,
            TranscriptContent::Markup(_) => ContentFormat::RawMarkup,
        }
    }

    pub fn content(&self) -> &TranscriptContent {
        &self.content
    }

    /// Name of the strategy that produced this artifact
    pub fn strategy(&self) -> &str {
        &self.strategy
    }

    pub fn captured_at(&self) -> DateTime<Utc> {
        self.captured_at
    }

    /// An artifact with no content: null, `{}`, `[]`, or empty markup.
    /// The executor treats these as a miss and moves to the next strategy.
    pub fn is_empty(&self) -> bool {
        match &self.content {
            TranscriptContent::Structured(Value::Null) => true,
            TranscriptContent::Structured(Value::Object(map)) => map.is_empty(),
            TranscriptContent::Structured(Value::Array(items)) => items.is_empty(),
            TranscriptContent::Structured(Value::String(s)) => s.is_empty(),
            TranscriptContent::Structured(_) => false,
            TranscriptContent::Markup(markup) => markup.is_empty(),
        }
    }

    /// Text form of the content: pretty JSON for structured captions, markup as-is
    pub fn to_text(&self) -> String {
        match &self.content {
            TranscriptContent::Structured(value) => {
                serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
            }
            TranscriptContent::Markup(markup) => markup.clone(),
        }
    }
}

/// Result of one strategy attempt
#[derive(Debug, Clone)]
pub enum StrategyOutcome {
    Success(TranscriptArtifact),
    Failure(String),
}

impl StrategyOutcome {
    pub fn failure(error: impl std::fmt::Display) -> Self {
        StrategyOutcome::Failure(error.to_string())
    }

    pub fn is_success(&self) -> bool {
        matches!(self, StrategyOutcome::Success(_))
    }
}

impl From<Result<TranscriptArtifact, ExtractionError>> for StrategyOutcome {
    fn from(result: Result<TranscriptArtifact, ExtractionError>) -> Self {
        match result {
            Ok(artifact) => StrategyOutcome::Success(artifact),
            Err(e) => StrategyOutcome::failure(e),
        }
    }
}

/// A self-contained way of obtaining a transcript.
///
/// Implementations must never propagate errors: every failure becomes
/// `StrategyOutcome::Failure`, and anything acquired during the attempt is
/// released before `attempt` returns.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Strategy: Send + Sync {
    /// Short name used in logs and on produced artifacts
    fn name(&self) -> &'static str;

    /// Try to produce a transcript for the video
    async fn attempt(&self, video_id: &VideoId, ctx: &RunContext) -> StrategyOutcome;
}
