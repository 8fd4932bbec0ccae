//! Captionchain - fetch the transcript of a single YouTube video
//!
//! The library tries a fixed chain of extraction strategies (the caption API, yt-dlp
//! through a proxy, and a headless browser) and keeps the first non-empty result.

pub mod cli;
pub mod config;
pub mod context;
pub mod executor;
pub mod input;
pub mod sink;
pub mod strategies;
pub mod utils;

pub use cli::{Cli, Commands};
pub use config::Config;
pub use context::{Clock, RunContext, SystemClock};
pub use executor::{FallbackExecutor, TranscriptPipeline};
pub use input::ActorInput;
pub use sink::{FileKeyValueStore, KeyValueStore, ResultSink, StorageSink};
pub use strategies::{ContentFormat, Strategy, StrategyOutcome, TranscriptArtifact, VideoId};

/// Result type used throughout the library
pub type Result<T> = anyhow::Result<T>;

/// Error types for transcript extraction
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum ExtractionError {
    #[error("Caption API unavailable: {0}")]
    ApiUnavailable(String),

    #[error("Extraction tool failed: {0}")]
    ToolInvocation(String),

    #[error("Element '{selector}' not found within {timeout_secs}s")]
    ElementNotFound { selector: String, timeout_secs: u64 },

    #[error("Browser automation failed: {0}")]
    BrowserAutomation(String),

    #[error("No video identifier found in input")]
    NoIdentifierFound,

    #[error("All {0} strategies failed to produce a transcript")]
    AllStrategiesExhausted(usize),
}
