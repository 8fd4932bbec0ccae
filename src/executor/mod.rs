use std::time::Duration;
use tracing::Instrument;

use crate::config::Config;
use crate::context::RunContext;
use crate::strategies::{
    ApiStrategy, BrowserAutomationStrategy, DownloadToolStrategy, Strategy, StrategyOutcome,
    TranscriptArtifact, VideoId,
};

pub mod pipeline;

pub use pipeline::TranscriptPipeline;

/// Tries strategies in priority order and keeps the first non-empty transcript
pub struct FallbackExecutor {
    strategies: Vec<Box<dyn Strategy>>,
}

impl FallbackExecutor {
    pub fn new(strategies: Vec<Box<dyn Strategy>>) -> Self {
        Self { strategies }
    }

    /// The standard chain: caption API, then yt-dlp, then the headless browser
    pub fn from_config(config: &Config) -> Self {
        Self::new(vec![
            Box::new(ApiStrategy::new(Duration::from_secs(config.source.request_timeout_secs))),
            Box::new(DownloadToolStrategy::new(&config.tool, &config.proxy)),
            Box::new(BrowserAutomationStrategy::default()),
        ])
    }

    /// Strategy names in the order they are tried
    pub fn strategy_names(&self) -> Vec<&'static str> {
        self.strategies.iter().map(|strategy| strategy.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.strategies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }

    /// Run each strategy once, in order, stopping at the first non-empty success
    pub async fn resolve(&self, video_id: &VideoId, ctx: &RunContext) -> Option<TranscriptArtifact> {
        self.resolve_inner(video_id, ctx)
            .instrument(ctx.span().clone())
            .await
    }

    async fn resolve_inner(&self, video_id: &VideoId, ctx: &RunContext) -> Option<TranscriptArtifact> {
        for strategy in &self.strategies {
            let name = strategy.name();
            let progress = ctx.spinner(format!("Trying {}...", name));
            tracing::debug!("Attempting strategy {}", name);

            let outcome = strategy.attempt(video_id, ctx).await;
            progress.finish_and_clear();

            match outcome {
                StrategyOutcome::Success(artifact) if !artifact.is_empty() => {
                    tracing::info!("{} produced a {} transcript", name, artifact.format());
                    return Some(artifact);
                }
                StrategyOutcome::Success(_) => {
                    tracing::info!("{} returned an empty result, falling back", name);
                }
                StrategyOutcome::Failure(reason) => {
                    tracing::info!("{} failed: {}", name, reason);
                }
            }
        }

        None
    }
}
