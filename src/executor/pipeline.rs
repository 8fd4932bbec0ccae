use anyhow::Context;
use tracing::Instrument;

use super::FallbackExecutor;
use crate::config::Config;
use crate::context::RunContext;
use crate::sink::{ResultSink, StorageSink};
use crate::strategies::{TranscriptArtifact, VideoId};
use crate::{ExtractionError, Result};

/// Resolves a transcript and hands the outcome to a sink
pub struct TranscriptPipeline {
    executor: FallbackExecutor,
    sink: Box<dyn ResultSink>,
}

impl TranscriptPipeline {
    pub fn new(executor: FallbackExecutor, sink: Box<dyn ResultSink>) -> Self {
        Self { executor, sink }
    }

    /// Default strategy chain writing to local storage
    pub fn from_config(config: &Config) -> Self {
        Self::new(
            FallbackExecutor::from_config(config),
            Box::new(StorageSink::from_config(&config.storage)),
        )
    }

    pub fn executor(&self) -> &FallbackExecutor {
        &self.executor
    }

    /// Resolve the transcript and persist it.
    ///
    /// Fails with `ExtractionError::AllStrategiesExhausted` when no strategy
    /// produced anything; in that case nothing is written.
    pub async fn run(&self, video_id: &VideoId, ctx: &RunContext) -> Result<TranscriptArtifact> {
        let artifact = self.executor.resolve(video_id, ctx).await;

        self.finish(video_id, artifact)
            .instrument(ctx.span().clone())
            .await
    }

    async fn finish(&self, video_id: &VideoId, artifact: Option<TranscriptArtifact>) -> Result<TranscriptArtifact> {
        let Some(artifact) = artifact else {
            let error = ExtractionError::AllStrategiesExhausted(self.executor.len());
            self.sink.record_failure(video_id, &error);
            return Err(error.into());
        };

        tracing::info!("Transcript extracted successfully with {}", artifact.strategy());
        self.sink
            .persist(&artifact)
            .await
            .context("Failed to persist transcript")?;

        Ok(artifact)
    }
}
