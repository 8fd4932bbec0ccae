use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;

use crate::sink::KeyValueStore;
use crate::strategies::VideoId;
use crate::ExtractionError;

/// Marker preceding the video id in a canonical watch URL
const WATCH_MARKER: &str = "watch?v=";

/// Actor input payload
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ActorInput {
    #[serde(default)]
    pub start_urls: Vec<StartUrl>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StartUrl {
    #[serde(default)]
    pub url: String,
}

impl ActorInput {
    pub fn from_value(value: Value) -> Result<Self> {
        if value.is_null() {
            return Ok(Self::default());
        }
        serde_json::from_value(value).context("Invalid actor input")
    }

    /// Read input from a JSON file; a missing file is an empty input
    pub fn from_path(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!("No input file at {}", path.display());
            return Ok(Self::default());
        }

        let content = fs_err::read_to_string(path)?;
        let value: Value = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse input file {}", path.display()))?;
        Self::from_value(value)
    }

    /// Read input from the key-value store; an absent record is an empty input
    pub async fn from_store(store: &dyn KeyValueStore, key: &str) -> Result<Self> {
        match store.get_value(key).await? {
            Some(value) => Self::from_value(value),
            None => Ok(Self::default()),
        }
    }

    /// Video id from the first start URL that carries a watch marker
    pub fn video_id(&self) -> Result<VideoId, ExtractionError> {
        self.start_urls
            .iter()
            .find_map(|target| video_id_from_url(&target.url))
            .ok_or(ExtractionError::NoIdentifierFound)
    }
}

/// Text after `watch?v=` up to the next `&`
pub fn video_id_from_url(url: &str) -> Option<VideoId> {
    let (_, rest) = url.rsplit_once(WATCH_MARKER)?;
    let id = rest.split('&').next().unwrap_or_default();
    VideoId::new(id).ok()
}
