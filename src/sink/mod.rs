use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::config::StorageConfig;
use crate::strategies::{TranscriptArtifact, VideoId};
use crate::ExtractionError;

/// Fixed local copy of the transcript, relative to the working directory.
/// It does not follow the store configuration.
pub const MIRROR_PATH: &str = "apify_storage/key_value_stores/default/OUTPUT.json";

/// Named JSON records, one per key
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get_value(&self, key: &str) -> Result<Option<Value>>;

    async fn set_value(&self, key: &str, value: &Value) -> Result<()>;

    /// Remove a record; removing a missing key is not an error
    async fn delete_value(&self, key: &str) -> Result<()>;
}

/// Key-value store laid out as `<dir>/<KEY>.json`
pub struct FileKeyValueStore {
    dir: PathBuf,
}

impl FileKeyValueStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn from_config(storage: &StorageConfig) -> Self {
        Self::new(storage.store_dir())
    }

    pub fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", key))
    }
}

#[async_trait]
impl KeyValueStore for FileKeyValueStore {
    async fn get_value(&self, key: &str) -> Result<Option<Value>> {
        let path = self.path_for(key);
        if !path.exists() {
            return Ok(None);
        }

        let content = fs_err::read_to_string(&path)?;
        let value = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        Ok(Some(value))
    }

    async fn set_value(&self, key: &str, value: &Value) -> Result<()> {
        write_json_atomic(&self.path_for(key), value)
    }

    async fn delete_value(&self, key: &str) -> Result<()> {
        match fs_err::remove_file(self.path_for(key)) {
            Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e.into()),
            _ => Ok(()),
        }
    }
}

/// Pretty JSON written to a temp file next to its destination, not yet visible there
pub struct StagedJson {
    file: tempfile::NamedTempFile,
    path: PathBuf,
}

impl StagedJson {
    pub fn new(path: &Path, value: &Value) -> Result<Self> {
        let parent = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        fs_err::create_dir_all(parent)?;

        let content = serde_json::to_string_pretty(value).context("Failed to serialize output")?;

        let mut file = tempfile::NamedTempFile::new_in(parent)
            .with_context(|| format!("Failed to create temporary file in {}", parent.display()))?;
        file.write_all(content.as_bytes())?;
        file.flush()?;

        Ok(Self { file, path: path.to_path_buf() })
    }

    /// Rename into place. Dropping without committing removes the temp file.
    pub fn commit(self) -> Result<()> {
        let path = self.path;
        self.file
            .persist(&path)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(())
    }
}

/// Write pretty JSON through a temp file in the target directory, then rename into place
pub fn write_json_atomic(path: &Path, value: &Value) -> Result<()> {
    StagedJson::new(path, value)?.commit()
}

/// Receives the outcome of a run
#[async_trait]
pub trait ResultSink: Send + Sync {
    /// Store a successful transcript
    async fn persist(&self, artifact: &TranscriptArtifact) -> Result<()>;

    /// Report a run that produced nothing. Nothing is written.
    fn record_failure(&self, video_id: &VideoId, error: &ExtractionError) {
        tracing::error!("Failed to extract transcript for {}: {}", video_id, error);
    }
}

/// Saves the transcript under the output key and mirrors it to a local JSON file
pub struct StorageSink {
    store: Box<dyn KeyValueStore>,
    output_key: String,
    mirror_path: PathBuf,
}

impl StorageSink {
    pub fn new(store: Box<dyn KeyValueStore>, output_key: impl Into<String>, mirror_path: impl Into<PathBuf>) -> Self {
        Self {
            store,
            output_key: output_key.into(),
            mirror_path: mirror_path.into(),
        }
    }

    pub fn from_config(storage: &StorageConfig) -> Self {
        Self::new(
            Box::new(FileKeyValueStore::from_config(storage)),
            storage.output_key.clone(),
            MIRROR_PATH,
        )
    }

    pub fn mirror_path(&self) -> &Path {
        &self.mirror_path
    }
}

#[async_trait]
impl ResultSink for StorageSink {
    async fn persist(&self, artifact: &TranscriptArtifact) -> Result<()> {
        let value = Value::String(artifact.to_text());

        // Both copies land or neither does.
        let mirror = StagedJson::new(&self.mirror_path, &value)?;
        let previous = self.store.get_value(&self.output_key).await.ok().flatten();

        self.store
            .set_value(&self.output_key, &value)
            .await
            .with_context(|| format!("Failed to store {}", self.output_key))?;

        if let Err(e) = mirror.commit() {
            self.restore_output(previous).await;
            return Err(e);
        }

        tracing::info!("Transcript saved in key-value store as {}", self.output_key);
        tracing::info!("Transcript saved to {}", self.mirror_path.display());

        Ok(())
    }
}

impl StorageSink {
    async fn restore_output(&self, previous: Option<Value>) {
        let restored = match &previous {
            Some(value) => self.store.set_value(&self.output_key, value).await,
            None => self.store.delete_value(&self.output_key).await,
        };
        if let Err(e) = restored {
            tracing::warn!("Could not roll back {}: {}", self.output_key, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio_test::assert_ok;

    #[tokio::test]
    async fn test_store_round_trip_and_missing_key() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileKeyValueStore::new(dir.path().join("key_value_stores").join("default"));

        assert!(store.get_value("INPUT").await.unwrap().is_none());

        let input = json!({"start_urls": [{"url": "https://www.youtube.com/watch?v=ABC123"}]});
        assert_ok!(store.set_value("INPUT", &input).await);
        assert_eq!(store.get_value("INPUT").await.unwrap(), Some(input));
    }

    #[tokio::test]
    async fn test_persist_writes_store_and_mirror() {
        let dir = tempfile::tempdir().unwrap();
        let store_dir = dir.path().join("store");
        let mirror = dir.path().join("mirror").join("nested").join("OUTPUT.json");
        let sink = StorageSink::new(Box::new(FileKeyValueStore::new(&store_dir)), "OUTPUT", &mirror);

        let artifact = TranscriptArtifact::structured("caption-api", json!([{"text": "hi", "start": 1.0}]));
        assert_ok!(sink.persist(&artifact).await);

        let mirrored = fs_err::read_to_string(&mirror).unwrap();
        let stored = fs_err::read_to_string(store_dir.join("OUTPUT.json")).unwrap();
        assert_eq!(mirrored, stored);

        let text: String = serde_json::from_str(&mirrored).unwrap();
        assert_eq!(text, artifact.to_text());
    }

    #[test]
    fn test_atomic_write_replaces_existing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("OUTPUT.json");
        fs_err::write(&path, "stale").unwrap();

        write_json_atomic(&path, &json!("fresh")).unwrap();
        assert_eq!(fs_err::read_to_string(&path).unwrap(), "\"fresh\"");

        let leftovers = std::fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(leftovers, 1);
    }

    #[test]
    fn test_from_config_paths() {
        let sink = StorageSink::from_config(&crate::Config::default().storage);
        assert_eq!(
            sink.mirror_path(),
            Path::new("apify_storage/key_value_stores/default/OUTPUT.json")
        );
    }

    #[test]
    fn test_storage_dir_override_leaves_mirror_in_place() {
        let mut config = crate::Config::default();
        config.apply_overrides(|key| (key == "APIFY_LOCAL_STORAGE_DIR").then(|| "/srv/actor".to_string()));

        let store = FileKeyValueStore::from_config(&config.storage);
        assert_eq!(
            store.path_for("OUTPUT"),
            PathBuf::from("/srv/actor/key_value_stores/default/OUTPUT.json")
        );

        let sink = StorageSink::from_config(&config.storage);
        assert_eq!(sink.mirror_path(), Path::new(MIRROR_PATH));
    }

    #[tokio::test]
    async fn test_unwritable_mirror_leaves_store_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let store_dir = dir.path().join("store");
        let blocker = dir.path().join("blocker");
        fs_err::write(&blocker, "not a directory").unwrap();

        let sink = StorageSink::new(
            Box::new(FileKeyValueStore::new(&store_dir)),
            "OUTPUT",
            blocker.join("OUTPUT.json"),
        );

        let artifact = TranscriptArtifact::markup("headless-browser", "<html>captions</html>");
        assert!(sink.persist(&artifact).await.is_err());
        assert!(!store_dir.join("OUTPUT.json").exists());
    }

    #[tokio::test]
    async fn test_failed_mirror_rename_rolls_back_store() {
        let dir = tempfile::tempdir().unwrap();
        let store_dir = dir.path().join("store");
        // A directory at the mirror path lets staging succeed but the final rename fail.
        let mirror = dir.path().join("mirror");
        fs_err::create_dir_all(mirror.join("occupied")).unwrap();

        let store = FileKeyValueStore::new(&store_dir);
        let sink = StorageSink::new(Box::new(FileKeyValueStore::new(&store_dir)), "OUTPUT", &mirror);
        let artifact = TranscriptArtifact::markup("headless-browser", "<html>captions</html>");

        assert!(sink.persist(&artifact).await.is_err());
        assert!(store.get_value("OUTPUT").await.unwrap().is_none());

        store.set_value("OUTPUT", &json!("earlier run")).await.unwrap();
        assert!(sink.persist(&artifact).await.is_err());
        assert_eq!(store.get_value("OUTPUT").await.unwrap(), Some(json!("earlier run")));

        // No temp files are left next to the mirror.
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 2);
    }

    #[tokio::test]
    async fn test_delete_missing_key_is_ok() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileKeyValueStore::new(dir.path());
        assert_ok!(store.delete_value("OUTPUT").await);
    }
}
