use async_trait::async_trait;
use serde_json::Value;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

use super::{Strategy, StrategyOutcome, TranscriptArtifact, VideoId};
use crate::config::{ProxyConfig, ToolConfig};
use crate::context::RunContext;
use crate::ExtractionError;

/// Reads automatic caption metadata through yt-dlp, routed via a proxy
pub struct DownloadToolStrategy {
    yt_dlp_path: String,
    proxy: ProxyConfig,
    timeout: Duration,
}

impl DownloadToolStrategy {
    pub fn new(tool: &ToolConfig, proxy: &ProxyConfig) -> Self {
        Self {
            yt_dlp_path: tool.yt_dlp_path.clone(),
            proxy: proxy.clone(),
            timeout: Duration::from_secs(tool.timeout_secs),
        }
    }

    /// Get video information using yt-dlp without downloading media
    async fn get_video_info(&self, url: &str) -> Result<Value, ExtractionError> {
        tracing::debug!("Extracting video info for {} via proxy {}", url, self.proxy.url());

        let proxy = self.proxy.url();
        let child = Command::new(&self.yt_dlp_path)
            .args([
                "--dump-json",
                "--skip-download",
                "--no-playlist",
                "--quiet",
                "--no-warnings",
                "--proxy",
                proxy.as_str(),
                url,
            ])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ExtractionError::ToolInvocation(format!("failed to start {}: {}", self.yt_dlp_path, e)))?;

        // On timeout the child future is dropped, which kills the process.
        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| ExtractionError::ToolInvocation(format!("timed out after {}s", self.timeout.as_secs())))?
            .map_err(|e| ExtractionError::ToolInvocation(format!("failed to read tool output: {}", e)))?;

        if !output.status.success() {
            let error = String::from_utf8_lossy(&output.stderr);
            return Err(ExtractionError::ToolInvocation(format!(
                "yt-dlp exited with {}: {}",
                output.status,
                error.trim()
            )));
        }

        serde_json::from_slice(&output.stdout)
            .map_err(|e| ExtractionError::ToolInvocation(format!("unreadable yt-dlp output: {}", e)))
    }
}

/// Take the `automatic_captions` mapping out of a yt-dlp info document.
/// An empty mapping is returned as-is; deciding whether it counts is up to the caller.
pub fn automatic_captions(info: &Value) -> Result<Value, ExtractionError> {
    match info.get("automatic_captions") {
        Some(captions @ Value::Object(_)) => Ok(captions.clone()),
        Some(Value::Null) | None => Err(ExtractionError::ToolInvocation(
            "info has no automatic_captions field".to_string(),
        )),
        Some(other) => Err(ExtractionError::ToolInvocation(format!(
            "automatic_captions has unexpected type: {}",
            json_type(other)
        ))),
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[async_trait]
impl Strategy for DownloadToolStrategy {
    fn name(&self) -> &'static str {
        "yt-dlp"
    }

    async fn attempt(&self, video_id: &VideoId, ctx: &RunContext) -> StrategyOutcome {
        let url = video_id.watch_url(&ctx.config().source.watch_url);

        let result = self
            .get_video_info(&url)
            .await
            .and_then(|info| automatic_captions(&info))
            .map(|captions| TranscriptArtifact::structured(self.name(), captions));

        result.into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use serde_json::json;

    #[test]
    fn test_automatic_captions_present() {
        let info = json!({
            "id": "ABC123",
            "automatic_captions": {
                "en": [{"ext": "json3", "url": "https://example.com/en.json3"}]
            }
        });
        let captions = automatic_captions(&info).unwrap();
        assert_eq!(captions["en"][0]["ext"], "json3");
    }

    #[test]
    fn test_empty_captions_are_not_an_error() {
        let info = json!({"automatic_captions": {}});
        assert_eq!(automatic_captions(&info).unwrap(), json!({}));
    }

    #[test]
    fn test_missing_or_wrong_captions_field() {
        assert!(automatic_captions(&json!({"id": "x"})).is_err());
        assert!(automatic_captions(&json!({"automatic_captions": null})).is_err());

        let err = automatic_captions(&json!({"automatic_captions": []})).unwrap_err();
        assert!(err.to_string().contains("array"));
    }

    #[tokio::test]
    async fn test_missing_binary_is_failure() {
        let config = Config::default();
        let tool = ToolConfig {
            yt_dlp_path: "captionchain-no-such-yt-dlp".to_string(),
            timeout_secs: 5,
        };
        let strategy = DownloadToolStrategy::new(&tool, &config.proxy);
        let video_id = VideoId::new("ABC123").unwrap();
        let ctx = RunContext::new(config, &video_id);

        match strategy.attempt(&video_id, &ctx).await {
            StrategyOutcome::Failure(reason) => assert!(reason.contains("failed to start")),
            StrategyOutcome::Success(_) => panic!("expected failure"),
        }
    }

    /// Run the strategy against a shell script standing in for yt-dlp
    #[cfg(unix)]
    async fn attempt_with_script(dir: &std::path::Path, body: &str, timeout_secs: u64) -> StrategyOutcome {
        use std::os::unix::fs::PermissionsExt;

        let script = dir.join("yt-dlp");
        fs_err::write(&script, format!("#!/bin/sh\n{}\n", body)).unwrap();
        fs_err::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let config = Config::default();
        let tool = ToolConfig {
            yt_dlp_path: script.to_string_lossy().into_owned(),
            timeout_secs,
        };
        let strategy = DownloadToolStrategy::new(&tool, &config.proxy);
        let video_id = VideoId::new("ABC123").unwrap();
        let ctx = RunContext::new(config, &video_id);

        strategy.attempt(&video_id, &ctx).await
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_reads_captions_and_passes_proxy() {
        let dir = tempfile::tempdir().unwrap();
        let args_file = dir.path().join("args.txt");
        let body = format!(
            "printf '%s\\n' \"$@\" > '{}'\necho '{{\"id\":\"ABC123\",\"automatic_captions\":{{\"en\":[{{\"ext\":\"json3\"}}]}}}}'",
            args_file.display()
        );

        match attempt_with_script(dir.path(), &body, 10).await {
            StrategyOutcome::Success(artifact) => {
                assert_eq!(artifact.strategy(), "yt-dlp");
                assert!(!artifact.is_empty());
                assert!(matches!(
                    artifact.content(),
                    crate::strategies::TranscriptContent::Structured(captions) if captions["en"][0]["ext"] == "json3"
                ));
            }
            StrategyOutcome::Failure(reason) => panic!("unexpected failure: {}", reason),
        }

        let args = fs_err::read_to_string(&args_file).unwrap();
        let args: Vec<&str> = args.lines().collect();
        assert!(args.contains(&"--dump-json"));
        assert!(args.contains(&"--skip-download"));
        let proxy = args.iter().position(|a| *a == "--proxy").unwrap();
        assert_eq!(args[proxy + 1], "http://proxy.apify.com:8000");
        assert_eq!(args.last(), Some(&"https://www.youtube.com/watch?v=ABC123"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_empty_captions_come_back_as_empty_success() {
        let dir = tempfile::tempdir().unwrap();

        match attempt_with_script(dir.path(), r#"echo '{"automatic_captions":{}}'"#, 10).await {
            StrategyOutcome::Success(artifact) => assert!(artifact.is_empty()),
            StrategyOutcome::Failure(reason) => panic!("unexpected failure: {}", reason),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_nonzero_exit_reports_stderr() {
        let dir = tempfile::tempdir().unwrap();
        let body = "echo 'ERROR: Sign in to confirm you are not a bot' >&2\nexit 1";

        match attempt_with_script(dir.path(), body, 10).await {
            StrategyOutcome::Failure(reason) => {
                assert!(reason.contains("yt-dlp exited with"));
                assert!(reason.contains("Sign in to confirm you are not a bot"));
            }
            StrategyOutcome::Success(_) => panic!("expected failure"),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_unparseable_output_is_failure() {
        let dir = tempfile::tempdir().unwrap();

        match attempt_with_script(dir.path(), "echo 'not json'", 10).await {
            StrategyOutcome::Failure(reason) => assert!(reason.contains("unreadable yt-dlp output")),
            StrategyOutcome::Success(_) => panic!("expected failure"),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_hung_tool_is_killed_after_timeout() {
        let dir = tempfile::tempdir().unwrap();
        let started = std::time::Instant::now();

        match attempt_with_script(dir.path(), "exec sleep 30", 1).await {
            StrategyOutcome::Failure(reason) => assert!(reason.contains("timed out after 1s")),
            StrategyOutcome::Success(_) => panic!("expected timeout"),
        }
        assert!(started.elapsed() < Duration::from_secs(10));
    }
}
