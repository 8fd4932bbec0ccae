use tokio::process::Command;

/// Browser binaries looked up on PATH, in order
const BROWSER_CANDIDATES: &[&str] = &["chromium", "chromium-browser", "google-chrome", "chrome"];

/// Check if the current environment has the external tools the strategies use
pub async fn check_dependencies() -> Vec<String> {
    let mut missing = Vec::new();

    if !check_command_available("yt-dlp").await {
        missing.push("yt-dlp - required for the yt-dlp strategy".to_string());
    }

    if find_browser().await.is_none() {
        missing.push("chromium/chrome - required for the headless browser strategy".to_string());
    }

    missing
}

/// First Chrome/Chromium binary that answers `--version`
pub async fn find_browser() -> Option<&'static str> {
    for &candidate in BROWSER_CANDIDATES {
        if check_command_available(candidate).await {
            return Some(candidate);
        }
    }
    None
}

/// Check if a command is available in PATH
pub async fn check_command_available(command: &str) -> bool {
    Command::new(command)
        .arg("--version")
        .output()
        .await
        .map(|output| output.status.success())
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_command_is_unavailable() {
        assert!(!check_command_available("captionchain-definitely-missing").await);
    }

    #[tokio::test]
    async fn test_dependency_report_mentions_tools_only() {
        for message in check_dependencies().await {
            assert!(message.starts_with("yt-dlp") || message.starts_with("chromium"));
        }
    }
}
