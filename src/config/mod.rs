use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Where videos live and which caption languages to prefer
    pub source: SourceConfig,

    /// Proxy used by the download tool
    pub proxy: ProxyConfig,

    /// External extraction tool settings
    pub tool: ToolConfig,

    /// Headless browser settings
    pub browser: BrowserSettings,

    /// Local key-value storage
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Base of the canonical watch URL; the video id is appended as `?v=<id>`
    pub watch_url: String,

    /// Caption languages in order of preference
    pub languages: Vec<String>,

    /// Timeout for caption API requests in seconds
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxyConfig {
    pub host: String,
    pub port: u16,
}

impl ProxyConfig {
    pub fn url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolConfig {
    /// Path or name of the yt-dlp binary
    pub yt_dlp_path: String,

    /// Kill the tool if it runs longer than this
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrowserSettings {
    /// Chrome/Chromium binary; auto-detected when unset
    pub executable: Option<PathBuf>,

    pub window_width: u32,
    pub window_height: u32,

    /// CSS selector of the captions toggle
    pub caption_selector: String,

    /// How long to wait for the captions toggle to appear
    pub element_timeout_secs: u64,

    /// Delay between checks for the captions toggle
    pub poll_interval_ms: u64,

    /// Bounds of the random delay after enabling captions
    pub settle_min_ms: u64,
    pub settle_max_ms: u64,
}

impl BrowserSettings {
    pub fn element_timeout(&self) -> Duration {
        Duration::from_secs(self.element_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Root of the local storage tree
    pub dir: PathBuf,

    /// Key-value store name under `key_value_stores/`
    pub store: String,

    /// Key the transcript is saved under
    pub output_key: String,

    /// Key the actor input is read from
    pub input_key: String,
}

impl StorageConfig {
    pub fn store_dir(&self) -> PathBuf {
        self.dir.join("key_value_stores").join(&self.store)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            source: SourceConfig {
                watch_url: "https://www.youtube.com/watch".to_string(),
                languages: vec!["en".to_string()],
                request_timeout_secs: 30,
            },
            proxy: ProxyConfig {
                host: "proxy.apify.com".to_string(),
                port: 8000,
            },
            tool: ToolConfig {
                yt_dlp_path: "yt-dlp".to_string(),
                timeout_secs: 120,
            },
            browser: BrowserSettings {
                executable: None,
                window_width: 1280,
                window_height: 720,
                caption_selector: ".ytp-subtitles-button".to_string(),
                element_timeout_secs: 10,
                poll_interval_ms: 250,
                settle_min_ms: 5_000,
                settle_max_ms: 10_000,
            },
            storage: StorageConfig {
                dir: PathBuf::from("apify_storage"),
                store: "default".to_string(),
                output_key: "OUTPUT".to_string(),
                input_key: "INPUT".to_string(),
            },
        }
    }
}

impl Config {
    /// Load configuration from file or create default, then apply environment overrides
    pub async fn load(path: Option<&Path>) -> Result<Self> {
        let config_path = match path {
            Some(path) => path.to_path_buf(),
            None => Self::config_path()?,
        };

        let mut config = if config_path.exists() {
            let content = fs_err::read_to_string(&config_path)
                .context("Failed to read config file")?;

            serde_yaml::from_str(&content)
                .context("Failed to parse config file")?
        } else {
            let config = Self::default();
            config.save_to(&config_path).await?;
            config
        };

        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub async fn save_to(&self, config_path: &Path) -> Result<()> {
        if let Some(parent) = config_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs_err::create_dir_all(parent)?;
            }
        }

        let content = serde_yaml::to_string(self)
            .context("Failed to serialize config")?;

        fs_err::write(config_path, content)
            .context("Failed to write config file")?;

        Ok(())
    }

    /// Get configuration file path
    pub fn config_path() -> Result<PathBuf> {
        let local_config = PathBuf::from("config.yaml");
        if local_config.exists() {
            return Ok(local_config);
        }

        let config_dir = dirs::config_dir()
            .context("Could not determine config directory")?;

        Ok(config_dir.join("captionchain").join("config.yaml"))
    }

    /// Apply platform environment variables on top of the file configuration
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        if let Some(dir) = lookup("APIFY_LOCAL_STORAGE_DIR") {
            self.storage.dir = PathBuf::from(dir);
        }
        if let Some(host) = lookup("APIFY_PROXY_HOSTNAME") {
            self.proxy.host = host;
        }
        if let Some(port) = lookup("APIFY_PROXY_PORT") {
            match port.parse() {
                Ok(port) => self.proxy.port = port,
                Err(_) => tracing::warn!("Ignoring invalid APIFY_PROXY_PORT: {}", port),
            }
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        Url::parse(&self.source.watch_url)
            .with_context(|| format!("Invalid watch URL: {}", self.source.watch_url))?;

        if self.proxy.host.trim().is_empty() {
            anyhow::bail!("Proxy host must be configured");
        }

        if self.browser.window_width == 0 || self.browser.window_height == 0 {
            anyhow::bail!("Browser viewport must be non-zero");
        }

        if self.browser.settle_min_ms > self.browser.settle_max_ms {
            anyhow::bail!(
                "Settle delay minimum ({}ms) exceeds maximum ({}ms)",
                self.browser.settle_min_ms,
                self.browser.settle_max_ms
            );
        }

        if self.browser.caption_selector.trim().is_empty() {
            anyhow::bail!("Caption selector must not be empty");
        }

        Ok(())
    }

    /// Display current configuration
    pub fn display(&self) {
        println!("Current Configuration:");
        println!("  Watch URL: {}", self.source.watch_url);
        println!("  Caption Languages: {}", self.source.languages.join(", "));
        println!("  Proxy: {}", self.proxy.url());
        println!("  yt-dlp: {}", self.tool.yt_dlp_path);
        println!(
            "  Browser: {}x{}, element timeout {}s, settle {}-{}ms",
            self.browser.window_width,
            self.browser.window_height,
            self.browser.element_timeout_secs,
            self.browser.settle_min_ms,
            self.browser.settle_max_ms
        );
        println!("  Storage: {}", self.storage.store_dir().display());
    }
}
