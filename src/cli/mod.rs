use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "captionchain",
    about = "Captionchain - Fetch a YouTube transcript through a chain of fallback strategies",
    version,
    long_about = "Fetches the transcript of a single video. Tries the caption API first, then yt-dlp through a proxy, then a headless browser, and saves the first result to local key-value storage."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Disable progress indicators
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub log_json: bool,

    /// Configuration file (defaults to ./config.yaml or the user config directory)
    #[arg(short, long, global = true, value_name = "FILE", env = "CAPTIONCHAIN_CONFIG")]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Fetch the transcript for the video named in the actor input
    Run {
        /// Input JSON file (defaults to the INPUT record of the local key-value store)
        #[arg(short, long, value_name = "FILE")]
        input: Option<PathBuf>,

        /// Use this video id instead of reading the input
        #[arg(long, value_name = "ID")]
        video_id: Option<String>,

        /// Seed for the browser jitter delay
        #[arg(long, value_name = "SEED")]
        seed: Option<u64>,
    },

    /// Show or create the configuration file
    Config {
        /// Show current configuration
        #[arg(short, long)]
        show: bool,
    },

    /// List extraction strategies in the order they are tried
    Strategies,
}
