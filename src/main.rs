use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use captionchain::cli::{Cli, Commands};
use captionchain::config::Config;
use captionchain::context::RunContext;
use captionchain::executor::{FallbackExecutor, TranscriptPipeline};
use captionchain::input::ActorInput;
use captionchain::sink::{FileKeyValueStore, MIRROR_PATH};
use captionchain::strategies::VideoId;
use captionchain::utils;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_tracing(cli.verbose, cli.log_json);

    // Check for required external dependencies (non-fatal; earlier strategies may still succeed)
    let missing_deps = utils::check_dependencies().await;
    if !missing_deps.is_empty() {
        eprintln!("⚠️  Dependency check warnings:");
        for dep in missing_deps {
            eprintln!("   • {}", dep);
        }
        eprintln!("   (Continuing anyway - strategies needing them will fail over)");
    }

    let config = Config::load(cli.config.as_deref()).await?;

    match cli.command {
        Commands::Run { input, video_id, seed } => {
            tracing::info!("Actor started");

            let video_id = match video_id {
                Some(id) => VideoId::new(id)?,
                None => {
                    let input = match input {
                        Some(path) => ActorInput::from_path(&path)?,
                        None => {
                            let store = FileKeyValueStore::from_config(&config.storage);
                            ActorInput::from_store(&store, &config.storage.input_key).await?
                        }
                    };
                    input.video_id().map_err(|e| {
                        tracing::error!("No video_id provided!");
                        e
                    })?
                }
            };

            tracing::info!("Fetching transcript for video {}", video_id);

            let pipeline = TranscriptPipeline::from_config(&config);
            let mut ctx = RunContext::new(config.clone(), &video_id).with_progress(!cli.quiet);
            if let Some(seed) = seed {
                ctx = ctx.with_seed(seed);
            }

            let artifact = pipeline.run(&video_id, &ctx).await?;

            println!(
                "Transcript ({}, via {}) saved to: {}",
                artifact.format(),
                artifact.strategy(),
                MIRROR_PATH
            );
            tracing::info!("Actor finished");
        }
        Commands::Config { show } => {
            if show {
                config.display();
            } else {
                let path = match &cli.config {
                    Some(path) => path.clone(),
                    None => Config::config_path()?,
                };
                println!("Configuration file: {}", path.display());
                println!("Edit it to change the proxy, timeouts or storage location.");
            }
        }
        Commands::Strategies => {
            println!("Strategies, in the order they are tried:");
            let executor = FallbackExecutor::from_config(&config);
            for (position, name) in executor.strategy_names().iter().enumerate() {
                println!("  {}. {}", position + 1, name);
            }
        }
    }

    Ok(())
}

fn init_tracing(verbose: bool, json: bool) {
    let default_filter = if verbose { "captionchain=debug" } else { "captionchain=info" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| default_filter.into());

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}
