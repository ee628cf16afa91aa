//! vlmcap CLI - caption images with interchangeable vision-language models.
//!
//! # Usage
//!
//! ```bash
//! # List models and prompts
//! vlmcap models list
//! vlmcap prompts
//!
//! # Caption one image
//! vlmcap caption photo.jpg --model Qwen3-VLM-8B-Ollama --prompt short
//!
//! # Caption a directory, writing photo.txt next to photo.jpg
//! vlmcap directory ./photos --model microsoft/Florence-2-base-ft
//!
//! # Fetch local model files
//! vlmcap models download microsoft/Florence-2-base-ft
//! ```

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use vlmcap_core::Config;

mod cli;
mod logging;

/// vlmcap - caption images with interchangeable vision-language models.
#[derive(Parser, Debug)]
#[command(name = "vlmcap")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Enable verbose (debug) logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Output logs in JSON format
    #[arg(long, global = true)]
    json_logs: bool,

    /// Use this config file instead of the default location
    #[arg(long, global = true, env = "VLMCAP_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Available commands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Manage models (list, download, path)
    Models(cli::models::ModelsArgs),

    /// List prompt keys and their text
    Prompts(cli::prompts::PromptsArgs),

    /// Caption a single image
    Caption(cli::caption::CaptionArgs),

    /// Caption every image in a directory, writing a sidecar file per image
    Directory(cli::directory::DirectoryArgs),

    /// View and manage configuration
    Config(cli::config::ConfigArgs),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Logging isn't initialized yet, so config warnings go through eprintln.
    let config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => match Config::load() {
            Ok(config) => config,
            Err(e) => {
                eprintln!(
                    "Warning: Failed to load config: {e}\n  \
                     Using default configuration. Check your config file with `vlmcap config path`."
                );
                Config::default()
            }
        },
    };
    logging::init_from_config(&config, cli.verbose, cli.json_logs);

    tracing::debug!("vlmcap v{}", vlmcap_core::VERSION);

    match cli.command {
        Commands::Models(args) => cli::models::execute(args, &config).await,
        Commands::Prompts(args) => cli::prompts::execute(args, &config),
        Commands::Caption(args) => cli::caption::execute(args, &config).await,
        Commands::Directory(args) => cli::directory::execute(args, &config).await,
        Commands::Config(args) => cli::config::execute(args, &config, cli.config.as_deref()),
    }
}
