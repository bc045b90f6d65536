//! Lode - native inference engine provisioning
//!
//! CLI entry point that dispatches to subcommands.

use clap::Parser;
use console::style;
use lode::cli::{Cli, CommandContext, Commands};
use lode::config::ConfigManager;
use lode::error::LodeResult;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {}", style("Error:").red().bold(), e);
            if let Some(hint) = e.hint() {
                eprintln!("{} {}", style("Hint:").yellow(), hint);
            }
            ExitCode::FAILURE
        }
    }
}

async fn run() -> LodeResult<()> {
    let cli = Cli::parse();

    // Initialize logging: 0 = warn (spinners only), 1 = info, 2+ = debug
    let filter = match cli.verbose {
        0 => EnvFilter::new("lode=warn"),
        1 => EnvFilter::new("lode=info"),
        _ => EnvFilter::new("lode=debug"),
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .init();

    // Load configuration
    let config_manager = if let Some(ref path) = cli.config {
        ConfigManager::with_path(path.clone())
    } else {
        ConfigManager::new()
    };
    let config = config_manager.load().await?;

    let ctx = CommandContext {
        config,
        cache_dir: cli.cache_dir,
        index_url: cli.index_url,
    };

    // Dispatch to command
    match cli.command {
        Commands::Ready(args) => lode::cli::commands::ready(args, &ctx).await,
        Commands::Download(args) => lode::cli::commands::download(args, &ctx).await,
        Commands::Clean(args) => lode::cli::commands::clean(args, &ctx).await,
        Commands::Checksum(args) => lode::cli::commands::checksum(args).await,
        Commands::Status(args) => lode::cli::commands::status(args, &ctx).await,
    }
}
