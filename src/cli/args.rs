//! CLI argument definitions using clap derive

use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Lode - native inference engine provisioning
///
/// Resolves, downloads, caches, and loads platform-specific engine builds
/// so the surrounding application never compiles native code itself.
#[derive(Parser, Debug)]
#[command(name = "lode")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity (-v info, -vv debug)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    /// Configuration file path
    #[arg(short, long, global = true, env = "LODE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Cache root override (higher priority than LODE_CACHE_DIR)
    #[arg(long, global = true)]
    pub cache_dir: Option<PathBuf>,

    /// Release index base URL, for mirrors
    #[arg(long, global = true, env = "LODE_INDEX_URL", hide = true)]
    pub index_url: Option<String>,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Fetch (if needed) and load the engine for this machine
    Ready(ReadyArgs),

    /// Download engine builds for a list of platforms
    Download(DownloadArgs),

    /// Remove cached engine builds
    Clean(CleanArgs),

    /// Compute the SHA-256 digest of a file
    Checksum(ChecksumArgs),

    /// Show cache root, cached builds, and loader state
    Status(StatusArgs),
}

/// Output format for listings
#[derive(ValueEnum, Clone, Copy, Debug)]
pub enum OutputFormat {
    Table,
    Json,
}

/// Arguments for the ready command
#[derive(Parser, Debug)]
pub struct ReadyArgs {
    /// Release tag (defaults to the configured pin, then latest)
    #[arg(short, long)]
    pub tag: Option<String>,

    /// GPU variant: cuda, vulkan, or hip (defaults to the CPU build)
    #[arg(long)]
    pub variant: Option<String>,
}

/// Arguments for the download command
#[derive(Parser, Debug)]
pub struct DownloadArgs {
    /// Release tag (defaults to the configured pin, then latest)
    #[arg(short, long)]
    pub tag: Option<String>,

    /// Platforms to provision, e.g. linux-x64 windows-x64-cuda
    /// (defaults to this machine)
    #[arg(value_name = "PLATFORM")]
    pub platforms: Vec<String>,

    /// Maximum parallel downloads
    #[arg(short = 'j', long, default_value_t = crate::batch::DEFAULT_CONCURRENCY)]
    pub concurrency: usize,
}

/// Arguments for the clean command
#[derive(Parser, Debug)]
pub struct CleanArgs {
    /// Only remove entries for this release tag
    #[arg(short, long)]
    pub tag: Option<String>,

    /// Only remove entries for this platform, e.g. linux-x64
    #[arg(short, long)]
    pub platform: Option<String>,

    /// Skip the confirmation prompt
    #[arg(short, long)]
    pub yes: bool,
}

/// Arguments for the checksum command
#[derive(Parser, Debug)]
pub struct ChecksumArgs {
    /// File to digest
    pub file: PathBuf,
}

/// Arguments for the status command
#[derive(Parser, Debug)]
pub struct StatusArgs {
    /// Output format
    #[arg(long, value_enum, default_value = "table")]
    pub format: OutputFormat,
}
