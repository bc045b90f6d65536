//! Status command - cache root, cached builds, and loader state

use crate::cache::{format_bytes, CachedBuild, LibraryCache};
use crate::cli::args::{OutputFormat, StatusArgs};
use crate::cli::commands::CommandContext;
use crate::engine;
use crate::error::LodeResult;
use crate::platform::PlatformTarget;
use console::style;

/// Execute the status command
pub async fn status(args: StatusArgs, ctx: &CommandContext) -> LodeResult<()> {
    let cache = ctx.open_cache()?;
    let builds = cache.entries()?;

    match args.format {
        OutputFormat::Table => print_table(ctx, &cache, &builds),
        OutputFormat::Json => print_json(ctx, &cache, &builds),
    }
}

fn detect_platform(ctx: &CommandContext) -> Option<String> {
    let variant = ctx.config.gpu_variant().ok().flatten();
    PlatformTarget::detect(variant).ok().map(|t| t.to_string())
}

fn print_table(
    ctx: &CommandContext,
    cache: &LibraryCache,
    builds: &[CachedBuild],
) -> LodeResult<()> {
    println!("{}", style("Lode Status").bold());
    println!();

    let platform = detect_platform(ctx).unwrap_or_else(|| "unknown".to_string());
    println!("Platform:    {}", platform);
    println!(
        "Engine repo: {}/{}",
        ctx.config.repo.owner, ctx.config.repo.name
    );
    println!("Cache root:  {}", cache.root().display());
    println!(
        "Loader:      {}",
        if engine::loader().is_loaded() {
            style("loaded").green().to_string()
        } else {
            style("not loaded").dim().to_string()
        }
    );
    println!();

    if builds.is_empty() {
        println!("No cached builds.");
        return Ok(());
    }

    println!(
        "{:<14} {:<22} {:<10} {:<20}",
        "TAG", "PLATFORM", "SIZE", "MODIFIED"
    );
    println!("{}", "-".repeat(68));

    for build in builds {
        let modified = build
            .modified
            .map(|m| m.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| "-".to_string());

        println!(
            "{:<14} {:<22} {:<10} {:<20}",
            build.tag,
            build.platform,
            format_bytes(build.size_bytes),
            modified
        );
    }

    println!();
    println!("Total: {} cached build(s)", builds.len());
    Ok(())
}

fn print_json(
    ctx: &CommandContext,
    cache: &LibraryCache,
    builds: &[CachedBuild],
) -> LodeResult<()> {
    #[derive(serde::Serialize)]
    struct BuildJson {
        tag: String,
        platform: String,
        size_bytes: u64,
        modified: Option<String>,
    }

    #[derive(serde::Serialize)]
    struct StatusJson {
        platform: Option<String>,
        repo: String,
        cache_root: String,
        loaded: bool,
        builds: Vec<BuildJson>,
    }

    let status = StatusJson {
        platform: detect_platform(ctx),
        repo: format!("{}/{}", ctx.config.repo.owner, ctx.config.repo.name),
        cache_root: cache.root().display().to_string(),
        loaded: engine::loader().is_loaded(),
        builds: builds
            .iter()
            .map(|b| BuildJson {
                tag: b.tag.clone(),
                platform: b.platform.clone(),
                size_bytes: b.size_bytes,
                modified: b.modified.map(|m| m.to_rfc3339()),
            })
            .collect(),
    };

    println!("{}", serde_json::to_string_pretty(&status)?);
    Ok(())
}
