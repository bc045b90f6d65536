//! Ready command - fetch (if needed) and load the engine for this machine

use crate::cli::args::ReadyArgs;
use crate::cli::commands::CommandContext;
use crate::engine;
use crate::error::LodeResult;
use crate::platform::PlatformTarget;
use crate::ui::{DownloadBar, TaskSpinner, UiContext};
use console::style;

/// Execute the ready command
pub async fn ready(args: ReadyArgs, ctx: &CommandContext) -> LodeResult<()> {
    let ui = UiContext::detect();

    let variant = match args.variant {
        Some(v) => Some(v.parse()?),
        None => ctx.config.gpu_variant()?,
    };
    let target = PlatformTarget::detect(variant)?;
    let tag = args.tag.or_else(|| ctx.config.engine.tag.clone());

    let cache = ctx.open_cache()?;
    let client = ctx.release_client();

    let mut spinner = TaskSpinner::new(&ui);
    spinner.start(&format!("Preparing engine for {}", target));

    let entry = match tag.as_deref() {
        // Pinned tag already on disk: no network at all
        Some(tag) if cache.lookup(tag, &target).is_some() => {
            cache.materialize(&client, Some(tag), &target).await?
        }
        tag => {
            let release = client.resolve(tag).await?;
            spinner.message(&format!("Fetching {} for {}", release.tag, target));
            let bar = DownloadBar::new(&ui, &release.tag);
            let result = cache
                .materialize_from_release(&client, &release, &target, Some(bar.callback()))
                .await;
            bar.finish();
            result?
        }
    };

    spinner.message("Loading engine library");
    let loaded = engine::loader().ensure_loaded(&entry.library_path);
    let loaded = match loaded {
        Ok(loaded) => loaded,
        Err(e) => {
            spinner.stop_error("Engine failed to load");
            return Err(e);
        }
    };

    spinner.stop(&format!("Engine {} ready for {}", entry.tag, target));

    println!("Library: {}", entry.library_path.display());
    println!("SHA-256: {}", entry.digest);

    let missing = loaded.symbols.missing();
    if missing.is_empty() {
        println!(
            "{} All {} declared symbols bound",
            style("✓").green(),
            loaded.symbols.bound_count()
        );
    } else {
        println!(
            "{} {} symbols unbound: {}",
            style("!").yellow(),
            missing.len(),
            missing.join(", ")
        );
    }

    if let Ok(info) = engine::loader().system_info() {
        if !info.is_empty() {
            println!("{}", style(info.trim()).dim());
        }
    }

    Ok(())
}
