//! Clean command - remove cached engine builds

use crate::cli::args::CleanArgs;
use crate::cli::commands::CommandContext;
use crate::error::LodeResult;
use crate::platform::PlatformTarget;
use crate::ui::UiContext;
use console::style;

/// Execute the clean command
pub async fn clean(args: CleanArgs, ctx: &CommandContext) -> LodeResult<()> {
    let ui = UiContext::detect().with_auto_yes(args.yes);
    let cache = ctx.open_cache()?;

    let target: Option<PlatformTarget> = args
        .platform
        .as_deref()
        .map(str::parse)
        .transpose()?;

    // A full wipe is the destructive case worth a prompt; filtered cleans
    // are scoped enough to run directly
    if args.tag.is_none() && target.is_none() {
        let message = format!(
            "Remove all cached builds under {}?",
            cache.root().display()
        );
        if !ui.confirm(&message)? {
            println!("Aborted.");
            return Ok(());
        }
    }

    let removed = cache.invalidate(args.tag.as_deref(), target.as_ref()).await?;
    println!(
        "{} Removed {} cached build(s)",
        style("✓").green(),
        removed
    );
    Ok(())
}
