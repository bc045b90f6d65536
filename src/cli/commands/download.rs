//! Download command - batch provisioning for a platform list

use crate::batch::{self, DownloadResult};
use crate::cli::args::DownloadArgs;
use crate::cli::commands::CommandContext;
use crate::error::{LodeError, LodeResult};
use crate::platform::PlatformTarget;
use crate::ui::{TaskSpinner, UiContext};
use console::style;

/// Execute the download command
pub async fn download(args: DownloadArgs, ctx: &CommandContext) -> LodeResult<()> {
    let ui = UiContext::detect();

    let targets: Vec<PlatformTarget> = if args.platforms.is_empty() {
        vec![PlatformTarget::detect(ctx.config.gpu_variant()?)?]
    } else {
        args.platforms
            .iter()
            .map(|spec| spec.parse())
            .collect::<LodeResult<_>>()?
    };
    let tag = args.tag.or_else(|| ctx.config.engine.tag.clone());

    let cache = ctx.open_cache()?;
    let client = ctx.release_client();

    let mut spinner = TaskSpinner::new(&ui);
    spinner.start(&format!(
        "Provisioning {} platform(s), {} at a time",
        targets.len(),
        args.concurrency
    ));

    let results =
        batch::download_all(&cache, &client, tag.as_deref(), &targets, args.concurrency).await;

    let failures = results.iter().filter(|r| !r.succeeded()).count();
    if failures == 0 {
        spinner.stop(&format!("{} platform(s) provisioned", results.len()));
    } else {
        spinner.stop_error(&format!(
            "{} of {} platform(s) failed",
            failures,
            results.len()
        ));
    }

    print_results(&results);

    if failures > 0 {
        return Err(LodeError::User(format!(
            "{} of {} platform downloads failed",
            failures,
            results.len()
        )));
    }
    Ok(())
}

fn print_results(results: &[DownloadResult]) {
    println!();
    println!("{:<22} {:<8} DETAILS", "PLATFORM", "STATUS");
    println!("{}", "-".repeat(72));

    for result in results {
        match &result.outcome {
            Ok(entry) => {
                println!(
                    "{:<22} {:<8} {}",
                    result.target.to_string(),
                    style("ok").green().to_string(),
                    entry.library_path.display()
                );
                println!("{:<22} {:<8} sha256:{}", "", "", entry.digest);
            }
            Err(e) => {
                println!(
                    "{:<22} {:<8} {}",
                    result.target.to_string(),
                    style("failed").red().to_string(),
                    e
                );
            }
        }
    }
}
