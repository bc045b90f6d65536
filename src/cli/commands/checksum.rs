//! Checksum command - standalone file digest

use crate::checksum::sha256_file;
use crate::cli::args::ChecksumArgs;
use crate::error::LodeResult;

/// Execute the checksum command. Output format matches `sha256sum` so the
/// result can be diffed against external tooling.
pub async fn checksum(args: ChecksumArgs) -> LodeResult<()> {
    let digest = sha256_file(&args.file).await?;
    println!("{}  {}", digest, args.file.display());
    Ok(())
}
