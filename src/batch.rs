//! Parallel multi-platform provisioning
//!
//! Runs the resolve → match → fetch pipeline once per requested platform
//! under a bounded worker pool. One platform's failure never cancels its
//! siblings; the result list is always sized to the input and preserves
//! input order regardless of completion order.

use crate::cache::{CacheEntry, LibraryCache};
use crate::error::{LodeError, LodeResult};
use crate::platform::PlatformTarget;
use crate::release::ReleaseClient;
use futures_util::stream::{self, StreamExt};
use std::path::Path;
use tracing::warn;

/// Default worker-pool size. Kept small so a batch does not hammer the
/// release index's rate limits.
pub const DEFAULT_CONCURRENCY: usize = 4;

/// Per-platform outcome of an orchestrated download. Transient; returned to
/// the caller as a batch and never persisted.
#[derive(Debug)]
pub struct DownloadResult {
    pub target: PlatformTarget,
    pub outcome: LodeResult<CacheEntry>,
}

impl DownloadResult {
    pub fn succeeded(&self) -> bool {
        self.outcome.is_ok()
    }

    pub fn library_path(&self) -> Option<&Path> {
        self.outcome.as_ref().ok().map(|e| e.library_path.as_path())
    }

    pub fn digest(&self) -> Option<&str> {
        self.outcome.as_ref().ok().map(|e| e.digest.as_str())
    }
}

/// Materialize one tag for every requested platform, at most
/// `max_concurrency` in flight.
///
/// All targets share the tag, so the release index is queried exactly once;
/// if that single resolution fails, every result carries the failure.
pub async fn download_all(
    cache: &LibraryCache,
    client: &ReleaseClient,
    tag: Option<&str>,
    targets: &[PlatformTarget],
    max_concurrency: usize,
) -> Vec<DownloadResult> {
    if targets.is_empty() {
        return Vec::new();
    }
    let concurrency = max_concurrency.max(1);

    let release = match client.resolve(tag).await {
        Ok(release) => release,
        Err(e) => {
            warn!("Release resolution failed for the whole batch: {}", e);
            return targets
                .iter()
                .map(|target| DownloadResult {
                    target: target.clone(),
                    outcome: Err(replay_resolve_error(&e)),
                })
                .collect();
        }
    };

    let release = &release;
    stream::iter(targets.iter().cloned().map(|target| async move {
        let outcome = cache
            .materialize_from_release(client, release, &target, None)
            .await;
        if let Err(ref e) = outcome {
            warn!("Provisioning {} failed: {}", target, e);
        }
        DownloadResult { target, outcome }
    }))
    // `buffered` (not `buffer_unordered`): bounded concurrency with results
    // yielded in input order
    .buffered(concurrency)
    .collect()
    .await
}

/// Reproduce the one up-front resolution error for each per-target result
fn replay_resolve_error(e: &LodeError) -> LodeError {
    match e {
        LodeError::ReleaseNotFound { tag } => LodeError::ReleaseNotFound { tag: tag.clone() },
        LodeError::HttpStatus { status, context } => LodeError::HttpStatus {
            status: *status,
            context: context.clone(),
        },
        LodeError::Timeout { context } => LodeError::Timeout {
            context: context.clone(),
        },
        other => LodeError::network("resolving release for batch", other.to_string()),
    }
}
