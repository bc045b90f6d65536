//! Version-keyed library cache
//!
//! Owns the on-disk cache root: one subdirectory per (release tag, platform)
//! pair, each holding one extracted engine build. The cache root is shared
//! across processes; the only safety mechanism is staging-directory
//! extraction plus an atomic rename into the final location, so a concurrent
//! reader either sees nothing or sees a complete entry.

use crate::checksum::sha256_file;
use crate::error::{LodeError, LodeResult};
use crate::fetch::{self, DownloadProgress};
use crate::platform::PlatformTarget;
use crate::release::{select_asset, ReleaseClient, ReleaseInfo};
use chrono::{DateTime, Utc};
use std::path::{Component, Path, PathBuf};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Environment variable overriding the cache root
pub const CACHE_DIR_ENV: &str = "LODE_CACHE_DIR";

/// Incomplete extractions live here until promoted
const STAGING_DIR: &str = ".staging";

/// Sidecar recording the library digest computed at commit time
const DIGEST_FILE: &str = ".digest";

/// The on-disk, ready-to-load artifact for one (tag, platform) pair
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub tag: String,
    pub target: PlatformTarget,
    pub library_path: PathBuf,
    pub digest: String,
}

/// A cached build as listed by `status`
#[derive(Debug, Clone)]
pub struct CachedBuild {
    pub tag: String,
    pub platform: String,
    pub size_bytes: u64,
    pub modified: Option<DateTime<Utc>>,
}

/// Resolve the cache root through the configured priority chain:
/// explicit override > `LODE_CACHE_DIR` > platform cache directory >
/// temporary directory.
pub fn resolve_cache_root(explicit: Option<&Path>) -> LodeResult<PathBuf> {
    let root = if let Some(path) = explicit {
        path.to_path_buf()
    } else if let Some(env_root) = std::env::var_os(CACHE_DIR_ENV).filter(|v| !v.is_empty()) {
        PathBuf::from(env_root)
    } else if let Some(cache_dir) = dirs::cache_dir() {
        cache_dir.join("lode")
    } else {
        std::env::temp_dir().join("lode")
    };

    validate_cache_path(&root)?;
    Ok(root)
}

/// Reject traversal segments in a configured cache path, then normalize
/// lexically and check again.
fn validate_cache_path(path: &Path) -> LodeResult<()> {
    let invalid = |reason: &str| LodeError::PathInvalid {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    };

    if path.as_os_str().is_empty() {
        return Err(invalid("empty path"));
    }
    if path.components().any(|c| matches!(c, Component::ParentDir)) {
        return Err(invalid("path contains traversal segments"));
    }

    let normalized: PathBuf = path
        .components()
        .filter(|c| !matches!(c, Component::CurDir))
        .collect();
    if normalized
        .components()
        .any(|c| matches!(c, Component::ParentDir))
    {
        return Err(invalid("normalized path contains traversal segments"));
    }

    Ok(())
}

fn create_dir_restricted(path: &Path) -> LodeResult<()> {
    std::fs::create_dir_all(path)
        .map_err(|e| LodeError::io(format!("creating directory {}", path.display()), e))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o700);
        std::fs::set_permissions(path, perms)
            .map_err(|e| LodeError::io(format!("restricting {}", path.display()), e))?;
    }

    Ok(())
}

fn lookup_in(entry_dir: &Path, library_name: &str) -> Option<PathBuf> {
    if !entry_dir.is_dir() {
        return None;
    }
    fetch::find_library(entry_dir, library_name)
}

/// The cache manager
pub struct LibraryCache {
    root: PathBuf,
}

impl LibraryCache {
    /// Open (creating if needed) the cache at the resolved root
    pub fn open(explicit_root: Option<&Path>) -> LodeResult<Self> {
        let root = resolve_cache_root(explicit_root)?;
        create_dir_restricted(&root)?;
        debug!("Cache root: {}", root.display());
        Ok(Self { root })
    }

    /// The resolved cache root
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Final directory for a (tag, platform) entry
    pub fn entry_dir(&self, tag: &str, target: &PlatformTarget) -> PathBuf {
        self.root.join(tag).join(target.id())
    }

    /// Path of the cached library for a (tag, platform) pair, if the entry
    /// is materialized and complete
    pub fn lookup(&self, tag: &str, target: &PlatformTarget) -> Option<PathBuf> {
        lookup_in(&self.entry_dir(tag, target), target.library_file_name())
    }

    /// Ensure a (tag, platform) entry is materialized, returning it.
    ///
    /// Idempotent: an explicit tag that is already cached is returned with
    /// no network activity at all. `None` resolves the latest release first
    /// (metadata-only query) and keys the cache by the concrete tag it
    /// returns.
    pub async fn materialize(
        &self,
        client: &ReleaseClient,
        tag: Option<&str>,
        target: &PlatformTarget,
    ) -> LodeResult<CacheEntry> {
        if let Some(tag) = tag {
            if let Some(library_path) = self.lookup(tag, target) {
                debug!("Cache hit for {}/{}", tag, target);
                let digest = self.entry_digest(tag, target, &library_path).await?;
                return Ok(CacheEntry {
                    tag: tag.to_string(),
                    target: target.clone(),
                    library_path,
                    digest,
                });
            }
        }

        let release = client.resolve(tag).await?;
        self.materialize_from_release(client, &release, target, None)
            .await
    }

    /// Materialize from already-resolved release metadata. Used by the
    /// orchestrator to avoid re-querying the index once per platform.
    pub async fn materialize_from_release(
        &self,
        client: &ReleaseClient,
        release: &ReleaseInfo,
        target: &PlatformTarget,
        progress: Option<DownloadProgress>,
    ) -> LodeResult<CacheEntry> {
        let library_name = target.library_file_name();
        let final_dir = self.entry_dir(&release.tag, target);

        if let Some(library_path) = lookup_in(&final_dir, library_name) {
            debug!("Cache hit for {}/{}", release.tag, target);
            let digest = self.entry_digest(&release.tag, target, &library_path).await?;
            return Ok(CacheEntry {
                tag: release.tag.clone(),
                target: target.clone(),
                library_path,
                digest,
            });
        }

        // An entry directory without the library file is a broken extraction
        // from a previous run; discard it and fetch again.
        if final_dir.exists() {
            warn!(
                "Cache entry {} is missing {}; re-fetching",
                final_dir.display(),
                library_name
            );
            tokio::fs::remove_dir_all(&final_dir)
                .await
                .map_err(|e| LodeError::io(format!("removing {}", final_dir.display()), e))?;
        }

        let asset = select_asset(release, &target.asset_pattern())?;
        info!("Fetching {} for {}", asset.name, target);

        let staging = self
            .root
            .join(STAGING_DIR)
            .join(Uuid::new_v4().to_string());
        tokio::fs::create_dir_all(&staging)
            .await
            .map_err(|e| LodeError::io(format!("creating staging dir {}", staging.display()), e))?;

        let agent = client.agent().clone();
        let url = asset.download_url.clone();
        let staging_task = staging.clone();
        let library_task = library_name.to_string();

        let fetched = tokio::task::spawn_blocking(move || {
            let mut progress = progress;
            let progress_ref: Option<fetch::Progress<'_, '_>> =
                progress.as_mut().map(|cb| &mut **cb);
            fetch::fetch_and_extract(&agent, &url, &staging_task, &library_task, progress_ref)
        })
        .await
        .map_err(|e| LodeError::Internal(format!("fetch task panicked: {}", e)))?;

        let staged_library = match fetched {
            Ok(path) => path,
            Err(e) => {
                // Never leak a partial extraction
                let _ = tokio::fs::remove_dir_all(&staging).await;
                return Err(e);
            }
        };

        let relative = staged_library
            .strip_prefix(&staging)
            .map_err(|e| LodeError::Internal(format!("staged library outside staging dir: {}", e)))?
            .to_path_buf();

        let library_path = self
            .promote(&staging, &final_dir, &relative, library_name)
            .await?;

        let digest = sha256_file(&library_path).await?;
        if let Err(e) = tokio::fs::write(final_dir.join(DIGEST_FILE), &digest).await {
            warn!("Cannot record digest for {}: {}", final_dir.display(), e);
        }

        info!(
            "Materialized {}/{} at {}",
            release.tag,
            target,
            library_path.display()
        );

        Ok(CacheEntry {
            tag: release.tag.clone(),
            target: target.clone(),
            library_path,
            digest,
        })
    }

    /// Promote a fully-extracted staging directory to the final entry
    /// location. A failed rename means a concurrent materialize won the
    /// race; their entry is complete by construction, so use it and discard
    /// our staging data.
    async fn promote(
        &self,
        staging: &Path,
        final_dir: &Path,
        relative_library: &Path,
        library_name: &str,
    ) -> LodeResult<PathBuf> {
        if let Some(parent) = final_dir.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| LodeError::io(format!("creating {}", parent.display()), e))?;
        }

        match tokio::fs::rename(staging, final_dir).await {
            Ok(()) => Ok(final_dir.join(relative_library)),
            Err(rename_err) => {
                let _ = tokio::fs::remove_dir_all(staging).await;
                match lookup_in(final_dir, library_name) {
                    Some(existing) => {
                        debug!(
                            "Lost materialize race for {}; using existing entry",
                            final_dir.display()
                        );
                        Ok(existing)
                    }
                    None => Err(LodeError::io(
                        format!("promoting cache entry {}", final_dir.display()),
                        rename_err,
                    )),
                }
            }
        }
    }

    /// Read the digest recorded at commit time, or recompute it when the
    /// sidecar is missing or malformed.
    async fn entry_digest(
        &self,
        tag: &str,
        target: &PlatformTarget,
        library_path: &Path,
    ) -> LodeResult<String> {
        let sidecar = self.entry_dir(tag, target).join(DIGEST_FILE);
        if let Ok(recorded) = tokio::fs::read_to_string(&sidecar).await {
            let recorded = recorded.trim();
            if recorded.len() == 64 && recorded.chars().all(|c| c.is_ascii_hexdigit()) {
                return Ok(recorded.to_string());
            }
        }
        sha256_file(library_path).await
    }

    /// Remove cached entries. With no filter the whole cache root is
    /// cleared (including staging leftovers). Returns the number of
    /// (tag, platform) entries removed.
    pub async fn invalidate(
        &self,
        tag: Option<&str>,
        target: Option<&PlatformTarget>,
    ) -> LodeResult<usize> {
        match (tag, target) {
            (None, None) => {
                let count = self.entries()?.len();
                tokio::fs::remove_dir_all(&self.root)
                    .await
                    .map_err(|e| LodeError::io(format!("clearing {}", self.root.display()), e))?;
                create_dir_restricted(&self.root)?;
                info!("Cleared cache root {}", self.root.display());
                Ok(count)
            }
            (Some(tag), None) => {
                let version_dir = self.root.join(tag);
                if !version_dir.is_dir() {
                    return Ok(0);
                }
                let count = count_subdirs(&version_dir)?;
                tokio::fs::remove_dir_all(&version_dir)
                    .await
                    .map_err(|e| LodeError::io(format!("removing {}", version_dir.display()), e))?;
                Ok(count)
            }
            (tag_filter, Some(target)) => {
                let mut removed = 0;
                for build in self.entries()? {
                    if build.platform != target.id() {
                        continue;
                    }
                    if let Some(tag) = tag_filter {
                        if build.tag != tag {
                            continue;
                        }
                    }
                    let dir = self.root.join(&build.tag).join(&build.platform);
                    tokio::fs::remove_dir_all(&dir)
                        .await
                        .map_err(|e| LodeError::io(format!("removing {}", dir.display()), e))?;
                    removed += 1;
                }
                Ok(removed)
            }
        }
    }

    /// List materialized builds, newest tags unsorted (directory order)
    pub fn entries(&self) -> LodeResult<Vec<CachedBuild>> {
        let mut builds = Vec::new();

        for version_dir in read_dirs(&self.root)? {
            let tag = match version_dir.file_name().and_then(|n| n.to_str()) {
                Some(name) if !name.starts_with('.') => name.to_string(),
                _ => continue,
            };

            for platform_dir in read_dirs(&version_dir)? {
                let platform = match platform_dir.file_name().and_then(|n| n.to_str()) {
                    Some(name) => name.to_string(),
                    None => continue,
                };
                let modified = std::fs::metadata(&platform_dir)
                    .and_then(|m| m.modified())
                    .ok()
                    .map(DateTime::<Utc>::from);

                builds.push(CachedBuild {
                    tag: tag.clone(),
                    platform,
                    size_bytes: dir_size(&platform_dir),
                    modified,
                });
            }
        }

        Ok(builds)
    }
}

fn read_dirs(path: &Path) -> LodeResult<Vec<PathBuf>> {
    if !path.is_dir() {
        return Ok(Vec::new());
    }
    let entries = std::fs::read_dir(path)
        .map_err(|e| LodeError::io(format!("reading {}", path.display()), e))?;

    Ok(entries
        .filter_map(|e| e.ok().map(|e| e.path()))
        .filter(|p| p.is_dir())
        .collect())
}

fn count_subdirs(path: &Path) -> LodeResult<usize> {
    Ok(read_dirs(path)?.len())
}

fn dir_size(path: &Path) -> u64 {
    let Ok(entries) = std::fs::read_dir(path) else {
        return 0;
    };
    entries
        .filter_map(|e| e.ok())
        .map(|e| {
            let path = e.path();
            if path.is_dir() {
                dir_size(&path)
            } else {
                e.metadata().map(|m| m.len()).unwrap_or(0)
            }
        })
        .sum()
}

/// Format bytes as human-readable size (e.g., "1.5 GB")
pub fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::{Arch, Os};
    use crate::release::EngineRepo;
    use serde_json::json;
    use serial_test::serial;
    use std::io::Write;
    use tempfile::TempDir;
    use wiremock::matchers::{method, path as url_path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn linux_x64() -> PlatformTarget {
        PlatformTarget::new(Os::Linux, Arch::X64, None)
    }

    fn engine_zip(library_name: &str, payload: &[u8]) -> Vec<u8> {
        let mut writer = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
        let options = zip::write::SimpleFileOptions::default();
        writer
            .start_file(format!("build/bin/{}", library_name), options)
            .unwrap();
        writer.write_all(payload).unwrap();
        writer.finish().unwrap().into_inner()
    }

    /// Mount a release with one linux x64 asset and return (server, client)
    async fn release_fixture(tag: &str, payload: &[u8]) -> (MockServer, ReleaseClient) {
        let server = MockServer::start().await;
        let asset_name = format!("llama-{}-bin-ubuntu-x64.zip", tag);

        Mock::given(method("GET"))
            .and(url_path("/repos/ggml-org/llama.cpp/releases/latest"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "tag_name": tag,
                "assets": [{
                    "name": asset_name,
                    "browser_download_url": format!("{}/dl/{}", server.uri(), asset_name),
                }],
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(url_path(format!(
                "/repos/ggml-org/llama.cpp/releases/tags/{}",
                tag
            )))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "tag_name": tag,
                "assets": [{
                    "name": asset_name,
                    "browser_download_url": format!("{}/dl/{}", server.uri(), asset_name),
                }],
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(url_path(format!("/dl/{}", asset_name)))
            .respond_with(
                ResponseTemplate::new(200).set_body_bytes(engine_zip("libllama.so", payload)),
            )
            .mount(&server)
            .await;

        let client = ReleaseClient::with_base_url(EngineRepo::default(), server.uri());
        (server, client)
    }

    #[test]
    fn validate_rejects_traversal() {
        assert!(validate_cache_path(Path::new("/tmp/../etc")).is_err());
        assert!(validate_cache_path(Path::new("..")).is_err());
        assert!(validate_cache_path(Path::new("")).is_err());
        assert!(validate_cache_path(Path::new("/var/cache/lode")).is_ok());
    }

    #[test]
    #[serial]
    fn root_explicit_beats_env() {
        let temp = TempDir::new().unwrap();
        std::env::set_var(CACHE_DIR_ENV, "/somewhere/else");
        let root = resolve_cache_root(Some(temp.path())).unwrap();
        std::env::remove_var(CACHE_DIR_ENV);
        assert_eq!(root, temp.path());
    }

    #[test]
    #[serial]
    fn root_env_beats_default() {
        let temp = TempDir::new().unwrap();
        std::env::set_var(CACHE_DIR_ENV, temp.path());
        let root = resolve_cache_root(None).unwrap();
        std::env::remove_var(CACHE_DIR_ENV);
        assert_eq!(root, temp.path());
    }

    #[test]
    #[serial]
    fn root_env_traversal_rejected() {
        std::env::set_var(CACHE_DIR_ENV, "/tmp/../../etc/lode");
        let result = resolve_cache_root(None);
        std::env::remove_var(CACHE_DIR_ENV);
        assert!(matches!(result, Err(LodeError::PathInvalid { .. })));
    }

    #[cfg(unix)]
    #[test]
    fn open_restricts_root_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let temp = TempDir::new().unwrap();
        let root = temp.path().join("cache");
        let cache = LibraryCache::open(Some(&root)).unwrap();

        let mode = std::fs::metadata(cache.root()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o700);
    }

    #[tokio::test]
    async fn materialize_latest_then_hit_without_network() {
        let temp = TempDir::new().unwrap();
        let cache = LibraryCache::open(Some(temp.path())).unwrap();
        let (server, client) = release_fixture("b100", b"fake engine bytes").await;

        let entry = cache
            .materialize(&client, None, &linux_x64())
            .await
            .unwrap();
        assert_eq!(entry.tag, "b100");
        assert!(entry.library_path.is_file());
        assert_eq!(entry.digest, sha256_file(&entry.library_path).await.unwrap());

        // Take the index offline: a pinned-tag hit must not need it
        drop(server);

        let again = cache
            .materialize(&client, Some("b100"), &linux_x64())
            .await
            .unwrap();
        assert_eq!(again.library_path, entry.library_path);
        assert_eq!(again.digest, entry.digest);
    }

    #[tokio::test]
    async fn materialize_leaves_no_staging_behind() {
        let temp = TempDir::new().unwrap();
        let cache = LibraryCache::open(Some(temp.path())).unwrap();
        let (_server, client) = release_fixture("b7", b"x").await;

        cache
            .materialize(&client, Some("b7"), &linux_x64())
            .await
            .unwrap();

        let staging = temp.path().join(STAGING_DIR);
        let leftovers = std::fs::read_dir(&staging)
            .map(|rd| rd.count())
            .unwrap_or(0);
        assert_eq!(leftovers, 0);
    }

    #[tokio::test]
    async fn concurrent_materialize_single_entry() {
        let temp = TempDir::new().unwrap();
        let cache = LibraryCache::open(Some(temp.path())).unwrap();
        let (_server, client) = release_fixture("b8", b"race payload").await;

        let release = client.resolve(Some("b8")).await.unwrap();
        let target = linux_x64();

        let (a, b) = tokio::join!(
            cache.materialize_from_release(&client, &release, &target, None),
            cache.materialize_from_release(&client, &release, &target, None),
        );

        let a = a.unwrap();
        let b = b.unwrap();
        assert_eq!(a.library_path, b.library_path);
        assert_eq!(a.digest, b.digest);

        // Exactly one authoritative entry for the key
        assert_eq!(count_subdirs(&temp.path().join("b8")).unwrap(), 1);
    }

    #[tokio::test]
    async fn broken_entry_is_refetched() {
        let temp = TempDir::new().unwrap();
        let cache = LibraryCache::open(Some(temp.path())).unwrap();
        let (_server, client) = release_fixture("b9", b"good bytes").await;

        // Entry directory exists but holds no library file
        let broken = cache.entry_dir("b9", &linux_x64());
        std::fs::create_dir_all(&broken).unwrap();
        std::fs::write(broken.join("README"), b"half extracted").unwrap();

        let entry = cache
            .materialize(&client, Some("b9"), &linux_x64())
            .await
            .unwrap();
        assert!(entry.library_path.is_file());
        assert_eq!(std::fs::read(&entry.library_path).unwrap(), b"good bytes");
    }

    #[tokio::test]
    async fn invalidate_all_forces_refetch() {
        let temp = TempDir::new().unwrap();
        let cache = LibraryCache::open(Some(temp.path())).unwrap();
        let (_server, client) = release_fixture("b10", b"v1").await;

        cache
            .materialize(&client, Some("b10"), &linux_x64())
            .await
            .unwrap();
        assert!(cache.lookup("b10", &linux_x64()).is_some());

        let removed = cache.invalidate(None, None).await.unwrap();
        assert_eq!(removed, 1);
        assert!(cache.lookup("b10", &linux_x64()).is_none());

        // Materializing again goes back to the network and succeeds
        let entry = cache
            .materialize(&client, Some("b10"), &linux_x64())
            .await
            .unwrap();
        assert!(entry.library_path.is_file());
    }

    #[tokio::test]
    async fn invalidate_filters_by_tag_and_platform() {
        let temp = TempDir::new().unwrap();
        let cache = LibraryCache::open(Some(temp.path())).unwrap();

        // Seed two fake entries directly on disk
        for (tag, platform) in [("b1", "linux-x64"), ("b2", "linux-x64")] {
            let dir = temp.path().join(tag).join(platform);
            std::fs::create_dir_all(&dir).unwrap();
            std::fs::write(dir.join("libllama.so"), b"x").unwrap();
        }

        let removed = cache.invalidate(Some("b1"), None).await.unwrap();
        assert_eq!(removed, 1);
        assert!(cache.lookup("b1", &linux_x64()).is_none());
        assert!(cache.lookup("b2", &linux_x64()).is_some());

        let removed = cache
            .invalidate(None, Some(&linux_x64()))
            .await
            .unwrap();
        assert_eq!(removed, 1);
        assert!(cache.lookup("b2", &linux_x64()).is_none());
    }

    #[tokio::test]
    async fn entries_lists_builds() {
        let temp = TempDir::new().unwrap();
        let cache = LibraryCache::open(Some(temp.path())).unwrap();
        let (_server, client) = release_fixture("b11", b"some engine").await;

        cache
            .materialize(&client, Some("b11"), &linux_x64())
            .await
            .unwrap();

        let builds = cache.entries().unwrap();
        assert_eq!(builds.len(), 1);
        assert_eq!(builds[0].tag, "b11");
        assert_eq!(builds[0].platform, "linux-x64");
        assert!(builds[0].size_bytes > 0);
        assert!(builds[0].modified.is_some());
    }

    #[test]
    fn format_bytes_ranges() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.0 KB");
        assert_eq!(format_bytes(5 * 1024 * 1024), "5.0 MB");
        assert_eq!(format_bytes(3 * 1024 * 1024 * 1024), "3.0 GB");
    }
}
