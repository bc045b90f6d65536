//! Subcommand implementations

mod checksum;
mod clean;
mod download;
mod ready;
mod status;

pub use checksum::checksum;
pub use clean::clean;
pub use download::download;
pub use ready::ready;
pub use status::status;

use crate::cache::LibraryCache;
use crate::config::Config;
use crate::error::LodeResult;
use crate::release::ReleaseClient;
use std::path::PathBuf;

/// State resolved once in main and shared by every command: the merged
/// configuration plus global CLI overrides.
pub struct CommandContext {
    pub config: Config,
    pub cache_dir: Option<PathBuf>,
    pub index_url: Option<String>,
}

impl CommandContext {
    /// Build a release client honoring the index override
    pub fn release_client(&self) -> ReleaseClient {
        match &self.index_url {
            Some(url) => ReleaseClient::with_base_url(self.config.engine_repo(), url.clone()),
            None => ReleaseClient::new(self.config.engine_repo()),
        }
    }

    /// Open the cache. Priority: CLI flag > LODE_CACHE_DIR > config file >
    /// platform default.
    pub fn open_cache(&self) -> LodeResult<LibraryCache> {
        if let Some(dir) = self.cache_dir.as_deref() {
            return LibraryCache::open(Some(dir));
        }
        let env_set = std::env::var_os(crate::cache::CACHE_DIR_ENV)
            .is_some_and(|v| !v.is_empty());
        if env_set {
            return LibraryCache::open(None);
        }
        LibraryCache::open(self.config.cache.dir.as_deref())
    }
}
