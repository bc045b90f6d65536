//! Configuration management for Lode
//!
//! Explicit CLI values always win over the config file, which wins over
//! built-in defaults. Configuration is a resolved value passed into the
//! components that need it, never global state.

use crate::error::{LodeError, LodeResult};
use crate::platform::GpuVariant;
use crate::release::EngineRepo;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info};

/// Lode configuration (`config.toml`)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub repo: RepoConfig,
    pub cache: CacheConfig,
    pub engine: EngineConfig,
}

/// Which repository publishes engine builds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RepoConfig {
    pub owner: String,
    pub name: String,
}

impl Default for RepoConfig {
    fn default() -> Self {
        let repo = EngineRepo::default();
        Self {
            owner: repo.owner,
            name: repo.name,
        }
    }
}

/// Cache location override (lower priority than LODE_CACHE_DIR)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub dir: Option<PathBuf>,
}

/// Engine build preferences
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Preferred GPU variant (cuda, vulkan, hip); unset means the CPU build
    pub variant: Option<String>,
    /// Pinned release tag; unset means the latest release
    pub tag: Option<String>,
}

impl Config {
    pub fn engine_repo(&self) -> EngineRepo {
        EngineRepo {
            owner: self.repo.owner.clone(),
            name: self.repo.name.clone(),
        }
    }

    pub fn gpu_variant(&self) -> LodeResult<Option<GpuVariant>> {
        self.engine
            .variant
            .as_deref()
            .map(str::parse)
            .transpose()
    }
}

/// Configuration manager
pub struct ConfigManager {
    config_path: PathBuf,
}

impl ConfigManager {
    /// Create a new config manager with default path
    pub fn new() -> Self {
        Self {
            config_path: Self::default_config_path(),
        }
    }

    /// Create a config manager with a custom path
    pub fn with_path(path: PathBuf) -> Self {
        Self { config_path: path }
    }

    /// Get the default config file path
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("lode")
            .join("config.toml")
    }

    /// Load configuration, using defaults if the file does not exist
    pub async fn load(&self) -> LodeResult<Config> {
        if !self.config_path.exists() {
            debug!("Config file not found, using defaults");
            return Ok(Config::default());
        }

        self.load_from_file(&self.config_path).await
    }

    /// Load configuration from a specific file
    pub async fn load_from_file(&self, path: &Path) -> LodeResult<Config> {
        let content = fs::read_to_string(path)
            .await
            .map_err(|e| LodeError::io(format!("reading config from {}", path.display()), e))?;

        toml::from_str(&content).map_err(|e| LodeError::ConfigInvalid {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    /// Save configuration to file
    pub async fn save(&self, config: &Config) -> LodeResult<()> {
        self.ensure_config_dir().await?;

        let content = toml::to_string_pretty(config)?;
        fs::write(&self.config_path, content).await.map_err(|e| {
            LodeError::io(
                format!("writing config to {}", self.config_path.display()),
                e,
            )
        })?;

        info!("Configuration saved to {}", self.config_path.display());
        Ok(())
    }

    async fn ensure_config_dir(&self) -> LodeResult<()> {
        if let Some(parent) = self.config_path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| LodeError::io(format!("creating {}", parent.display()), e))?;
        }
        Ok(())
    }

    /// Get the config file path
    pub fn path(&self) -> &Path {
        &self.config_path
    }
}

impl Default for ConfigManager {
    fn default() -> Self {
        Self::new()
    }
}
