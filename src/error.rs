//! Error types for Lode
//!
//! All modules use `LodeResult<T>` as their return type.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for Lode operations
pub type LodeResult<T> = Result<T, LodeError>;

/// All errors that can occur in Lode
#[derive(Error, Debug)]
pub enum LodeError {
    // Release resolution errors
    #[error("release not found: {tag} (upstream returned 404)")]
    ReleaseNotFound { tag: String },

    #[error("release index returned HTTP {status} while {context}")]
    HttpStatus { status: u16, context: String },

    #[error("network request failed while {context}: {reason}")]
    Network { context: String, reason: String },

    #[error("request timed out while {context}")]
    Timeout { context: String },

    // Asset matching errors
    #[error("release {tag} has no asset matching '{pattern}'")]
    NoMatchingAsset { tag: String, pattern: String },

    // Archive errors
    #[error("invalid archive {path}: {reason}")]
    BadArchive { path: PathBuf, reason: String },

    #[error("archive entry '{entry}' escapes the extraction root")]
    UnsafeArchivePath { entry: String },

    #[error("library file '{name}' not found in extracted archive at {dir}")]
    LibraryMissing { name: String, dir: PathBuf },

    // Cache errors
    #[error("invalid cache path {path}: {reason}")]
    PathInvalid { path: PathBuf, reason: String },

    // Loader errors
    #[error("failed to load engine library {path}: {reason}")]
    LoadFailed { path: PathBuf, reason: String },

    #[error("engine library is not loaded")]
    EngineNotLoaded,

    #[error("engine symbol '{0}' is unavailable in the loaded library")]
    SymbolUnavailable(&'static str),

    // Platform errors
    #[error("unsupported platform: {0}")]
    UnsupportedPlatform(String),

    #[error("invalid platform spec '{spec}': {reason}")]
    PlatformParse { spec: String, reason: String },

    // Configuration errors
    #[error("invalid configuration at {path}: {reason}")]
    ConfigInvalid { path: PathBuf, reason: String },

    // IO errors
    #[error("IO error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    // Serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    // General errors
    #[error("internal error: {0}")]
    Internal(String),

    #[error("{0}")]
    User(String),
}

impl LodeError {
    /// Create an IO error with context
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Create a network error with context
    pub fn network(context: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Network {
            context: context.into(),
            reason: reason.into(),
        }
    }

    /// Check if error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Network { .. }
                | Self::Timeout { .. }
                | Self::HttpStatus {
                    status: 500..=599,
                    ..
                }
        )
    }

    /// Get actionable hint for the error
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::ReleaseNotFound { .. } => {
                Some("Check the tag exists upstream, or omit --tag for the latest release")
            }
            Self::NoMatchingAsset { .. } => {
                Some("The release may not ship a build for this platform/variant combination")
            }
            Self::EngineNotLoaded => Some("Run: lode ready"),
            Self::PathInvalid { .. } => Some("Set LODE_CACHE_DIR to a plain absolute directory"),
            Self::Timeout { .. } | Self::Network { .. } => {
                Some("Check network connectivity and retry")
            }
            _ => None,
        }
    }
}
