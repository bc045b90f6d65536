//! Platform targets and asset-name patterns
//!
//! A `PlatformTarget` identifies which release asset is compatible with a
//! given environment: operating system, CPU architecture, and an optional
//! GPU variant. It is derived once from the running process or supplied
//! explicitly for cross-platform provisioning, and doubles as the cache key.

use crate::error::{LodeError, LodeResult};
use std::fmt;
use std::str::FromStr;

/// Operating systems with published engine builds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Os {
    Linux,
    MacOs,
    Windows,
}

impl Os {
    /// Token that appears in release asset file names for this OS
    pub fn asset_token(&self) -> &'static str {
        match self {
            Self::Linux => "ubuntu",
            Self::MacOs => "macos",
            Self::Windows => "win",
        }
    }

    /// Expected file name of the engine shared library on this OS
    pub fn library_file_name(&self) -> &'static str {
        match self {
            Self::Linux => "libllama.so",
            Self::MacOs => "libllama.dylib",
            Self::Windows => "llama.dll",
        }
    }
}

impl fmt::Display for Os {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Linux => "linux",
            Self::MacOs => "macos",
            Self::Windows => "windows",
        };
        write!(f, "{}", name)
    }
}

/// CPU architectures with published engine builds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Arch {
    X64,
    Arm64,
}

impl Arch {
    /// Token that appears in release asset file names for this architecture
    pub fn asset_token(&self) -> &'static str {
        match self {
            Self::X64 => "x64",
            Self::Arm64 => "arm64",
        }
    }
}

impl fmt::Display for Arch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.asset_token())
    }
}

/// Hardware-accelerated build variants
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GpuVariant {
    Cuda,
    Vulkan,
    Hip,
}

impl GpuVariant {
    /// Token that appears in release asset file names for this variant
    pub fn asset_token(&self) -> &'static str {
        match self {
            Self::Cuda => "cuda",
            Self::Vulkan => "vulkan",
            Self::Hip => "hip",
        }
    }

    /// All known variant tokens, used to exclude accelerator builds when a
    /// CPU-only target is requested
    pub fn all_tokens() -> &'static [&'static str] {
        &["cuda", "vulkan", "hip"]
    }
}

impl fmt::Display for GpuVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.asset_token())
    }
}

impl FromStr for GpuVariant {
    type Err = LodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cuda" => Ok(Self::Cuda),
            "vulkan" => Ok(Self::Vulkan),
            "hip" | "rocm" => Ok(Self::Hip),
            other => Err(LodeError::PlatformParse {
                spec: other.to_string(),
                reason: "unknown GPU variant (expected cuda, vulkan, or hip)".to_string(),
            }),
        }
    }
}

/// The (OS, architecture, optional GPU variant) tuple identifying which
/// asset is compatible with an environment. Immutable value; also the
/// cache key for materialized entries.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PlatformTarget {
    pub os: Os,
    pub arch: Arch,
    pub variant: Option<GpuVariant>,
}

impl PlatformTarget {
    pub fn new(os: Os, arch: Arch, variant: Option<GpuVariant>) -> Self {
        Self { os, arch, variant }
    }

    /// Detect the platform of the running process.
    ///
    /// The GPU variant is never probed from hardware; it comes from config
    /// or an explicit flag. Without one, the CPU build is selected.
    pub fn detect(variant: Option<GpuVariant>) -> LodeResult<Self> {
        let os = if cfg!(target_os = "linux") {
            Os::Linux
        } else if cfg!(target_os = "macos") {
            Os::MacOs
        } else if cfg!(target_os = "windows") {
            Os::Windows
        } else {
            return Err(LodeError::UnsupportedPlatform(
                std::env::consts::OS.to_string(),
            ));
        };

        let arch = if cfg!(target_arch = "x86_64") {
            Arch::X64
        } else if cfg!(target_arch = "aarch64") {
            Arch::Arm64
        } else {
            return Err(LodeError::UnsupportedPlatform(format!(
                "{}/{}",
                std::env::consts::OS,
                std::env::consts::ARCH
            )));
        };

        Ok(Self { os, arch, variant })
    }

    /// Canonical identifier, e.g. `linux-x64` or `windows-x64-cuda`.
    /// Used as the per-platform cache subdirectory name.
    pub fn id(&self) -> String {
        match self.variant {
            Some(v) => format!("{}-{}-{}", self.os, self.arch, v),
            None => format!("{}-{}", self.os, self.arch),
        }
    }

    /// Expected file name of the engine shared library for this target
    pub fn library_file_name(&self) -> &'static str {
        self.os.library_file_name()
    }

    /// The asset-name matching pattern for this target
    pub fn asset_pattern(&self) -> AssetPattern {
        let mut require = vec![
            self.os.asset_token().to_string(),
            self.arch.asset_token().to_string(),
        ];
        let exclude = match self.variant {
            Some(v) => {
                require.push(v.asset_token().to_string());
                Vec::new()
            }
            // CPU-only: never match an accelerator build that happens to
            // sort first in the release's asset list
            None => GpuVariant::all_tokens()
                .iter()
                .map(|t| (*t).to_string())
                .collect(),
        };
        AssetPattern { require, exclude }
    }
}

impl fmt::Display for PlatformTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.id())
    }
}

impl FromStr for PlatformTarget {
    type Err = LodeError;

    /// Parse `os-arch[-variant]`, e.g. `linux-x64`, `macos-arm64`,
    /// `windows-x64-cuda`. OS aliases: `ubuntu`, `darwin`/`osx`, `win`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parse_err = |reason: &str| LodeError::PlatformParse {
            spec: s.to_string(),
            reason: reason.to_string(),
        };

        let mut parts = s.split('-');
        let os = match parts.next() {
            Some("linux") | Some("ubuntu") => Os::Linux,
            Some("macos") | Some("darwin") | Some("osx") => Os::MacOs,
            Some("windows") | Some("win") => Os::Windows,
            Some(other) if !other.is_empty() => {
                return Err(parse_err(&format!("unknown OS '{}'", other)))
            }
            _ => return Err(parse_err("expected os-arch[-variant]")),
        };

        let arch = match parts.next() {
            Some("x64") | Some("x86_64") | Some("amd64") => Arch::X64,
            Some("arm64") | Some("aarch64") => Arch::Arm64,
            Some(other) => return Err(parse_err(&format!("unknown architecture '{}'", other))),
            None => return Err(parse_err("missing architecture")),
        };

        let variant = match parts.next() {
            Some(v) => Some(v.parse::<GpuVariant>().map_err(|_| {
                parse_err(&format!("unknown GPU variant '{}'", v))
            })?),
            None => None,
        };

        if parts.next().is_some() {
            return Err(parse_err("too many segments"));
        }

        Ok(Self { os, arch, variant })
    }
}

/// Matching expression over release asset file names.
///
/// An asset matches when its name contains every `require` token, contains
/// no `exclude` token, and carries the archive extension.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetPattern {
    pub require: Vec<String>,
    pub exclude: Vec<String>,
}

impl AssetPattern {
    /// Test an asset file name against this pattern
    pub fn matches(&self, asset_name: &str) -> bool {
        if !asset_name.ends_with(".zip") {
            return false;
        }
        self.require.iter().all(|t| asset_name.contains(t.as_str()))
            && !self.exclude.iter().any(|t| asset_name.contains(t.as_str()))
    }
}

impl fmt::Display for AssetPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.require.join("+"))?;
        for t in &self.exclude {
            write!(f, " -{}", t)?;
        }
        Ok(())
    }
}
