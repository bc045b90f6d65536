//! Engine loading and lifecycle
//!
//! The process needs at most one open handle to the native engine library.
//! `EngineLoader` centralizes every load/unload transition behind a
//! read/write lock: Unloaded → (exclusive lock held) loading → Loaded, or
//! back to Unloaded on failure so a later call may retry after the cache
//! re-materializes the library. `libloading` hides the per-OS dlopen /
//! LoadLibrary mechanics behind one interface, keeping everything here
//! platform-agnostic.

pub mod symbols;

pub use symbols::{names, SymbolTable};

use crate::cache::{CacheEntry, LibraryCache};
use crate::error::{LodeError, LodeResult};
use crate::platform::PlatformTarget;
use crate::release::ReleaseClient;
use libloading::Library;
use std::ffi::CStr;
use std::path::Path;
use std::sync::{Arc, RwLock};
use tracing::{debug, info, warn};

/// An open engine library and its bound symbol table.
///
/// The `Library` field keeps the OS handle alive for as long as any caller
/// holds the engine; the raw function pointers in `symbols` must never
/// outlive it, which this struct guarantees by owning both.
#[derive(Debug)]
pub struct LoadedEngine {
    pub symbols: SymbolTable,
    _library: Option<Library>,
}

enum LoaderState {
    Unloaded,
    Loaded(Arc<LoadedEngine>),
}

/// Process-wide loader singleton. All state transitions live here; there is
/// no "is it loaded" flag anywhere else.
pub struct EngineLoader {
    state: RwLock<LoaderState>,
}

static LOADER: EngineLoader = EngineLoader::new();

/// The process-wide loader
pub fn loader() -> &'static EngineLoader {
    &LOADER
}

impl EngineLoader {
    pub const fn new() -> Self {
        Self {
            state: RwLock::new(LoaderState::Unloaded),
        }
    }

    fn read_state(&self) -> LodeResult<std::sync::RwLockReadGuard<'_, LoaderState>> {
        self.state
            .read()
            .map_err(|_| LodeError::Internal("engine loader lock poisoned".to_string()))
    }

    fn write_state(&self) -> LodeResult<std::sync::RwLockWriteGuard<'_, LoaderState>> {
        self.state
            .write()
            .map_err(|_| LodeError::Internal("engine loader lock poisoned".to_string()))
    }

    /// Whether a library is currently open
    pub fn is_loaded(&self) -> bool {
        matches!(
            self.read_state().as_deref(),
            Ok(LoaderState::Loaded(_))
        )
    }

    /// The loaded engine, or `EngineNotLoaded`. Never dereferences an
    /// absent handle.
    pub fn engine(&self) -> LodeResult<Arc<LoadedEngine>> {
        match &*self.read_state()? {
            LoaderState::Loaded(engine) => Ok(engine.clone()),
            LoaderState::Unloaded => Err(LodeError::EngineNotLoaded),
        }
    }

    /// Open the library at `library_path` and bind its symbols, exactly
    /// once per process.
    ///
    /// Double-checked: a cheap shared-lock check first, then concurrent
    /// callers collapse into a single attempt under the exclusive lock.
    /// Once Loaded, later calls return the existing handle without touching
    /// the path again. On failure the state stays Unloaded so the caller
    /// may retry.
    pub fn ensure_loaded(&self, library_path: &Path) -> LodeResult<Arc<LoadedEngine>> {
        if let LoaderState::Loaded(engine) = &*self.read_state()? {
            return Ok(engine.clone());
        }

        let mut state = self.write_state()?;
        if let LoaderState::Loaded(engine) = &*state {
            debug!("Engine was loaded while waiting for the lock");
            return Ok(engine.clone());
        }

        let library =
            unsafe { Library::new(library_path) }.map_err(|e| LodeError::LoadFailed {
                path: library_path.to_path_buf(),
                reason: e.to_string(),
            })?;

        let symbols = SymbolTable::bind(&library);
        let missing = symbols.missing();
        if missing.is_empty() {
            info!(
                "Loaded engine library {} ({} symbols bound)",
                library_path.display(),
                symbols.bound_count()
            );
        } else {
            warn!(
                "Loaded engine library {} with {} unbound symbols: {:?}",
                library_path.display(),
                missing.len(),
                missing
            );
        }

        let engine = Arc::new(LoadedEngine {
            symbols,
            _library: Some(library),
        });
        *state = LoaderState::Loaded(engine.clone());
        Ok(engine)
    }

    /// Return to Unloaded. The OS handle closes once the last caller drops
    /// its reference. Safe to call when nothing is loaded.
    pub fn unload(&self) -> LodeResult<()> {
        let mut state = self.write_state()?;
        if matches!(&*state, LoaderState::Unloaded) {
            debug!("Unload requested but nothing is loaded");
            return Ok(());
        }
        *state = LoaderState::Unloaded;
        info!("Engine library unloaded");
        Ok(())
    }

    #[cfg(test)]
    fn install_for_test(&self, symbols: SymbolTable) {
        let mut state = self.state.write().unwrap();
        *state = LoaderState::Loaded(Arc::new(LoadedEngine {
            symbols,
            _library: None,
        }));
    }

    // Public call wrappers. Each one checks Loaded state, then its specific
    // symbol, before any invocation.

    pub fn backend_init(&self) -> LodeResult<()> {
        let engine = self.engine()?;
        let f = engine
            .symbols
            .backend_init
            .ok_or(LodeError::SymbolUnavailable(names::BACKEND_INIT))?;
        unsafe { f() };
        Ok(())
    }

    /// Teardown runs unconditionally on program exit paths, so an unloaded
    /// library or an absent symbol is a silent no-op, never an error.
    pub fn backend_free(&self) {
        let Ok(engine) = self.engine() else {
            return;
        };
        if let Some(f) = engine.symbols.backend_free {
            unsafe { f() };
        }
    }

    pub fn system_info(&self) -> LodeResult<String> {
        let engine = self.engine()?;
        let f = engine
            .symbols
            .print_system_info
            .ok_or(LodeError::SymbolUnavailable(names::PRINT_SYSTEM_INFO))?;
        let ptr = unsafe { f() };
        if ptr.is_null() {
            return Ok(String::new());
        }
        let info = unsafe { CStr::from_ptr(ptr) };
        Ok(info.to_string_lossy().into_owned())
    }

    pub fn supports_mmap(&self) -> LodeResult<bool> {
        let engine = self.engine()?;
        let f = engine
            .symbols
            .supports_mmap
            .ok_or(LodeError::SymbolUnavailable(names::SUPPORTS_MMAP))?;
        Ok(unsafe { f() })
    }

    pub fn supports_mlock(&self) -> LodeResult<bool> {
        let engine = self.engine()?;
        let f = engine
            .symbols
            .supports_mlock
            .ok_or(LodeError::SymbolUnavailable(names::SUPPORTS_MLOCK))?;
        Ok(unsafe { f() })
    }

    pub fn supports_gpu_offload(&self) -> LodeResult<bool> {
        let engine = self.engine()?;
        let f = engine
            .symbols
            .supports_gpu_offload
            .ok_or(LodeError::SymbolUnavailable(names::SUPPORTS_GPU_OFFLOAD))?;
        Ok(unsafe { f() })
    }

    pub fn max_devices(&self) -> LodeResult<usize> {
        let engine = self.engine()?;
        let f = engine
            .symbols
            .max_devices
            .ok_or(LodeError::SymbolUnavailable(names::MAX_DEVICES))?;
        Ok(unsafe { f() })
    }

    pub fn time_us(&self) -> LodeResult<i64> {
        let engine = self.engine()?;
        let f = engine
            .symbols
            .time_us
            .ok_or(LodeError::SymbolUnavailable(names::TIME_US))?;
        Ok(unsafe { f() })
    }
}

impl Default for EngineLoader {
    fn default() -> Self {
        Self::new()
    }
}

/// Everything the caller needs to know after "ensure the engine is ready":
/// which build was materialized and which declared capabilities are absent.
#[derive(Debug)]
pub struct ReadyReport {
    pub entry: CacheEntry,
    pub missing_symbols: Vec<&'static str>,
}

/// Materialize the engine build for `target` and load it into the process.
///
/// Idempotent: with a warm cache and a loaded engine this performs no
/// network activity and returns the existing handle's state.
pub async fn ensure_ready(
    cache: &LibraryCache,
    client: &ReleaseClient,
    tag: Option<&str>,
    target: &PlatformTarget,
) -> LodeResult<ReadyReport> {
    let entry = cache.materialize(client, tag, target).await?;
    let engine = LOADER.ensure_loaded(&entry.library_path)?;

    Ok(ReadyReport {
        entry,
        missing_symbols: engine.symbols.missing(),
    })
}
