//! Defensive symbol binding
//!
//! Every declared native entry point gets one slot in the table: either a
//! usable function reference or an explicit absence, recorded exactly once
//! at load time. A missing symbol is data, not a failure — builds differ in
//! what they export, and wrappers report absence as a typed error instead
//! of dereferencing a null pointer.

use libloading::Library;
use std::ffi::c_char;
use tracing::debug;

/// Declared symbol names
pub mod names {
    pub const BACKEND_INIT: &str = "llama_backend_init";
    pub const BACKEND_FREE: &str = "llama_backend_free";
    pub const PRINT_SYSTEM_INFO: &str = "llama_print_system_info";
    pub const SUPPORTS_MMAP: &str = "llama_supports_mmap";
    pub const SUPPORTS_MLOCK: &str = "llama_supports_mlock";
    pub const SUPPORTS_GPU_OFFLOAD: &str = "llama_supports_gpu_offload";
    pub const MAX_DEVICES: &str = "llama_max_devices";
    pub const TIME_US: &str = "llama_time_us";

    pub const ALL: &[&str] = &[
        BACKEND_INIT,
        BACKEND_FREE,
        PRINT_SYSTEM_INFO,
        SUPPORTS_MMAP,
        SUPPORTS_MLOCK,
        SUPPORTS_GPU_OFFLOAD,
        MAX_DEVICES,
        TIME_US,
    ];
}

pub type BackendInitFn = unsafe extern "C" fn();
pub type BackendFreeFn = unsafe extern "C" fn();
pub type PrintSystemInfoFn = unsafe extern "C" fn() -> *const c_char;
pub type SupportsFn = unsafe extern "C" fn() -> bool;
pub type MaxDevicesFn = unsafe extern "C" fn() -> usize;
pub type TimeUsFn = unsafe extern "C" fn() -> i64;

/// One optional callable reference per declared native capability.
///
/// The raw function pointers are only valid while the `Library` they came
/// from stays open; `LoadedEngine` owns both and enforces that.
#[derive(Debug)]
pub struct SymbolTable {
    pub backend_init: Option<BackendInitFn>,
    pub backend_free: Option<BackendFreeFn>,
    pub print_system_info: Option<PrintSystemInfoFn>,
    pub supports_mmap: Option<SupportsFn>,
    pub supports_mlock: Option<SupportsFn>,
    pub supports_gpu_offload: Option<SupportsFn>,
    pub max_devices: Option<MaxDevicesFn>,
    pub time_us: Option<TimeUsFn>,
}

impl SymbolTable {
    /// Attempt to bind every declared symbol. Each resolution happens
    /// exactly once; absent entries are never re-attempted.
    pub fn bind(library: &Library) -> Self {
        Self {
            backend_init: resolve(library, names::BACKEND_INIT),
            backend_free: resolve(library, names::BACKEND_FREE),
            print_system_info: resolve(library, names::PRINT_SYSTEM_INFO),
            supports_mmap: resolve(library, names::SUPPORTS_MMAP),
            supports_mlock: resolve(library, names::SUPPORTS_MLOCK),
            supports_gpu_offload: resolve(library, names::SUPPORTS_GPU_OFFLOAD),
            max_devices: resolve(library, names::MAX_DEVICES),
            time_us: resolve(library, names::TIME_US),
        }
    }

    /// A table with nothing bound
    pub fn empty() -> Self {
        Self {
            backend_init: None,
            backend_free: None,
            print_system_info: None,
            supports_mmap: None,
            supports_mlock: None,
            supports_gpu_offload: None,
            max_devices: None,
            time_us: None,
        }
    }

    /// Names of declared symbols that failed to bind
    pub fn missing(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.backend_init.is_none() {
            missing.push(names::BACKEND_INIT);
        }
        if self.backend_free.is_none() {
            missing.push(names::BACKEND_FREE);
        }
        if self.print_system_info.is_none() {
            missing.push(names::PRINT_SYSTEM_INFO);
        }
        if self.supports_mmap.is_none() {
            missing.push(names::SUPPORTS_MMAP);
        }
        if self.supports_mlock.is_none() {
            missing.push(names::SUPPORTS_MLOCK);
        }
        if self.supports_gpu_offload.is_none() {
            missing.push(names::SUPPORTS_GPU_OFFLOAD);
        }
        if self.max_devices.is_none() {
            missing.push(names::MAX_DEVICES);
        }
        if self.time_us.is_none() {
            missing.push(names::TIME_US);
        }
        missing
    }

    /// Number of declared symbols that bound successfully
    pub fn bound_count(&self) -> usize {
        names::ALL.len() - self.missing().len()
    }
}

/// Resolve one symbol, copying the function pointer out of the loader's
/// guard. The copy is sound because the owning `Library` outlives every
/// table (see `LoadedEngine`).
fn resolve<T: Copy>(library: &Library, name: &'static str) -> Option<T> {
    match unsafe { library.get::<T>(name.as_bytes()) } {
        Ok(symbol) => Some(*symbol),
        Err(e) => {
            debug!("Symbol {} not bound: {}", name, e);
            None
        }
    }
}
