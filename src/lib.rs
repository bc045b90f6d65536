//! Lode - native inference engine acquisition and loading
//!
//! Resolves which engine build matches a platform, downloads and verifies
//! it exactly once, caches it across runs, and binds its exported C symbols
//! at runtime behind defensive, typed wrappers.

pub mod batch;
pub mod cache;
pub mod checksum;
pub mod cli;
pub mod config;
pub mod engine;
pub mod error;
pub mod fetch;
pub mod platform;
pub mod release;
pub mod ui;

pub use error::{LodeError, LodeResult};
