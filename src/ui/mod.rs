//! Terminal output helpers with CI fallback

mod context;
mod progress;

pub use context::UiContext;
pub use progress::{DownloadBar, TaskSpinner};
