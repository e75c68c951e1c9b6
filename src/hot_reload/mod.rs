//! Shader hot-reload trigger
//!
//! Watches the shader directory and tells the renderer when to run a hot-load pass.
//! Detection of what actually changed stays with the pipeline tracker; the watcher only
//! decides when to look.

pub mod error;
pub mod watcher;

pub use error::{watch_error, HotReloadErrorContext, HotReloadResult};
#[cfg(feature = "native")]
pub use watcher::ShaderWatcher;
pub use watcher::{FileFilter, WatchEvent, WatchEventType};
