//! Hot reload error handling
//!
//! Type alias and helpers for the file watcher.

use std::path::Path;

use crate::error::{io_error, EngineError, EngineResult};

/// Type alias for hot reload results
pub type HotReloadResult<T> = EngineResult<T>;

/// Helper trait for hot reload error contexts
pub trait HotReloadErrorContext<T> {
    fn hot_reload_context(self, path: &Path) -> HotReloadResult<T>;
}

#[cfg(feature = "native")]
impl<T> HotReloadErrorContext<T> for Result<T, notify::Error> {
    fn hot_reload_context(self, path: &Path) -> HotReloadResult<T> {
        self.map_err(|e| watch_error(path, e))
    }
}

/// Create a watcher error for a path
pub fn watch_error(path: &Path, error: impl std::fmt::Display) -> EngineError {
    io_error(path, format!("watch failed: {}", error))
}
