//! Renderer subsystem error handling
//!
//! Type alias and helpers for renderer operations.

use crate::error::{EngineError, EngineResult};

/// Type alias for renderer operation results
pub type RendererResult<T> = EngineResult<T>;

/// Helper trait for renderer error contexts
pub trait RendererErrorContext<T> {
    fn renderer_context(self, context: &str) -> RendererResult<T>;
}

impl<T> RendererErrorContext<T> for EngineResult<T> {
    /// Prefix driver errors with the renderer step that failed
    fn renderer_context(self, context: &str) -> RendererResult<T> {
        self.map_err(|e| match e {
            EngineError::DriverCreation { object, error } => EngineError::DriverCreation {
                object: format!("{} / {}", context, object),
                error,
            },
            other => other,
        })
    }
}

/// Create a frame configuration error
pub fn frame_config_error(frames_in_flight: usize) -> EngineError {
    EngineError::Config {
        path: "<renderer>".into(),
        error: format!("frames_in_flight must be at least 2, got {}", frames_in_flight),
    }
}
