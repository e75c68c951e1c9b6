//! Engine-wide error type
//!
//! Every subsystem reports failures through [`EngineError`]. Subsystems add their own
//! `error.rs` with result aliases and constructor helpers on top of it.

use std::path::{Path, PathBuf};
use thiserror::Error;

/// Result alias used across the engine
pub type EngineResult<T> = Result<T, EngineError>;

#[derive(Debug, Error)]
pub enum EngineError {
    /// A shader source or include file could not be read
    #[error("I/O error on {path}: {error}")]
    Io { path: PathBuf, error: String },

    /// A tracked file could not be stat'ed while scanning for changes
    #[error("Cannot access {path}: {error}")]
    FileAccess { path: PathBuf, error: String },

    /// Front-end parse, validation, limit or lowering failure
    #[error("Shader compilation failed for {path}:\n{diagnostic}")]
    Compile { path: PathBuf, diagnostic: String },

    /// The driver refused to create a shader module, pipeline or layout
    #[error("Driver failed to create {object}: {error}")]
    DriverCreation { object: String, error: String },

    /// A required device or context is missing or lost
    #[error("Fatal: {reason}")]
    ProcessFatal { reason: String },

    /// Configuration file unreadable or malformed
    #[error("Invalid configuration {path}: {error}")]
    Config { path: PathBuf, error: String },

    /// Registry lookup for an id it never handed out
    #[error("Unknown pipeline id {id}")]
    UnknownPipeline { id: u64 },
}

impl EngineError {
    /// True for errors that must stop the operation that requested the work,
    /// as opposed to errors that only invalidate a single rebuild.
    pub fn is_fatal(&self) -> bool {
        matches!(self, EngineError::ProcessFatal { .. })
    }
}

/// Create an I/O error for a path
pub fn io_error(path: &Path, error: impl std::fmt::Display) -> EngineError {
    EngineError::Io {
        path: path.to_path_buf(),
        error: error.to_string(),
    }
}

/// Create a fatal error
pub fn fatal_error(reason: impl Into<String>) -> EngineError {
    EngineError::ProcessFatal {
        reason: reason.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_process_fatal_is_fatal() {
        assert!(fatal_error("device lost").is_fatal());
        assert!(!io_error(Path::new("a.vert"), "missing").is_fatal());
        assert!(!EngineError::Compile {
            path: PathBuf::from("a.vert"),
            diagnostic: "bad".to_string(),
        }
        .is_fatal());
    }

    #[test]
    fn test_compile_error_carries_diagnostic() {
        let err = EngineError::Compile {
            path: PathBuf::from("shaders/mesh.frag"),
            diagnostic: "error: unknown identifier 'colr'".to_string(),
        };
        let text = err.to_string();
        assert!(text.contains("shaders/mesh.frag"));
        assert!(text.contains("unknown identifier"));
    }
}
