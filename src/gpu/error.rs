//! GPU driver error handling
//!
//! Type alias and helper constructors for driver operations.

use crate::error::{fatal_error, EngineError, EngineResult};

/// Type alias for driver operation results
pub type GpuResult<T> = EngineResult<T>;

/// Create a driver object creation error
pub fn driver_creation_error(object: &str, error: impl std::fmt::Display) -> EngineError {
    EngineError::DriverCreation {
        object: object.to_string(),
        error: error.to_string(),
    }
}

/// Create the error returned by every operation on a lost device
pub fn device_lost_error(device: &str) -> EngineError {
    fatal_error(format!("device '{}' was lost", device))
}
