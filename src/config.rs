//! Engine configuration
//!
//! Loaded from TOML. Every section has defaults so an empty file is a valid config.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};

/// Main engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct EngineConfig {
    pub shaders: ShaderConfig,
    pub frames: FrameConfig,
    pub log: LogConfig,
}

/// Shader compilation and hot-reload settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShaderConfig {
    /// Directory holding the shader sources
    pub root: PathBuf,

    /// Fixed root that `#include` directives are resolved against
    pub include_root: PathBuf,

    /// Track shader files so pipelines can be rebuilt at runtime
    pub hotload: bool,

    /// Request a hot-reload automatically when a file under `root` changes
    pub watch: bool,

    /// Debounce time in milliseconds for the watcher
    pub debounce_ms: u64,

    /// Maximum nesting of `#include` directives
    pub max_include_depth: usize,
}

impl Default for ShaderConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("res/shaders"),
            include_root: PathBuf::from("res/shaders/include"),
            hotload: true,
            watch: false,
            debounce_ms: 100,
            max_include_depth: 16,
        }
    }
}

/// Frame pacing settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FrameConfig {
    /// Number of frames that may be in flight on the GPU at once
    pub frames_in_flight: usize,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self { frames_in_flight: 2 }
    }
}

/// Logging settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Default `env_logger` filter when `RUST_LOG` is unset
    pub filter: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
        }
    }
}

impl EngineConfig {
    /// Parse a configuration from TOML text
    pub fn from_toml_str(raw: &str) -> EngineResult<Self> {
        let config: EngineConfig = toml::from_str(raw).map_err(|e| EngineError::Config {
            path: PathBuf::from("<inline>"),
            error: e.to_string(),
        })?;
        config.validated(Path::new("<inline>"))
    }

    /// Load a configuration file
    pub fn load(path: impl AsRef<Path>) -> EngineResult<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| EngineError::Config {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;
        let config: EngineConfig = toml::from_str(&raw).map_err(|e| EngineError::Config {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;
        log::info!("[EngineConfig::load] Loaded configuration from {}", path.display());
        config.validated(path)
    }

    /// Serialize back to TOML
    pub fn to_toml_string(&self) -> EngineResult<String> {
        toml::to_string_pretty(self).map_err(|e| EngineError::Config {
            path: PathBuf::from("<inline>"),
            error: e.to_string(),
        })
    }

    fn validated(self, path: &Path) -> EngineResult<Self> {
        // Rebuilds wait for every in-flight frame, fewer than two defeats the point of buffering
        if self.frames.frames_in_flight < 2 {
            return Err(EngineError::Config {
                path: path.to_path_buf(),
                error: format!(
                    "frames_in_flight must be at least 2, got {}",
                    self.frames.frames_in_flight
                ),
            });
        }
        Ok(self)
    }
}
