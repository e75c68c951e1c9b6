//! Pipeline lifecycle and shader hot-reload core
//!
//! The [`pipeline::PipelineManager`] owns graphics and compute pipelines by logical id,
//! tracks the shader files each one was built from and rebuilds them in place when
//! those files change. [`renderer::Renderer`] drives it once per frame.

pub mod config;
pub mod error;
pub mod gpu;
pub mod hot_reload;
pub mod pipeline;
pub mod renderer;
pub mod shader;

pub use config::{EngineConfig, FrameConfig, LogConfig, ShaderConfig};
pub use error::{EngineError, EngineResult};
pub use gpu::{wait_idle, DeviceIdle, GpuDevice, HeadlessDevice, PipelineHandle, PipelineLayoutHandle, WgpuDevice};
pub use pipeline::{HotloadReport, LayoutId, PipelineId, PipelineManager, TrackShader};
pub use renderer::{Renderer, RendererOptions};
pub use shader::{ShaderCompiler, ShaderSet, ShaderStage};

/// Install the `env_logger` backend, honouring `RUST_LOG` over `default_filter`
///
/// Safe to call more than once; later calls are ignored.
pub fn init_logging(default_filter: &str) {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .format_timestamp_millis()
        .try_init();
}
