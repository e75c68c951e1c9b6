//! Renderer orchestration
//!
//! Owns the device, the pipeline registry and the frame pacing state. Hot-reload is
//! requested at any time (key press, watcher, API call) and carried out at the start of
//! the next frame, once the device is idle.

pub mod background;
pub mod error;
pub mod frame;
pub mod materials;

pub use background::{BackgroundEffects, ComputeEffect, ComputePushConstants};
pub use error::{RendererErrorContext, RendererResult};
pub use frame::{FrameData, FrameSync};
pub use materials::{DrawPushConstants, MaterialPass, MaterialPipelines, MaterialTargets};

use crate::config::EngineConfig;
use crate::error::fatal_error;
use crate::gpu::{shared_queue, wait_idle, DescriptorSetLayoutHandle, GpuDevice, PipelineHandle, SharedDeletionQueue};
use crate::pipeline::{HotloadReport, PipelineManager, RenderMode, TrackShader};

#[cfg(feature = "native")]
use crate::hot_reload::ShaderWatcher;

/// Attachment formats and externally created sets the pipelines are built against
#[derive(Debug, Clone)]
pub struct RendererOptions {
    pub color_format: wgpu::TextureFormat,
    pub depth_format: wgpu::TextureFormat,
    pub render_mode: RenderMode,
    pub extent: (u32, u32),
    /// Scene data and material set layouts
    pub material_set_layouts: Vec<DescriptorSetLayoutHandle>,
    /// Draw image set layout
    pub background_set_layouts: Vec<DescriptorSetLayoutHandle>,
}

impl Default for RendererOptions {
    fn default() -> Self {
        Self {
            color_format: wgpu::TextureFormat::Rgba16Float,
            depth_format: wgpu::TextureFormat::Depth32Float,
            render_mode: RenderMode::Dynamic,
            extent: (1700, 900),
            material_set_layouts: Vec::new(),
            background_set_layouts: Vec::new(),
        }
    }
}

/// Pipelines bound during one frame
#[derive(Debug)]
pub struct FrameReport {
    pub frame_number: u64,
    pub frame_index: usize,
    pub background: PipelineHandle,
    pub opaque: PipelineHandle,
    pub transparent: PipelineHandle,
    /// Present when a hot-reload ran before this frame
    pub hotload: Option<HotloadReport>,
}

pub struct Renderer<D: GpuDevice> {
    device: D,
    config: EngineConfig,
    options: RendererOptions,
    deletion_queue: SharedDeletionQueue,
    pipelines: PipelineManager,
    materials: MaterialPipelines,
    backgrounds: BackgroundEffects,
    frames: FrameSync,
    hotload_requested: bool,
    #[cfg(feature = "native")]
    watcher: Option<ShaderWatcher>,
    shut_down: bool,
}

impl<D: GpuDevice> Renderer<D> {
    /// Build every pipeline the renderer needs
    ///
    /// Initial build failures are returned; whatever was created before the failure is
    /// destroyed first.
    pub fn new(device: D, config: EngineConfig, options: RendererOptions) -> RendererResult<Self> {
        let frames = FrameSync::new(config.frames.frames_in_flight)?;

        #[cfg(feature = "native")]
        let watcher = if config.shaders.hotload && config.shaders.watch {
            let mut watcher = ShaderWatcher::new(config.shaders.debounce_ms)?;
            watcher.watch_dir(&config.shaders.root)?;
            Some(watcher)
        } else {
            None
        };

        let deletion_queue = shared_queue();
        let mut pipelines = PipelineManager::from_config(deletion_queue.clone(), &config.shaders);

        let track = if config.shaders.hotload {
            TrackShader::Yes
        } else {
            TrackShader::No
        };

        let built = Self::build_pipelines(&device, &mut pipelines, &config, &options, track);
        let (backgrounds, materials) = match built {
            Ok(built) => built,
            Err(e) => {
                log::error!("[Renderer::new] Initial pipeline build failed: {}", e);
                if let Ok(idle) = wait_idle(&device) {
                    deletion_queue.borrow_mut().flush(&device, &idle);
                }
                return Err(e);
            }
        };

        log::info!(
            "[Renderer::new] Renderer ready on {} with {} pipelines, {} frames in flight",
            device.name(),
            pipelines.pipeline_count(),
            frames.frames_in_flight()
        );

        Ok(Self {
            device,
            config,
            options,
            deletion_queue,
            pipelines,
            materials,
            backgrounds,
            frames,
            hotload_requested: false,
            #[cfg(feature = "native")]
            watcher,
            shut_down: false,
        })
    }

    fn build_pipelines(
        device: &D,
        pipelines: &mut PipelineManager,
        config: &EngineConfig,
        options: &RendererOptions,
        track: TrackShader,
    ) -> RendererResult<(BackgroundEffects, MaterialPipelines)> {
        let root = &config.shaders.root;
        let backgrounds =
            BackgroundEffects::build(device, pipelines, root, &options.background_set_layouts, track)?;
        let targets = MaterialTargets {
            color_format: options.color_format,
            depth_format: options.depth_format,
            render_mode: options.render_mode,
            set_layouts: options.material_set_layouts.clone(),
        };
        let materials = MaterialPipelines::build(device, pipelines, root, &targets, track)?;
        Ok((backgrounds, materials))
    }

    /// Ask for a shader hot-reload before the next frame
    pub fn request_hotload(&mut self) {
        if !self.config.shaders.hotload {
            log::warn!("[Renderer::request_hotload] Shader hot-reload is disabled in the configuration");
            return;
        }
        self.hotload_requested = true;
    }

    pub fn hotload_requested(&self) -> bool {
        self.hotload_requested
    }

    #[cfg(feature = "native")]
    fn poll_watcher(&mut self) {
        if let Some(watcher) = &self.watcher {
            let changed = watcher.changed_paths();
            if !changed.is_empty() {
                log::debug!("[Renderer::poll_watcher] {} shader files changed", changed.len());
                self.hotload_requested = true;
            }
        }
    }

    /// Run one frame
    ///
    /// A pending hot-reload runs first: wait for the device to go idle, then rebuild
    /// changed pipelines. Rebuild failures end up in the report; only a lost device
    /// fails the frame.
    pub fn process_frame(&mut self) -> RendererResult<FrameReport> {
        if self.shut_down {
            return Err(fatal_error("renderer has been shut down"));
        }

        #[cfg(feature = "native")]
        self.poll_watcher();

        let hotload = if self.hotload_requested {
            self.hotload_requested = false;
            let idle = wait_idle(&self.device)?;
            self.frames.mark_idle(&idle);
            Some(self.pipelines.hotload_shaders(&self.device, &idle)?)
        } else {
            None
        };

        let frame_index = self.frames.begin_frame();
        let report = FrameReport {
            frame_number: self.frames.frame_number(),
            frame_index,
            background: self.pipelines.get_pipeline(self.backgrounds.current().pipeline),
            opaque: self.pipelines.get_pipeline(self.materials.pipeline_for(MaterialPass::MainColor)),
            transparent: self
                .pipelines
                .get_pipeline(self.materials.pipeline_for(MaterialPass::Transparent)),
            hotload,
        };
        self.frames.end_frame();

        log::trace!(
            "[Renderer::process_frame] Frame {} in slot {}",
            report.frame_number,
            report.frame_index
        );
        Ok(report)
    }

    /// New draw extent; waits for in-flight frames first
    pub fn resize(&mut self, width: u32, height: u32) -> RendererResult<()> {
        let idle = wait_idle(&self.device)?;
        self.frames.mark_idle(&idle);
        self.options.extent = (width, height);
        log::info!("[Renderer::resize] Draw extent is now {}x{}", width, height);
        Ok(())
    }

    /// Wait for the device and destroy everything the registry owns
    ///
    /// Calling it again is a no-op.
    pub fn shutdown(&mut self) -> RendererResult<()> {
        if self.shut_down {
            return Ok(());
        }
        let idle = wait_idle(&self.device)?;
        self.frames.mark_idle(&idle);
        self.deletion_queue.borrow_mut().flush(&self.device, &idle);
        self.shut_down = true;
        log::info!("[Renderer::shutdown] Renderer shut down after {} frames", self.frames.frame_number());
        Ok(())
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn options(&self) -> &RendererOptions {
        &self.options
    }

    pub fn pipelines(&self) -> &PipelineManager {
        &self.pipelines
    }

    pub fn pipelines_mut(&mut self) -> &mut PipelineManager {
        &mut self.pipelines
    }

    pub fn deletion_queue(&self) -> &SharedDeletionQueue {
        &self.deletion_queue
    }

    pub fn materials(&self) -> &MaterialPipelines {
        &self.materials
    }

    pub fn backgrounds(&self) -> &BackgroundEffects {
        &self.backgrounds
    }

    pub fn backgrounds_mut(&mut self) -> &mut BackgroundEffects {
        &mut self.backgrounds
    }

    pub fn frames(&self) -> &FrameSync {
        &self.frames
    }
}

impl<D: GpuDevice> Drop for Renderer<D> {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            log::error!("[Renderer::drop] Shutdown failed: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::HeadlessDevice;
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    const VERT: &str = "#version 450\nlayout(location = 0) out vec4 color;\nvoid main() { color = vec4(1.0); gl_Position = vec4(0.0); }\n";
    const FRAG: &str = "#version 450\nlayout(location = 0) in vec4 color;\nlayout(location = 0) out vec4 outColor;\nvoid main() { outColor = color; }\n";
    const COMP: &str = "#version 450\nlayout(local_size_x = 16, local_size_y = 16) in;\nvoid main() {}\n";

    fn write_shaders(root: &Path) {
        fs::write(root.join(materials::MESH_VERTEX_SHADER), VERT).expect("write vert");
        fs::write(root.join(materials::MESH_FRAGMENT_SHADER), FRAG).expect("write frag");
        fs::write(root.join(background::GRADIENT_SHADER), COMP).expect("write gradient");
        fs::write(root.join(background::SKY_SHADER), COMP).expect("write sky");
    }

    fn config(root: &Path) -> EngineConfig {
        let mut config = EngineConfig::default();
        config.shaders.root = root.to_path_buf();
        config.shaders.include_root = root.to_path_buf();
        config
    }

    #[test]
    fn test_renderer_builds_all_pipelines() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        write_shaders(temp_dir.path());

        let renderer = Renderer::new(HeadlessDevice::new(), config(temp_dir.path()), RendererOptions::default())
            .expect("renderer");
        assert_eq!(renderer.pipelines().pipeline_count(), 4);
        assert_eq!(renderer.pipelines().layout_count(), 2);
        assert_eq!(renderer.device().live_pipelines(), 4);
        assert_eq!(renderer.backgrounds().current().name, "gradient");
    }

    #[test]
    fn test_failed_initial_build_cleans_up() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        write_shaders(temp_dir.path());
        fs::remove_file(temp_dir.path().join(materials::MESH_FRAGMENT_SHADER)).expect("remove frag");

        let device = HeadlessDevice::new();
        let result = Renderer::new(&device, config(temp_dir.path()), RendererOptions::default());
        assert!(result.is_err());
        assert_eq!(device.live_pipelines(), 0);
        assert_eq!(device.live_pipeline_layouts(), 0);
        assert_eq!(device.invalid_destroys(), 0);
    }

    #[test]
    fn test_frames_without_hotload() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        write_shaders(temp_dir.path());
        let mut renderer =
            Renderer::new(HeadlessDevice::new(), config(temp_dir.path()), RendererOptions::default())
                .expect("renderer");

        let first = renderer.process_frame().expect("frame");
        let second = renderer.process_frame().expect("frame");
        assert_eq!((first.frame_index, second.frame_index), (0, 1));
        assert!(first.hotload.is_none());
        assert_eq!(first.opaque, second.opaque);
        assert!(!first.background.is_null());
        assert_eq!(renderer.device().idle_waits(), 0);
    }

    #[test]
    fn test_shutdown_is_idempotent() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        write_shaders(temp_dir.path());
        let device = HeadlessDevice::new();
        let mut renderer = Renderer::new(&device, config(temp_dir.path()), RendererOptions::default())
            .expect("renderer");

        renderer.shutdown().expect("shutdown");
        renderer.shutdown().expect("second shutdown");
        assert!(renderer.process_frame().unwrap_err().is_fatal());
        drop(renderer);

        assert_eq!(device.live_pipelines(), 0);
        assert_eq!(device.live_pipeline_layouts(), 0);
        assert_eq!(device.invalid_destroys(), 0);
    }

    #[test]
    fn test_hotload_disabled_ignores_requests() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        write_shaders(temp_dir.path());
        let mut config = config(temp_dir.path());
        config.shaders.hotload = false;
        let mut renderer =
            Renderer::new(HeadlessDevice::new(), config, RendererOptions::default()).expect("renderer");

        renderer.request_hotload();
        assert!(!renderer.hotload_requested());
        assert!(renderer.pipelines().tracker().is_empty());
    }
}
