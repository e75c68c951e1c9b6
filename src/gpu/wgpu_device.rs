//! wgpu backend
//!
//! Native objects live in tables keyed by handle. Removing a table entry drops the wgpu
//! object, which is how destruction is expressed in wgpu. Validation failures are caught
//! with error scopes and reported as [`EngineError::DriverCreation`].
//!
//! [`EngineError::DriverCreation`]: crate::error::EngineError::DriverCreation

use std::borrow::Cow;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;

use super::error::driver_creation_error;
use super::{
    DescriptorSetLayoutHandle, GpuDevice, GpuResult, PipelineHandle, PipelineLayoutHandle,
    RenderPassHandle, ShaderModuleHandle,
};
use crate::error::fatal_error;
use crate::pipeline::config::{ComputeConfig, GraphicsConfig, RenderMode};
use crate::pipeline::layout::LayoutDesc;
use crate::shader::{CompiledShader, ShaderStage};

/// Attachment formats of a render pass created outside the registry
#[derive(Debug, Clone, PartialEq)]
pub struct RenderPassFormats {
    pub color_formats: Vec<wgpu::TextureFormat>,
    pub depth_format: Option<wgpu::TextureFormat>,
}

#[derive(Default)]
struct WgpuTables {
    next_handle: u64,
    shader_modules: FxHashMap<ShaderModuleHandle, wgpu::ShaderModule>,
    pipeline_layouts: FxHashMap<PipelineLayoutHandle, wgpu::PipelineLayout>,
    render_pipelines: FxHashMap<PipelineHandle, wgpu::RenderPipeline>,
    compute_pipelines: FxHashMap<PipelineHandle, wgpu::ComputePipeline>,
    bind_group_layouts: FxHashMap<DescriptorSetLayoutHandle, wgpu::BindGroupLayout>,
    render_passes: FxHashMap<RenderPassHandle, RenderPassFormats>,
}

impl WgpuTables {
    fn allocate(&mut self) -> u64 {
        self.next_handle += 1;
        self.next_handle
    }
}

pub struct WgpuDevice {
    device: wgpu::Device,
    queue: wgpu::Queue,
    adapter_name: String,
    tables: Mutex<WgpuTables>,
}

impl WgpuDevice {
    /// Request an adapter and device without a surface
    pub fn new_headless() -> GpuResult<Self> {
        pollster::block_on(Self::request())
    }

    async fn request() -> GpuResult<Self> {
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                force_fallback_adapter: false,
                compatible_surface: None,
            })
            .await
            .ok_or_else(|| fatal_error("no suitable GPU adapter found"))?;

        let info = adapter.get_info();
        log::info!(
            "[WgpuDevice::new_headless] Using adapter {} ({:?})",
            info.name,
            info.backend
        );

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("Kiln Device"),
                    required_features: adapter.features() & wgpu::Features::PUSH_CONSTANTS,
                    required_limits: adapter.limits(),
                },
                None,
            )
            .await
            .map_err(|e| fatal_error(format!("device request failed: {}", e)))?;

        Ok(Self::from_parts(device, queue, info.name))
    }

    /// Wrap a device created by the application
    pub fn from_parts(device: wgpu::Device, queue: wgpu::Queue, adapter_name: impl Into<String>) -> Self {
        Self {
            device,
            queue,
            adapter_name: adapter_name.into(),
            tables: Mutex::new(WgpuTables::default()),
        }
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    /// Hand a bind group layout to the device so pipeline layouts can reference it
    pub fn register_bind_group_layout(&self, layout: wgpu::BindGroupLayout) -> DescriptorSetLayoutHandle {
        let mut tables = self.tables.lock();
        let handle = DescriptorSetLayoutHandle(tables.allocate());
        tables.bind_group_layouts.insert(handle, layout);
        handle
    }

    /// Record the attachment formats of an externally created render pass
    pub fn register_render_pass(&self, formats: RenderPassFormats) -> RenderPassHandle {
        let mut tables = self.tables.lock();
        let handle = RenderPassHandle(tables.allocate());
        tables.render_passes.insert(handle, formats);
        handle
    }

    /// Run `f` with the render pipeline behind `handle`
    pub fn with_render_pipeline<R>(
        &self,
        handle: PipelineHandle,
        f: impl FnOnce(&wgpu::RenderPipeline) -> R,
    ) -> Option<R> {
        self.tables.lock().render_pipelines.get(&handle).map(f)
    }

    /// Run `f` with the compute pipeline behind `handle`
    pub fn with_compute_pipeline<R>(
        &self,
        handle: PipelineHandle,
        f: impl FnOnce(&wgpu::ComputePipeline) -> R,
    ) -> Option<R> {
        self.tables.lock().compute_pipelines.get(&handle).map(f)
    }

    /// Run a creation call inside validation and out-of-memory error scopes
    fn scoped<T>(&self, object: &str, create: impl FnOnce(&wgpu::Device) -> T) -> GpuResult<T> {
        self.device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let value = create(&self.device);
        let validation = pollster::block_on(self.device.pop_error_scope());
        let out_of_memory = pollster::block_on(self.device.pop_error_scope());

        match validation.or(out_of_memory) {
            Some(error) => {
                log::error!("[WgpuDevice::scoped] Failed to create {}: {}", object, error);
                Err(driver_creation_error(object, error))
            }
            None => Ok(value),
        }
    }

    fn attachment_formats(
        tables: &WgpuTables,
        label: &str,
        config: &GraphicsConfig,
    ) -> GpuResult<(Vec<wgpu::TextureFormat>, Option<wgpu::TextureFormat>)> {
        match config.render_mode {
            RenderMode::Dynamic => Ok((
                config.rendering.color_formats.clone(),
                config.rendering.depth_format,
            )),
            RenderMode::Classic(pass) => tables
                .render_passes
                .get(&pass)
                .map(|formats| (formats.color_formats.clone(), formats.depth_format))
                .ok_or_else(|| driver_creation_error(label, format!("{} is not registered", pass))),
        }
    }
}

/// Live module and entry point bound to `stage`, if the config uses that stage
fn stage_module<'a>(
    tables: &'a WgpuTables,
    label: &str,
    config: &'a GraphicsConfig,
    stage: ShaderStage,
) -> GpuResult<Option<(&'a wgpu::ShaderModule, &'a str)>> {
    let Some(binding) = config.stage(stage) else {
        return Ok(None);
    };
    tables
        .shader_modules
        .get(&binding.module)
        .map(|module| Some((module, binding.entry_point.as_str())))
        .ok_or_else(|| driver_creation_error(label, format!("{} is not alive", binding.module)))
}

impl GpuDevice for WgpuDevice {
    fn name(&self) -> &str {
        &self.adapter_name
    }

    fn create_shader_module(&self, label: &str, shader: &CompiledShader) -> GpuResult<ShaderModuleHandle> {
        if shader.stage == ShaderStage::Geometry {
            return Err(driver_creation_error(label, "wgpu has no geometry stage"));
        }

        let module = self.scoped(label, |device| {
            device.create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(label),
                source: wgpu::ShaderSource::SpirV(Cow::Borrowed(&shader.spirv)),
            })
        })?;

        let mut tables = self.tables.lock();
        let handle = ShaderModuleHandle(tables.allocate());
        tables.shader_modules.insert(handle, module);
        Ok(handle)
    }

    fn destroy_shader_module(&self, module: ShaderModuleHandle) {
        if self.tables.lock().shader_modules.remove(&module).is_none() {
            log::error!("[WgpuDevice::destroy_shader_module] {} is not alive", module);
        }
    }

    fn create_pipeline_layout(&self, label: &str, desc: &LayoutDesc) -> GpuResult<PipelineLayoutHandle> {
        let mut tables = self.tables.lock();
        let bind_group_layouts = desc
            .set_layouts
            .iter()
            .map(|handle| {
                tables
                    .bind_group_layouts
                    .get(handle)
                    .ok_or_else(|| driver_creation_error(label, format!("{} is not registered", handle)))
            })
            .collect::<GpuResult<Vec<_>>>()?;

        let layout = self.scoped(label, |device| {
            device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some(label),
                bind_group_layouts: &bind_group_layouts,
                push_constant_ranges: &desc.push_constant_ranges,
            })
        })?;

        let handle = PipelineLayoutHandle(tables.allocate());
        tables.pipeline_layouts.insert(handle, layout);
        Ok(handle)
    }

    fn destroy_pipeline_layout(&self, layout: PipelineLayoutHandle) {
        if self.tables.lock().pipeline_layouts.remove(&layout).is_none() {
            log::error!("[WgpuDevice::destroy_pipeline_layout] {} is not alive", layout);
        }
    }

    fn create_graphics_pipeline(
        &self,
        label: &str,
        layout: PipelineLayoutHandle,
        config: &GraphicsConfig,
    ) -> GpuResult<PipelineHandle> {
        let mut tables = self.tables.lock();

        let pipeline_layout = if layout.is_null() {
            None
        } else {
            Some(
                tables
                    .pipeline_layouts
                    .get(&layout)
                    .ok_or_else(|| driver_creation_error(label, format!("{} is not alive", layout)))?,
            )
        };

        if config.stage(ShaderStage::Geometry).is_some() {
            return Err(driver_creation_error(label, "wgpu has no geometry stage"));
        }
        let (vertex_module, vertex_entry) = stage_module(&tables, label, config, ShaderStage::Vertex)?
            .ok_or_else(|| driver_creation_error(label, "graphics pipeline without a vertex stage"))?;
        let fragment = stage_module(&tables, label, config, ShaderStage::Fragment)?;

        let (color_formats, depth_format) = Self::attachment_formats(&tables, label, config)?;

        let vertex_buffers: Vec<wgpu::VertexBufferLayout> = config
            .vertex_input
            .buffers
            .iter()
            .map(|buffer| wgpu::VertexBufferLayout {
                array_stride: buffer.array_stride,
                step_mode: buffer.step_mode,
                attributes: &buffer.attributes,
            })
            .collect();

        let targets: Vec<Option<wgpu::ColorTargetState>> = color_formats
            .iter()
            .map(|format| {
                Some(wgpu::ColorTargetState {
                    format: *format,
                    blend: config.color_blend.to_wgpu(),
                    write_mask: config.color_blend.write_mask,
                })
            })
            .collect();

        let depth = &config.depth_stencil;
        let raster = &config.rasterization;
        let depth_stencil = depth_format.map(|format| wgpu::DepthStencilState {
            format,
            depth_write_enabled: depth.depth_test_enable && depth.depth_write_enable,
            depth_compare: if depth.depth_test_enable {
                depth.depth_compare
            } else {
                wgpu::CompareFunction::Always
            },
            stencil: wgpu::StencilState::default(),
            bias: if raster.depth_bias_enable {
                wgpu::DepthBiasState {
                    constant: raster.depth_bias_constant,
                    slope_scale: raster.depth_bias_slope,
                    clamp: raster.depth_bias_clamp,
                }
            } else {
                wgpu::DepthBiasState::default()
            },
        });

        let assembly = &config.input_assembly;
        let strip = matches!(
            assembly.topology,
            wgpu::PrimitiveTopology::LineStrip | wgpu::PrimitiveTopology::TriangleStrip
        );

        let pipeline = self.scoped(label, |device| {
            device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some(label),
                layout: pipeline_layout,
                vertex: wgpu::VertexState {
                    module: vertex_module,
                    entry_point: vertex_entry,
                    buffers: &vertex_buffers,
                },
                primitive: wgpu::PrimitiveState {
                    topology: assembly.topology,
                    strip_index_format: (strip && assembly.primitive_restart_enable)
                        .then_some(wgpu::IndexFormat::Uint32),
                    front_face: raster.front_face,
                    cull_mode: raster.cull_mode,
                    unclipped_depth: raster.depth_clamp_enable,
                    polygon_mode: raster.polygon_mode,
                    conservative: false,
                },
                depth_stencil,
                multisample: wgpu::MultisampleState {
                    count: config.multisample.sample_count,
                    mask: config.multisample.sample_mask,
                    alpha_to_coverage_enabled: config.multisample.alpha_to_coverage_enable,
                },
                fragment: fragment.map(|(module, entry_point)| wgpu::FragmentState {
                    module,
                    entry_point,
                    targets: &targets,
                }),
                multiview: None,
            })
        })?;

        let handle = PipelineHandle(tables.allocate());
        tables.render_pipelines.insert(handle, pipeline);
        Ok(handle)
    }

    fn create_compute_pipeline(
        &self,
        label: &str,
        layout: PipelineLayoutHandle,
        config: &ComputeConfig,
    ) -> GpuResult<PipelineHandle> {
        let mut tables = self.tables.lock();

        let pipeline_layout = if layout.is_null() {
            None
        } else {
            Some(
                tables
                    .pipeline_layouts
                    .get(&layout)
                    .ok_or_else(|| driver_creation_error(label, format!("{} is not alive", layout)))?,
            )
        };
        let module = tables
            .shader_modules
            .get(&config.module)
            .ok_or_else(|| driver_creation_error(label, format!("{} is not alive", config.module)))?;

        let pipeline = self.scoped(label, |device| {
            device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                label: Some(label),
                layout: pipeline_layout,
                module,
                entry_point: &config.entry_point,
            })
        })?;

        let handle = PipelineHandle(tables.allocate());
        tables.compute_pipelines.insert(handle, pipeline);
        Ok(handle)
    }

    fn destroy_pipeline(&self, pipeline: PipelineHandle) {
        let mut tables = self.tables.lock();
        let removed = tables.render_pipelines.remove(&pipeline).is_some()
            || tables.compute_pipelines.remove(&pipeline).is_some();
        if !removed {
            log::error!("[WgpuDevice::destroy_pipeline] {} is not alive", pipeline);
        }
    }

    fn wait_for_idle(&self) -> GpuResult<()> {
        let _ = self.device.poll(wgpu::Maintain::Wait);
        Ok(())
    }
}
