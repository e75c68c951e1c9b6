//! Graphics pipeline builder and the stage helpers shared by first builds and rebuilds

use std::collections::BTreeSet;
use std::path::PathBuf;

use crate::gpu::{GpuDevice, GpuResult, PipelineHandle, PipelineLayoutHandle, ShaderModuleHandle};
use crate::shader::{ShaderCompiler, ShaderSet, ShaderStage};

use super::config::{
    ColorBlendAttachment, ComputeConfig, DepthStencilState, DynamicState, GraphicsConfig,
    MultisampleState, RenderMode, ShaderStageBinding,
};
use super::layout::LayoutDesc;

/// Accumulates graphics state, then creates the pipeline
///
/// The builder can be reused: after `build_pipeline` the state is kept, so a second
/// variant only needs the settings that differ.
#[derive(Debug, Clone, Default)]
pub struct PipelineBuilder {
    config: GraphicsConfig,
    layout: PipelineLayoutHandle,
}

impl PipelineBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from a stored configuration
    pub fn from_config(config: GraphicsConfig) -> Self {
        Self {
            config,
            layout: PipelineLayoutHandle::NULL,
        }
    }

    pub fn config(&self) -> &GraphicsConfig {
        &self.config
    }

    /// Reset all fixed-function and stage state
    pub fn clear(&mut self) {
        self.config.clear();
        self.layout = PipelineLayoutHandle::NULL;
    }

    pub fn set_shaders(&mut self, vertex: ShaderModuleHandle, fragment: ShaderModuleHandle) -> &mut Self {
        self.config.stages = vec![
            ShaderStageBinding::new(ShaderStage::Vertex, vertex),
            ShaderStageBinding::new(ShaderStage::Fragment, fragment),
        ];
        self
    }

    pub fn set_stages(&mut self, stages: Vec<ShaderStageBinding>) -> &mut Self {
        self.config.stages = stages;
        self
    }

    pub fn set_input_topology(&mut self, topology: wgpu::PrimitiveTopology) -> &mut Self {
        self.config.input_assembly.topology = topology;
        self.config.input_assembly.primitive_restart_enable = false;
        self
    }

    pub fn set_polygon_mode(&mut self, mode: wgpu::PolygonMode) -> &mut Self {
        self.config.rasterization.polygon_mode = mode;
        self.config.rasterization.line_width = 1.0;
        self
    }

    pub fn set_cull_mode(&mut self, cull_mode: Option<wgpu::Face>, front_face: wgpu::FrontFace) -> &mut Self {
        self.config.rasterization.cull_mode = cull_mode;
        self.config.rasterization.front_face = front_face;
        self
    }

    pub fn set_multisampling_none(&mut self) -> &mut Self {
        self.config.multisample = MultisampleState::default();
        self
    }

    pub fn disable_blending(&mut self) -> &mut Self {
        self.config.color_blend.write_mask = wgpu::ColorWrites::ALL;
        self.config.color_blend.blend_enable = false;
        self
    }

    /// `src * src_alpha + dst`
    pub fn enable_blending_additive(&mut self) -> &mut Self {
        self.config.color_blend = ColorBlendAttachment {
            blend_enable: true,
            src_color_factor: wgpu::BlendFactor::SrcAlpha,
            dst_color_factor: wgpu::BlendFactor::One,
            color_op: wgpu::BlendOperation::Add,
            src_alpha_factor: wgpu::BlendFactor::One,
            dst_alpha_factor: wgpu::BlendFactor::Zero,
            alpha_op: wgpu::BlendOperation::Add,
            write_mask: wgpu::ColorWrites::ALL,
        };
        self
    }

    /// `src * src_alpha + dst * (1 - src_alpha)`
    pub fn enable_blending_alphablend(&mut self) -> &mut Self {
        self.config.color_blend = ColorBlendAttachment {
            blend_enable: true,
            src_color_factor: wgpu::BlendFactor::SrcAlpha,
            dst_color_factor: wgpu::BlendFactor::OneMinusSrcAlpha,
            color_op: wgpu::BlendOperation::Add,
            src_alpha_factor: wgpu::BlendFactor::One,
            dst_alpha_factor: wgpu::BlendFactor::Zero,
            alpha_op: wgpu::BlendOperation::Add,
            write_mask: wgpu::ColorWrites::ALL,
        };
        self
    }

    pub fn set_color_attachment_format(&mut self, format: wgpu::TextureFormat) -> &mut Self {
        self.config.rendering.color_formats = vec![format];
        self
    }

    pub fn set_depth_format(&mut self, format: wgpu::TextureFormat) -> &mut Self {
        self.config.rendering.depth_format = Some(format);
        self
    }

    pub fn disable_depthtest(&mut self) -> &mut Self {
        self.config.depth_stencil = DepthStencilState::default();
        self
    }

    pub fn enable_depthtest(&mut self, depth_write_enable: bool, op: wgpu::CompareFunction) -> &mut Self {
        self.config.depth_stencil = DepthStencilState {
            depth_test_enable: true,
            depth_write_enable,
            depth_compare: op,
            ..DepthStencilState::default()
        };
        self
    }

    pub fn set_render_mode(&mut self, mode: RenderMode) -> &mut Self {
        self.config.render_mode = mode;
        self
    }

    /// Layout to build against, and the description needed to recreate it
    pub fn set_layout(&mut self, layout: PipelineLayoutHandle, desc: LayoutDesc) -> &mut Self {
        self.layout = layout;
        self.config.layout = desc;
        self
    }

    /// Create the pipeline; `store` receives the configuration for later rebuilds
    pub fn build_pipeline(
        &mut self,
        device: &dyn GpuDevice,
        label: &str,
        mode: RenderMode,
        store: Option<&mut GraphicsConfig>,
    ) -> GpuResult<PipelineHandle> {
        self.config.render_mode = mode;
        self.config.viewport_count = 1;
        self.config.scissor_count = 1;
        self.config.dynamic_states = vec![DynamicState::Viewport, DynamicState::Scissor];

        if mode == RenderMode::Dynamic
            && self.config.rendering.color_formats.is_empty()
            && self.config.rendering.depth_format.is_none()
        {
            log::warn!(
                "[PipelineBuilder::build_pipeline] '{}' uses dynamic rendering without attachment formats",
                label
            );
        }

        let pipeline = device.create_graphics_pipeline(label, self.layout, &self.config)?;

        if let Some(store) = store {
            *store = self.config.clone();
            store.stages.clear();
        }

        log::debug!("[PipelineBuilder::build_pipeline] Built '{}' as {}", label, pipeline);
        Ok(pipeline)
    }
}

/// Modules for one build plus every file the stage sources included
#[derive(Debug, Default)]
pub struct CompiledStages {
    pub stages: Vec<ShaderStageBinding>,
    pub includes: BTreeSet<PathBuf>,
}

/// Compile every non-empty stage of `shaders` and create its module
///
/// The first failure aborts; modules created before it are destroyed.
pub fn compile_stages(
    device: &dyn GpuDevice,
    compiler: &mut ShaderCompiler,
    label: &str,
    shaders: &ShaderSet,
) -> GpuResult<CompiledStages> {
    let mut compiled = CompiledStages {
        stages: Vec::with_capacity(2),
        includes: BTreeSet::new(),
    };

    for slot in shaders.active() {
        let module = compiler.compile(&slot.path, slot.stage).and_then(|shader| {
            let module = device.create_shader_module(&format!("{} ({})", label, slot.stage), &shader)?;
            compiled.includes.extend(shader.includes);
            Ok(module)
        });

        match module {
            Ok(module) => compiled.stages.push(ShaderStageBinding::new(slot.stage, module)),
            Err(e) => {
                destroy_stages(device, &compiled.stages);
                return Err(e);
            }
        }
    }

    Ok(compiled)
}

/// Destroy the transient modules of a build
pub fn destroy_stages(device: &dyn GpuDevice, stages: &[ShaderStageBinding]) {
    for binding in stages {
        device.destroy_shader_module(binding.module);
    }
}

/// Create a compute pipeline from `config` with `module` as its single stage
pub fn build_compute_pipeline(
    device: &dyn GpuDevice,
    label: &str,
    layout: PipelineLayoutHandle,
    config: &ComputeConfig,
    module: ShaderModuleHandle,
) -> GpuResult<PipelineHandle> {
    let config = ComputeConfig {
        module,
        ..config.clone()
    };
    let pipeline = device.create_compute_pipeline(label, layout, &config)?;
    log::debug!("[build_compute_pipeline] Built '{}' as {}", label, pipeline);
    Ok(pipeline)
}
