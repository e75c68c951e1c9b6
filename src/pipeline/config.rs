//! Pipeline configuration
//!
//! A [`PipelineConfig`] holds everything needed to build a native pipeline again from
//! scratch. Rebuilds reuse it unchanged; only the shader-stage list is refilled with
//! freshly compiled modules each time.

use crate::gpu::{RenderPassHandle, ShaderModuleHandle};
use crate::shader::compiler::ENTRY_POINT;
use crate::shader::ShaderStage;

use super::layout::LayoutDesc;
use super::PipelineKind;

/// A compiled module bound to one pipeline stage
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShaderStageBinding {
    pub stage: ShaderStage,
    pub module: ShaderModuleHandle,
    pub entry_point: String,
}

impl ShaderStageBinding {
    pub fn new(stage: ShaderStage, module: ShaderModuleHandle) -> Self {
        Self {
            stage,
            module,
            entry_point: ENTRY_POINT.to_string(),
        }
    }
}

/// One vertex buffer binding
#[derive(Debug, Clone, PartialEq)]
pub struct VertexBufferLayout {
    pub array_stride: u64,
    pub step_mode: wgpu::VertexStepMode,
    pub attributes: Vec<wgpu::VertexAttribute>,
}

/// Vertex buffers consumed by the vertex stage; empty for vertex pulling
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VertexInputState {
    pub buffers: Vec<VertexBufferLayout>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InputAssemblyState {
    pub topology: wgpu::PrimitiveTopology,
    pub primitive_restart_enable: bool,
}

impl Default for InputAssemblyState {
    fn default() -> Self {
        Self {
            topology: wgpu::PrimitiveTopology::TriangleList,
            primitive_restart_enable: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RasterizationState {
    pub polygon_mode: wgpu::PolygonMode,
    pub cull_mode: Option<wgpu::Face>,
    pub front_face: wgpu::FrontFace,
    pub line_width: f32,
    pub depth_clamp_enable: bool,
    pub depth_bias_enable: bool,
    pub depth_bias_constant: i32,
    pub depth_bias_slope: f32,
    pub depth_bias_clamp: f32,
}

impl Default for RasterizationState {
    fn default() -> Self {
        Self {
            polygon_mode: wgpu::PolygonMode::Fill,
            cull_mode: None,
            front_face: wgpu::FrontFace::Ccw,
            line_width: 1.0,
            depth_clamp_enable: false,
            depth_bias_enable: false,
            depth_bias_constant: 0,
            depth_bias_slope: 0.0,
            depth_bias_clamp: 0.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MultisampleState {
    pub sample_count: u32,
    pub sample_shading_enable: bool,
    pub min_sample_shading: f32,
    pub sample_mask: u64,
    pub alpha_to_coverage_enable: bool,
    pub alpha_to_one_enable: bool,
}

impl Default for MultisampleState {
    fn default() -> Self {
        Self {
            sample_count: 1,
            sample_shading_enable: false,
            min_sample_shading: 1.0,
            sample_mask: !0,
            alpha_to_coverage_enable: false,
            alpha_to_one_enable: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DepthStencilState {
    pub depth_test_enable: bool,
    pub depth_write_enable: bool,
    pub depth_compare: wgpu::CompareFunction,
    pub depth_bounds_test_enable: bool,
    pub stencil_test_enable: bool,
    pub min_depth_bounds: f32,
    pub max_depth_bounds: f32,
}

impl Default for DepthStencilState {
    fn default() -> Self {
        Self {
            depth_test_enable: false,
            depth_write_enable: false,
            depth_compare: wgpu::CompareFunction::Never,
            depth_bounds_test_enable: false,
            stencil_test_enable: false,
            min_depth_bounds: 0.0,
            max_depth_bounds: 1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColorBlendAttachment {
    pub blend_enable: bool,
    pub src_color_factor: wgpu::BlendFactor,
    pub dst_color_factor: wgpu::BlendFactor,
    pub color_op: wgpu::BlendOperation,
    pub src_alpha_factor: wgpu::BlendFactor,
    pub dst_alpha_factor: wgpu::BlendFactor,
    pub alpha_op: wgpu::BlendOperation,
    pub write_mask: wgpu::ColorWrites,
}

impl Default for ColorBlendAttachment {
    fn default() -> Self {
        Self {
            blend_enable: false,
            src_color_factor: wgpu::BlendFactor::Zero,
            dst_color_factor: wgpu::BlendFactor::Zero,
            color_op: wgpu::BlendOperation::Add,
            src_alpha_factor: wgpu::BlendFactor::Zero,
            dst_alpha_factor: wgpu::BlendFactor::Zero,
            alpha_op: wgpu::BlendOperation::Add,
            write_mask: wgpu::ColorWrites::ALL,
        }
    }
}

impl ColorBlendAttachment {
    /// `None` when blending is off
    pub fn to_wgpu(&self) -> Option<wgpu::BlendState> {
        self.blend_enable.then(|| wgpu::BlendState {
            color: wgpu::BlendComponent {
                src_factor: self.src_color_factor,
                dst_factor: self.dst_color_factor,
                operation: self.color_op,
            },
            alpha: wgpu::BlendComponent {
                src_factor: self.src_alpha_factor,
                dst_factor: self.dst_alpha_factor,
                operation: self.alpha_op,
            },
        })
    }
}

/// Attachment formats for dynamic rendering
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RenderingInfo {
    pub color_formats: Vec<wgpu::TextureFormat>,
    pub depth_format: Option<wgpu::TextureFormat>,
}

/// How a graphics pipeline learns its attachment formats
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RenderMode {
    /// Formats come from [`RenderingInfo`]
    #[default]
    Dynamic,
    /// Formats come from a render pass created elsewhere
    Classic(RenderPassHandle),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DynamicState {
    Viewport,
    Scissor,
    LineWidth,
    DepthBias,
    BlendConstants,
    StencilReference,
}

/// Complete fixed-function and stage description of a graphics pipeline
#[derive(Debug, Clone, PartialEq)]
pub struct GraphicsConfig {
    pub vertex_input: VertexInputState,
    pub input_assembly: InputAssemblyState,
    pub rasterization: RasterizationState,
    pub multisample: MultisampleState,
    pub depth_stencil: DepthStencilState,
    pub color_blend: ColorBlendAttachment,
    pub rendering: RenderingInfo,
    pub render_mode: RenderMode,
    pub dynamic_states: Vec<DynamicState>,
    pub viewport_count: u32,
    pub scissor_count: u32,
    /// Filled with fresh modules right before each build, empty otherwise
    pub stages: Vec<ShaderStageBinding>,
    pub layout: LayoutDesc,
}

impl Default for GraphicsConfig {
    fn default() -> Self {
        Self {
            vertex_input: VertexInputState::default(),
            input_assembly: InputAssemblyState::default(),
            rasterization: RasterizationState::default(),
            multisample: MultisampleState::default(),
            depth_stencil: DepthStencilState::default(),
            color_blend: ColorBlendAttachment::default(),
            rendering: RenderingInfo::default(),
            render_mode: RenderMode::Dynamic,
            dynamic_states: vec![DynamicState::Viewport, DynamicState::Scissor],
            viewport_count: 1,
            scissor_count: 1,
            stages: Vec::new(),
            layout: LayoutDesc::default(),
        }
    }
}

impl GraphicsConfig {
    /// Reset every field to its default
    pub fn clear(&mut self) {
        *self = Self::default();
    }

    pub fn stage(&self, stage: ShaderStage) -> Option<&ShaderStageBinding> {
        self.stages.iter().find(|binding| binding.stage == stage)
    }
}

/// Description of a compute pipeline
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComputeConfig {
    pub entry_point: String,
    /// Filled with a fresh module right before each build
    pub module: ShaderModuleHandle,
    pub layout: LayoutDesc,
}

impl Default for ComputeConfig {
    fn default() -> Self {
        Self {
            entry_point: ENTRY_POINT.to_string(),
            module: ShaderModuleHandle::NULL,
            layout: LayoutDesc::default(),
        }
    }
}

impl ComputeConfig {
    pub fn new(layout: LayoutDesc) -> Self {
        Self {
            layout,
            ..Self::default()
        }
    }
}

/// Per-kind pipeline configuration
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineConfig {
    Graphics(Box<GraphicsConfig>),
    Compute(ComputeConfig),
}

impl PipelineConfig {
    pub fn kind(&self) -> PipelineKind {
        match self {
            PipelineConfig::Graphics(_) => PipelineKind::Graphics,
            PipelineConfig::Compute(_) => PipelineKind::Compute,
        }
    }

    pub fn graphics(&self) -> Option<&GraphicsConfig> {
        match self {
            PipelineConfig::Graphics(config) => Some(&**config),
            PipelineConfig::Compute(_) => None,
        }
    }

    pub fn graphics_mut(&mut self) -> Option<&mut GraphicsConfig> {
        match self {
            PipelineConfig::Graphics(config) => Some(&mut **config),
            PipelineConfig::Compute(_) => None,
        }
    }

    pub fn compute(&self) -> Option<&ComputeConfig> {
        match self {
            PipelineConfig::Compute(config) => Some(config),
            PipelineConfig::Graphics(_) => None,
        }
    }

    pub fn compute_mut(&mut self) -> Option<&mut ComputeConfig> {
        match self {
            PipelineConfig::Compute(config) => Some(config),
            PipelineConfig::Graphics(_) => None,
        }
    }

    pub fn layout_desc(&self) -> &LayoutDesc {
        match self {
            PipelineConfig::Graphics(config) => &config.layout,
            PipelineConfig::Compute(config) => &config.layout,
        }
    }
}

impl From<GraphicsConfig> for PipelineConfig {
    fn from(config: GraphicsConfig) -> Self {
        PipelineConfig::Graphics(Box::new(config))
    }
}

impl From<ComputeConfig> for PipelineConfig {
    fn from(config: ComputeConfig) -> Self {
        PipelineConfig::Compute(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_graphics_defaults() {
        let config = GraphicsConfig::default();
        assert_eq!(config.rasterization.line_width, 1.0);
        assert_eq!(config.multisample.sample_count, 1);
        assert_eq!(config.depth_stencil.max_depth_bounds, 1.0);
        assert_eq!(config.color_blend.write_mask, wgpu::ColorWrites::ALL);
        assert_eq!(config.dynamic_states, vec![DynamicState::Viewport, DynamicState::Scissor]);
        assert_eq!((config.viewport_count, config.scissor_count), (1, 1));
        assert_eq!(config.render_mode, RenderMode::Dynamic);
    }

    #[test]
    fn test_clear_restores_defaults() {
        let mut config = GraphicsConfig::default();
        config.rasterization.cull_mode = Some(wgpu::Face::Back);
        config.render_mode = RenderMode::Classic(RenderPassHandle(4));
        config.stages.push(ShaderStageBinding::new(ShaderStage::Vertex, ShaderModuleHandle(1)));

        config.clear();
        assert_eq!(config, GraphicsConfig::default());
    }

    #[test]
    fn test_tag_accessors() {
        let mut graphics = PipelineConfig::from(GraphicsConfig::default());
        assert_eq!(graphics.kind(), PipelineKind::Graphics);
        assert!(graphics.graphics().is_some());
        assert!(graphics.compute().is_none());
        assert!(graphics.compute_mut().is_none());

        let compute = PipelineConfig::from(ComputeConfig::default());
        assert_eq!(compute.kind(), PipelineKind::Compute);
        assert!(compute.graphics().is_none());
        assert_eq!(compute.compute().map(|c| c.entry_point.as_str()), Some("main"));
    }

    #[test]
    fn test_blend_state_only_when_enabled() {
        let mut attachment = ColorBlendAttachment::default();
        assert!(attachment.to_wgpu().is_none());
        attachment.blend_enable = true;
        attachment.src_color_factor = wgpu::BlendFactor::SrcAlpha;
        let state = attachment.to_wgpu().expect("blend state");
        assert_eq!(state.color.src_factor, wgpu::BlendFactor::SrcAlpha);
    }
}
