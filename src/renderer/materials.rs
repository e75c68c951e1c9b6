//! Mesh material pipelines
//!
//! Opaque and transparent variants of the mesh shaders. Both use one pipeline layout
//! (scene data and material sets plus the draw push constants) that the registry
//! destroys exactly once.

use crate::gpu::{DescriptorSetLayoutHandle, GpuDevice};
use crate::pipeline::{
    GraphicsConfig, LayoutDesc, LayoutId, PipelineBuilder, PipelineId, PipelineLayoutResource,
    PipelineManager, RenderMode, TrackShader,
};
use crate::shader::ShaderSet;

use super::error::{RendererErrorContext, RendererResult};

pub const MESH_VERTEX_SHADER: &str = "mesh.vert";
pub const MESH_FRAGMENT_SHADER: &str = "mesh.frag";

/// Per-draw push constants: world matrix and vertex buffer address
#[repr(C)]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
pub struct DrawPushConstants {
    pub world_matrix: [[f32; 4]; 4],
    pub vertex_buffer: u64,
}

impl DrawPushConstants {
    pub const SIZE: u32 = std::mem::size_of::<DrawPushConstants>() as u32;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MaterialPass {
    MainColor,
    Transparent,
}

/// Attachment formats and sets the material pipelines are built against
#[derive(Debug, Clone)]
pub struct MaterialTargets {
    pub color_format: wgpu::TextureFormat,
    pub depth_format: wgpu::TextureFormat,
    pub render_mode: RenderMode,
    pub set_layouts: Vec<DescriptorSetLayoutHandle>,
}

#[derive(Debug, Clone)]
pub struct MaterialPipelines {
    pub opaque: PipelineId,
    pub transparent: PipelineId,
    pub layout: PipelineLayoutResource,
}

impl MaterialPipelines {
    pub fn build(
        device: &dyn GpuDevice,
        manager: &mut PipelineManager,
        shader_root: &std::path::Path,
        targets: &MaterialTargets,
        track: TrackShader,
    ) -> RendererResult<Self> {
        let desc = LayoutDesc {
            set_layouts: targets.set_layouts.clone(),
            ..LayoutDesc::with_push_constants(wgpu::ShaderStages::VERTEX, DrawPushConstants::SIZE)
        };
        let mut layout = PipelineLayoutResource::create_shared(device, "mesh materials", &desc)
            .renderer_context("material layout")?;

        let shaders = ShaderSet::graphics(
            shader_root.join(MESH_VERTEX_SHADER),
            shader_root.join(MESH_FRAGMENT_SHADER),
        );

        let mut builder = PipelineBuilder::new();
        builder
            .set_input_topology(wgpu::PrimitiveTopology::TriangleList)
            .set_polygon_mode(wgpu::PolygonMode::Fill)
            .set_cull_mode(None, wgpu::FrontFace::Cw)
            .set_multisampling_none()
            .disable_blending()
            .enable_depthtest(true, wgpu::CompareFunction::GreaterEqual)
            .set_color_attachment_format(targets.color_format)
            .set_depth_format(targets.depth_format)
            .set_render_mode(targets.render_mode)
            .set_layout(layout.handle, desc.clone());
        let opaque_config = builder.config().clone();

        builder
            .enable_blending_additive()
            .enable_depthtest(false, wgpu::CompareFunction::GreaterEqual);
        let transparent_config = builder.config().clone();

        let opaque = match Self::manage_variant(
            device,
            manager,
            "mesh opaque",
            shaders.clone(),
            opaque_config,
            track,
            &mut layout,
        ) {
            Ok(id) => id,
            Err(e) => {
                // Nothing registered the layout yet
                device.destroy_pipeline_layout(layout.handle);
                return Err(e);
            }
        };

        let transparent = Self::manage_variant(
            device,
            manager,
            "mesh transparent",
            shaders,
            transparent_config,
            track,
            &mut layout,
        )?;

        log::info!(
            "[MaterialPipelines::build] Material pipelines ready: opaque {}, transparent {}",
            opaque,
            transparent
        );
        Ok(Self {
            opaque,
            transparent,
            layout,
        })
    }

    fn manage_variant(
        device: &dyn GpuDevice,
        manager: &mut PipelineManager,
        name: &str,
        shaders: ShaderSet,
        config: GraphicsConfig,
        track: TrackShader,
        layout: &mut PipelineLayoutResource,
    ) -> RendererResult<PipelineId> {
        let resource = manager
            .build_graphics(device, name, shaders, config, PipelineLayoutResource::member_of(layout))
            .renderer_context(name)?;
        manager.manage(resource, track, Some(layout))
    }

    pub fn pipeline_for(&self, pass: MaterialPass) -> PipelineId {
        match pass {
            MaterialPass::MainColor => self.opaque,
            MaterialPass::Transparent => self.transparent,
        }
    }

    /// Registry id of the shared layout
    pub fn layout_id(&self) -> Option<LayoutId> {
        self.layout.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_constant_size() {
        assert_eq!(DrawPushConstants::SIZE, 72);
    }
}
