//! Background compute effects
//!
//! Full-screen compute shaders that fill the draw image before geometry is drawn.
//! Every effect shares one layout: the draw image set and four vec4 push constants.

use crate::gpu::{DescriptorSetLayoutHandle, GpuDevice};
use crate::pipeline::{
    ComputeConfig, LayoutDesc, PipelineId, PipelineLayoutResource, PipelineManager, TrackShader,
};
use crate::shader::ShaderSet;

use super::error::{RendererErrorContext, RendererResult};

pub const GRADIENT_SHADER: &str = "gradient_color.comp";
pub const SKY_SHADER: &str = "sky.comp";

/// Push constants consumed by every background shader
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct ComputePushConstants {
    pub data1: [f32; 4],
    pub data2: [f32; 4],
    pub data3: [f32; 4],
    pub data4: [f32; 4],
}

impl ComputePushConstants {
    pub const SIZE: u32 = std::mem::size_of::<ComputePushConstants>() as u32;

    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::bytes_of(self)
    }
}

#[derive(Debug, Clone)]
pub struct ComputeEffect {
    pub name: String,
    pub pipeline: PipelineId,
    pub data: ComputePushConstants,
}

#[derive(Debug, Clone)]
pub struct BackgroundEffects {
    effects: Vec<ComputeEffect>,
    current: usize,
    layout: PipelineLayoutResource,
}

impl BackgroundEffects {
    pub fn build(
        device: &dyn GpuDevice,
        manager: &mut PipelineManager,
        shader_root: &std::path::Path,
        set_layouts: &[DescriptorSetLayoutHandle],
        track: TrackShader,
    ) -> RendererResult<Self> {
        let desc = LayoutDesc {
            set_layouts: set_layouts.to_vec(),
            ..LayoutDesc::with_push_constants(wgpu::ShaderStages::COMPUTE, ComputePushConstants::SIZE)
        };
        let mut layout = PipelineLayoutResource::create_shared(device, "background", &desc)
            .renderer_context("background layout")?;

        let presets = [
            (
                "gradient",
                GRADIENT_SHADER,
                ComputePushConstants {
                    data1: [1.0, 0.0, 0.0, 1.0],
                    data2: [0.0, 0.0, 1.0, 1.0],
                    ..ComputePushConstants::default()
                },
            ),
            (
                "sky",
                SKY_SHADER,
                ComputePushConstants {
                    data1: [0.1, 0.2, 0.4, 0.97],
                    ..ComputePushConstants::default()
                },
            ),
        ];

        let mut effects = Vec::with_capacity(presets.len());
        for (name, file, data) in presets {
            let resource = manager.build_compute(
                device,
                name,
                ShaderSet::compute(shader_root.join(file)),
                ComputeConfig::new(desc.clone()),
                PipelineLayoutResource::member_of(&layout),
            );
            let pipeline = match resource {
                Ok(resource) => manager.manage(resource, track, Some(&mut layout))?,
                Err(e) => {
                    if layout.id.is_none() {
                        device.destroy_pipeline_layout(layout.handle);
                    }
                    return Err(e).renderer_context("background effects");
                }
            };
            effects.push(ComputeEffect {
                name: name.to_string(),
                pipeline,
                data,
            });
        }

        log::info!("[BackgroundEffects::build] {} background effects ready", effects.len());
        Ok(Self {
            effects,
            current: 0,
            layout,
        })
    }

    pub fn effects(&self) -> &[ComputeEffect] {
        &self.effects
    }

    pub fn current(&self) -> &ComputeEffect {
        &self.effects[self.current]
    }

    pub fn current_index(&self) -> usize {
        self.current
    }

    /// Select an effect; the index is clamped to the last one
    pub fn select(&mut self, index: usize) {
        self.current = index.min(self.effects.len().saturating_sub(1));
    }

    pub fn select_by_name(&mut self, name: &str) -> bool {
        match self.effects.iter().position(|effect| effect.name == name) {
            Some(index) => {
                self.current = index;
                true
            }
            None => false,
        }
    }

    pub fn current_mut(&mut self) -> &mut ComputeEffect {
        &mut self.effects[self.current]
    }

    pub fn layout(&self) -> &PipelineLayoutResource {
        &self.layout
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_constants_are_four_vec4() {
        assert_eq!(ComputePushConstants::SIZE, 64);
        let data = ComputePushConstants {
            data1: [1.0, 0.0, 0.0, 1.0],
            ..ComputePushConstants::default()
        };
        assert_eq!(data.as_bytes().len(), 64);
        assert_eq!(&data.as_bytes()[0..4], &1.0f32.to_le_bytes());
    }
}
