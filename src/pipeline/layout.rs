//! Pipeline layouts and who is responsible for destroying them

use crate::gpu::{DescriptorSetLayoutHandle, GpuDevice, GpuResult, PipelineLayoutHandle};

use super::LayoutId;

/// Everything needed to create a pipeline layout from scratch
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LayoutDesc {
    pub set_layouts: Vec<DescriptorSetLayoutHandle>,
    pub push_constant_ranges: Vec<wgpu::PushConstantRange>,
}

impl LayoutDesc {
    pub fn with_push_constants(stages: wgpu::ShaderStages, size: u32) -> Self {
        Self {
            set_layouts: Vec::new(),
            push_constant_ranges: vec![wgpu::PushConstantRange {
                stages,
                range: 0..size,
            }],
        }
    }
}

/// Whether the registry must destroy a layout
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayoutOwnership {
    /// No layout assigned yet
    Uninitialized,
    /// The registry queues the layout for destruction
    Owned,
    /// Somebody else destroys it
    NotOwned,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayoutSharing {
    Private,
    Shared,
}

/// A pipeline layout handle plus its registry bookkeeping
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineLayoutResource {
    pub handle: PipelineLayoutHandle,
    pub id: Option<LayoutId>,
    pub ownership: LayoutOwnership,
    pub sharing: LayoutSharing,
}

impl Default for PipelineLayoutResource {
    fn default() -> Self {
        Self::uninitialized()
    }
}

impl PipelineLayoutResource {
    pub fn uninitialized() -> Self {
        Self {
            handle: PipelineLayoutHandle::NULL,
            id: None,
            ownership: LayoutOwnership::Uninitialized,
            sharing: LayoutSharing::Private,
        }
    }

    /// Private layout the registry destroys
    pub fn owned(handle: PipelineLayoutHandle) -> Self {
        Self {
            handle,
            id: None,
            ownership: LayoutOwnership::Owned,
            sharing: LayoutSharing::Private,
        }
    }

    /// Layout whose lifetime is managed elsewhere
    pub fn not_owned(handle: PipelineLayoutHandle) -> Self {
        Self {
            handle,
            id: None,
            ownership: LayoutOwnership::NotOwned,
            sharing: LayoutSharing::Private,
        }
    }

    /// Token for a layout several pipelines use; the registry destroys it once
    pub fn shared(handle: PipelineLayoutHandle) -> Self {
        Self {
            handle,
            id: None,
            ownership: LayoutOwnership::Owned,
            sharing: LayoutSharing::Shared,
        }
    }

    /// Create a private layout on `device`
    pub fn create_owned(device: &dyn GpuDevice, label: &str, desc: &LayoutDesc) -> GpuResult<Self> {
        Ok(Self::owned(device.create_pipeline_layout(label, desc)?))
    }

    /// Create a shared layout token on `device`
    pub fn create_shared(device: &dyn GpuDevice, label: &str, desc: &LayoutDesc) -> GpuResult<Self> {
        Ok(Self::shared(device.create_pipeline_layout(label, desc)?))
    }

    /// View of a shared token as seen by one of its member pipelines
    pub fn member_of(token: &PipelineLayoutResource) -> Self {
        Self {
            handle: token.handle,
            id: token.id,
            ownership: LayoutOwnership::NotOwned,
            sharing: LayoutSharing::Shared,
        }
    }

    pub fn is_shared(&self) -> bool {
        self.sharing == LayoutSharing::Shared
    }
}
