//! Driver boundary
//!
//! Everything the pipeline registry needs from a graphics driver goes through the
//! [`GpuDevice`] trait. Native objects are referred to by small `Copy` handles; the
//! device implementation owns the real objects behind them.
//!
//! Two implementations exist: [`HeadlessDevice`], an in-process driver that only does
//! handle accounting, and [`WgpuDevice`], which creates real wgpu objects.

pub mod deletion_queue;
pub mod error;
pub mod headless;
pub mod wgpu_device;

pub use deletion_queue::{shared_queue, DeletionQueue, Deletor, SharedDeletionQueue};
pub use error::{driver_creation_error, GpuResult};
pub use headless::{FailurePoint, HeadlessDevice};
pub use wgpu_device::{RenderPassFormats, WgpuDevice};

use crate::pipeline::config::{ComputeConfig, GraphicsConfig};
use crate::pipeline::layout::LayoutDesc;
use crate::shader::CompiledShader;

macro_rules! define_handle {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
        pub struct $name(pub u64);

        impl $name {
            /// Sentinel for "no object"
            pub const NULL: Self = Self(0);

            pub fn is_null(self) -> bool {
                self.0 == 0
            }

            pub fn raw(self) -> u64 {
                self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}({:#x})", stringify!($name), self.0)
            }
        }
    };
}

define_handle!(
    /// Native pipeline object (graphics or compute)
    PipelineHandle
);
define_handle!(
    /// Native pipeline layout object
    PipelineLayoutHandle
);
define_handle!(
    /// Native shader module, only alive while a pipeline is being built
    ShaderModuleHandle
);
define_handle!(
    /// Render pass a classic-mode pipeline is compatible with
    RenderPassHandle
);
define_handle!(
    /// Descriptor set (bind group) layout referenced by a pipeline layout
    DescriptorSetLayoutHandle
);

/// Capability to create and destroy pipeline objects
///
/// Methods take `&self`; implementations keep their tables behind interior mutability
/// so a device can be shared by the registry, the renderer and the deletion queue.
pub trait GpuDevice {
    /// Backend name for logs
    fn name(&self) -> &str;

    fn create_shader_module(&self, label: &str, shader: &CompiledShader) -> GpuResult<ShaderModuleHandle>;

    fn destroy_shader_module(&self, module: ShaderModuleHandle);

    fn create_pipeline_layout(&self, label: &str, desc: &LayoutDesc) -> GpuResult<PipelineLayoutHandle>;

    fn destroy_pipeline_layout(&self, layout: PipelineLayoutHandle);

    /// Build a graphics pipeline from `config`, whose stage list must already hold
    /// live shader modules
    fn create_graphics_pipeline(
        &self,
        label: &str,
        layout: PipelineLayoutHandle,
        config: &GraphicsConfig,
    ) -> GpuResult<PipelineHandle>;

    fn create_compute_pipeline(
        &self,
        label: &str,
        layout: PipelineLayoutHandle,
        config: &ComputeConfig,
    ) -> GpuResult<PipelineHandle>;

    fn destroy_pipeline(&self, pipeline: PipelineHandle);

    /// Block until the device has finished all submitted work
    fn wait_for_idle(&self) -> GpuResult<()>;
}

impl<T: GpuDevice + ?Sized> GpuDevice for &T {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn create_shader_module(&self, label: &str, shader: &CompiledShader) -> GpuResult<ShaderModuleHandle> {
        (**self).create_shader_module(label, shader)
    }

    fn destroy_shader_module(&self, module: ShaderModuleHandle) {
        (**self).destroy_shader_module(module)
    }

    fn create_pipeline_layout(&self, label: &str, desc: &LayoutDesc) -> GpuResult<PipelineLayoutHandle> {
        (**self).create_pipeline_layout(label, desc)
    }

    fn destroy_pipeline_layout(&self, layout: PipelineLayoutHandle) {
        (**self).destroy_pipeline_layout(layout)
    }

    fn create_graphics_pipeline(
        &self,
        label: &str,
        layout: PipelineLayoutHandle,
        config: &GraphicsConfig,
    ) -> GpuResult<PipelineHandle> {
        (**self).create_graphics_pipeline(label, layout, config)
    }

    fn create_compute_pipeline(
        &self,
        label: &str,
        layout: PipelineLayoutHandle,
        config: &ComputeConfig,
    ) -> GpuResult<PipelineHandle> {
        (**self).create_compute_pipeline(label, layout, config)
    }

    fn destroy_pipeline(&self, pipeline: PipelineHandle) {
        (**self).destroy_pipeline(pipeline)
    }

    fn wait_for_idle(&self) -> GpuResult<()> {
        (**self).wait_for_idle()
    }
}

/// Proof that the device had no work in flight when it was obtained
///
/// Only [`wait_idle`] can construct one. Operations that destroy objects immediately
/// take it by reference, so the precondition is visible at every call site.
#[derive(Debug)]
pub struct DeviceIdle {
    _private: (),
}

/// Wait for the device to go idle and hand out the proof token
pub fn wait_idle(device: &dyn GpuDevice) -> GpuResult<DeviceIdle> {
    device.wait_for_idle()?;
    log::trace!("[gpu::wait_idle] {} is idle", device.name());
    Ok(DeviceIdle { _private: () })
}
