//! Deferred destruction of driver objects
//!
//! Pipelines and layouts created during initialisation are pushed here and destroyed
//! together at shutdown. When a pipeline is rebuilt its pending entry is re-pointed to
//! the new handle, so the queue never holds a handle that was already destroyed.

use std::cell::RefCell;
use std::rc::Rc;

use super::{DeviceIdle, GpuDevice, PipelineHandle, PipelineLayoutHandle};

/// Arbitrary cleanup run on flush
pub type Deletor = Box<dyn FnOnce(&dyn GpuDevice)>;

/// Queue shared between the registry and the renderer on the main thread
pub type SharedDeletionQueue = Rc<RefCell<DeletionQueue>>;

/// Create an empty shared queue
pub fn shared_queue() -> SharedDeletionQueue {
    Rc::new(RefCell::new(DeletionQueue::default()))
}

#[derive(Default)]
pub struct DeletionQueue {
    pipelines: Vec<PipelineHandle>,
    pipeline_layouts: Vec<PipelineLayoutHandle>,
    deletors: Vec<Deletor>,
}

impl DeletionQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_pipeline(&mut self, pipeline: PipelineHandle) {
        if pipeline.is_null() {
            log::warn!("[DeletionQueue::push_pipeline] Ignoring null pipeline handle");
            return;
        }
        self.pipelines.push(pipeline);
    }

    pub fn push_pipeline_layout(&mut self, layout: PipelineLayoutHandle) {
        if layout.is_null() {
            log::warn!("[DeletionQueue::push_pipeline_layout] Ignoring null layout handle");
            return;
        }
        self.pipeline_layouts.push(layout);
    }

    /// Re-point the pending entry for `old` to `new`
    ///
    /// Returns false when `old` was not queued; `new` is then queued on its own.
    pub fn replace_pipeline(&mut self, old: PipelineHandle, new: PipelineHandle) -> bool {
        match self.pipelines.iter_mut().find(|pending| **pending == old) {
            Some(pending) => {
                *pending = new;
                true
            }
            None => {
                log::warn!(
                    "[DeletionQueue::replace_pipeline] {} was not queued, queueing {} instead",
                    old,
                    new
                );
                self.push_pipeline(new);
                false
            }
        }
    }

    pub fn push_deletor(&mut self, deletor: impl FnOnce(&dyn GpuDevice) + 'static) {
        self.deletors.push(Box::new(deletor));
    }

    pub fn contains_pipeline(&self, pipeline: PipelineHandle) -> bool {
        self.pipelines.contains(&pipeline)
    }

    pub fn contains_pipeline_layout(&self, layout: PipelineLayoutHandle) -> bool {
        self.pipeline_layouts.contains(&layout)
    }

    pub fn pending_pipelines(&self) -> &[PipelineHandle] {
        &self.pipelines
    }

    pub fn pending_pipeline_layouts(&self) -> &[PipelineLayoutHandle] {
        &self.pipeline_layouts
    }

    pub fn len(&self) -> usize {
        self.pipelines.len() + self.pipeline_layouts.len() + self.deletors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Destroy everything queued: pipelines, then layouts, then deletors newest first
    pub fn flush(&mut self, device: &dyn GpuDevice, _idle: &DeviceIdle) {
        let pipelines = std::mem::take(&mut self.pipelines);
        let layouts = std::mem::take(&mut self.pipeline_layouts);
        let deletors = std::mem::take(&mut self.deletors);

        log::info!(
            "[DeletionQueue::flush] Destroying {} pipelines, {} layouts, {} other objects",
            pipelines.len(),
            layouts.len(),
            deletors.len()
        );

        for pipeline in pipelines {
            device.destroy_pipeline(pipeline);
        }
        for layout in layouts {
            device.destroy_pipeline_layout(layout);
        }
        for deletor in deletors.into_iter().rev() {
            deletor(device);
        }
    }
}

impl std::fmt::Debug for DeletionQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeletionQueue")
            .field("pipelines", &self.pipelines)
            .field("pipeline_layouts", &self.pipeline_layouts)
            .field("deletors", &self.deletors.len())
            .finish()
    }
}
