//! In-process driver without a GPU
//!
//! Allocates handles and keeps track of which objects are alive, so the registry's
//! create/destroy discipline can be checked exactly. Creation failures and device loss
//! can be injected.

use parking_lot::Mutex;
use rustc_hash::{FxHashMap, FxHashSet};

use super::error::{device_lost_error, driver_creation_error};
use super::{
    DescriptorSetLayoutHandle, GpuDevice, GpuResult, PipelineHandle, PipelineLayoutHandle,
    RenderPassHandle, ShaderModuleHandle,
};
use crate::pipeline::config::{ComputeConfig, GraphicsConfig, RenderMode};
use crate::pipeline::layout::LayoutDesc;
use crate::pipeline::PipelineKind;
use crate::shader::{CompiledShader, ShaderStage};

/// Create call that an injected failure applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailurePoint {
    ShaderModule,
    PipelineLayout,
    GraphicsPipeline,
    ComputePipeline,
}

#[derive(Debug, Clone)]
struct HeadlessPipeline {
    label: String,
    kind: PipelineKind,
    layout: PipelineLayoutHandle,
}

#[derive(Debug, Default)]
struct HeadlessState {
    next_handle: u64,
    shader_modules: FxHashMap<u64, ShaderStage>,
    pipeline_layouts: FxHashMap<u64, String>,
    pipelines: FxHashMap<u64, HeadlessPipeline>,
    set_layouts: FxHashSet<u64>,
    render_passes: FxHashSet<u64>,
    destroyed_pipelines: Vec<PipelineHandle>,
    invalid_destroys: usize,
    pending_failures: Vec<FailurePoint>,
    idle_waits: usize,
    lost: bool,
}

impl HeadlessState {
    fn allocate(&mut self) -> u64 {
        self.next_handle += 1;
        self.next_handle
    }

    fn take_failure(&mut self, point: FailurePoint) -> bool {
        match self.pending_failures.iter().position(|p| *p == point) {
            Some(index) => {
                self.pending_failures.remove(index);
                true
            }
            None => false,
        }
    }
}

/// Driver that only does bookkeeping
#[derive(Debug, Default)]
pub struct HeadlessDevice {
    state: Mutex<HeadlessState>,
}

impl HeadlessDevice {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next create call at `point` fail with a driver error
    pub fn fail_next(&self, point: FailurePoint) {
        self.state.lock().pending_failures.push(point);
    }

    /// Every following operation reports a fatal device loss
    pub fn mark_lost(&self) {
        log::error!("[HeadlessDevice::mark_lost] Device marked as lost");
        self.state.lock().lost = true;
    }

    pub fn register_descriptor_set_layout(&self) -> DescriptorSetLayoutHandle {
        let mut state = self.state.lock();
        let raw = state.allocate();
        state.set_layouts.insert(raw);
        DescriptorSetLayoutHandle(raw)
    }

    pub fn register_render_pass(&self) -> RenderPassHandle {
        let mut state = self.state.lock();
        let raw = state.allocate();
        state.render_passes.insert(raw);
        RenderPassHandle(raw)
    }

    pub fn live_pipelines(&self) -> usize {
        self.state.lock().pipelines.len()
    }

    pub fn live_pipeline_layouts(&self) -> usize {
        self.state.lock().pipeline_layouts.len()
    }

    pub fn live_shader_modules(&self) -> usize {
        self.state.lock().shader_modules.len()
    }

    pub fn is_live_pipeline(&self, pipeline: PipelineHandle) -> bool {
        self.state.lock().pipelines.contains_key(&pipeline.raw())
    }

    pub fn is_live_pipeline_layout(&self, layout: PipelineLayoutHandle) -> bool {
        self.state.lock().pipeline_layouts.contains_key(&layout.raw())
    }

    pub fn pipeline_label(&self, pipeline: PipelineHandle) -> Option<String> {
        self.state.lock().pipelines.get(&pipeline.raw()).map(|p| p.label.clone())
    }

    pub fn pipeline_kind(&self, pipeline: PipelineHandle) -> Option<PipelineKind> {
        self.state.lock().pipelines.get(&pipeline.raw()).map(|p| p.kind)
    }

    pub fn pipeline_layout_of(&self, pipeline: PipelineHandle) -> Option<PipelineLayoutHandle> {
        self.state.lock().pipelines.get(&pipeline.raw()).map(|p| p.layout)
    }

    /// Pipelines destroyed so far, in destruction order
    pub fn destroyed_pipelines(&self) -> Vec<PipelineHandle> {
        self.state.lock().destroyed_pipelines.clone()
    }

    /// Destroy calls on handles that were never created or already destroyed
    pub fn invalid_destroys(&self) -> usize {
        self.state.lock().invalid_destroys
    }

    pub fn idle_waits(&self) -> usize {
        self.state.lock().idle_waits
    }

    fn check_layout(state: &HeadlessState, label: &str, layout: PipelineLayoutHandle) -> GpuResult<()> {
        // A null layout asks the driver to derive one
        if !layout.is_null() && !state.pipeline_layouts.contains_key(&layout.raw()) {
            return Err(driver_creation_error(label, format!("{} is not a live layout", layout)));
        }
        Ok(())
    }

    fn check_module(
        state: &HeadlessState,
        label: &str,
        module: ShaderModuleHandle,
        expected: ShaderStage,
    ) -> GpuResult<()> {
        match state.shader_modules.get(&module.raw()) {
            Some(stage) if *stage == expected => Ok(()),
            Some(stage) => Err(driver_creation_error(
                label,
                format!("{} was compiled for the {} stage, bound as {}", module, stage, expected),
            )),
            None => Err(driver_creation_error(label, format!("{} is not a live shader module", module))),
        }
    }
}

impl GpuDevice for HeadlessDevice {
    fn name(&self) -> &str {
        "headless"
    }

    fn create_shader_module(&self, label: &str, shader: &CompiledShader) -> GpuResult<ShaderModuleHandle> {
        let mut state = self.state.lock();
        if state.lost {
            return Err(device_lost_error(self.name()));
        }
        if state.take_failure(FailurePoint::ShaderModule) {
            return Err(driver_creation_error(label, "injected shader module failure"));
        }
        if shader.spirv.is_empty() {
            return Err(driver_creation_error(label, "empty SPIR-V"));
        }

        let raw = state.allocate();
        state.shader_modules.insert(raw, shader.stage);
        Ok(ShaderModuleHandle(raw))
    }

    fn destroy_shader_module(&self, module: ShaderModuleHandle) {
        let mut state = self.state.lock();
        if state.shader_modules.remove(&module.raw()).is_none() {
            log::error!("[HeadlessDevice::destroy_shader_module] {} is not alive", module);
            state.invalid_destroys += 1;
        }
    }

    fn create_pipeline_layout(&self, label: &str, desc: &LayoutDesc) -> GpuResult<PipelineLayoutHandle> {
        let mut state = self.state.lock();
        if state.lost {
            return Err(device_lost_error(self.name()));
        }
        if state.take_failure(FailurePoint::PipelineLayout) {
            return Err(driver_creation_error(label, "injected layout failure"));
        }
        if let Some(missing) = desc
            .set_layouts
            .iter()
            .find(|set| !state.set_layouts.contains(&set.raw()))
        {
            return Err(driver_creation_error(
                label,
                format!("{} is not a registered descriptor set layout", missing),
            ));
        }

        let raw = state.allocate();
        state.pipeline_layouts.insert(raw, label.to_string());
        Ok(PipelineLayoutHandle(raw))
    }

    fn destroy_pipeline_layout(&self, layout: PipelineLayoutHandle) {
        let mut state = self.state.lock();
        if state.pipeline_layouts.remove(&layout.raw()).is_none() {
            log::error!("[HeadlessDevice::destroy_pipeline_layout] {} is not alive", layout);
            state.invalid_destroys += 1;
        }
    }

    fn create_graphics_pipeline(
        &self,
        label: &str,
        layout: PipelineLayoutHandle,
        config: &GraphicsConfig,
    ) -> GpuResult<PipelineHandle> {
        let mut state = self.state.lock();
        if state.lost {
            return Err(device_lost_error(self.name()));
        }
        if state.take_failure(FailurePoint::GraphicsPipeline) {
            return Err(driver_creation_error(label, "injected graphics pipeline failure"));
        }

        Self::check_layout(&state, label, layout)?;
        if config.stage(ShaderStage::Vertex).is_none() {
            return Err(driver_creation_error(label, "graphics pipeline without a vertex stage"));
        }
        for binding in &config.stages {
            Self::check_module(&state, label, binding.module, binding.stage)?;
        }
        if let RenderMode::Classic(pass) = config.render_mode {
            if !state.render_passes.contains(&pass.raw()) {
                return Err(driver_creation_error(label, format!("{} is not a registered render pass", pass)));
            }
        }

        let raw = state.allocate();
        state.pipelines.insert(
            raw,
            HeadlessPipeline {
                label: label.to_string(),
                kind: PipelineKind::Graphics,
                layout,
            },
        );
        Ok(PipelineHandle(raw))
    }

    fn create_compute_pipeline(
        &self,
        label: &str,
        layout: PipelineLayoutHandle,
        config: &ComputeConfig,
    ) -> GpuResult<PipelineHandle> {
        let mut state = self.state.lock();
        if state.lost {
            return Err(device_lost_error(self.name()));
        }
        if state.take_failure(FailurePoint::ComputePipeline) {
            return Err(driver_creation_error(label, "injected compute pipeline failure"));
        }

        Self::check_layout(&state, label, layout)?;
        Self::check_module(&state, label, config.module, ShaderStage::Compute)?;

        let raw = state.allocate();
        state.pipelines.insert(
            raw,
            HeadlessPipeline {
                label: label.to_string(),
                kind: PipelineKind::Compute,
                layout,
            },
        );
        Ok(PipelineHandle(raw))
    }

    fn destroy_pipeline(&self, pipeline: PipelineHandle) {
        let mut state = self.state.lock();
        if state.pipelines.remove(&pipeline.raw()).is_some() {
            state.destroyed_pipelines.push(pipeline);
        } else {
            log::error!("[HeadlessDevice::destroy_pipeline] {} is not alive", pipeline);
            state.invalid_destroys += 1;
        }
    }

    fn wait_for_idle(&self) -> GpuResult<()> {
        let mut state = self.state.lock();
        if state.lost {
            return Err(device_lost_error(self.name()));
        }
        state.idle_waits += 1;
        Ok(())
    }
}
