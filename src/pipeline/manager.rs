//! Pipeline registry
//!
//! Owns every managed pipeline by logical id, the layouts it is responsible for, the
//! shader tracker and the compiler. Rebuilds replace a pipeline's native handle in
//! place; everything else keeps referring to the same [`PipelineId`].

use std::collections::{BTreeMap, BTreeSet};
use std::num::NonZeroU64;
use std::path::PathBuf;

use rustc_hash::FxHashMap;

use crate::config::ShaderConfig;
use crate::error::{EngineError, EngineResult};
use crate::gpu::{DeviceIdle, GpuDevice, PipelineHandle, PipelineLayoutHandle, SharedDeletionQueue};
use crate::shader::{ShaderCompiler, ShaderSet, ShaderStage};

use super::builder::{
    build_compute_pipeline, compile_stages, destroy_stages, CompiledStages, PipelineBuilder,
};
use super::config::{ComputeConfig, GraphicsConfig, PipelineConfig};
use super::layout::{LayoutOwnership, PipelineLayoutResource};
use super::resource::PipelineResource;
use super::tracker::{FileClock, ScanFailure, ShaderTracker, SystemClock};
use super::{LayoutId, PipelineId};

/// Whether a managed pipeline is rebuilt when its sources change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackShader {
    Yes,
    No,
}

/// Outcome of one hot-reload pass
#[derive(Debug, Default)]
pub struct HotloadReport {
    /// Rebuilt successfully, in id order
    pub rebuilt: Vec<PipelineId>,
    /// Rebuild attempted and failed; the old pipeline is still in use
    pub failed: Vec<(PipelineId, EngineError)>,
    /// Sources that could not be checked this pass
    pub scan_failures: Vec<ScanFailure>,
}

impl HotloadReport {
    pub fn is_empty(&self) -> bool {
        self.rebuilt.is_empty() && self.failed.is_empty() && self.scan_failures.is_empty()
    }
}

pub struct PipelineManager {
    resources: BTreeMap<PipelineId, PipelineResource>,
    pipelines: FxHashMap<PipelineId, PipelineHandle>,
    layouts: FxHashMap<LayoutId, PipelineLayoutHandle>,
    shared_layouts: FxHashMap<LayoutId, Vec<PipelineId>>,
    tracker: ShaderTracker,
    compiler: ShaderCompiler,
    clock: Box<dyn FileClock>,
    deletion_queue: SharedDeletionQueue,
    next_pipeline_id: NonZeroU64,
    next_layout_id: NonZeroU64,
}

impl PipelineManager {
    pub fn new(deletion_queue: SharedDeletionQueue, compiler: ShaderCompiler) -> Self {
        Self {
            resources: BTreeMap::new(),
            pipelines: FxHashMap::default(),
            layouts: FxHashMap::default(),
            shared_layouts: FxHashMap::default(),
            tracker: ShaderTracker::new(),
            compiler,
            clock: Box::new(SystemClock),
            deletion_queue,
            next_pipeline_id: NonZeroU64::MIN,
            next_layout_id: NonZeroU64::MIN,
        }
    }

    /// Manager with a compiler built from the shader settings
    pub fn from_config(deletion_queue: SharedDeletionQueue, config: &ShaderConfig) -> Self {
        Self::new(deletion_queue, ShaderCompiler::new(config))
    }

    /// Replace the source of file modification times
    pub fn with_clock(mut self, clock: Box<dyn FileClock>) -> Self {
        self.clock = clock;
        self
    }

    fn allocate_pipeline_id(&mut self) -> PipelineId {
        let id = PipelineId(self.next_pipeline_id);
        self.next_pipeline_id = self.next_pipeline_id.saturating_add(1);
        id
    }

    fn allocate_layout_id(&mut self) -> LayoutId {
        let id = LayoutId(self.next_layout_id);
        self.next_layout_id = self.next_layout_id.saturating_add(1);
        id
    }

    /// Compile `shaders` and build a graphics pipeline; the result is not managed yet
    pub fn build_graphics(
        &mut self,
        device: &dyn GpuDevice,
        name: &str,
        shaders: ShaderSet,
        config: GraphicsConfig,
        layout: PipelineLayoutResource,
    ) -> EngineResult<PipelineResource> {
        let mut resource = PipelineResource::graphics(name, shaders, config, layout);
        let (handle, includes) = build_native(device, &mut self.compiler, &resource)?;
        resource.handle = handle;
        resource.set_includes(includes);
        Ok(resource)
    }

    /// Compile `shaders` and build a compute pipeline; the result is not managed yet
    pub fn build_compute(
        &mut self,
        device: &dyn GpuDevice,
        name: &str,
        shaders: ShaderSet,
        config: ComputeConfig,
        layout: PipelineLayoutResource,
    ) -> EngineResult<PipelineResource> {
        let mut resource = PipelineResource::compute(name, shaders, config, layout);
        let (handle, includes) = build_native(device, &mut self.compiler, &resource)?;
        resource.handle = handle;
        resource.set_includes(includes);
        Ok(resource)
    }

    /// Take ownership of a built pipeline
    ///
    /// A resource without an id gets a fresh one and its handle is queued for
    /// destruction. A resource that already carries one of this manager's ids is
    /// re-managed: its queued handle is swapped for the current one. `shared` is the
    /// token of a layout several pipelines use; it is queued only on first sighting.
    /// A resource whose own layout is a shared token and that comes without `shared`
    /// registers that token itself.
    pub fn manage(
        &mut self,
        mut resource: PipelineResource,
        track: TrackShader,
        shared: Option<&mut PipelineLayoutResource>,
    ) -> EngineResult<PipelineId> {
        let id = match resource.id {
            Some(id) => {
                let old = *self
                    .pipelines
                    .get(&id)
                    .ok_or(EngineError::UnknownPipeline { id: id.get() })?;
                if old != resource.handle {
                    self.deletion_queue.borrow_mut().replace_pipeline(old, resource.handle);
                }
                id
            }
            None => {
                let id = self.allocate_pipeline_id();
                self.deletion_queue.borrow_mut().push_pipeline(resource.handle);
                resource.id = Some(id);
                id
            }
        };

        let mut own_token;
        let shared = match shared {
            Some(token) => Some(token),
            None if resource.layout.ownership == LayoutOwnership::Owned && resource.layout.is_shared() => {
                own_token = resource.layout.clone();
                Some(&mut own_token)
            }
            None => None,
        };

        match resource.layout.ownership {
            LayoutOwnership::Uninitialized => {
                log::warn!(
                    "[PipelineManager::manage] '{}' has no pipeline layout assigned",
                    resource.name
                );
            }
            LayoutOwnership::Owned if !resource.layout.is_shared() => {
                if resource.layout.id.is_none() {
                    let layout_id = self.allocate_layout_id();
                    resource.layout.id = Some(layout_id);
                    self.layouts.insert(layout_id, resource.layout.handle);
                    self.deletion_queue
                        .borrow_mut()
                        .push_pipeline_layout(resource.layout.handle);
                }
                resource.layout_id = resource.layout.id;
            }
            LayoutOwnership::Owned | LayoutOwnership::NotOwned => {}
        }

        if let Some(token) = shared {
            if token.handle.is_null() {
                log::warn!(
                    "[PipelineManager::manage] Shared layout token for '{}' has no handle, ignoring it",
                    resource.name
                );
            } else {
                let layout_id = match token.id.or_else(|| self.registered_layout(token.handle)) {
                    Some(layout_id) => {
                        token.id = Some(layout_id);
                        let members = self.shared_layouts.entry(layout_id).or_default();
                        if !members.contains(&id) {
                            members.push(id);
                        }
                        layout_id
                    }
                    None => {
                        let layout_id = self.allocate_layout_id();
                        token.id = Some(layout_id);
                        self.layouts.insert(layout_id, token.handle);
                        self.shared_layouts.insert(layout_id, vec![id]);
                        self.deletion_queue.borrow_mut().push_pipeline_layout(token.handle);
                        log::debug!(
                            "[PipelineManager::manage] Shared layout {} registered by '{}'",
                            layout_id,
                            resource.name
                        );
                        layout_id
                    }
                };
                resource.layout = PipelineLayoutResource::member_of(token);
                resource.layout_id = Some(layout_id);
            }
        }

        self.pipelines.insert(id, resource.handle);

        if track == TrackShader::Yes {
            stamp_untimed(self.clock.as_ref(), &mut resource);
            self.tracker.track(&resource);
        }

        log::info!(
            "[PipelineManager::manage] Managing '{}' as {} ({})",
            resource.name,
            id,
            resource.handle
        );
        self.resources.insert(id, resource);
        Ok(id)
    }

    /// Registry id of a layout handle that is already queued
    fn registered_layout(&self, handle: PipelineLayoutHandle) -> Option<LayoutId> {
        self.layouts
            .iter()
            .find(|(_, registered)| **registered == handle)
            .map(|(id, _)| *id)
    }

    /// Current native pipeline for `id`, or NULL
    pub fn get_pipeline(&self, id: PipelineId) -> PipelineHandle {
        self.pipelines.get(&id).copied().unwrap_or(PipelineHandle::NULL)
    }

    /// Layout handle registered under `id`, or NULL
    pub fn get_layout(&self, id: LayoutId) -> PipelineLayoutHandle {
        self.layouts.get(&id).copied().unwrap_or(PipelineLayoutHandle::NULL)
    }

    /// Pipelines using the shared layout `id`
    pub fn shared_layout_members(&self, id: LayoutId) -> &[PipelineId] {
        self.shared_layouts.get(&id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn resource(&self, id: PipelineId) -> Option<&PipelineResource> {
        self.resources.get(&id)
    }

    pub fn resource_mut(&mut self, id: PipelineId) -> Option<&mut PipelineResource> {
        self.resources.get_mut(&id)
    }

    pub fn pipeline_count(&self) -> usize {
        self.pipelines.len()
    }

    pub fn layout_count(&self) -> usize {
        self.layouts.len()
    }

    pub fn tracker(&self) -> &ShaderTracker {
        &self.tracker
    }

    pub fn compiler_mut(&mut self) -> &mut ShaderCompiler {
        &mut self.compiler
    }

    /// Recompile and rebuild one pipeline, keeping its id
    ///
    /// On failure the old handle stays live and registered. On success the old handle
    /// is destroyed right away, which `idle` proves is safe.
    pub fn rebuild(&mut self, device: &dyn GpuDevice, id: PipelineId, _idle: &DeviceIdle) -> EngineResult<PipelineHandle> {
        let resource = self
            .resources
            .get(&id)
            .ok_or(EngineError::UnknownPipeline { id: id.get() })?;

        let (new_handle, includes) = build_native(device, &mut self.compiler, resource)?;
        let old_handle = resource.handle;
        let name = resource.name.clone();

        device.destroy_pipeline(old_handle);
        self.pipelines.insert(id, new_handle);
        self.deletion_queue.borrow_mut().replace_pipeline(old_handle, new_handle);

        if let Some(resource) = self.resources.get_mut(&id) {
            resource.handle = new_handle;
            resource.set_includes(includes);
            if self.tracker.is_tracked(id) {
                stamp_untimed(self.clock.as_ref(), resource);
                self.tracker.track(resource);
            }
        }

        log::info!(
            "[PipelineManager::rebuild] Rebuilt '{}' ({}): {} -> {}",
            name,
            id,
            old_handle,
            new_handle
        );
        Ok(new_handle)
    }

    /// Rebuild every pipeline whose shader sources changed since the last pass
    ///
    /// Per-pipeline failures are logged and reported, never returned. Only a fatal
    /// device error ends the pass early.
    pub fn hotload_shaders(&mut self, device: &dyn GpuDevice, idle: &DeviceIdle) -> EngineResult<HotloadReport> {
        let scan = self.tracker.scan(&mut self.resources, self.clock.as_ref());
        let mut report = HotloadReport {
            scan_failures: scan.failures,
            ..HotloadReport::default()
        };

        if scan.modified.is_empty() {
            log::debug!("[PipelineManager::hotload_shaders] No shader changes detected");
            return Ok(report);
        }

        for id in scan.modified {
            match self.rebuild(device, id, idle) {
                Ok(_) => report.rebuilt.push(id),
                Err(e) if e.is_fatal() => {
                    log::error!("[PipelineManager::hotload_shaders] Aborting hot-reload: {}", e);
                    return Err(e);
                }
                Err(e) => {
                    log::error!(
                        "[PipelineManager::hotload_shaders] Keeping previous pipeline for {}: {}",
                        id,
                        e
                    );
                    report.failed.push((id, e));
                }
            }
        }

        log::info!(
            "[PipelineManager::hotload_shaders] {} rebuilt, {} failed, {} unreadable",
            report.rebuilt.len(),
            report.failed.len(),
            report.scan_failures.len()
        );
        Ok(report)
    }
}

/// Give never-stamped stage slots and includes their current modification time
fn stamp_untimed(clock: &dyn FileClock, resource: &mut PipelineResource) {
    for stage in ShaderStage::ALL {
        let slot = resource.shaders.slot_mut(stage);
        if slot.is_empty() || slot.last_modified.is_some() {
            continue;
        }
        match clock.modified(&slot.path) {
            Ok(modified) => slot.last_modified = Some(modified),
            Err(e) => log::warn!("[PipelineManager::manage] {}", e),
        }
    }

    for (path, seen) in resource.includes.iter_mut().filter(|(_, seen)| seen.is_none()) {
        match clock.modified(path) {
            Ok(modified) => *seen = Some(modified),
            Err(e) => log::warn!("[PipelineManager::manage] {}", e),
        }
    }
}

/// Compile the stages of `resource` and build a new native pipeline from its config
///
/// Shader modules only live for the duration of the build. Also returns every file
/// the stages included.
fn build_native(
    device: &dyn GpuDevice,
    compiler: &mut ShaderCompiler,
    resource: &PipelineResource,
) -> EngineResult<(PipelineHandle, BTreeSet<PathBuf>)> {
    let CompiledStages { stages, includes } =
        compile_stages(device, compiler, &resource.name, &resource.shaders)?;
    let layout = resource.layout_handle();

    let result = match &resource.config {
        PipelineConfig::Graphics(config) => {
            let mut builder = PipelineBuilder::from_config((**config).clone());
            builder
                .set_stages(stages.clone())
                .set_layout(layout, config.layout.clone());
            builder.build_pipeline(device, &resource.name, config.render_mode, None)
        }
        PipelineConfig::Compute(config) => match stages.iter().find(|s| s.stage == ShaderStage::Compute) {
            Some(binding) => build_compute_pipeline(device, &resource.name, layout, config, binding.module),
            None => Err(EngineError::DriverCreation {
                object: resource.name.clone(),
                error: "compute pipeline without a compute stage".to_string(),
            }),
        },
    };

    destroy_stages(device, &stages);
    result.map(|handle| (handle, includes))
}
