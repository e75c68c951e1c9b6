//! Shader source tracking
//!
//! Maps each shader file, stage sources and the files they include alike, to the
//! pipelines built from it. A scan reads every tracked
//! file's modification time once and reports which pipelines saw a change.
//!
//! Timestamps are advanced when a change is detected, not when the rebuild succeeds:
//! a file that fails to compile is reported once and not again until it changes.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use rustc_hash::FxHashSet;

use crate::error::{EngineError, EngineResult};
use crate::shader::ShaderStage;

use super::resource::PipelineResource;
use super::PipelineId;

/// Source of file modification times
pub trait FileClock {
    fn modified(&self, path: &Path) -> EngineResult<SystemTime>;
}

/// Reads modification times from the filesystem
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl FileClock for SystemClock {
    fn modified(&self, path: &Path) -> EngineResult<SystemTime> {
        std::fs::metadata(path)
            .and_then(|metadata| metadata.modified())
            .map_err(|e| EngineError::FileAccess {
                path: path.to_path_buf(),
                error: e.to_string(),
            })
    }
}

/// A tracked file that could not be checked
#[derive(Debug)]
pub struct ScanFailure {
    pub path: PathBuf,
    pub dependents: Vec<PipelineId>,
    pub error: EngineError,
}

/// Result of one scan
#[derive(Debug, Default)]
pub struct ScanReport {
    /// Pipelines with at least one changed stage, in id order
    pub modified: BTreeSet<PipelineId>,
    pub failures: Vec<ScanFailure>,
}

impl ScanReport {
    pub fn is_clean(&self) -> bool {
        self.modified.is_empty() && self.failures.is_empty()
    }
}

/// Path to dependents map
#[derive(Debug, Default)]
pub struct ShaderTracker {
    dependents: BTreeMap<PathBuf, Vec<PipelineId>>,
}

impl ShaderTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `id` to the dependents of `path`; duplicates are allowed until the next `track`
    pub fn register(&mut self, path: impl Into<PathBuf>, id: PipelineId) {
        self.dependents.entry(path.into()).or_default().push(id);
    }

    /// Register `resource` exactly once under each distinct path it uses, and nowhere else
    pub fn track(&mut self, resource: &PipelineResource) {
        let Some(id) = resource.id else {
            log::warn!(
                "[ShaderTracker::track] '{}' has no id yet, not tracking it",
                resource.name
            );
            return;
        };

        self.untrack(id);
        let paths = resource.source_paths();
        for path in &paths {
            self.register(*path, id);
        }

        log::debug!(
            "[ShaderTracker::track] {} ('{}') depends on {} file(s)",
            id,
            resource.name,
            paths.len()
        );
    }

    /// Remove `id` from every dependents list
    pub fn untrack(&mut self, id: PipelineId) {
        self.dependents.retain(|_, ids| {
            ids.retain(|dependent| *dependent != id);
            !ids.is_empty()
        });
    }

    pub fn dependents(&self, path: &Path) -> &[PipelineId] {
        self.dependents.get(path).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn tracked_paths(&self) -> impl Iterator<Item = &Path> {
        self.dependents.keys().map(PathBuf::as_path)
    }

    pub fn is_tracked(&self, id: PipelineId) -> bool {
        self.dependents.values().any(|ids| ids.contains(&id))
    }

    pub fn len(&self) -> usize {
        self.dependents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dependents.is_empty()
    }

    /// Detect modified sources and stamp the new timestamps onto `resources`
    ///
    /// Pipelines depending on a file that could not be checked are left out of this
    /// scan entirely, and none of their timestamps move.
    pub fn scan(
        &self,
        resources: &mut BTreeMap<PipelineId, PipelineResource>,
        clock: &dyn FileClock,
    ) -> ScanReport {
        let mut report = ScanReport::default();
        let mut observed: Vec<(&Path, &[PipelineId], SystemTime)> = Vec::with_capacity(self.dependents.len());
        let mut excluded: FxHashSet<PipelineId> = FxHashSet::default();

        for (path, ids) in &self.dependents {
            match clock.modified(path) {
                Ok(modified) => observed.push((path.as_path(), ids.as_slice(), modified)),
                Err(error) => {
                    log::warn!("[ShaderTracker::scan] {}", error);
                    excluded.extend(ids.iter().copied());
                    report.failures.push(ScanFailure {
                        path: path.clone(),
                        dependents: ids.clone(),
                        error,
                    });
                }
            }
        }

        for (path, ids, modified) in observed {
            for id in ids {
                if excluded.contains(id) {
                    continue;
                }
                let Some(resource) = resources.get_mut(id) else {
                    continue;
                };

                let mut changed = false;
                for stage in ShaderStage::ALL {
                    let slot = resource.shaders.slot_mut(stage);
                    if !slot.is_empty() && slot.path == path && slot.last_modified != Some(modified) {
                        slot.last_modified = Some(modified);
                        changed = true;
                    }
                }
                if let Some(seen) = resource.includes.get_mut(path) {
                    if *seen != Some(modified) {
                        *seen = Some(modified);
                        changed = true;
                    }
                }

                if changed {
                    log::info!(
                        "[ShaderTracker::scan] {} changed, {} ('{}') needs a rebuild",
                        path.display(),
                        id,
                        resource.name
                    );
                    report.modified.insert(*id);
                }
            }
        }

        report
    }
}
