//! A managed pipeline and everything needed to rebuild it

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use crate::gpu::{PipelineHandle, PipelineLayoutHandle};
use crate::shader::ShaderSet;

use super::config::{ComputeConfig, GraphicsConfig, PipelineConfig};
use super::layout::PipelineLayoutResource;
use super::{LayoutId, PipelineId, PipelineKind};

/// One pipeline owned by the registry
///
/// Identity is `id`; `handle` is replaced in place on every rebuild.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineResource {
    pub name: String,
    pub handle: PipelineHandle,
    pub layout: PipelineLayoutResource,
    pub shaders: ShaderSet,
    /// Files the stages `#include`d at the last successful build, with the
    /// modification time each was last seen with
    pub includes: BTreeMap<PathBuf, Option<SystemTime>>,
    pub id: Option<PipelineId>,
    /// Layout the pipeline was built against: its private one or a shared one
    pub layout_id: Option<LayoutId>,
    pub kind: PipelineKind,
    pub config: PipelineConfig,
}

impl PipelineResource {
    /// Unbuilt graphics resource
    pub fn graphics(
        name: impl Into<String>,
        shaders: ShaderSet,
        config: GraphicsConfig,
        layout: PipelineLayoutResource,
    ) -> Self {
        Self::new(name, shaders, PipelineConfig::from(config), layout)
    }

    /// Unbuilt compute resource
    pub fn compute(
        name: impl Into<String>,
        shaders: ShaderSet,
        config: ComputeConfig,
        layout: PipelineLayoutResource,
    ) -> Self {
        Self::new(name, shaders, PipelineConfig::from(config), layout)
    }

    fn new(
        name: impl Into<String>,
        shaders: ShaderSet,
        config: PipelineConfig,
        layout: PipelineLayoutResource,
    ) -> Self {
        Self {
            name: name.into(),
            handle: PipelineHandle::NULL,
            layout,
            shaders,
            includes: BTreeMap::new(),
            id: None,
            layout_id: None,
            kind: config.kind(),
            config,
        }
    }

    pub fn layout_handle(&self) -> PipelineLayoutHandle {
        self.layout.handle
    }

    pub fn is_built(&self) -> bool {
        !self.handle.is_null()
    }

    /// Replace the include set, keeping timestamps of files that are still included
    pub fn set_includes(&mut self, paths: BTreeSet<PathBuf>) {
        let previous = std::mem::take(&mut self.includes);
        self.includes = paths
            .into_iter()
            .map(|path| {
                let seen = previous.get(&path).copied().flatten();
                (path, seen)
            })
            .collect();
    }

    /// Every distinct file a rebuild reads: stage sources first, then includes
    pub fn source_paths(&self) -> Vec<&Path> {
        let mut paths = self.shaders.paths();
        for include in self.includes.keys() {
            if !paths.contains(&include.as_path()) {
                paths.push(include);
            }
        }
        paths
    }

    /// True when any non-empty stage slot or include reads `path`
    pub fn uses_path(&self, path: &Path) -> bool {
        self.shaders.active().any(|slot| slot.path == path) || self.includes.contains_key(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_new_resource_is_unbuilt() {
        let resource = PipelineResource::compute(
            "gradient",
            ShaderSet::compute("gradient.comp"),
            ComputeConfig::default(),
            PipelineLayoutResource::uninitialized(),
        );
        assert_eq!(resource.kind, PipelineKind::Compute);
        assert!(!resource.is_built());
        assert!(resource.id.is_none());
        assert!(resource.uses_path(Path::new("gradient.comp")));
        assert!(!resource.uses_path(Path::new("sky.comp")));
    }

    #[test]
    fn test_set_includes_keeps_known_timestamps() {
        let mut resource = PipelineResource::compute(
            "sky",
            ShaderSet::compute("sky.comp"),
            ComputeConfig::default(),
            PipelineLayoutResource::uninitialized(),
        );
        let seen = SystemTime::UNIX_EPOCH + Duration::from_secs(5);
        resource.set_includes(BTreeSet::from([PathBuf::from("noise.glsl")]));
        resource.includes.insert(PathBuf::from("noise.glsl"), Some(seen));

        resource.set_includes(BTreeSet::from([
            PathBuf::from("noise.glsl"),
            PathBuf::from("atmosphere.glsl"),
        ]));

        assert_eq!(resource.includes[Path::new("noise.glsl")], Some(seen));
        assert_eq!(resource.includes[Path::new("atmosphere.glsl")], None);
        assert!(resource.uses_path(Path::new("atmosphere.glsl")));
        assert_eq!(
            resource.source_paths(),
            vec![Path::new("sky.comp"), Path::new("atmosphere.glsl"), Path::new("noise.glsl")]
        );

        resource.set_includes(BTreeSet::new());
        assert!(!resource.uses_path(Path::new("noise.glsl")));
    }
}
