//! Shader sources and compilation
//!
//! Shader sources are plain GLSL files on disk. A pipeline owns a [`ShaderSet`] with up
//! to four stage files; the [`ShaderCompiler`] turns each into SPIR-V.

pub mod compiler;
pub mod includer;
pub mod limits;

pub use compiler::{CompiledShader, ShaderCompiler};
pub use includer::{
    expand_includes, DirIncluder, ExpandedSource, IncludeKind, IncludeResult, Includer,
};
pub use limits::ResourceLimits;

use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// Programmable pipeline stage a source file is compiled for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ShaderStage {
    Vertex,
    Fragment,
    Geometry,
    Compute,
}

impl ShaderStage {
    pub const ALL: [ShaderStage; 4] = [
        ShaderStage::Vertex,
        ShaderStage::Fragment,
        ShaderStage::Geometry,
        ShaderStage::Compute,
    ];

    /// Detect stage from the conventional GLSL file extension
    pub fn from_path(path: &Path) -> Option<Self> {
        match path.extension().and_then(|e| e.to_str()) {
            Some("vert") => Some(ShaderStage::Vertex),
            Some("frag") => Some(ShaderStage::Fragment),
            Some("geom") => Some(ShaderStage::Geometry),
            Some("comp") => Some(ShaderStage::Compute),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ShaderStage::Vertex => "vertex",
            ShaderStage::Fragment => "fragment",
            ShaderStage::Geometry => "geometry",
            ShaderStage::Compute => "compute",
        }
    }

    pub fn to_wgpu(self) -> wgpu::ShaderStages {
        match self {
            ShaderStage::Vertex => wgpu::ShaderStages::VERTEX,
            ShaderStage::Fragment => wgpu::ShaderStages::FRAGMENT,
            // wgpu has no geometry stage; the module is still visible to vertex processing
            ShaderStage::Geometry => wgpu::ShaderStages::VERTEX,
            ShaderStage::Compute => wgpu::ShaderStages::COMPUTE,
        }
    }
}

impl std::fmt::Display for ShaderStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// One stage slot of a pipeline: the source file and the timestamp it was last seen with
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShaderStageFile {
    pub path: PathBuf,
    pub stage: ShaderStage,
    pub last_modified: Option<SystemTime>,
}

impl ShaderStageFile {
    pub fn empty(stage: ShaderStage) -> Self {
        Self {
            path: PathBuf::new(),
            stage,
            last_modified: None,
        }
    }

    pub fn new(path: impl Into<PathBuf>, stage: ShaderStage) -> Self {
        Self {
            path: path.into(),
            stage,
            last_modified: None,
        }
    }

    /// Empty slots are never compiled or tracked
    pub fn is_empty(&self) -> bool {
        self.path.as_os_str().is_empty()
    }
}

/// The fixed set of stage slots a pipeline can use
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShaderSet {
    pub vertex: ShaderStageFile,
    pub fragment: ShaderStageFile,
    pub geometry: ShaderStageFile,
    pub compute: ShaderStageFile,
}

impl Default for ShaderSet {
    fn default() -> Self {
        Self {
            vertex: ShaderStageFile::empty(ShaderStage::Vertex),
            fragment: ShaderStageFile::empty(ShaderStage::Fragment),
            geometry: ShaderStageFile::empty(ShaderStage::Geometry),
            compute: ShaderStageFile::empty(ShaderStage::Compute),
        }
    }
}

impl ShaderSet {
    /// Vertex + fragment pair, the common graphics case
    pub fn graphics(vertex: impl Into<PathBuf>, fragment: impl Into<PathBuf>) -> Self {
        Self {
            vertex: ShaderStageFile::new(vertex, ShaderStage::Vertex),
            fragment: ShaderStageFile::new(fragment, ShaderStage::Fragment),
            ..Self::default()
        }
    }

    pub fn compute(compute: impl Into<PathBuf>) -> Self {
        Self {
            compute: ShaderStageFile::new(compute, ShaderStage::Compute),
            ..Self::default()
        }
    }

    pub fn slot(&self, stage: ShaderStage) -> &ShaderStageFile {
        match stage {
            ShaderStage::Vertex => &self.vertex,
            ShaderStage::Fragment => &self.fragment,
            ShaderStage::Geometry => &self.geometry,
            ShaderStage::Compute => &self.compute,
        }
    }

    pub fn slot_mut(&mut self, stage: ShaderStage) -> &mut ShaderStageFile {
        match stage {
            ShaderStage::Vertex => &mut self.vertex,
            ShaderStage::Fragment => &mut self.fragment,
            ShaderStage::Geometry => &mut self.geometry,
            ShaderStage::Compute => &mut self.compute,
        }
    }

    /// Non-empty slots in pipeline stage order
    pub fn active(&self) -> impl Iterator<Item = &ShaderStageFile> {
        [&self.vertex, &self.geometry, &self.fragment, &self.compute]
            .into_iter()
            .filter(|slot| !slot.is_empty())
    }

    /// Distinct source paths used by this set
    pub fn paths(&self) -> Vec<&Path> {
        let mut paths: Vec<&Path> = Vec::with_capacity(4);
        for slot in self.active() {
            if !paths.contains(&slot.path.as_path()) {
                paths.push(&slot.path);
            }
        }
        paths
    }
}
