//! Pipeline lifecycle and shader hot-reload
//!
//! The [`PipelineManager`] owns every graphics and compute pipeline the renderer uses,
//! keyed by a logical [`PipelineId`] that stays stable while the native handle behind
//! it is rebuilt. The [`ShaderTracker`] maps shader source files to the pipelines that
//! use them so a change on disk rebuilds exactly the affected pipelines.

pub mod builder;
pub mod config;
pub mod layout;
pub mod manager;
pub mod resource;
pub mod tracker;

pub use builder::{
    build_compute_pipeline, compile_stages, destroy_stages, CompiledStages, PipelineBuilder,
};
pub use config::{
    ColorBlendAttachment, ComputeConfig, DepthStencilState, DynamicState, GraphicsConfig,
    InputAssemblyState, MultisampleState, PipelineConfig, RasterizationState, RenderMode,
    RenderingInfo, ShaderStageBinding, VertexBufferLayout, VertexInputState,
};
pub use layout::{LayoutDesc, LayoutOwnership, LayoutSharing, PipelineLayoutResource};
pub use manager::{HotloadReport, PipelineManager, TrackShader};
pub use resource::PipelineResource;
pub use tracker::{FileClock, ScanFailure, ScanReport, ShaderTracker, SystemClock};

use std::num::NonZeroU64;

/// Logical identity of a managed pipeline; survives rebuilds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PipelineId(NonZeroU64);

/// Logical identity of a registry-owned pipeline layout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LayoutId(NonZeroU64);

impl PipelineId {
    pub fn new(raw: u64) -> Option<Self> {
        NonZeroU64::new(raw).map(Self)
    }

    pub fn get(self) -> u64 {
        self.0.get()
    }
}

impl LayoutId {
    pub fn new(raw: u64) -> Option<Self> {
        NonZeroU64::new(raw).map(Self)
    }

    pub fn get(self) -> u64 {
        self.0.get()
    }
}

impl std::fmt::Display for PipelineId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "pipeline#{}", self.0)
    }
}

impl std::fmt::Display for LayoutId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "layout#{}", self.0)
    }
}

/// Which pipeline bind point a resource is for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PipelineKind {
    Graphics,
    Compute,
}
