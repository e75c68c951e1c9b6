//! Renderer-driven hot-reload on the headless device

use std::fs::{self, File};
use std::path::Path;
use std::time::{Duration, UNIX_EPOCH};

use kiln_engine::gpu::{FailurePoint, HeadlessDevice};
use kiln_engine::renderer::{background, materials, MaterialPass, Renderer, RendererOptions};
use kiln_engine::EngineConfig;
use tempfile::TempDir;

const VERT: &str = "#version 450\nlayout(location = 0) out vec4 color;\nvoid main() { color = vec4(1.0); gl_Position = vec4(0.0); }\n";
const FRAG: &str = "#version 450\nlayout(location = 0) in vec4 color;\nlayout(location = 0) out vec4 outColor;\nvoid main() { outColor = color; }\n";
const COMP: &str = "#version 450\nlayout(local_size_x = 16, local_size_y = 16) in;\nvoid main() {}\n";

fn touch(path: &Path, secs: u64) {
    let file = File::options().write(true).open(path).expect("open shader");
    file.set_modified(UNIX_EPOCH + Duration::from_secs(secs)).expect("set mtime");
}

fn shader_dir() -> TempDir {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let root = temp_dir.path();
    for (name, src) in [
        (materials::MESH_VERTEX_SHADER, VERT),
        (materials::MESH_FRAGMENT_SHADER, FRAG),
        (background::GRADIENT_SHADER, COMP),
        (background::SKY_SHADER, COMP),
    ] {
        fs::write(root.join(name), src).expect("write shader");
        touch(&root.join(name), 1_800_000_000);
    }
    temp_dir
}

fn config(root: &Path) -> EngineConfig {
    let mut config = EngineConfig::default();
    config.shaders.root = root.to_path_buf();
    config.shaders.include_root = root.to_path_buf();
    config
}

#[test]
fn hotload_request_rebuilds_changed_materials() {
    let shaders = shader_dir();
    let device = HeadlessDevice::new();
    let mut renderer =
        Renderer::new(&device, config(shaders.path()), RendererOptions::default()).expect("renderer");

    let before = renderer.process_frame().expect("frame");
    touch(&shaders.path().join(materials::MESH_FRAGMENT_SHADER), 1_800_000_500);

    renderer.request_hotload();
    assert!(renderer.hotload_requested());
    let after = renderer.process_frame().expect("frame");
    assert!(!renderer.hotload_requested());

    let report = after.hotload.expect("hotload ran");
    let materials = renderer.materials();
    assert_eq!(
        report.rebuilt,
        vec![
            materials.pipeline_for(MaterialPass::MainColor),
            materials.pipeline_for(MaterialPass::Transparent)
        ]
    );
    assert_ne!(after.opaque, before.opaque);
    assert_ne!(after.transparent, before.transparent);
    assert_eq!(after.background, before.background);
    assert_eq!(device.idle_waits(), 1);
    assert_eq!(renderer.frames().in_flight_count(), 1);

    // Rebuilt pipelines keep using the shared layout
    assert_eq!(device.pipeline_layout_of(after.opaque), Some(materials.layout.handle));
    assert_eq!(device.pipeline_layout_of(after.transparent), Some(materials.layout.handle));
}

#[test]
fn broken_background_keeps_previous_pipeline() {
    let shaders = shader_dir();
    let device = HeadlessDevice::new();
    let mut renderer =
        Renderer::new(&device, config(shaders.path()), RendererOptions::default()).expect("renderer");
    renderer.backgrounds_mut().select_by_name("sky");
    let before = renderer.process_frame().expect("frame");

    let sky = shaders.path().join(background::SKY_SHADER);
    fs::write(&sky, "#version 450\nlayout(local_size_x = 16) in;\nvoid main() { float x = ; }\n").expect("break sky");
    touch(&sky, 1_800_000_500);
    renderer.request_hotload();

    let after = renderer.process_frame().expect("rebuild failures never fail the frame");
    let report = after.hotload.expect("hotload ran");
    assert!(report.rebuilt.is_empty());
    assert_eq!(report.failed.len(), 1);
    assert_eq!(after.background, before.background);
    assert!(device.is_live_pipeline(after.background));
}

#[test]
fn driver_failure_during_hotload_is_reported() {
    let shaders = shader_dir();
    let device = HeadlessDevice::new();
    let mut renderer =
        Renderer::new(&device, config(shaders.path()), RendererOptions::default()).expect("renderer");
    let before = renderer.process_frame().expect("frame");

    touch(&shaders.path().join(background::GRADIENT_SHADER), 1_800_000_500);
    device.fail_next(FailurePoint::ComputePipeline);
    renderer.request_hotload();

    let after = renderer.process_frame().expect("frame");
    let report = after.hotload.expect("hotload ran");
    assert_eq!(report.failed.len(), 1);
    assert_eq!(after.background, before.background);
    assert_eq!(device.live_shader_modules(), 0);
}

#[test]
fn lost_device_fails_the_frame() {
    let shaders = shader_dir();
    let device = HeadlessDevice::new();
    let mut renderer =
        Renderer::new(&device, config(shaders.path()), RendererOptions::default()).expect("renderer");

    device.mark_lost();
    renderer.request_hotload();
    let err = renderer.process_frame().unwrap_err();
    assert!(err.is_fatal());
}

#[test]
fn shutdown_releases_every_object() {
    let shaders = shader_dir();
    let device = HeadlessDevice::new();
    {
        let mut renderer =
            Renderer::new(&device, config(shaders.path()), RendererOptions::default()).expect("renderer");
        touch(&shaders.path().join(materials::MESH_VERTEX_SHADER), 1_800_000_500);
        renderer.request_hotload();
        renderer.process_frame().expect("frame");
        assert_eq!(device.live_pipelines(), 4);
        assert_eq!(device.live_pipeline_layouts(), 2);
    }

    assert_eq!(device.live_pipelines(), 0);
    assert_eq!(device.live_pipeline_layouts(), 0);
    assert_eq!(device.live_shader_modules(), 0);
    assert_eq!(device.invalid_destroys(), 0);
}
