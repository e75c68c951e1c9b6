//! Registry and hot-reload behaviour against the headless device

use std::fs::{self, File};
use std::path::Path;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use kiln_engine::gpu::{shared_queue, wait_idle, HeadlessDevice, SharedDeletionQueue};
use kiln_engine::pipeline::{
    ComputeConfig, GraphicsConfig, LayoutDesc, PipelineBuilder, PipelineLayoutResource, PipelineManager,
    TrackShader,
};
use kiln_engine::shader::{DirIncluder, ResourceLimits, ShaderCompiler, ShaderSet, ShaderStage};
use kiln_engine::EngineError;
use tempfile::TempDir;

const VERT: &str = "#version 450\nlayout(location = 0) out vec4 color;\nvoid main() { color = vec4(1.0); gl_Position = vec4(0.0); }\n";
const FRAG: &str = "#version 450\nlayout(location = 0) in vec4 color;\nlayout(location = 0) out vec4 outColor;\nvoid main() { outColor = color; }\n";
const COMP: &str = "#version 450\nlayout(local_size_x = 16, local_size_y = 16) in;\nvoid main() {}\n";

fn manager(root: &Path) -> (PipelineManager, SharedDeletionQueue) {
    let queue = shared_queue();
    let compiler = ShaderCompiler::with_includer(Box::new(DirIncluder::new(root, 8)), ResourceLimits::DEFAULT);
    (PipelineManager::new(queue.clone(), compiler), queue)
}

fn set_mtime(path: &Path, time: SystemTime) {
    let file = File::options().write(true).open(path).expect("open shader");
    file.set_modified(time).expect("set mtime");
}

fn at(secs: u64) -> SystemTime {
    UNIX_EPOCH + Duration::from_secs(secs)
}

fn graphics_config() -> GraphicsConfig {
    let mut builder = PipelineBuilder::new();
    builder
        .disable_blending()
        .enable_depthtest(true, wgpu::CompareFunction::GreaterEqual)
        .set_color_attachment_format(wgpu::TextureFormat::Rgba16Float)
        .set_depth_format(wgpu::TextureFormat::Depth32Float);
    builder.config().clone()
}

#[test]
fn mesh_touch_vertex_rebuilds_once() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let root = temp_dir.path();
    let (vert, frag) = (root.join("v.vert"), root.join("f.frag"));
    fs::write(&vert, VERT).expect("write vert");
    fs::write(&frag, FRAG).expect("write frag");
    set_mtime(&vert, at(1_800_000_000));
    set_mtime(&frag, at(1_800_000_000));

    let device = HeadlessDevice::new();
    let (mut manager, queue) = manager(root);
    let layout = PipelineLayoutResource::create_owned(&device, "mesh", &LayoutDesc::default()).expect("layout");
    let resource = manager
        .build_graphics(&device, "mesh", ShaderSet::graphics(&vert, &frag), graphics_config(), layout)
        .expect("initial build");
    let id = manager.manage(resource, TrackShader::Yes, None).expect("manage");
    let old = manager.get_pipeline(id);

    let t1 = at(1_800_000_100);
    set_mtime(&vert, t1);

    let idle = wait_idle(&device).expect("idle");
    let report = manager.hotload_shaders(&device, &idle).expect("hotload");
    assert_eq!(report.rebuilt, vec![id]);
    assert!(report.failed.is_empty());

    let new = manager.get_pipeline(id);
    assert_ne!(new, old);
    assert!(!new.is_null());
    assert_eq!(device.destroyed_pipelines(), vec![old]);
    assert_eq!(device.live_pipelines(), 1);
    assert_eq!(queue.borrow().pending_pipelines(), &[new]);

    let shaders = &manager.resource(id).expect("resource").shaders;
    assert_eq!(shaders.slot(ShaderStage::Vertex).last_modified, Some(t1));

    // Nothing changed since: a second pass is a no-op
    let report = manager.hotload_shaders(&device, &idle).expect("hotload");
    assert!(report.is_empty());
    assert_eq!(manager.get_pipeline(id), new);
}

#[test]
fn failing_rebuild_does_not_block_others() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let root = temp_dir.path();
    let (a_path, b_path) = (root.join("a.comp"), root.join("b.comp"));
    fs::write(&a_path, COMP).expect("write a");
    fs::write(&b_path, COMP).expect("write b");
    set_mtime(&a_path, at(1_800_000_000));
    set_mtime(&b_path, at(1_800_000_000));

    let device = HeadlessDevice::new();
    let (mut manager, _queue) = manager(root);

    let mut ids = Vec::new();
    for (name, path) in [("a", &a_path), ("b", &b_path)] {
        let layout = PipelineLayoutResource::create_owned(&device, name, &LayoutDesc::default()).expect("layout");
        let resource = manager
            .build_compute(&device, name, ShaderSet::compute(path), ComputeConfig::default(), layout)
            .expect("build");
        ids.push(manager.manage(resource, TrackShader::Yes, None).expect("manage"));
    }
    let (a, b) = (ids[0], ids[1]);
    let (a_old, b_old) = (manager.get_pipeline(a), manager.get_pipeline(b));

    fs::write(&a_path, "#version 450\nlayout(local_size_x = 1) in;\nvoid main() { undefined_call(); }\n")
        .expect("break a");
    set_mtime(&a_path, at(1_800_000_050));
    set_mtime(&b_path, at(1_800_000_050));

    let idle = wait_idle(&device).expect("idle");
    let report = manager.hotload_shaders(&device, &idle).expect("hotload");

    assert_eq!(report.rebuilt, vec![b]);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].0, a);
    assert!(matches!(report.failed[0].1, EngineError::Compile { .. }));
    assert_eq!(manager.get_pipeline(a), a_old);
    assert!(device.is_live_pipeline(a_old));
    assert_ne!(manager.get_pipeline(b), b_old);

    // The failed file is not re-detected until it changes again
    let report = manager.hotload_shaders(&device, &idle).expect("hotload");
    assert!(report.is_empty());

    fs::write(&a_path, COMP).expect("fix a");
    set_mtime(&a_path, at(1_800_000_090));
    let report = manager.hotload_shaders(&device, &idle).expect("hotload");
    assert_eq!(report.rebuilt, vec![a]);
}

#[test]
fn shared_layout_is_registered_once() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let root = temp_dir.path();
    let (vert, frag) = (root.join("mesh.vert"), root.join("mesh.frag"));
    fs::write(&vert, VERT).expect("write vert");
    fs::write(&frag, FRAG).expect("write frag");

    let device = HeadlessDevice::new();
    let (mut manager, queue) = manager(root);
    let mut mat_layout =
        PipelineLayoutResource::create_shared(&device, "matLayout", &LayoutDesc::default()).expect("layout");

    let mut ids = Vec::new();
    for name in ["opaque", "transparent"] {
        let resource = manager
            .build_graphics(
                &device,
                name,
                ShaderSet::graphics(&vert, &frag),
                graphics_config(),
                PipelineLayoutResource::member_of(&mat_layout),
            )
            .expect("build");
        ids.push(manager.manage(resource, TrackShader::Yes, Some(&mut mat_layout)).expect("manage"));
    }

    let layout_id = mat_layout.id.expect("shared layout id");
    assert_eq!(manager.layout_count(), 1);
    assert_eq!(manager.get_layout(layout_id), mat_layout.handle);
    assert_eq!(manager.shared_layout_members(layout_id), ids.as_slice());
    assert_eq!(queue.borrow().pending_pipeline_layouts(), &[mat_layout.handle]);
    for id in &ids {
        let resource = manager.resource(*id).expect("resource");
        assert_eq!(resource.layout_id, Some(layout_id));
        assert_eq!(resource.layout.handle, mat_layout.handle);
    }

    // Both members depend on the same files
    assert_eq!(manager.tracker().dependents(&vert), ids.as_slice());
}

#[test]
fn missing_file_is_retried_next_scan() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let root = temp_dir.path();
    let path = root.join("sky.comp");
    fs::write(&path, COMP).expect("write");
    set_mtime(&path, at(1_800_000_000));

    let device = HeadlessDevice::new();
    let (mut manager, _queue) = manager(root);
    let resource = manager
        .build_compute(
            &device,
            "sky",
            ShaderSet::compute(&path),
            ComputeConfig::default(),
            PipelineLayoutResource::uninitialized(),
        )
        .expect("build");
    let id = manager.manage(resource, TrackShader::Yes, None).expect("manage");

    let moved = root.join("sky.comp.bak");
    fs::rename(&path, &moved).expect("move away");
    let idle = wait_idle(&device).expect("idle");
    let report = manager.hotload_shaders(&device, &idle).expect("hotload");
    assert!(report.rebuilt.is_empty());
    assert_eq!(report.scan_failures.len(), 1);
    assert_eq!(report.scan_failures[0].dependents, vec![id]);
    assert!(matches!(report.scan_failures[0].error, EngineError::FileAccess { .. }));
    assert_eq!(
        manager.resource(id).expect("resource").shaders.compute.last_modified,
        Some(at(1_800_000_000))
    );

    fs::rename(&moved, &path).expect("move back");
    set_mtime(&path, at(1_800_000_200));
    let report = manager.hotload_shaders(&device, &idle).expect("hotload");
    assert_eq!(report.rebuilt, vec![id]);
    assert!(report.scan_failures.is_empty());
}

#[test]
fn flush_destroys_everything_once() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let root = temp_dir.path();
    let (vert, frag, comp) = (root.join("m.vert"), root.join("m.frag"), root.join("g.comp"));
    fs::write(&vert, VERT).expect("write vert");
    fs::write(&frag, FRAG).expect("write frag");
    fs::write(&comp, COMP).expect("write comp");
    set_mtime(&comp, at(1_800_000_000));

    let device = HeadlessDevice::new();
    let (mut manager, queue) = manager(root);

    let mut shared = PipelineLayoutResource::create_shared(&device, "shared", &LayoutDesc::default()).expect("layout");
    for name in ["opaque", "transparent"] {
        let resource = manager
            .build_graphics(
                &device,
                name,
                ShaderSet::graphics(&vert, &frag),
                graphics_config(),
                PipelineLayoutResource::member_of(&shared),
            )
            .expect("build");
        manager.manage(resource, TrackShader::No, Some(&mut shared)).expect("manage");
    }
    let private = PipelineLayoutResource::create_owned(&device, "gradient", &LayoutDesc::default()).expect("layout");
    let resource = manager
        .build_compute(&device, "gradient", ShaderSet::compute(&comp), ComputeConfig::default(), private)
        .expect("build");
    let gradient = manager.manage(resource, TrackShader::Yes, None).expect("manage");

    // A rebuild swaps one queued handle for another
    set_mtime(&comp, at(1_800_000_010));
    let idle = wait_idle(&device).expect("idle");
    let report = manager.hotload_shaders(&device, &idle).expect("hotload");
    assert_eq!(report.rebuilt, vec![gradient]);

    let external = std::rc::Rc::new(std::cell::Cell::new(0));
    let counter = external.clone();
    queue.borrow_mut().push_deletor(move |_device| counter.set(counter.get() + 1));

    assert_eq!(device.live_pipelines(), 3);
    assert_eq!(device.live_pipeline_layouts(), 2);

    let idle = wait_idle(&device).expect("idle");
    queue.borrow_mut().flush(&device, &idle);
    assert_eq!(device.live_pipelines(), 0);
    assert_eq!(device.live_pipeline_layouts(), 0);
    assert_eq!(device.invalid_destroys(), 0);
    assert_eq!(external.get(), 1);
    assert!(queue.borrow().is_empty());

    // Flushing an empty queue is harmless
    queue.borrow_mut().flush(&device, &idle);
    assert_eq!(device.invalid_destroys(), 0);
}

#[test]
fn editing_an_include_rebuilds_its_includers() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let root = temp_dir.path();
    let (common, a, b) = (root.join("common.glsl"), root.join("a.comp"), root.join("b.comp"));
    fs::write(&common, "const float SCALE = 1.0;\n").expect("write include");
    fs::write(
        &a,
        "#version 450\n#include \"common.glsl\" // shared constants\nlayout(local_size_x = 8) in;\nvoid main() { float s = SCALE; }\n",
    )
    .expect("write a");
    fs::write(&b, COMP).expect("write b");
    for path in [&common, &a, &b] {
        set_mtime(path, at(1_800_000_000));
    }

    let device = HeadlessDevice::new();
    let (mut manager, _queue) = manager(root);
    let mut ids = Vec::new();
    for (name, path) in [("a", &a), ("b", &b)] {
        let layout = PipelineLayoutResource::create_owned(&device, name, &LayoutDesc::default()).expect("layout");
        let resource = manager
            .build_compute(&device, name, ShaderSet::compute(path), ComputeConfig::default(), layout)
            .expect("initial build");
        ids.push(manager.manage(resource, TrackShader::Yes, None).expect("manage"));
    }
    assert_eq!(manager.tracker().dependents(&common), &[ids[0]]);

    fs::write(&common, "const float SCALE = 2.0;\n").expect("edit include");
    set_mtime(&common, at(1_800_000_100));

    let idle = wait_idle(&device).expect("idle");
    let report = manager.hotload_shaders(&device, &idle).expect("hotload");
    assert_eq!(report.rebuilt, vec![ids[0]]);
    assert!(report.failed.is_empty());
    assert_eq!(
        manager.resource(ids[0]).expect("resource").includes[&common],
        Some(at(1_800_000_100))
    );

    let again = manager.hotload_shaders(&device, &idle).expect("second hotload");
    assert!(again.is_empty());
}
