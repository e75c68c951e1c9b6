//! GLSL to SPIR-V compilation with includes and resource limits

use std::fs;

use kiln_engine::config::ShaderConfig;
use kiln_engine::shader::{ShaderCompiler, ShaderStage};
use kiln_engine::EngineError;
use tempfile::TempDir;

const SPIRV_MAGIC: u32 = 0x0723_0203;

fn compiler(dir: &TempDir) -> ShaderCompiler {
    let include_root = dir.path().join("include");
    fs::create_dir_all(&include_root).expect("include dir");
    ShaderCompiler::new(&ShaderConfig {
        root: dir.path().to_path_buf(),
        include_root,
        ..ShaderConfig::default()
    })
}

#[test]
fn compiles_fragment_with_shared_include() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let mut shader_compiler = compiler(&dir);
    fs::write(
        dir.path().join("include/tint.glsl"),
        "vec4 tint(vec4 c) { return c * 0.5; }\n",
    )
    .expect("write include");
    let frag = dir.path().join("mesh.frag");
    fs::write(
        &frag,
        "#version 450\n#extension GL_GOOGLE_include_directive : require\n#include <tint.glsl>\nlayout(location = 0) in vec4 color;\nlayout(location = 0) out vec4 outColor;\nvoid main() { outColor = tint(color); }\n",
    )
    .expect("write frag");

    let compiled = shader_compiler.compile(&frag, ShaderStage::Fragment).expect("compile");
    assert_eq!(compiled.stage, ShaderStage::Fragment);
    assert_eq!(compiled.includes, vec![dir.path().join("include/tint.glsl")]);
    assert_eq!(compiled.source_path, frag);
    assert_eq!(compiled.spirv[0], SPIRV_MAGIC);
    assert_eq!(compiled.as_bytes().len(), compiled.spirv.len() * 4);
}

#[test]
fn missing_include_is_an_io_error() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let comp = dir.path().join("sky.comp");
    fs::write(
        &comp,
        "#version 450\n#include \"noise.glsl\"\nlayout(local_size_x = 8) in;\nvoid main() {}\n",
    )
    .expect("write comp");

    let err = compiler(&dir).compile(&comp, ShaderStage::Compute).unwrap_err();
    assert!(matches!(err, EngineError::Io { .. }), "unexpected {:?}", err);
}

#[test]
fn oversized_workgroup_is_rejected() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let comp = dir.path().join("big.comp");
    fs::write(&comp, "#version 450\nlayout(local_size_x = 2048) in;\nvoid main() {}\n").expect("write comp");

    match compiler(&dir).compile(&comp, ShaderStage::Compute) {
        Err(EngineError::Compile { path, diagnostic }) => {
            assert_eq!(path, comp);
            assert!(diagnostic.contains("local_size_x"), "{}", diagnostic);
        }
        other => panic!("expected a compile error, got {:?}", other.map(|c| c.spirv.len())),
    }
}

#[test]
fn same_source_compiles_to_same_words() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let comp = dir.path().join("gradient_color.comp");
    fs::write(&comp, "#version 450\nlayout(local_size_x = 16, local_size_y = 16) in;\nvoid main() {}\n")
        .expect("write comp");

    let mut shader_compiler = compiler(&dir);
    let first = shader_compiler.compile(&comp, ShaderStage::Compute).expect("first");
    let second = shader_compiler.compile(&comp, ShaderStage::Compute).expect("second");
    assert_eq!(first.spirv, second.spirv);
}
