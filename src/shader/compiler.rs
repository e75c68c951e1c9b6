//! GLSL to SPIR-V compilation
//!
//! Source text is read from disk, `#include` directives are expanded through an
//! [`Includer`], the result is parsed by naga's GLSL front end, validated, checked
//! against [`ResourceLimits`] and lowered to SPIR-V words for the driver.

use std::fs;
use std::path::{Path, PathBuf};

use naga::back::spv;
use naga::front::glsl;
use naga::valid::{Capabilities, ValidationFlags, Validator};

use super::includer::{expand_includes, DirIncluder, ExpandedSource, Includer};
use super::limits::ResourceLimits;
use super::ShaderStage;
use crate::config::ShaderConfig;
use crate::error::{io_error, EngineError, EngineResult};

/// `#version` assumed for sources that do not declare one
pub const DEFAULT_GLSL_VERSION: u32 = 450;

/// SPIR-V version every module is emitted as
pub const TARGET_SPIRV_VERSION: (u8, u8) = (1, 0);

/// Entry point name of every GLSL stage
pub const ENTRY_POINT: &str = "main";

/// SPIR-V produced for one stage file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledShader {
    pub stage: ShaderStage,
    pub source_path: PathBuf,
    pub spirv: Vec<u32>,
    /// Files pulled in through `#include`
    pub includes: Vec<PathBuf>,
}

impl CompiledShader {
    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.spirv)
    }
}

/// Compiles shader source files into SPIR-V
pub struct ShaderCompiler {
    includer: Box<dyn Includer>,
    limits: ResourceLimits,
    frontend: glsl::Frontend,
}

impl ShaderCompiler {
    /// Compiler resolving includes against the configured include root
    pub fn new(config: &ShaderConfig) -> Self {
        Self::with_includer(
            Box::new(DirIncluder::new(&config.include_root, config.max_include_depth)),
            ResourceLimits::DEFAULT,
        )
    }

    pub fn with_includer(includer: Box<dyn Includer>, limits: ResourceLimits) -> Self {
        Self {
            includer,
            limits,
            frontend: glsl::Frontend::default(),
        }
    }

    pub fn limits(&self) -> &ResourceLimits {
        &self.limits
    }

    /// Compile one source file for `stage`
    pub fn compile(&mut self, path: &Path, stage: ShaderStage) -> EngineResult<CompiledShader> {
        let source = fs::read_to_string(path).map_err(|e| io_error(path, e))?;
        let compiled = self.compile_source(&source, path, stage)?;

        log::debug!(
            "[ShaderCompiler::compile] Compiled {} ({} stage, {} words, {} includes)",
            path.display(),
            stage,
            compiled.spirv.len(),
            compiled.includes.len()
        );
        Ok(compiled)
    }

    /// Compile in-memory source text; `path` anchors relative includes and diagnostics
    pub fn compile_source(
        &mut self,
        source: &str,
        path: &Path,
        stage: ShaderStage,
    ) -> EngineResult<CompiledShader> {
        let naga_stage = match stage {
            ShaderStage::Vertex => naga::ShaderStage::Vertex,
            ShaderStage::Fragment => naga::ShaderStage::Fragment,
            ShaderStage::Compute => naga::ShaderStage::Compute,
            ShaderStage::Geometry => {
                return Err(shader_compile_error(
                    path,
                    "geometry shaders are not supported by the GLSL front end",
                ))
            }
        };

        self.includer.reset();
        let expanded = expand_includes(source, path, self.includer.as_mut(), 0)?;
        let text = with_version_directive(&expanded.text);
        let prepended_lines = usize::from(text.len() != expanded.text.len());

        let module = self
            .frontend
            .parse(&glsl::Options::from(naga_stage), &text)
            .map_err(|errors| {
                shader_compile_error(path, frontend_diagnostic(&errors, &text, &expanded, prepended_lines))
            })?;

        self.check_limits(&module, naga_stage)
            .map_err(|message| shader_compile_error(path, message))?;

        let info = Validator::new(ValidationFlags::all(), Capabilities::all())
            .validate(&module)
            .map_err(|e| shader_compile_error(path, diagnostic_chain(&e)))?;

        let options = spv::Options {
            lang_version: TARGET_SPIRV_VERSION,
            ..spv::Options::default()
        };
        let pipeline_options = spv::PipelineOptions {
            shader_stage: naga_stage,
            entry_point: ENTRY_POINT.to_string(),
        };

        let spirv = spv::write_vec(&module, &info, &options, Some(&pipeline_options))
            .map_err(|e| shader_compile_error(path, diagnostic_chain(&e)))?;

        Ok(CompiledShader {
            stage,
            source_path: path.to_path_buf(),
            spirv,
            includes: expanded.includes,
        })
    }

    fn check_limits(&self, module: &naga::Module, stage: naga::ShaderStage) -> Result<(), String> {
        let Some(entry) = module
            .entry_points
            .iter()
            .find(|ep| ep.stage == stage && ep.name == ENTRY_POINT)
        else {
            return Err(format!("no `{}` entry point for the {:?} stage", ENTRY_POINT, stage));
        };

        match stage {
            naga::ShaderStage::Compute => self.limits.check_work_group_size(entry.workgroup_size),
            naga::ShaderStage::Vertex => {
                let inputs = entry
                    .function
                    .arguments
                    .iter()
                    .map(|arg| count_locations(module, arg.ty, arg.binding.as_ref()))
                    .sum();
                self.limits.check_vertex_inputs(inputs)
            }
            naga::ShaderStage::Fragment => {
                let outputs = entry
                    .function
                    .result
                    .as_ref()
                    .map(|result| count_locations(module, result.ty, result.binding.as_ref()))
                    .unwrap_or(0);
                self.limits.check_fragment_outputs(outputs)
            }
        }
    }
}

/// Number of user locations behind an entry point argument or result
fn count_locations(
    module: &naga::Module,
    ty: naga::Handle<naga::Type>,
    binding: Option<&naga::Binding>,
) -> usize {
    match binding {
        Some(naga::Binding::Location { .. }) => 1,
        Some(naga::Binding::BuiltIn(_)) => 0,
        None => match module.types[ty].inner {
            naga::TypeInner::Struct { ref members, .. } => members
                .iter()
                .map(|member| count_locations(module, member.ty, member.binding.as_ref()))
                .sum(),
            _ => 0,
        },
    }
}

/// Prepend `#version` when the source has none
fn with_version_directive(source: &str) -> String {
    let has_version = source
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty() && !line.starts_with("//"))
        .map(|line| line.starts_with("#version"))
        .unwrap_or(false);

    if has_version {
        source.to_string()
    } else {
        format!("#version {}\n{}", DEFAULT_GLSL_VERSION, source)
    }
}

/// One `file:line:column: message` line per front end error
///
/// Spans index into the parsed text; they are mapped back through the include
/// expansion so locations point into the file the user edited.
fn frontend_diagnostic(
    errors: &[glsl::Error],
    parsed: &str,
    expanded: &ExpandedSource,
    prepended_lines: usize,
) -> String {
    let mut lines = Vec::with_capacity(errors.len());
    for error in errors {
        if error.meta.to_range().map_or(true, |range| !parsed.is_char_boundary(range.start)) {
            lines.push(error.to_string());
            continue;
        }
        let location = error.meta.location(parsed);
        let origin = (location.line_number as usize)
            .checked_sub(prepended_lines)
            .and_then(|line| expanded.locate(line));
        match origin {
            Some((file, line)) => lines.push(format!(
                "{}:{}:{}: {}",
                file.display(),
                line,
                location.line_position,
                error
            )),
            None => lines.push(format!(
                "{}:{}: {}",
                location.line_number, location.line_position, error
            )),
        }
    }
    lines.join("\n")
}

/// Flatten an error and its sources into diagnostic text
fn diagnostic_chain(error: &dyn std::error::Error) -> String {
    let mut text = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        text.push_str("\n  caused by: ");
        text.push_str(&cause.to_string());
        source = cause.source();
    }
    text
}

/// Create a shader compilation error
pub fn shader_compile_error(path: &Path, diagnostic: impl Into<String>) -> EngineError {
    EngineError::Compile {
        path: path.to_path_buf(),
        diagnostic: diagnostic.into(),
    }
}
