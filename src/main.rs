//! `kiln` shader tool
//!
//! `kiln check [--config FILE] [--emit DIR] <shader>...` compiles shaders the way the
//! engine does and reports diagnostics.
//! `kiln watch [--config FILE] [--emit DIR] <dir>` recompiles shaders as they change.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use kiln_engine::{EngineConfig, ShaderCompiler, ShaderStage};

#[derive(Parser)]
#[command(version, about = "Compile and watch GLSL shaders the way the kiln engine does")]
struct Cli {
    /// Engine configuration file (TOML)
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    /// Write `<name>.spv` for every compiled shader into this directory
    #[arg(long, short, global = true)]
    emit: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Compile shaders once and report diagnostics
    Check {
        #[arg(required = true)]
        shaders: Vec<PathBuf>,
    },
    /// Recompile shaders under a directory whenever they or their includes change
    Watch { dir: PathBuf },
}

fn load_config(path: Option<&Path>) -> Result<EngineConfig> {
    match path {
        Some(path) => Ok(EngineConfig::load(path)?),
        None => Ok(EngineConfig::default()),
    }
}

/// Compile one file; diagnostics go to the log, the included files to the caller
fn check_file(compiler: &mut ShaderCompiler, path: &Path, emit: Option<&Path>) -> Result<Vec<PathBuf>> {
    let stage = ShaderStage::from_path(path)
        .with_context(|| format!("{}: unknown shader stage extension", path.display()))?;
    let compiled = compiler.compile(path, stage)?;

    if let Some(dir) = emit {
        std::fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
        let file_name = path.file_name().context("shader path has no file name")?;
        let out = dir.join(format!("{}.spv", file_name.to_string_lossy()));
        std::fs::write(&out, compiled.as_bytes()).with_context(|| format!("writing {}", out.display()))?;
        log::info!("Wrote {}", out.display());
    }

    log::info!("{}: ok ({} words)", path.display(), compiled.spirv.len());
    Ok(compiled.includes)
}

fn check(shaders: &[PathBuf], emit: Option<&Path>, config: &EngineConfig) -> bool {
    let mut compiler = ShaderCompiler::new(&config.shaders);

    let mut failures = 0;
    for path in shaders {
        if let Err(e) = check_file(&mut compiler, path, emit) {
            log::error!("{:#}", e);
            failures += 1;
        }
    }

    if failures > 0 {
        log::error!("{} of {} shaders failed", failures, shaders.len());
    }
    failures == 0
}

/// Stage files under `dir`, recursively, in path order
#[cfg(feature = "native")]
fn stage_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut found = Vec::new();
    let mut pending = vec![dir.to_path_buf()];
    while let Some(dir) = pending.pop() {
        for entry in std::fs::read_dir(&dir).with_context(|| format!("reading {}", dir.display()))? {
            let path = entry?.path();
            if path.is_dir() {
                pending.push(path);
            } else if ShaderStage::from_path(&path).is_some() {
                found.push(path);
            }
        }
    }
    found.sort();
    Ok(found)
}

#[cfg(feature = "native")]
fn watch(dir: &Path, emit: Option<&Path>, config: &EngineConfig) -> Result<bool> {
    use kiln_engine::hot_reload::{ShaderWatcher, WatchEventType};
    use std::collections::BTreeMap;
    use std::time::Duration;

    let mut compiler = ShaderCompiler::new(&config.shaders);
    let mut watcher = ShaderWatcher::new(config.shaders.debounce_ms)?;
    watcher.watch_dir(dir)?;

    // Stage file -> files it included at its last successful compile
    let mut includes: BTreeMap<PathBuf, Vec<PathBuf>> = BTreeMap::new();
    let mut recompile = |path: &Path, includes: &mut BTreeMap<PathBuf, Vec<PathBuf>>| {
        match check_file(&mut compiler, path, emit) {
            Ok(included) => {
                includes.insert(path.to_path_buf(), included);
            }
            Err(e) => log::error!("{:#}", e),
        }
    };

    for path in stage_files(dir)? {
        recompile(&path, &mut includes);
    }

    log::info!("Watching {} (Ctrl+C to stop)", dir.display());
    loop {
        let Some(event) = watcher.wait_event(Duration::from_millis(250)) else {
            continue;
        };
        if event.event_type == WatchEventType::Deleted {
            includes.remove(&event.path);
            continue;
        }

        if ShaderStage::from_path(&event.path).is_some() {
            recompile(&event.path, &mut includes);
            continue;
        }

        let includers: Vec<PathBuf> = includes
            .iter()
            .filter(|(_, included)| included.iter().any(|file| same_file(file, &event.path)))
            .map(|(stage_file, _)| stage_file.clone())
            .collect();
        log::debug!("{} changed, {} shader(s) include it", event.path.display(), includers.len());
        for path in includers {
            recompile(&path, &mut includes);
        }
    }
}

#[cfg(feature = "native")]
fn same_file(a: &Path, b: &Path) -> bool {
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => a == b,
    }
}

#[cfg(not(feature = "native"))]
fn watch(_dir: &Path, _emit: Option<&Path>, _config: &EngineConfig) -> Result<bool> {
    anyhow::bail!("kiln was built without the `native` feature; watching is unavailable")
}

fn run(cli: Cli) -> Result<bool> {
    let config = load_config(cli.config.as_deref())?;
    kiln_engine::init_logging(&config.log.filter);

    match &cli.command {
        Command::Check { shaders } => Ok(check(shaders, cli.emit.as_deref(), &config)),
        Command::Watch { dir } => watch(dir, cli.emit.as_deref(), &config),
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let result = run(cli);
    // Errors before the configuration was read still need a logger
    kiln_engine::init_logging("info");

    match result {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            log::error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}
