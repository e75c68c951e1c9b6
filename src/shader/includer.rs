use std::fs;
use std::path::{Path, PathBuf};

use rustc_hash::FxHashSet;

use crate::error::{io_error, EngineError, EngineResult};

/// Outcome of resolving one `#include` directive
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IncludeResult {
    /// Source text of a file that has not been pulled in yet
    Resolved { path: PathBuf, content: String },
    /// File was already spliced into this translation unit
    AlreadyIncluded(PathBuf),
}

/// Resolves `#include` directives while a shader is being compiled
///
/// Called once per directive. `reset` runs before every top-level compile so one
/// includer can be reused across files.
pub trait Includer {
    fn include(
        &mut self,
        requested: &str,
        kind: IncludeKind,
        requesting_file: &Path,
        depth: usize,
    ) -> EngineResult<IncludeResult>;

    fn reset(&mut self) {}
}

/// `#include "local"` vs `#include <system>`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IncludeKind {
    Relative,
    Standard,
}

/// Includer that resolves against a fixed include root
pub struct DirIncluder {
    include_root: PathBuf,
    max_depth: usize,
    included: FxHashSet<PathBuf>,
}

impl DirIncluder {
    pub fn new(include_root: impl Into<PathBuf>, max_depth: usize) -> Self {
        Self {
            include_root: include_root.into(),
            max_depth,
            included: FxHashSet::default(),
        }
    }

    pub fn include_root(&self) -> &Path {
        &self.include_root
    }

    /// Quoted includes try the including file's directory first, then the root.
    /// Angle-bracket includes only look in the root.
    fn resolve_include_path(
        &self,
        requested: &str,
        kind: IncludeKind,
        requesting_file: &Path,
    ) -> EngineResult<PathBuf> {
        let requested_path = Path::new(requested);

        if kind == IncludeKind::Relative {
            if let Some(dir) = requesting_file.parent() {
                let candidate = dir.join(requested_path);
                if candidate.is_file() {
                    return Ok(candidate);
                }
            }
        }

        let candidate = self.include_root.join(requested_path);
        if candidate.is_file() {
            return Ok(candidate);
        }

        Err(io_error(
            requested_path,
            format!(
                "include not found (requested by {}, root {})",
                requesting_file.display(),
                self.include_root.display()
            ),
        ))
    }
}

impl Includer for DirIncluder {
    fn include(
        &mut self,
        requested: &str,
        kind: IncludeKind,
        requesting_file: &Path,
        depth: usize,
    ) -> EngineResult<IncludeResult> {
        if depth > self.max_depth {
            return Err(EngineError::Compile {
                path: requesting_file.to_path_buf(),
                diagnostic: format!(
                    "#include nesting deeper than {} while including \"{}\"",
                    self.max_depth, requested
                ),
            });
        }

        let resolved = self.resolve_include_path(requested, kind, requesting_file)?;
        let key = resolved.canonicalize().unwrap_or_else(|_| resolved.clone());
        if !self.included.insert(key) {
            return Ok(IncludeResult::AlreadyIncluded(resolved));
        }

        let content = fs::read_to_string(&resolved).map_err(|e| io_error(&resolved, e))?;
        Ok(IncludeResult::Resolved {
            path: resolved,
            content,
        })
    }

    fn reset(&mut self) {
        self.included.clear();
    }
}

/// Parse an `#include` directive from a line; a trailing comment is allowed
fn parse_include_directive(line: &str) -> Option<(String, IncludeKind)> {
    let after_include = line.trim().strip_prefix("#include")?.trim_start();

    let (close, kind) = match after_include.chars().next()? {
        '"' => ('"', IncludeKind::Relative),
        '<' => ('>', IncludeKind::Standard),
        _ => return None,
    };
    let inner = &after_include[1..];
    let end = inner.find(close)?;
    let (name, rest) = (&inner[..end], inner[end + 1..].trim());

    let trailing_ok = rest.is_empty()
        || rest.starts_with("//")
        || (rest.starts_with("/*") && rest.ends_with("*/") && rest.len() >= 4);
    if name.is_empty() || !trailing_ok {
        return None;
    }
    Some((name.to_string(), kind))
}

/// Extensions that only tell glslang to accept `#include`; they are meaningless once
/// the directives have been expanded.
fn is_include_extension(line: &str) -> bool {
    let trimmed = line.trim();
    trimmed.starts_with("#extension")
        && (trimmed.contains("GL_GOOGLE_include_directive")
            || trimmed.contains("GL_ARB_shading_language_include"))
}

/// Where a line of expanded text came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct LineOrigin {
    file: usize,
    line: usize,
}

/// Source text with every include spliced in
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExpandedSource {
    pub text: String,
    /// Files spliced in, in first-inclusion order, without repeats
    pub includes: Vec<PathBuf>,
    /// `files[0]` is the top-level file
    files: Vec<PathBuf>,
    origins: Vec<LineOrigin>,
}

impl ExpandedSource {
    /// File and 1-based line that produced 1-based `line` of `text`
    pub fn locate(&self, line: usize) -> Option<(&Path, usize)> {
        let origin = self.origins.get(line.checked_sub(1)?)?;
        Some((self.files[origin.file].as_path(), origin.line))
    }

    fn push_line(&mut self, text: &str, file: usize, line: usize) {
        self.text.push_str(text);
        self.text.push('\n');
        self.origins.push(LineOrigin { file, line });
    }

    fn file_index(&mut self, path: &Path) -> usize {
        match self.files.iter().position(|known| known == path) {
            Some(index) => index,
            None => {
                self.files.push(path.to_path_buf());
                self.files.len() - 1
            }
        }
    }
}

/// Expand every `#include` in `content`, recursively
pub fn expand_includes(
    content: &str,
    current_file: &Path,
    includer: &mut dyn Includer,
    depth: usize,
) -> EngineResult<ExpandedSource> {
    let mut expanded = ExpandedSource {
        text: String::with_capacity(content.len()),
        ..ExpandedSource::default()
    };
    expand_into(content, current_file, includer, depth, &mut expanded)?;
    Ok(expanded)
}

fn expand_into(
    content: &str,
    current_file: &Path,
    includer: &mut dyn Includer,
    depth: usize,
    out: &mut ExpandedSource,
) -> EngineResult<()> {
    let file = out.file_index(current_file);

    for (index, line) in content.lines().enumerate() {
        let line_number = index + 1;
        if is_include_extension(line) {
            // Keep the line so numbering stays intact
            out.push_line("", file, line_number);
            continue;
        }

        let Some((include_path, kind)) = parse_include_directive(line) else {
            out.push_line(line, file, line_number);
            continue;
        };

        match includer.include(&include_path, kind, current_file, depth + 1)? {
            IncludeResult::Resolved { path, content } => {
                if !out.includes.contains(&path) {
                    out.includes.push(path.clone());
                }
                out.push_line(&format!("// Begin include: {}", include_path), file, line_number);
                expand_into(&content, &path, includer, depth + 1, out)?;
                out.push_line(&format!("// End include: {}", include_path), file, line_number);
            }
            IncludeResult::AlreadyIncluded(path) => {
                log::trace!(
                    "[expand_includes] Skipping repeated include {} in {}",
                    path.display(),
                    current_file.display()
                );
                out.push_line(
                    &format!("// Skipped repeated include: {}", include_path),
                    file,
                    line_number,
                );
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_parse_include_directive() {
        assert_eq!(
            parse_include_directive("#include \"common.glsl\""),
            Some(("common.glsl".to_string(), IncludeKind::Relative))
        );
        assert_eq!(
            parse_include_directive("  #include <lighting.glsl>"),
            Some(("lighting.glsl".to_string(), IncludeKind::Standard))
        );
        assert_eq!(parse_include_directive("#include common.glsl"), None);
        assert_eq!(parse_include_directive("#include \"\""), None);
        assert_eq!(parse_include_directive("#version 450"), None);
    }

    #[test]
    fn test_expand_relative_then_root() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let shader_dir = temp_dir.path().join("shaders");
        let include_root = temp_dir.path().join("include");
        fs::create_dir_all(&shader_dir).expect("mkdir shaders");
        fs::create_dir_all(&include_root).expect("mkdir include");

        fs::write(shader_dir.join("local.glsl"), "float local_fn() { return 1.0; }\n")
            .expect("write local");
        fs::write(include_root.join("scene.glsl"), "#include \"consts.glsl\"\nvec4 scene;\n")
            .expect("write scene");
        fs::write(include_root.join("consts.glsl"), "const float PI = 3.14159;\n")
            .expect("write consts");

        let main_path = shader_dir.join("mesh.frag");
        let source = "#version 450\n#extension GL_GOOGLE_include_directive : require\n#include \"local.glsl\"\n#include <scene.glsl>\nvoid main() {}\n";

        let mut includer = DirIncluder::new(&include_root, 8);
        let expanded = expand_includes(source, &main_path, &mut includer, 0)
            .expect("expand")
            .text;

        assert!(expanded.starts_with("#version 450\n"));
        assert!(!expanded.contains("GL_GOOGLE_include_directive"));
        assert!(expanded.contains("float local_fn()"));
        assert!(expanded.contains("const float PI"));
        assert!(expanded.contains("vec4 scene;"));
        assert!(expanded.ends_with("void main() {}\n"));
    }

    #[test]
    fn test_repeated_include_spliced_once() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        fs::write(temp_dir.path().join("a.glsl"), "int a;\n").expect("write a");
        let main_path = temp_dir.path().join("main.comp");

        let mut includer = DirIncluder::new(temp_dir.path(), 8);
        let expanded = expand_includes(
            "#include \"a.glsl\"\n#include \"a.glsl\"\n",
            &main_path,
            &mut includer,
            0,
        )
        .expect("expand")
        .text;

        assert_eq!(expanded.matches("int a;").count(), 1);
        assert!(expanded.contains("Skipped repeated include"));
    }

    #[test]
    fn test_self_include_hits_depth_limit_or_dedup() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        fs::write(temp_dir.path().join("loop.glsl"), "#include \"loop.glsl\"\n").expect("write");
        let main_path = temp_dir.path().join("main.vert");

        let mut includer = DirIncluder::new(temp_dir.path(), 4);
        let expanded = expand_includes("#include \"loop.glsl\"\n", &main_path, &mut includer, 0)
            .expect("a self include is spliced once and then skipped")
            .text;
        assert_eq!(expanded.matches("Skipped repeated include").count(), 1);
    }

    #[test]
    fn test_depth_limit() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        for i in 0..4 {
            fs::write(
                temp_dir.path().join(format!("level{}.glsl", i)),
                format!("#include \"level{}.glsl\"\n", i + 1),
            )
            .expect("write level");
        }
        fs::write(temp_dir.path().join("level4.glsl"), "int deepest;\n").expect("write leaf");
        let main_path = temp_dir.path().join("main.vert");

        let mut includer = DirIncluder::new(temp_dir.path(), 2);
        let err = expand_includes("#include \"level0.glsl\"\n", &main_path, &mut includer, 0)
            .unwrap_err();
        assert!(matches!(err, EngineError::Compile { .. }));
    }

    #[test]
    fn test_missing_include_is_io_error() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let mut includer = DirIncluder::new(temp_dir.path(), 8);
        let err = expand_includes(
            "#include <nope.glsl>\n",
            &temp_dir.path().join("x.frag"),
            &mut includer,
            0,
        )
        .unwrap_err();
        assert!(matches!(err, EngineError::Io { .. }));
    }

    #[test]
    fn test_include_with_trailing_comment() {
        assert_eq!(
            parse_include_directive("#include \"common.glsl\" // shared constants"),
            Some(("common.glsl".to_string(), IncludeKind::Relative))
        );
        assert_eq!(
            parse_include_directive("#include <scene.glsl> /* scene data */"),
            Some(("scene.glsl".to_string(), IncludeKind::Standard))
        );
        assert_eq!(parse_include_directive("#include \"a.glsl\" junk"), None);
    }

    #[test]
    fn test_expansion_records_includes_and_line_origins() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        fs::write(temp_dir.path().join("consts.glsl"), "const float A = 1.0;\nconst float B = 2.0;\n")
            .expect("write consts");
        fs::write(temp_dir.path().join("common.glsl"), "#include \"consts.glsl\"\nfloat f();\n")
            .expect("write common");
        let main_path = temp_dir.path().join("main.comp");
        let source = "#version 450\n#include \"common.glsl\" // shared\n#include \"consts.glsl\"\nvoid main() {}\n";

        let mut includer = DirIncluder::new(temp_dir.path(), 8);
        let expanded = expand_includes(source, &main_path, &mut includer, 0).expect("expand");

        assert_eq!(
            expanded.includes,
            vec![temp_dir.path().join("common.glsl"), temp_dir.path().join("consts.glsl")]
        );

        let lines: Vec<&str> = expanded.text.lines().collect();
        let b_line = lines
            .iter()
            .position(|line| line.contains("const float B"))
            .expect("consts spliced")
            + 1;
        let main_line = lines
            .iter()
            .position(|line| line.contains("void main"))
            .expect("main kept")
            + 1;

        let consts = temp_dir.path().join("consts.glsl");
        assert_eq!(expanded.locate(b_line), Some((consts.as_path(), 2)));
        assert_eq!(expanded.locate(main_line), Some((main_path.as_path(), 4)));
        assert_eq!(expanded.locate(0), None);
        assert_eq!(expanded.locate(lines.len() + 1), None);
    }
}
