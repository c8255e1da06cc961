//! The `concat` strategy: join the sources in order, then minify once.

use super::toolchain::{check_syntax, minify};
use super::{ScriptError, PIPELINE};
use crate::build::discovery::{discover_ordered, glob_base};
use crate::build::result::PipelineResult;
use crate::build::BuildContext;
use crate::diagnostics::{display_path, Diagnostic};
use parcel_sourcemap::{OriginalLocation, SourceMap};
use rayon::prelude::*;
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};

/// One source file, read and syntax-checked
#[derive(Debug, Clone)]
pub struct Chunk {
    /// Source file
    pub path: PathBuf,
    /// File contents
    pub code: String,
}

/// Concatenated script with its source map.
#[derive(Debug, Clone)]
pub struct Joined {
    /// Script text
    pub code: String,
    /// Source map JSON
    pub map: String,
}

/// Join chunks in order.
///
/// Every generated line maps to the same line of the file it came from.
pub fn join_chunks(chunks: &[Chunk], sources_base: &Path, map_root: &str) -> Result<Joined, String> {
    let mut source_map = SourceMap::new(&sources_base.to_string_lossy());
    let mut code = String::new();
    let mut line = 0u32;

    for chunk in chunks {
        let source = source_map.add_source(&chunk.path.to_string_lossy());
        let text = chunk.code.trim_end();
        for (original_line, _) in text.lines().enumerate() {
            source_map.add_mapping(
                line,
                0,
                Some(OriginalLocation { original_line: original_line as u32, original_column: 0, source, name: None }),
            );
            line += 1;
        }
        code.push_str(text);
        code.push('\n');
    }

    let map = source_map.to_json(Some(map_root)).map_err(|e| format!("{:?}", e))?;
    Ok(Joined { code, map })
}

/// Minify a joined script once, composing the source maps so the result
/// points at the original files.
pub fn minify_joined(joined: &Joined, name: &str, map_root: &str) -> Result<Joined, String> {
    // Sources stay relative through the minifier; the root is set on the result
    let mut input: Value = serde_json::from_str(&joined.map).map_err(|e| e.to_string())?;
    if let Some(fields) = input.as_object_mut() {
        fields.remove("sourceRoot");
    }

    let minified = minify(name, &joined.code, Some(&input.to_string()))?;
    let map = match minified.map {
        Some(map) => {
            let mut map: Value = serde_json::from_str(&map).map_err(|e| e.to_string())?;
            map["sourceRoot"] = Value::from(map_root);
            map["file"] = Value::from(name);
            map.to_string()
        }
        None => joined.map.clone(),
    };
    Ok(Joined { code: minified.code, map })
}

/// Run the `concat` strategy once.
///
/// Any file that fails to read or parse is reported and nothing is
/// written for this run.
pub fn run(ctx: &BuildContext, result: &mut PipelineResult) -> Result<(), ScriptError> {
    let settings = ctx.settings();
    let root = ctx.project_root();

    let files = discover_ordered(root, &settings.js_src)?;
    result.sources = files.len();
    if files.is_empty() {
        tracing::debug!("no scripts match {:?}", settings.js_src);
        return Ok(());
    }

    let checked: Vec<Result<Chunk, (PathBuf, String)>> = files
        .par_iter()
        .map(|path| {
            let code = fs::read_to_string(path).map_err(|e| (path.clone(), e.to_string()))?;
            check_syntax(&display_path(path, root), &code).map_err(|e| (path.clone(), e))?;
            Ok(Chunk { path: path.clone(), code })
        })
        .collect();

    let mut chunks = Vec::with_capacity(checked.len());
    for entry in checked {
        match entry {
            Ok(chunk) => chunks.push(chunk),
            Err((path, message)) => {
                result.add_diagnostic(Diagnostic::in_file(PIPELINE, display_path(&path, root), message));
            }
        }
    }
    if !result.diagnostics.is_empty() {
        return Ok(());
    }

    let dest = ctx.js_dest();
    let js_path = dest.join(&settings.js_bundle);
    let map_name = format!("{}.map", settings.js_bundle);
    let map_path = dest.join(&map_name);

    let sources_base = settings.js_src.first().map(|p| ctx.resolve_path(&glob_base(p))).unwrap_or_default();
    let joined = join_chunks(&chunks, &sources_base, &settings.js_map_root).map_err(ScriptError::SourceMap)?;
    let minified = match minify_joined(&joined, &settings.js_bundle, &settings.js_map_root) {
        Ok(minified) => minified,
        Err(message) => {
            result.add_diagnostic(Diagnostic::new(PIPELINE, message));
            return Ok(());
        }
    };
    let code = format!("{}\n//# sourceMappingURL={}\n", minified.code.trim_end(), map_name);

    fs::create_dir_all(&dest).map_err(|e| ScriptError::Io(dest.clone(), e))?;
    fs::write(&js_path, code).map_err(|e| ScriptError::Io(js_path.clone(), e))?;
    fs::write(&map_path, minified.map).map_err(|e| ScriptError::Io(map_path.clone(), e))?;

    tracing::debug!("wrote {} from {} files", js_path.display(), chunks.len());
    result.outputs.push(js_path);
    result.outputs.push(map_path);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(path: &str, code: &str) -> Chunk {
        Chunk { path: PathBuf::from(path), code: code.to_string() }
    }

    #[test]
    fn test_join_chunks_order_and_map() {
        let chunks = vec![
            chunk("/p/src/code/vendor/lib.js", "var lib=1;"),
            chunk("/p/src/code/app.js", "lib++;\nrun();\n"),
        ];
        let joined = join_chunks(&chunks, Path::new("/p/src/code"), "../../src/code/").unwrap();

        assert_eq!(joined.code, "var lib=1;\nlib++;\nrun();\n");

        let map: serde_json::Value = serde_json::from_str(&joined.map).unwrap();
        assert_eq!(map["sourceRoot"], "../../src/code/");
        assert_eq!(map["sources"][0], "vendor/lib.js");
        assert_eq!(map["sources"][1], "app.js");
        // One segment per generated line, the last one on line 2 of app.js
        let mappings = map["mappings"].as_str().unwrap();
        assert_eq!(mappings.split(';').count(), 3);
        assert_eq!(mappings.split(';').last(), Some("AACA"));
    }

    #[test]
    fn test_join_no_chunks() {
        let joined = join_chunks(&[], Path::new("/p"), "").unwrap();
        assert_eq!(joined.code, "");
    }

    #[test]
    fn test_minify_joined_hoists_across_files() {
        let chunks = vec![
            chunk("/p/src/code/boot.js", "helper();\n"),
            chunk("/p/src/code/helper.js", "function helper() {\n  window.helped = true;\n}\n"),
        ];
        let joined = join_chunks(&chunks, Path::new("/p/src/code"), "../../src/code/").unwrap();
        let minified = minify_joined(&joined, "app.js", "../../src/code/").unwrap();

        // The call still reaches a hoisted declaration in the same script
        assert!(minified.code.contains("function helper("), "{}", minified.code);
        assert!(!minified.code.contains("=>"));
        assert!(!minified.code.contains("let "));

        let map: serde_json::Value = serde_json::from_str(&minified.map).unwrap();
        assert_eq!(map["sourceRoot"], "../../src/code/");
        assert_eq!(map["file"], "app.js");
        let sources: Vec<&str> = map["sources"].as_array().unwrap().iter().filter_map(|s| s.as_str()).collect();
        assert!(sources.iter().any(|s| s.ends_with("boot.js")), "{:?}", sources);
        assert!(sources.iter().any(|s| s.ends_with("helper.js")), "{:?}", sources);
    }
}
