//! Sass compilation.

use std::path::{Path, PathBuf};

/// Output style requested from the Sass compiler
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SassStyle {
    /// Readable output
    Expanded,
    /// Whitespace stripped
    Compressed,
}

/// One stylesheet compiled to CSS
#[derive(Debug, Clone)]
pub struct CompiledSheet {
    /// Source file
    pub path: PathBuf,
    /// Compiled CSS
    pub css: String,
}

/// Whether a file is a partial (`_name.scss`), only compiled through imports.
pub fn is_partial(path: &Path) -> bool {
    path.file_name().and_then(|n| n.to_str()).map(|n| n.starts_with('_')).unwrap_or(false)
}

/// Compile one stylesheet.
///
/// `include_paths` are added to the Sass load path after the file's own
/// directory.
pub fn compile_sass(path: &Path, style: SassStyle, include_paths: &[PathBuf]) -> Result<CompiledSheet, String> {
    if path.extension().and_then(|e| e.to_str()) == Some("sass") {
        return Err("indented syntax (.sass) is not supported, convert the file to .scss".to_string());
    }

    let output_style = match style {
        SassStyle::Expanded => grass::OutputStyle::Expanded,
        SassStyle::Compressed => grass::OutputStyle::Compressed,
    };
    let options = grass::Options::default().style(output_style).load_paths(include_paths);

    let css = grass::from_path(path, &options).map_err(|e| e.to_string())?;
    Ok(CompiledSheet { path: path.to_path_buf(), css })
}
