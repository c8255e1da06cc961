//! Vendor prefixing, minification and source maps for compiled CSS.
//!
//! Every compiled sheet is parsed separately with its own source index so
//! the printed source map points back at the original files, then the rule
//! lists are joined into one stylesheet in input order.

use super::compile::CompiledSheet;
use crate::diagnostics::Diagnostic;
use lightningcss::rules::CssRuleList;
use lightningcss::stylesheet::{MinifyOptions, ParserOptions, PrinterOptions, StyleSheet};
use lightningcss::targets::{Browsers, Targets};
use parcel_sourcemap::SourceMap;
use std::path::{Path, PathBuf};

/// Options for [`postprocess`]
#[derive(Debug, Clone)]
pub struct PostprocessOptions {
    /// Browser support queries
    pub browsers: Vec<String>,
    /// Minify the printed CSS
    pub minify: bool,
    /// Directory source paths are made relative to
    pub sources_base: PathBuf,
    /// `sourceRoot` written into the map
    pub map_root: String,
}

/// Printed stylesheet and its map
#[derive(Debug, Clone)]
pub struct Postprocessed {
    /// CSS without the `sourceMappingURL` comment
    pub css: String,
    /// Source map JSON
    pub map: String,
    /// Sheets that made it into the output
    pub included: Vec<PathBuf>,
}

/// Resolve browser queries into lightningcss targets.
pub fn resolve_targets(queries: &[String]) -> Result<Targets, String> {
    if queries.is_empty() {
        return Ok(Targets::default());
    }
    let browsers: Option<Browsers> =
        Browsers::from_browserslist(queries.iter().map(String::as_str)).map_err(|e| e.to_string())?;
    Ok(browsers.map(Targets::from).unwrap_or_default())
}

/// Prefix, optionally minify, and print `sheets` as one stylesheet.
///
/// Sheets that fail to parse are dropped with a diagnostic. Returns `None`
/// when no sheet survived.
pub fn postprocess(
    sheets: &[CompiledSheet],
    options: &PostprocessOptions,
) -> (Option<Postprocessed>, Vec<Diagnostic>) {
    let mut diagnostics = Vec::new();

    let targets = match resolve_targets(&options.browsers) {
        Ok(targets) => targets,
        Err(e) => {
            diagnostics.push(Diagnostic::new("style", format!("invalid prefixer query: {}", e)));
            Targets::default()
        }
    };

    let mut rules = Vec::new();
    let mut sources = Vec::new();
    let mut included = Vec::new();
    for sheet in sheets {
        let filename = sheet.path.to_string_lossy().into_owned();
        let parser_options = ParserOptions {
            filename: filename.clone(),
            source_index: sources.len() as u32,
            ..ParserOptions::default()
        };
        match StyleSheet::parse(&sheet.css, parser_options) {
            Ok(parsed) => {
                rules.extend(parsed.rules.0);
                sources.push(filename);
                included.push(sheet.path.clone());
            }
            Err(e) => {
                diagnostics.push(Diagnostic::in_file("style", &sheet.path, e.to_string()));
            }
        }
    }

    if included.is_empty() {
        return (None, diagnostics);
    }

    let mut merged = StyleSheet::new(sources.clone(), CssRuleList(rules), ParserOptions::default());
    if let Err(e) = merged.minify(MinifyOptions { targets, ..MinifyOptions::default() }) {
        diagnostics.push(Diagnostic::new("style", format!("minify failed: {}", e)));
        return (None, diagnostics);
    }

    let mut source_map = SourceMap::new(&options.sources_base.to_string_lossy());
    for source in &sources {
        source_map.add_source(source);
    }

    let printed = merged.to_css(PrinterOptions {
        minify: options.minify,
        source_map: Some(&mut source_map),
        targets,
        ..PrinterOptions::default()
    });
    let css = match printed {
        Ok(result) => result.code,
        Err(e) => {
            diagnostics.push(Diagnostic::new("style", format!("print failed: {}", e)));
            return (None, diagnostics);
        }
    };

    let map = match source_map.to_json(Some(&options.map_root)) {
        Ok(map) => map,
        Err(e) => {
            diagnostics.push(Diagnostic::new("style", format!("source map failed: {:?}", e)));
            return (None, diagnostics);
        }
    };

    (Some(Postprocessed { css, map, included }), diagnostics)
}

/// Comment linking a stylesheet to its map.
pub fn map_comment(map_file: &Path) -> String {
    let name = map_file.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
    format!("/*# sourceMappingURL={} */", name)
}
