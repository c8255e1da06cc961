//! The `bundle` strategy: one self-contained script per named entry.

use super::graph::{ModuleGraph, Resolver};
use super::runtime::{render_bundle, RenderedModule};
use super::toolchain::minify;
use super::{ScriptError, PIPELINE};
use crate::build::result::PipelineResult;
use crate::build::BuildContext;
use crate::diagnostics::{display_path, Diagnostic};
use std::fs;
use std::path::{Path, PathBuf};

/// A bundle ready to be written
#[derive(Debug, Clone)]
pub struct Bundle {
    /// Entry name, also the output file stem
    pub name: String,
    /// Bundle code
    pub code: String,
    /// Number of modules included
    pub modules: usize,
}

/// Build the bundle of one entry.
///
/// Modules are lowered to ES5 while the graph is built. A production
/// bundle is then minified as a whole, polyfills and loader included.
pub fn build_entry(
    name: &str,
    entries: &[PathBuf],
    resolver: &Resolver,
    root: &Path,
    production: bool,
) -> Result<Bundle, Vec<Diagnostic>> {
    let graph = ModuleGraph::build(entries, resolver, production).map_err(|e| {
        let diagnostic = match e.file() {
            Some(file) => Diagnostic::in_file(PIPELINE, display_path(file, root), e.to_string()),
            None => Diagnostic::new(PIPELINE, e.to_string()),
        };
        vec![diagnostic]
    })?;

    let rendered: Vec<RenderedModule> = graph
        .modules
        .into_iter()
        .map(|module| RenderedModule {
            id: module.id,
            label: format!("./{}", display_path(&module.path, root)),
            body: module.code,
            dependencies: module.dependencies,
        })
        .collect();

    let code = render_bundle(&rendered, &graph.entries, !production);
    let code = if production {
        minify(&format!("{}.js", name), &code, None)
            .map(|minified| minified.code)
            .map_err(|e| vec![Diagnostic::new(PIPELINE, format!("{}: {}", name, e))])?
    } else {
        code
    };

    Ok(Bundle { name: name.to_string(), code, modules: rendered.len() })
}

/// Run the `bundle` strategy once.
///
/// Every entry is built before anything is written. If any entry has
/// errors, no bundle is written for this run.
pub fn run(ctx: &BuildContext, result: &mut PipelineResult) -> Result<(), ScriptError> {
    let settings = ctx.settings();
    let root = ctx.project_root();
    let resolver = Resolver::new(root).with_aliases(settings.alias.clone());

    let mut bundles = Vec::with_capacity(settings.js_entry.len());
    for (name, files) in &settings.js_entry {
        let entries: Vec<PathBuf> = files.iter().map(|f| ctx.resolve_path(f)).collect();
        match build_entry(name, &entries, &resolver, root, ctx.is_production()) {
            Ok(bundle) => {
                result.sources += bundle.modules;
                bundles.push(bundle);
            }
            Err(diagnostics) => {
                for diagnostic in diagnostics {
                    result.add_diagnostic(diagnostic);
                }
            }
        }
    }
    if !result.diagnostics.is_empty() {
        return Ok(());
    }

    let dest = ctx.js_dest();
    fs::create_dir_all(&dest).map_err(|e| ScriptError::Io(dest.clone(), e))?;
    for bundle in bundles {
        let path = dest.join(format!("{}.js", bundle.name));
        fs::write(&path, &bundle.code).map_err(|e| ScriptError::Io(path.clone(), e))?;
        tracing::debug!("wrote {} ({} modules)", path.display(), bundle.modules);
        result.outputs.push(path);
    }
    Ok(())
}
