//! Stylesheet pipeline.
//!
//! Compiles every non-partial stylesheet matched by `style_src`, prefixes
//! and merges the results into one output stylesheet with a source map,
//! then asks connected browsers to swap it in.

pub mod compile;
pub mod postprocess;

use crate::build::discovery::{discover_files, glob_base, DiscoveryError};
use crate::build::result::PipelineResult;
use crate::build::BuildContext;
use crate::diagnostics::{display_path, Diagnostic};
use crate::server::livereload::LiveReload;
use compile::{compile_sass, is_partial, CompiledSheet, SassStyle};
use postprocess::{map_comment, postprocess, PostprocessOptions};
use rayon::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;
use thiserror::Error;

/// Pipeline name used in diagnostics and progress output
pub const PIPELINE: &str = "style";

/// Errors that abort a style run as a whole
#[derive(Debug, Error)]
pub enum StyleError {
    /// Source discovery failed
    #[error("{0}")]
    Discovery(#[from] DiscoveryError),

    /// Output could not be written
    #[error("Failed to write {0}: {1}")]
    Io(PathBuf, std::io::Error),
}

/// One run of the style pipeline.
pub struct StylePipeline<'a> {
    ctx: &'a BuildContext,
    live: Option<LiveReload>,
}

impl<'a> StylePipeline<'a> {
    /// Create a pipeline for `ctx`.
    pub fn new(ctx: &'a BuildContext) -> Self {
        Self { ctx, live: None }
    }

    /// Push finished stylesheets through `live`.
    pub fn with_live_reload(mut self, live: LiveReload) -> Self {
        self.live = Some(live);
        self
    }

    /// Run the pipeline. Never fails: every error ends up in the result.
    pub fn run(&self) -> PipelineResult {
        let start = Instant::now();
        let mut result = PipelineResult::new(PIPELINE);

        if let Err(e) = self.build(&mut result) {
            result.add_diagnostic(Diagnostic::new(PIPELINE, e.to_string()));
        }

        let result = result.finish(start.elapsed());
        if result.status.wrote_output() {
            if let Some(live) = &self.live {
                live.inject(&[self.ctx.settings().style_bundle.clone()]);
            }
        }
        result
    }

    fn build(&self, result: &mut PipelineResult) -> Result<(), StyleError> {
        let settings = self.ctx.settings();
        let root = self.ctx.project_root();

        let files: Vec<PathBuf> = discover_files(root, &settings.style_src)?
            .into_iter()
            .filter(|path| !is_partial(path))
            .collect();
        result.sources = files.len();
        if files.is_empty() {
            tracing::debug!("no stylesheets match {}", settings.style_src);
            return Ok(());
        }

        let sheets = self.compile_all(&files, result);
        if sheets.is_empty() {
            return Ok(());
        }

        let options = PostprocessOptions {
            browsers: settings.prefixer.clone(),
            minify: self.ctx.is_production(),
            sources_base: self.ctx.resolve_path(&glob_base(&settings.style_src)),
            map_root: settings.style_map_root.clone(),
        };
        let (output, diagnostics) = postprocess(&sheets, &options);
        for diagnostic in diagnostics {
            result.add_diagnostic(relative_diagnostic(diagnostic, root));
        }
        let Some(output) = output else {
            return Ok(());
        };

        let dest = self.ctx.style_dest();
        let css_path = dest.join(&settings.style_bundle);
        let map_path = dest.join(format!("{}.map", settings.style_bundle));
        let css = format!("{}\n{}\n", output.css.trim_end(), map_comment(&map_path));

        fs::create_dir_all(&dest).map_err(|e| StyleError::Io(dest.clone(), e))?;
        fs::write(&css_path, css).map_err(|e| StyleError::Io(css_path.clone(), e))?;
        fs::write(&map_path, output.map).map_err(|e| StyleError::Io(map_path.clone(), e))?;

        tracing::debug!("wrote {} from {} sheets", css_path.display(), output.included.len());
        result.outputs.push(css_path);
        result.outputs.push(map_path);
        Ok(())
    }

    /// Compile `files` in parallel, keeping input order. Failures are
    /// recorded and dropped.
    fn compile_all(&self, files: &[PathBuf], result: &mut PipelineResult) -> Vec<CompiledSheet> {
        let style = if self.ctx.is_production() { SassStyle::Compressed } else { SassStyle::Expanded };
        let include_paths: Vec<PathBuf> =
            self.ctx.settings().include_paths.iter().map(|p| self.ctx.resolve_path(p)).collect();

        let compiled: Vec<Result<CompiledSheet, (PathBuf, String)>> = files
            .par_iter()
            .map(|path| compile_sass(path, style, &include_paths).map_err(|e| (path.clone(), e)))
            .collect();

        let root = self.ctx.project_root();
        let mut sheets = Vec::with_capacity(compiled.len());
        for entry in compiled {
            match entry {
                Ok(sheet) => sheets.push(sheet),
                Err((path, message)) => {
                    result.add_diagnostic(Diagnostic::in_file(PIPELINE, display_path(&path, root), message));
                }
            }
        }
        sheets
    }
}

fn relative_diagnostic(mut diagnostic: Diagnostic, root: &Path) -> Diagnostic {
    if let Some(file) = diagnostic.file.take() {
        diagnostic.file = Some(PathBuf::from(display_path(&file, root)));
    }
    diagnostic
}
