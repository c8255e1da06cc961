//! Script pipeline.
//!
//! Two interchangeable strategies selected by `js_tasker`:
//!
//! - **concat**: join every file matched by `js_src` in glob order, then
//!   minify the result once, with a source map back to each file.
//! - **bundle**: resolve the module graph of every named entry, lower each
//!   module to ES5 CommonJS onto a small embedded runtime and write one
//!   self-contained script per entry.
//!
//! Either way the pipeline asks connected browsers to reload after a run.

pub mod bundle;
pub mod concat;
pub mod graph;
pub mod runtime;
pub mod toolchain;

use crate::build::discovery::{glob_base, DiscoveryError};
use crate::build::progress::{report_result, Reporter};
use crate::build::result::PipelineResult;
use crate::build::signal::FirstRun;
use crate::build::BuildContext;
use crate::config::ScriptStrategy;
use crate::diagnostics::{Diagnostic, ErrorTracker};
use crate::server::livereload::LiveReload;
use crate::watch::{watch_loop, ChangeWatcher, WatchError};
use std::path::PathBuf;
use std::time::{Duration, Instant};
use thiserror::Error;

/// Pipeline name used in diagnostics and progress output
pub const PIPELINE: &str = "script";

/// Errors that abort a script run as a whole
#[derive(Debug, Error)]
pub enum ScriptError {
    /// Source discovery failed
    #[error("{0}")]
    Discovery(#[from] DiscoveryError),

    /// Output could not be written
    #[error("Failed to write {0}: {1}")]
    Io(PathBuf, std::io::Error),

    /// Source map could not be serialized
    #[error("Failed to write source map: {0}")]
    SourceMap(String),

    /// The resident watcher failed
    #[error("{0}")]
    Watch(#[from] WatchError),
}

/// One script pipeline, run once or kept resident.
pub struct ScriptPipeline<'a> {
    ctx: &'a BuildContext,
    live: Option<LiveReload>,
}

impl<'a> ScriptPipeline<'a> {
    /// Create a pipeline for `ctx`.
    pub fn new(ctx: &'a BuildContext) -> Self {
        Self { ctx, live: None }
    }

    /// Reload connected browsers through `live` after each run.
    pub fn with_live_reload(mut self, live: LiveReload) -> Self {
        self.live = Some(live);
        self
    }

    /// Whether a failed run must fail the command.
    ///
    /// Only a one-shot production bundle fails hard. Concatenation errors
    /// and anything in watch mode are reported and survived.
    pub fn is_fatal(&self) -> bool {
        self.ctx.settings().js_tasker == ScriptStrategy::Bundle && self.ctx.is_production() && !self.ctx.is_watch()
    }

    /// Run the configured strategy once. Never fails: every error ends up
    /// in the result.
    pub fn run(&self) -> PipelineResult {
        let start = Instant::now();
        let mut result = PipelineResult::new(PIPELINE);

        let outcome = match self.ctx.settings().js_tasker {
            ScriptStrategy::Concat => concat::run(self.ctx, &mut result),
            ScriptStrategy::Bundle => bundle::run(self.ctx, &mut result),
        };
        if let Err(e) = outcome {
            result.add_diagnostic(Diagnostic::new(PIPELINE, e.to_string()));
        }

        let result = result.finish(start.elapsed()).with_fatal(self.is_fatal());
        if let Some(live) = &self.live {
            live.reload();
        }
        result
    }

    /// Globs whose changes trigger a rebuild.
    ///
    /// The concat sources for `concat`; every script and JSON file under
    /// the directory of each entry for `bundle`.
    pub fn watch_patterns(&self) -> Vec<String> {
        let settings = self.ctx.settings();
        match settings.js_tasker {
            ScriptStrategy::Concat => settings.js_src.clone(),
            ScriptStrategy::Bundle => {
                let mut patterns: Vec<String> = Vec::new();
                for file in settings.js_entry.values().flatten() {
                    let base = glob_base(&file.to_string_lossy());
                    let pattern = if base.as_os_str().is_empty() {
                        "**/*.{js,jsx,json}".to_string()
                    } else {
                        format!("{}/**/*.{{js,jsx,json}}", base.display())
                    };
                    if !patterns.contains(&pattern) {
                        patterns.push(pattern);
                    }
                }
                patterns
            }
        }
    }

    /// Watcher over [`ScriptPipeline::watch_patterns`].
    pub fn watcher(&self) -> Result<ChangeWatcher, WatchError> {
        let debounce = Duration::from_millis(u64::from(self.ctx.settings().debounce_ms));
        ChangeWatcher::new(self.ctx.project_root(), &self.watch_patterns(), debounce)
    }

    /// Stay resident: run once, fire `first_run`, then rebuild on change.
    pub fn watch_with(
        &self,
        watcher: &ChangeWatcher,
        reporter: &dyn Reporter,
        first_run: &FirstRun,
    ) -> Result<(), ScriptError> {
        let mut tracker = ErrorTracker::new();
        let result = self.run();
        report_result(reporter, &result, &mut tracker);
        first_run.fire();

        watch_loop(watcher, self.ctx.project_root(), reporter, |_| {
            let result = self.run();
            report_result(reporter, &result, &mut tracker);
        })?;
        Ok(())
    }
}
