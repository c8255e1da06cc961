//! Command orchestration.
//!
//! Every command builds its [`BuildMode`] once and runs in two stages:
//!
//! 1. the style and script pipelines, concurrently;
//! 2. the dev server and its watchers, started only after both stage 1
//!    pipelines reported their first completion.
//!
//! `build` stops after stage 1. `serve` skips it.

use crate::build::context::{BuildContext, BuildMode};
use crate::build::marker::{BuildMarker, MarkerError};
use crate::build::progress::{report_result, NullReporter, ProgressEvent, Reporter};
use crate::build::result::{PipelineResult, StageResult};
use crate::build::signal::FirstRun;
use crate::config::Settings;
use crate::diagnostics::{Diagnostic, ErrorTracker};
use crate::script::{ScriptError, ScriptPipeline};
use crate::server::browser::{open_browser, server_urls};
use crate::server::livereload::LiveReload;
use crate::server::{DevServer, ServerError};
use crate::style::StylePipeline;
use crate::watch::{WatchError, WatchSupervisor};
use std::path::PathBuf;
use std::sync::Arc;
use std::thread::{self, ScopedJoinHandle};
use std::time::Instant;
use thiserror::Error;

/// A top-level command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Build, watch, serve and open a browser
    Default,
    /// Build, watch and serve without opening a browser
    Watch,
    /// One-shot production build
    Build,
    /// Serve only
    Serve,
}

impl Command {
    /// Name shown in progress output.
    pub fn name(&self) -> &'static str {
        match self {
            Command::Default => "default",
            Command::Watch => "watch",
            Command::Build => "build",
            Command::Serve => "serve",
        }
    }

    /// Mode of this command. `always_open` is the `open` setting.
    pub fn mode(&self, always_open: bool) -> BuildMode {
        match self {
            Command::Default => BuildMode::development().with_watch(true).with_open(true),
            Command::Watch => BuildMode::development().with_watch(true).with_open(always_open),
            Command::Build => BuildMode::production(),
            Command::Serve => BuildMode::development().with_open(true),
        }
    }

    /// Whether the marker is set to `dirty` when the command starts.
    pub fn marks_dirty(&self) -> bool {
        !matches!(self, Command::Serve)
    }
}

/// Error that ends a command
#[derive(Debug, Error)]
pub enum BuildError {
    /// Marker could not be written
    #[error("{0}")]
    Marker(#[from] MarkerError),
    /// Dev server failed to start
    #[error("{0}")]
    Server(#[from] ServerError),
    /// A watcher failed
    #[error("{0}")]
    Watch(#[from] WatchError),
    /// The resident script pipeline failed
    #[error("{0}")]
    Script(#[from] ScriptError),
    /// A one-shot build failed
    #[error("{pipeline} pipeline failed")]
    PipelineFailed {
        /// Pipeline that failed
        pipeline: String,
    },
}

/// Runs one command.
pub struct Orchestrator {
    command: Command,
    ctx: BuildContext,
    reporter: Arc<dyn Reporter>,
}

fn join_result(handle: ScopedJoinHandle<'_, PipelineResult>, pipeline: &str) -> PipelineResult {
    handle
        .join()
        .unwrap_or_else(|_| PipelineResult::failed(pipeline, Diagnostic::new(pipeline, "pipeline panicked")))
}

impl Orchestrator {
    /// Create an orchestrator for `command`.
    pub fn new(command: Command, settings: Settings, project_root: PathBuf) -> Self {
        let mode = command.mode(settings.open);
        Self {
            command,
            ctx: BuildContext::new(settings, project_root).with_mode(mode),
            reporter: Arc::new(NullReporter::new()),
        }
    }

    /// Report progress through `reporter`.
    pub fn with_reporter(mut self, reporter: Arc<dyn Reporter>) -> Self {
        self.reporter = reporter;
        self
    }

    /// Set verbose mode.
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.ctx = self.ctx.with_verbose(verbose);
        self
    }

    /// Build context of the command.
    pub fn context(&self) -> &BuildContext {
        &self.ctx
    }

    /// Run the command.
    ///
    /// `build` returns its stage result. The resident commands only return
    /// when something fails.
    pub fn run(&self) -> Result<StageResult, BuildError> {
        let start = Instant::now();
        self.reporter.report(ProgressEvent::CommandStarted {
            command: self.command.name().to_string(),
            mode: self.ctx.mode().label().to_string(),
        });

        let marker = BuildMarker::new(self.ctx.marker_path());
        if self.command.marks_dirty() {
            marker.mark_dirty()?;
        }

        match self.command {
            Command::Build => {
                let stage = self.stage_one_once();
                let fatal = stage.pipelines.iter().find(|r| r.is_fatal_failure()).map(|r| r.pipeline.clone());
                if let Some(pipeline) = fatal {
                    self.reporter.report(ProgressEvent::CommandCompleted { success: false, duration: start.elapsed() });
                    return Err(BuildError::PipelineFailed { pipeline });
                }
                marker.mark_built_now()?;
                self.reporter.report(ProgressEvent::CommandCompleted { success: true, duration: start.elapsed() });
                Ok(stage)
            }
            Command::Serve => {
                let live = LiveReload::new().with_reporter(Arc::clone(&self.reporter));
                self.stage_two(live, None, false)?;
                Ok(StageResult::new())
            }
            Command::Default | Command::Watch => self.run_resident(),
        }
    }

    /// Stage 1 for one-shot commands: both pipelines once, concurrently.
    pub fn stage_one_once(&self) -> StageResult {
        let start = Instant::now();
        let (style, script) = thread::scope(|s| {
            let style = s.spawn(|| StylePipeline::new(&self.ctx).run());
            let script = s.spawn(|| ScriptPipeline::new(&self.ctx).run());
            (join_result(style, crate::style::PIPELINE), join_result(script, crate::script::PIPELINE))
        });

        let mut stage = StageResult::new();
        for result in [style, script] {
            report_result(self.reporter.as_ref(), &result, &mut ErrorTracker::new());
            stage.add_result(result);
        }
        stage.total_duration = start.elapsed();
        stage
    }

    /// Stage 1 with a resident script pipeline, then stage 2.
    fn run_resident(&self) -> Result<StageResult, BuildError> {
        let live = LiveReload::new().with_reporter(Arc::clone(&self.reporter));
        let first_run = FirstRun::new();

        let watcher = ScriptPipeline::new(&self.ctx).watcher()?;
        {
            let ctx = self.ctx.clone();
            let live = live.clone();
            let reporter = Arc::clone(&self.reporter);
            let first_run = first_run.clone();
            thread::spawn(move || {
                let pipeline = ScriptPipeline::new(&ctx).with_live_reload(live);
                if let Err(e) = pipeline.watch_with(&watcher, reporter.as_ref(), &first_run) {
                    reporter.report(ProgressEvent::Error { message: e.to_string() });
                }
            });
        }

        let style = StylePipeline::new(&self.ctx).with_live_reload(live.clone()).run();
        report_result(self.reporter.as_ref(), &style, &mut ErrorTracker::new());
        first_run.wait();

        self.stage_two(live, Some(&style), true)?;
        let mut stage = StageResult::new();
        stage.add_result(style);
        Ok(stage)
    }

    /// Stage 2: the dev server and its watchers. Blocks while they run.
    fn stage_two(&self, live: LiveReload, initial_style: Option<&PipelineResult>, watch_styles: bool) -> Result<(), BuildError> {
        let server = DevServer::bind(&self.ctx, live.clone())?;
        let port = server.local_addr()?.port();
        let (local, network) = server_urls(port);
        self.reporter.report(ProgressEvent::ServerStarted {
            local: local.clone(),
            network,
            serving: server.serving().to_string(),
        });
        thread::spawn(move || {
            if let Err(e) = server.serve() {
                tracing::error!("dev server stopped: {}", e);
            }
        });

        if self.ctx.mode().open {
            if let Err(e) = open_browser(&local) {
                self.reporter.report(ProgressEvent::Warning { message: format!("Could not open a browser: {}", e) });
            }
        }

        WatchSupervisor::new(&self.ctx, live, Arc::clone(&self.reporter))
            .with_style_watch(watch_styles)
            .run(initial_style)?;
        Ok(())
    }
}
