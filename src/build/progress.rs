//! Build progress reporting.
//!
//! Every user-facing line the tool prints goes through a [`Reporter`]. The
//! console reporter prefixes lines with a timestamp and colours them when
//! writing to a terminal.
//!
//! # Example
//!
//! ```ignore
//! use assetpipe::build::progress::{ConsoleReporter, ProgressEvent, Reporter};
//!
//! let reporter = ConsoleReporter::new();
//! reporter.report(ProgressEvent::PipelineStarted { pipeline: "style".to_string() });
//! ```

use crate::build::result::{PipelineResult, PipelineStatus};
use crate::diagnostics::{format_duration, Diagnostic, ErrorTracker};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;

/// Kind of live update sent to browsers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LiveUpdateKind {
    /// Full page reload
    Reload,
    /// In-place stylesheet replacement
    Inject,
}

/// Events that can be reported during a command.
#[derive(Debug, Clone)]
pub enum ProgressEvent {
    /// A command started
    CommandStarted {
        /// Command name
        command: String,
        /// Mode label ("development" / "production")
        mode: String,
    },
    /// A pipeline run started
    PipelineStarted {
        /// Pipeline name
        pipeline: String,
    },
    /// A pipeline run finished
    PipelineCompleted {
        /// Pipeline name
        pipeline: String,
        /// Run status
        status: PipelineStatus,
        /// One-line summary
        summary: String,
    },
    /// An error captured inside a pipeline
    Diagnostic(Diagnostic),
    /// A file that had errors compiles again
    Fixed {
        /// The file
        file: PathBuf,
    },
    /// A watched file changed
    Changed {
        /// The file
        file: PathBuf,
    },
    /// A watcher is active
    Watching {
        /// What is being watched
        target: String,
    },
    /// The dev server is listening
    ServerStarted {
        /// Loopback URL
        local: String,
        /// LAN URL, if an address could be determined
        network: Option<String>,
        /// What is served (document root or proxied origin)
        serving: String,
    },
    /// A live update was sent to browsers
    LiveUpdate {
        /// Update kind
        kind: LiveUpdateKind,
        /// Number of connected browsers
        clients: usize,
    },
    /// A warning was generated
    Warning {
        /// Warning message
        message: String,
    },
    /// An error outside any pipeline
    Error {
        /// Error message
        message: String,
    },
    /// A one-shot command finished
    CommandCompleted {
        /// Whether the command succeeded
        success: bool,
        /// Total duration
        duration: Duration,
    },
}

impl ProgressEvent {
    /// Build the completion event of a pipeline result.
    pub fn completed(result: &PipelineResult) -> Self {
        ProgressEvent::PipelineCompleted {
            pipeline: result.pipeline.clone(),
            status: result.status.clone(),
            summary: result.summary(),
        }
    }
}

/// Trait for progress reporters.
pub trait Reporter: Send + Sync {
    /// Report a progress event.
    fn report(&self, event: ProgressEvent);

    /// Check if this reporter wants verbose output.
    fn is_verbose(&self) -> bool {
        false
    }
}

/// Report a finished pipeline run.
///
/// Files that had errors last time and compile now are reported first,
/// then this run's diagnostics, then the summary line.
pub fn report_result(reporter: &dyn Reporter, result: &PipelineResult, tracker: &mut ErrorTracker) {
    for file in tracker.update(&result.diagnostics) {
        reporter.report(ProgressEvent::Fixed { file });
    }
    for diagnostic in &result.diagnostics {
        reporter.report(ProgressEvent::Diagnostic(diagnostic.clone()));
    }
    reporter.report(ProgressEvent::completed(result));
}

/// A reporter that discards all events.
#[derive(Debug, Default)]
pub struct NullReporter;

impl NullReporter {
    /// Create a new null reporter.
    pub fn new() -> Self {
        Self
    }
}

impl Reporter for NullReporter {
    fn report(&self, _event: ProgressEvent) {}
}

/// Console reporter with optional colors.
pub struct ConsoleReporter {
    /// Whether to use colors
    use_colors: bool,
    /// Whether to show verbose output
    verbose: bool,
    /// Whether to prefix lines with the time of day
    timestamps: bool,
    /// Output writer (for testing)
    output: Mutex<Box<dyn Write + Send>>,
}

impl std::fmt::Debug for ConsoleReporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConsoleReporter")
            .field("use_colors", &self.use_colors)
            .field("verbose", &self.verbose)
            .field("timestamps", &self.timestamps)
            .finish()
    }
}

impl ConsoleReporter {
    /// Create a console reporter writing to stderr.
    ///
    /// Colors are enabled when stderr is a terminal.
    pub fn new() -> Self {
        Self {
            use_colors: atty::is(atty::Stream::Stderr),
            verbose: false,
            timestamps: true,
            output: Mutex::new(Box::new(std::io::stderr())),
        }
    }

    /// Create a console reporter that writes to a custom output.
    pub fn with_output<W: Write + Send + 'static>(output: W) -> Self {
        Self {
            use_colors: false,
            verbose: false,
            timestamps: false,
            output: Mutex::new(Box::new(output)),
        }
    }

    /// Set whether to use colors.
    pub fn with_colors(mut self, use_colors: bool) -> Self {
        self.use_colors = use_colors;
        self
    }

    /// Set verbose mode.
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Set whether lines carry a timestamp.
    pub fn with_timestamps(mut self, timestamps: bool) -> Self {
        self.timestamps = timestamps;
        self
    }

    fn color(&self, text: &str, color: &str) -> String {
        if self.use_colors {
            format!("{}{}\x1b[0m", color, text)
        } else {
            text.to_string()
        }
    }

    fn green(&self, text: &str) -> String {
        self.color(text, "\x1b[32m")
    }

    fn yellow(&self, text: &str) -> String {
        self.color(text, "\x1b[33m")
    }

    fn red(&self, text: &str) -> String {
        self.color(text, "\x1b[31m")
    }

    fn cyan(&self, text: &str) -> String {
        self.color(text, "\x1b[36m")
    }

    fn magenta(&self, text: &str) -> String {
        self.color(text, "\x1b[35m")
    }

    fn bold(&self, text: &str) -> String {
        self.color(text, "\x1b[1m")
    }

    /// Write a line to output.
    fn writeln(&self, line: &str) {
        let line = if self.timestamps {
            format!("[{}] {}", chrono::Local::now().format("%H:%M:%S"), line)
        } else {
            line.to_string()
        };
        if let Ok(mut output) = self.output.lock() {
            let _ = writeln!(output, "{}", line);
        }
    }
}

impl Default for ConsoleReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl Reporter for ConsoleReporter {
    fn report(&self, event: ProgressEvent) {
        match event {
            ProgressEvent::CommandStarted { command, mode } => {
                self.writeln(&format!(
                    "{} Starting '{}' ({})",
                    self.cyan("[run]"),
                    self.bold(&command),
                    self.magenta(&mode)
                ));
            }
            ProgressEvent::PipelineStarted { pipeline } => {
                if self.verbose {
                    self.writeln(&format!("{} Running {}...", self.cyan("[run]"), pipeline));
                }
            }
            ProgressEvent::PipelineCompleted { status, summary, .. } => {
                let status_str = match status {
                    PipelineStatus::Success => self.green("ok"),
                    PipelineStatus::Partial => self.yellow("partial"),
                    PipelineStatus::Failed => self.red("FAILED"),
                };
                self.writeln(&format!("{} {} {}", self.cyan("[run]"), status_str, summary));
            }
            ProgressEvent::Diagnostic(diagnostic) => {
                self.writeln(&format!("{} {}", self.red("[error]"), diagnostic.to_console()));
            }
            ProgressEvent::Fixed { file } => {
                self.writeln(&format!("{} Fixed: {}", self.green("[ok]"), file.display()));
            }
            ProgressEvent::Changed { file } => {
                self.writeln(&format!("{} Changed: {}", self.cyan("[watch]"), file.display()));
            }
            ProgressEvent::Watching { target } => {
                self.writeln(&format!("{} Watching {} for changes...", self.cyan("[watch]"), target));
            }
            ProgressEvent::ServerStarted { local, network, serving } => {
                self.writeln(&format!("{} Serving {}", self.cyan("[serve]"), serving));
                self.writeln(&format!("{}    Local: {}", self.cyan("[serve]"), self.bold(&local)));
                if let Some(network) = network {
                    self.writeln(&format!(
                        "{} External: {}",
                        self.cyan("[serve]"),
                        self.bold(&network)
                    ));
                }
            }
            ProgressEvent::LiveUpdate { kind, clients } => {
                if self.verbose {
                    let what = match kind {
                        LiveUpdateKind::Reload => "Reloading",
                        LiveUpdateKind::Inject => "Injecting styles into",
                    };
                    self.writeln(&format!(
                        "{} {} {} browser{}",
                        self.cyan("[serve]"),
                        what,
                        clients,
                        if clients == 1 { "" } else { "s" }
                    ));
                }
            }
            ProgressEvent::Warning { message } => {
                self.writeln(&format!("{} {}", self.yellow("[warn]"), message));
            }
            ProgressEvent::Error { message } => {
                self.writeln(&format!("{} {}", self.red("[error]"), message));
            }
            ProgressEvent::CommandCompleted { success, duration } => {
                if success {
                    self.writeln(&format!(
                        "{} Finished in {}",
                        self.green("[done]"),
                        format_duration(duration)
                    ));
                } else {
                    self.writeln(&format!(
                        "{} Failed after {}",
                        self.red("[error]"),
                        format_duration(duration)
                    ));
                }
            }
        }
    }

    fn is_verbose(&self) -> bool {
        self.verbose
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    /// Test writer for capturing output.
    struct TestWriter(Arc<Mutex<Vec<u8>>>);

    impl Write for TestWriter {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn capture() -> (Arc<Mutex<Vec<u8>>>, ConsoleReporter) {
        let buffer = Arc::new(Mutex::new(Vec::new()));
        let reporter = ConsoleReporter::with_output(TestWriter(buffer.clone()));
        (buffer, reporter)
    }

    fn text(buffer: &Arc<Mutex<Vec<u8>>>) -> String {
        String::from_utf8(buffer.lock().unwrap().clone()).unwrap()
    }

    #[test]
    fn test_console_reports_completion() {
        let (buffer, reporter) = capture();
        let mut result = PipelineResult::new("style");
        result.outputs.push(PathBuf::from("app.css"));
        reporter.report(ProgressEvent::completed(&result.finish(Duration::from_millis(5))));

        assert_eq!(text(&buffer), "[run] ok style built 1 file in 5ms\n");
    }

    #[test]
    fn test_console_reports_diagnostic_multiline() {
        let (buffer, reporter) = capture();
        reporter.report(ProgressEvent::Diagnostic(Diagnostic::in_file(
            "style",
            "a.scss",
            "expected \";\"",
        )));

        assert_eq!(text(&buffer), "[error] [style] a.scss:\nexpected \";\"\n");
    }

    #[test]
    fn test_console_hides_pipeline_start_unless_verbose() {
        let (buffer, reporter) = capture();
        reporter.report(ProgressEvent::PipelineStarted { pipeline: "style".to_string() });
        assert!(text(&buffer).is_empty());

        let (buffer, reporter) = capture();
        let reporter = reporter.with_verbose(true);
        reporter.report(ProgressEvent::PipelineStarted { pipeline: "style".to_string() });
        assert_eq!(text(&buffer), "[run] Running style...\n");
    }

    #[test]
    fn test_console_server_started() {
        let (buffer, reporter) = capture();
        reporter.report(ProgressEvent::ServerStarted {
            local: "http://localhost:3000".to_string(),
            network: Some("http://192.168.1.4:3000".to_string()),
            serving: "./dist".to_string(),
        });
        let out = text(&buffer);
        assert!(out.contains("Local: http://localhost:3000"));
        assert!(out.contains("External: http://192.168.1.4:3000"));
    }

    #[test]
    fn test_console_colors() {
        let (buffer, reporter) = capture();
        let reporter = reporter.with_colors(true);
        reporter.report(ProgressEvent::Warning { message: "unknown key".to_string() });
        assert!(text(&buffer).contains("\x1b[33m[warn]\x1b[0m"));
    }

    #[test]
    fn test_report_result_announces_fixed_files() {
        let (buffer, reporter) = capture();
        let mut tracker = ErrorTracker::new();

        let mut broken = PipelineResult::new("style");
        broken.add_diagnostic(Diagnostic::in_file("style", "a.scss", "bad"));
        report_result(&reporter, &broken.finish(Duration::from_millis(1)), &mut tracker);

        let mut fixed = PipelineResult::new("style");
        fixed.outputs.push(PathBuf::from("app.css"));
        report_result(&reporter, &fixed.finish(Duration::from_millis(1)), &mut tracker);

        let out = text(&buffer);
        assert!(out.contains("[error] [style] a.scss:\nbad\n"));
        assert!(out.contains("[run] FAILED style failed with 1 error in 1ms\n"));
        assert!(out.ends_with("[ok] Fixed: a.scss\n[run] ok style built 1 file in 1ms\n"));
    }

    #[test]
    fn test_null_reporter() {
        let reporter = NullReporter::new();
        reporter.report(ProgressEvent::Error { message: "ignored".to_string() });
        assert!(!reporter.is_verbose());
    }
}
