//! Command handlers (default, watch, build, serve)

use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

use super::{EXIT_ERROR, EXIT_SUCCESS};
use crate::build::progress::{ConsoleReporter, ProgressEvent, Reporter};
use crate::build::{Command, Orchestrator};
use crate::config::loader::{load_settings, merge_cli_overrides, CliOverrides};

/// Run one command with settings from `config` (or the discovered
/// override file) and the CLI overrides.
pub fn run_command(command: Command, config: Option<&Path>, port: Option<u16>, verbose: bool) -> ExitCode {
    let reporter: Arc<dyn Reporter> = Arc::new(ConsoleReporter::new().with_verbose(verbose));

    let loaded = match load_settings(config) {
        Ok(loaded) => loaded,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::from(EXIT_ERROR);
        }
    };
    match &loaded.source {
        Some(path) => tracing::debug!("using config {}", path.display()),
        None => tracing::debug!("no assetpipe.toml found, using defaults"),
    }
    for key in &loaded.unknown_keys {
        reporter.report(ProgressEvent::Warning { message: format!("Unknown config key '{}' ignored", key) });
    }

    let mut settings = loaded.settings;
    merge_cli_overrides(&mut settings, &CliOverrides { port });
    let errors = settings.validate();
    if !errors.is_empty() {
        for error in errors {
            eprintln!("Error: {}", error);
        }
        return ExitCode::from(EXIT_ERROR);
    }

    let orchestrator = Orchestrator::new(command, settings, loaded.project_root)
        .with_verbose(verbose)
        .with_reporter(Arc::clone(&reporter));

    match orchestrator.run() {
        Ok(_) => ExitCode::from(EXIT_SUCCESS),
        Err(e) => {
            reporter.report(ProgressEvent::Error { message: e.to_string() });
            ExitCode::from(EXIT_ERROR)
        }
    }
}
