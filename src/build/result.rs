//! Pipeline result types.
//!
//! Contains types for representing the outcome of one pipeline run and of
//! a whole stage.

use crate::diagnostics::{format_duration, Diagnostic};
use std::path::PathBuf;
use std::time::Duration;

/// Status of a single pipeline run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineStatus {
    /// Every source was processed and output written
    Success,
    /// Output written, but some sources were dropped with diagnostics
    Partial,
    /// Nothing was written
    Failed,
}

impl PipelineStatus {
    /// Check if output was written.
    pub fn wrote_output(&self) -> bool {
        matches!(self, PipelineStatus::Success | PipelineStatus::Partial)
    }
}

impl std::fmt::Display for PipelineStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PipelineStatus::Success => write!(f, "success"),
            PipelineStatus::Partial => write!(f, "partial"),
            PipelineStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Result of one pipeline run.
#[derive(Debug, Clone)]
pub struct PipelineResult {
    /// Pipeline name ("style", "script")
    pub pipeline: String,
    /// Run status
    pub status: PipelineStatus,
    /// Files written
    pub outputs: Vec<PathBuf>,
    /// Errors captured during the run
    pub diagnostics: Vec<Diagnostic>,
    /// Number of sources read
    pub sources: usize,
    /// Run duration
    pub duration: Duration,
    /// Whether a failure must fail the whole command
    pub fatal: bool,
}

impl PipelineResult {
    /// Create an empty successful result.
    pub fn new(pipeline: impl Into<String>) -> Self {
        Self {
            pipeline: pipeline.into(),
            status: PipelineStatus::Success,
            outputs: vec![],
            diagnostics: vec![],
            sources: 0,
            duration: Duration::ZERO,
            fatal: false,
        }
    }

    /// Create a failed result carrying one diagnostic.
    pub fn failed(pipeline: impl Into<String>, diagnostic: Diagnostic) -> Self {
        let mut result = Self::new(pipeline);
        result.status = PipelineStatus::Failed;
        result.diagnostics.push(diagnostic);
        result
    }

    /// Record a diagnostic.
    pub fn add_diagnostic(&mut self, diagnostic: Diagnostic) {
        self.diagnostics.push(diagnostic);
    }

    /// Mark a failure as fatal for the command.
    pub fn with_fatal(mut self, fatal: bool) -> Self {
        self.fatal = fatal;
        self
    }

    /// Settle the status from what was recorded.
    ///
    /// No outputs and at least one diagnostic means the run failed.
    pub fn finish(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self.status = match (self.outputs.is_empty(), self.diagnostics.is_empty()) {
            (_, true) => PipelineStatus::Success,
            (false, false) => PipelineStatus::Partial,
            (true, false) => PipelineStatus::Failed,
        };
        self
    }

    /// Check if this result has no diagnostics.
    pub fn is_success(&self) -> bool {
        self.status == PipelineStatus::Success
    }

    /// Whether this result fails the command.
    pub fn is_fatal_failure(&self) -> bool {
        self.fatal && !self.diagnostics.is_empty()
    }

    /// One-line summary.
    pub fn summary(&self) -> String {
        match self.status {
            PipelineStatus::Success => format!(
                "{} built {} file{} in {}",
                self.pipeline,
                self.outputs.len(),
                if self.outputs.len() == 1 { "" } else { "s" },
                format_duration(self.duration)
            ),
            _ => format!(
                "{} {} with {} error{} in {}",
                self.pipeline,
                self.status,
                self.diagnostics.len(),
                if self.diagnostics.len() == 1 { "" } else { "s" },
                format_duration(self.duration)
            ),
        }
    }
}

/// Results of a stage.
#[derive(Debug, Default)]
pub struct StageResult {
    /// Result of each pipeline in the stage
    pub pipelines: Vec<PipelineResult>,
    /// Total duration
    pub total_duration: Duration,
}

impl StageResult {
    /// Create a new empty stage result.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a pipeline result.
    pub fn add_result(&mut self, result: PipelineResult) {
        self.pipelines.push(result);
    }

    /// Get all diagnostics.
    pub fn all_diagnostics(&self) -> Vec<&Diagnostic> {
        self.pipelines.iter().flat_map(|r| r.diagnostics.iter()).collect()
    }

    /// Get all outputs produced.
    pub fn all_outputs(&self) -> Vec<&PathBuf> {
        self.pipelines.iter().flat_map(|r| r.outputs.iter()).collect()
    }

    /// Whether any pipeline failed in a way that fails the command.
    pub fn has_fatal_failure(&self) -> bool {
        self.pipelines.iter().any(|r| r.is_fatal_failure())
    }

    /// Get a result by pipeline name.
    pub fn get(&self, pipeline: &str) -> Option<&PipelineResult> {
        self.pipelines.iter().find(|r| r.pipeline == pipeline)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_finish_success() {
        let mut result = PipelineResult::new("style");
        result.outputs.push(PathBuf::from("dist/app.css"));
        let result = result.finish(Duration::from_millis(12));

        assert!(result.is_success());
        assert_eq!(result.summary(), "style built 1 file in 12ms");
    }

    #[test]
    fn test_finish_partial() {
        let mut result = PipelineResult::new("style");
        result.outputs.push(PathBuf::from("dist/app.css"));
        result.add_diagnostic(Diagnostic::in_file("style", "bad.scss", "expected \"}\""));
        let result = result.finish(Duration::ZERO);

        assert_eq!(result.status, PipelineStatus::Partial);
        assert!(result.status.wrote_output());
        assert_eq!(result.summary(), "style partial with 1 error in 0ms");
    }

    #[test]
    fn test_finish_failed() {
        let mut result = PipelineResult::new("script");
        result.add_diagnostic(Diagnostic::new("script", "syntax error"));
        let result = result.finish(Duration::ZERO);

        assert_eq!(result.status, PipelineStatus::Failed);
        assert!(!result.status.wrote_output());
    }

    #[test]
    fn test_fatal_only_with_diagnostics() {
        let ok = PipelineResult::new("script").with_fatal(true);
        assert!(!ok.is_fatal_failure());

        let bad = PipelineResult::failed("script", Diagnostic::new("script", "x")).with_fatal(true);
        assert!(bad.is_fatal_failure());
    }

    #[test]
    fn test_stage_result_aggregates() {
        let mut stage = StageResult::new();
        let mut style = PipelineResult::new("style");
        style.outputs.push(PathBuf::from("a.css"));
        stage.add_result(style);
        stage.add_result(PipelineResult::failed("script", Diagnostic::new("script", "x")));

        assert_eq!(stage.all_outputs().len(), 1);
        assert_eq!(stage.all_diagnostics().len(), 1);
        assert!(!stage.has_fatal_failure());
        assert!(stage.get("style").is_some());
    }
}
