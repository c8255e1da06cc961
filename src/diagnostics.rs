//! Pipeline diagnostics
//!
//! Errors raised inside a pipeline are captured as [`Diagnostic`] values
//! instead of unwinding the command, so a broken source file never takes the
//! dev server down with it.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// A pipeline error with optional file location information
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    /// Name of the pipeline that raised it ("style", "script", ...)
    pub pipeline: String,
    /// Path to the file containing the error, if known
    pub file: Option<PathBuf>,
    /// Line number (1-indexed, None if unknown)
    pub line: Option<usize>,
    /// Column number (1-indexed, None if unknown)
    pub column: Option<usize>,
    /// Error message
    pub message: String,
}

impl Diagnostic {
    /// Create a diagnostic not tied to a file
    pub fn new(pipeline: impl Into<String>, message: impl Into<String>) -> Self {
        Self { pipeline: pipeline.into(), file: None, line: None, column: None, message: message.into() }
    }

    /// Create a diagnostic for a file
    pub fn in_file(
        pipeline: impl Into<String>,
        file: impl Into<PathBuf>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            pipeline: pipeline.into(),
            file: Some(file.into()),
            line: None,
            column: None,
            message: message.into(),
        }
    }

    /// Attach a location
    pub fn at(mut self, line: usize, column: Option<usize>) -> Self {
        self.line = Some(line);
        self.column = column;
        self
    }

    /// Render for terminal display.
    ///
    /// Chained messages (`outer: inner: detail`) are broken onto separate
    /// lines so long compiler errors stay readable.
    pub fn to_console(&self) -> String {
        self.to_string().split(": ").collect::<Vec<_>>().join(":\n")
    }
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] ", self.pipeline)?;
        if let Some(file) = &self.file {
            write!(f, "{}", file.display())?;
            if let Some(line) = self.line {
                write!(f, ":{}", line)?;
                if let Some(col) = self.column {
                    write!(f, ":{}", col)?;
                }
            }
            write!(f, ": ")?;
        }
        write!(f, "{}", self.message)
    }
}

/// Tracks files with errors across runs for recovery detection
#[derive(Debug, Default)]
pub struct ErrorTracker {
    files_with_errors: HashSet<PathBuf>,
}

impl ErrorTracker {
    /// Create a new error tracker
    pub fn new() -> Self {
        Self::default()
    }

    /// Update tracker with the diagnostics of a run, returns the fixed files
    pub fn update(&mut self, diagnostics: &[Diagnostic]) -> Vec<PathBuf> {
        let current: HashSet<PathBuf> =
            diagnostics.iter().filter_map(|d| d.file.clone()).collect();

        let mut fixed: Vec<PathBuf> =
            self.files_with_errors.difference(&current).cloned().collect();
        fixed.sort();

        self.files_with_errors = current;
        fixed
    }

    /// Check if there are any tracked errors
    pub fn has_errors(&self) -> bool {
        !self.files_with_errors.is_empty()
    }

    /// Get the number of files with errors
    pub fn error_count(&self) -> usize {
        self.files_with_errors.len()
    }
}

/// Format a duration as `999ms` or `1.23s`
pub fn format_duration(duration: Duration) -> String {
    let millis = duration.as_millis();
    if millis < 1000 {
        format!("{}ms", millis)
    } else {
        format!("{:.2}s", duration.as_secs_f64())
    }
}

/// Path shown to the user: relative to `root` when possible.
pub fn display_path(path: &Path, root: &Path) -> String {
    path.strip_prefix(root).unwrap_or(path).display().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_diagnostic_display_with_location() {
        let d = Diagnostic::in_file("style", "src/style/app.scss", "expected \";\"").at(5, Some(10));
        assert_eq!(d.to_string(), "[style] src/style/app.scss:5:10: expected \";\"");
    }

    #[test]
    fn test_diagnostic_display_without_file() {
        let d = Diagnostic::new("script", "module not found");
        assert_eq!(d.to_string(), "[script] module not found");
    }

    #[test]
    fn test_diagnostic_console_breaks_chains() {
        let d = Diagnostic::new("script", "bundle failed: cannot resolve './x'");
        assert_eq!(d.to_console(), "[script] bundle failed:\ncannot resolve './x'");
    }

    #[test]
    fn test_error_tracker_detects_fixed_files() {
        let mut tracker = ErrorTracker::new();

        let first = vec![
            Diagnostic::in_file("style", "a.scss", "Error 1"),
            Diagnostic::in_file("style", "b.scss", "Error 2"),
        ];
        assert!(tracker.update(&first).is_empty());
        assert_eq!(tracker.error_count(), 2);

        let second = vec![Diagnostic::in_file("style", "b.scss", "Error 2")];
        let fixed = tracker.update(&second);
        assert_eq!(fixed, vec![PathBuf::from("a.scss")]);
        assert!(tracker.has_errors());

        let fixed = tracker.update(&[]);
        assert_eq!(fixed, vec![PathBuf::from("b.scss")]);
        assert!(!tracker.has_errors());
    }

    #[test]
    fn test_error_tracker_ignores_fileless() {
        let mut tracker = ErrorTracker::new();
        tracker.update(&[Diagnostic::new("script", "boom")]);
        assert!(!tracker.has_errors());
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_millis(50)), "50ms");
        assert_eq!(format_duration(Duration::from_millis(999)), "999ms");
        assert_eq!(format_duration(Duration::from_millis(1000)), "1.00s");
        assert_eq!(format_duration(Duration::from_millis(1500)), "1.50s");
    }

    #[test]
    fn test_display_path() {
        assert_eq!(display_path(Path::new("/p/src/a.js"), Path::new("/p")), "src/a.js");
        assert_eq!(display_path(Path::new("/q/a.js"), Path::new("/p")), "/q/a.js");
    }
}
