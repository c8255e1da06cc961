//! Build marker file.
//!
//! A single file at the project root telling external tooling whether the
//! last build is in progress (`dirty`) or when the last production build
//! finished (an RFC 3339 timestamp). Nothing inside this crate reads it
//! back except tests.

use chrono::{DateTime, FixedOffset, SecondsFormat, Utc};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Content written while a build is in progress
pub const DIRTY_SENTINEL: &str = "dirty";

/// Marker write/read error
#[derive(Debug, Error)]
pub enum MarkerError {
    /// I/O error
    #[error("Failed to write build marker {0}: {1}")]
    Io(PathBuf, std::io::Error),
}

/// State recorded in the marker
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MarkerState {
    /// A build is in progress
    Dirty,
    /// The last production build finished at this time
    Built(DateTime<FixedOffset>),
    /// Anything else (hand-edited or foreign content)
    Unknown(String),
}

/// Handle to the marker file.
#[derive(Debug, Clone)]
pub struct BuildMarker {
    path: PathBuf,
}

impl BuildMarker {
    /// Create a handle for the marker at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Location of the marker.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Record that a build is in progress.
    pub fn mark_dirty(&self) -> Result<(), MarkerError> {
        self.write(DIRTY_SENTINEL)
    }

    /// Record a finished build at `at`.
    pub fn mark_built(&self, at: DateTime<Utc>) -> Result<(), MarkerError> {
        self.write(&at.to_rfc3339_opts(SecondsFormat::Nanos, true))
    }

    /// Record a build finishing now.
    pub fn mark_built_now(&self) -> Result<(), MarkerError> {
        self.mark_built(Utc::now())
    }

    fn write(&self, contents: &str) -> Result<(), MarkerError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| MarkerError::Io(self.path.clone(), e))?;
            }
        }
        fs::write(&self.path, contents).map_err(|e| MarkerError::Io(self.path.clone(), e))
    }

    /// Read the marker, `None` if it does not exist.
    pub fn read(&self) -> Option<MarkerState> {
        let contents = fs::read_to_string(&self.path).ok()?;
        Some(parse_marker(&contents))
    }
}

/// Interpret marker contents.
pub fn parse_marker(contents: &str) -> MarkerState {
    let trimmed = contents.trim();
    if trimmed == DIRTY_SENTINEL {
        return MarkerState::Dirty;
    }
    match DateTime::parse_from_rfc3339(trimmed) {
        Ok(at) => MarkerState::Built(at),
        Err(_) => MarkerState::Unknown(trimmed.to_string()),
    }
}
