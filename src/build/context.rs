//! Build context containing configuration and mode for one invocation.

use crate::config::loader::resolve_path;
use crate::config::Settings;
use std::path::{Path, PathBuf};

/// Mode of one command invocation.
///
/// Built once when a command starts and read by every component after
/// that; nothing mutates it later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BuildMode {
    /// Minify and strip development helpers
    pub production: bool,
    /// Keep pipelines resident and rebuild on change
    pub watch: bool,
    /// Open a browser tab when the dev server starts
    pub open: bool,
}

impl BuildMode {
    /// Mode of a one-shot development build.
    pub fn development() -> Self {
        Self::default()
    }

    /// Mode of a one-shot production build.
    pub fn production() -> Self {
        Self { production: true, ..Self::default() }
    }

    /// Set watch mode.
    pub fn with_watch(mut self, watch: bool) -> Self {
        self.watch = watch;
        self
    }

    /// Set browser opening.
    pub fn with_open(mut self, open: bool) -> Self {
        self.open = open;
        self
    }

    /// Name used in progress output.
    pub fn label(&self) -> &'static str {
        if self.production {
            "production"
        } else {
            "development"
        }
    }
}

/// Build context containing configuration, paths and mode for a build.
#[derive(Debug, Clone)]
pub struct BuildContext {
    /// The effective settings
    settings: Settings,
    /// Project root directory (where assetpipe.toml is located)
    project_root: PathBuf,
    /// Mode of the current command
    mode: BuildMode,
    /// Whether to run in verbose mode
    verbose: bool,
}

impl BuildContext {
    /// Create a new build context in development mode.
    pub fn new(settings: Settings, project_root: PathBuf) -> Self {
        Self { settings, project_root, mode: BuildMode::development(), verbose: false }
    }

    /// Set the mode.
    pub fn with_mode(mut self, mode: BuildMode) -> Self {
        self.mode = mode;
        self
    }

    /// Set verbose mode.
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Get the settings.
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Get the mode.
    pub fn mode(&self) -> BuildMode {
        self.mode
    }

    /// Whether this is a production build.
    pub fn is_production(&self) -> bool {
        self.mode.production
    }

    /// Whether pipelines stay resident.
    pub fn is_watch(&self) -> bool {
        self.mode.watch
    }

    /// Whether verbose mode is enabled.
    pub fn is_verbose(&self) -> bool {
        self.verbose
    }

    /// Get the project root directory.
    pub fn project_root(&self) -> &Path {
        &self.project_root
    }

    /// Resolve a path relative to the project root.
    pub fn resolve_path(&self, path: &Path) -> PathBuf {
        resolve_path(&self.project_root, path)
    }

    /// Directory the stylesheet is written to.
    pub fn style_dest(&self) -> PathBuf {
        self.resolve_path(&self.settings.style_dest)
    }

    /// Directory scripts are written to.
    pub fn js_dest(&self) -> PathBuf {
        self.resolve_path(&self.settings.js_dest)
    }

    /// Document root of the dev server.
    pub fn docroot(&self) -> PathBuf {
        self.resolve_path(&self.settings.docroot)
    }

    /// Location of the build marker.
    pub fn marker_path(&self) -> PathBuf {
        self.resolve_path(&self.settings.marker)
    }
}
