//! Configuration schema types for `assetpipe.toml`
//!
//! [`Settings`] is the effective configuration of one invocation.
//! [`SettingsOverride`] mirrors it with every key optional and is what the
//! local override file deserializes into.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Strategy used by the script pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ScriptStrategy {
    /// Concatenate the source globs in order and minify
    #[default]
    #[serde(alias = "js")]
    Concat,
    /// Resolve a module graph per entry point and emit one bundle each
    #[serde(alias = "webpack")]
    Bundle,
}

impl std::fmt::Display for ScriptStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScriptStrategy::Concat => write!(f, "concat"),
            ScriptStrategy::Bundle => write!(f, "bundle"),
        }
    }
}

/// Effective build configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// Glob of stylesheet sources (brace alternatives allowed)
    pub style_src: String,
    /// Source map root for stylesheets, relative to the output stylesheet
    pub style_map_root: String,
    /// Directory the compiled stylesheet is written to
    pub style_dest: PathBuf,
    /// File name of the compiled stylesheet
    pub style_bundle: String,
    /// Script strategy
    pub js_tasker: ScriptStrategy,
    /// Named entry points for the bundle strategy (name -> files)
    pub js_entry: BTreeMap<String, Vec<PathBuf>>,
    /// Ordered source globs for the concat strategy
    pub js_src: Vec<String>,
    /// Source map root for scripts, relative to the output script
    pub js_map_root: String,
    /// Directory scripts are written to
    pub js_dest: PathBuf,
    /// File name of the concatenated script
    pub js_bundle: String,
    /// Globs of static files that trigger a full reload
    pub watch: Vec<String>,
    /// Document root served by the dev server
    pub docroot: PathBuf,
    /// Origin to reverse-proxy instead of serving `docroot`
    pub proxy: Option<String>,
    /// Browser support queries for vendor prefixing
    pub prefixer: Vec<String>,
    /// Extra Sass load paths
    pub include_paths: Vec<PathBuf>,
    /// Module aliases for the bundle strategy
    pub alias: BTreeMap<String, String>,
    /// Dev server port
    pub port: u16,
    /// Always open a browser tab when the dev server starts
    pub open: bool,
    /// Watch debounce delay in milliseconds
    pub debounce_ms: u32,
    /// Build marker file, relative to the project root
    pub marker: PathBuf,
}

impl Default for Settings {
    fn default() -> Self {
        let mut js_entry = BTreeMap::new();
        js_entry.insert("app".to_string(), vec![PathBuf::from("./src/code/index.js")]);

        Self {
            style_src: "./src/style/**/*.{sass,scss}".to_string(),
            style_map_root: "../../src/style/".to_string(),
            style_dest: PathBuf::from("./dist/assets/css/"),
            style_bundle: "app.css".to_string(),
            js_tasker: ScriptStrategy::Concat,
            js_entry,
            js_src: vec!["./src/code/**/*.js".to_string()],
            js_map_root: "../../src/code/".to_string(),
            js_dest: PathBuf::from("./dist/assets/js/"),
            js_bundle: "app.js".to_string(),
            watch: vec!["./dist/**/*.html".to_string()],
            docroot: PathBuf::from("./dist"),
            proxy: None,
            prefixer: vec![
                "> 1%".to_string(),
                "last 2 versions".to_string(),
                "Firefox ESR".to_string(),
                "Opera 12.1".to_string(),
                "IE >= 9".to_string(),
            ],
            include_paths: vec![],
            alias: BTreeMap::new(),
            port: 3000,
            open: false,
            debounce_ms: 200,
            marker: PathBuf::from("build.txt"),
        }
    }
}

/// Local overrides, one optional field per [`Settings`] key.
///
/// Keys not listed here are kept in `unknown` so they can be reported
/// instead of rejected.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SettingsOverride {
    pub style_src: Option<String>,
    pub style_map_root: Option<String>,
    pub style_dest: Option<PathBuf>,
    pub style_bundle: Option<String>,
    pub js_tasker: Option<ScriptStrategy>,
    pub js_entry: Option<BTreeMap<String, Vec<PathBuf>>>,
    pub js_src: Option<Vec<String>>,
    pub js_map_root: Option<String>,
    pub js_dest: Option<PathBuf>,
    pub js_bundle: Option<String>,
    pub watch: Option<Vec<String>>,
    pub docroot: Option<PathBuf>,
    pub proxy: Option<String>,
    pub prefixer: Option<Vec<String>>,
    pub include_paths: Option<Vec<PathBuf>>,
    pub alias: Option<BTreeMap<String, String>>,
    pub port: Option<u16>,
    pub open: Option<bool>,
    pub debounce_ms: Option<u32>,
    pub marker: Option<PathBuf>,
    /// Unrecognized keys
    #[serde(flatten, skip_serializing)]
    pub unknown: BTreeMap<String, toml::Value>,
}

impl SettingsOverride {
    /// Names of keys that are not part of the schema.
    pub fn unknown_keys(&self) -> Vec<String> {
        self.unknown.keys().cloned().collect()
    }
}

/// Configuration validation error
#[derive(Debug, Clone)]
pub struct ConfigValidationError {
    /// Name of the invalid key
    pub field: String,
    /// Error message
    pub message: String,
}

impl std::fmt::Display for ConfigValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "assetpipe.toml: '{}' {}", self.field, self.message)
    }
}

impl Settings {
    /// Merge overrides into these settings.
    ///
    /// Every key present in `overrides` replaces the whole value of the same
    /// key here; maps and lists are never merged element-wise.
    pub fn merge(self, overrides: SettingsOverride) -> Settings {
        let SettingsOverride {
            style_src,
            style_map_root,
            style_dest,
            style_bundle,
            js_tasker,
            js_entry,
            js_src,
            js_map_root,
            js_dest,
            js_bundle,
            watch,
            docroot,
            proxy,
            prefixer,
            include_paths,
            alias,
            port,
            open,
            debounce_ms,
            marker,
            unknown: _,
        } = overrides;

        Settings {
            style_src: style_src.unwrap_or(self.style_src),
            style_map_root: style_map_root.unwrap_or(self.style_map_root),
            style_dest: style_dest.unwrap_or(self.style_dest),
            style_bundle: style_bundle.unwrap_or(self.style_bundle),
            js_tasker: js_tasker.unwrap_or(self.js_tasker),
            js_entry: js_entry.unwrap_or(self.js_entry),
            js_src: js_src.unwrap_or(self.js_src),
            js_map_root: js_map_root.unwrap_or(self.js_map_root),
            js_dest: js_dest.unwrap_or(self.js_dest),
            js_bundle: js_bundle.unwrap_or(self.js_bundle),
            watch: watch.unwrap_or(self.watch),
            docroot: docroot.unwrap_or(self.docroot),
            proxy: proxy.or(self.proxy),
            prefixer: prefixer.unwrap_or(self.prefixer),
            include_paths: include_paths.unwrap_or(self.include_paths),
            alias: alias.unwrap_or(self.alias),
            port: port.unwrap_or(self.port),
            open: open.unwrap_or(self.open),
            debounce_ms: debounce_ms.unwrap_or(self.debounce_ms),
            marker: marker.unwrap_or(self.marker),
        }
    }

    /// Validate the configuration and return any errors
    pub fn validate(&self) -> Vec<ConfigValidationError> {
        let mut errors = Vec::new();

        if self.style_src.trim().is_empty() {
            errors.push(ConfigValidationError {
                field: "style_src".to_string(),
                message: "must be a non-empty glob pattern".to_string(),
            });
        }

        for (field, name) in [("style_bundle", &self.style_bundle), ("js_bundle", &self.js_bundle)] {
            if name.is_empty() || name.contains('/') || name.contains('\\') {
                errors.push(ConfigValidationError {
                    field: field.to_string(),
                    message: "must be a plain file name".to_string(),
                });
            }
        }

        match self.js_tasker {
            ScriptStrategy::Concat => {
                if self.js_src.is_empty() {
                    errors.push(ConfigValidationError {
                        field: "js_src".to_string(),
                        message: "must contain at least one glob pattern".to_string(),
                    });
                }
            }
            ScriptStrategy::Bundle => {
                if self.js_entry.is_empty() {
                    errors.push(ConfigValidationError {
                        field: "js_entry".to_string(),
                        message: "must define at least one entry point".to_string(),
                    });
                }
                for (name, files) in &self.js_entry {
                    if files.is_empty() {
                        errors.push(ConfigValidationError {
                            field: format!("js_entry.{}", name),
                            message: "must list at least one file".to_string(),
                        });
                    }
                }
            }
        }

        if self.port == 0 {
            errors.push(ConfigValidationError {
                field: "port".to_string(),
                message: "must be a positive integer".to_string(),
            });
        }

        if let Some(proxy) = &self.proxy {
            if proxy.trim().is_empty() {
                errors.push(ConfigValidationError {
                    field: "proxy".to_string(),
                    message: "must be a host or URL".to_string(),
                });
            }
        }

        errors
    }

    /// Check if validation passed
    pub fn is_valid(&self) -> bool {
        self.validate().is_empty()
    }
}
