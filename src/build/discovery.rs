//! Source file discovery for the build system.
//!
//! Resolves the glob patterns from the settings against the project root.
//! The `glob` crate has no brace alternatives, so `*.{sass,scss}` is
//! expanded into one pattern per alternative first.

use glob::{glob, Pattern};
use std::collections::HashSet;
use std::path::{Component, Path, PathBuf};
use thiserror::Error;

/// Error during source discovery.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    /// Invalid glob pattern
    #[error("Invalid glob pattern '{0}': {1}")]
    InvalidPattern(String, glob::PatternError),
    /// Unbalanced brace group
    #[error("Invalid glob pattern '{0}': unbalanced braces")]
    UnbalancedBraces(String),
}

/// Expand brace alternatives in a glob pattern.
///
/// `src/**/*.{sass,scss}` becomes `src/**/*.sass` and `src/**/*.scss`.
/// Nested groups are expanded recursively, left to right.
pub fn expand_braces(pattern: &str) -> Result<Vec<String>, DiscoveryError> {
    let Some(open) = pattern.find('{') else {
        if pattern.contains('}') {
            return Err(DiscoveryError::UnbalancedBraces(pattern.to_string()));
        }
        return Ok(vec![pattern.to_string()]);
    };

    let mut depth = 0usize;
    let mut close = None;
    let mut splits = Vec::new();
    for (i, ch) in pattern[open..].char_indices() {
        let at = open + i;
        match ch {
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    close = Some(at);
                    break;
                }
            }
            ',' if depth == 1 => splits.push(at),
            _ => {}
        }
    }
    let close = close.ok_or_else(|| DiscoveryError::UnbalancedBraces(pattern.to_string()))?;

    let prefix = &pattern[..open];
    let suffix = &pattern[close + 1..];
    let mut bounds = vec![open];
    bounds.extend(splits);
    bounds.push(close);

    let mut expanded = Vec::new();
    for pair in bounds.windows(2) {
        let alternative = &pattern[pair[0] + 1..pair[1]];
        let candidate = format!("{}{}{}", prefix, alternative, suffix);
        expanded.extend(expand_braces(&candidate)?);
    }
    Ok(expanded)
}

/// Directory part of a pattern before its first wildcard.
///
/// `./src/style/**/*.scss` has the base `./src/style`. Used as the root
/// of source map paths and as the directory to watch.
pub fn glob_base(pattern: &str) -> PathBuf {
    let mut base = PathBuf::new();
    for component in Path::new(pattern).components() {
        let text = component.as_os_str().to_string_lossy();
        if text.contains(['*', '?', '[', '{']) {
            break;
        }
        base.push(component);
    }
    // A pattern without wildcards names a file; its base is the parent.
    if base == Path::new(pattern) {
        base.pop();
    }
    base
}

fn absolute_pattern(base_dir: &Path, pattern: &str) -> String {
    let path = Path::new(pattern);
    let joined = if path.is_absolute() {
        path.to_path_buf()
    } else {
        let mut joined = base_dir.to_path_buf();
        for component in path.components() {
            if component != Component::CurDir {
                joined.push(component);
            }
        }
        joined
    };
    joined.to_string_lossy().into_owned()
}

/// Discover files matching a glob pattern.
///
/// # Arguments
/// - `base_dir` - Base directory to resolve relative patterns from
/// - `pattern` - Glob pattern to match, brace alternatives allowed
///
/// # Returns
/// Matching regular files, sorted, without duplicates.
pub fn discover_files(base_dir: &Path, pattern: &str) -> Result<Vec<PathBuf>, DiscoveryError> {
    let mut files = Vec::new();
    for expanded in expand_braces(pattern)? {
        let full_pattern = absolute_pattern(base_dir, &expanded);
        let paths = glob(&full_pattern)
            .map_err(|e| DiscoveryError::InvalidPattern(pattern.to_string(), e))?;

        for entry in paths {
            match entry {
                Ok(path) => {
                    if path.is_file() {
                        files.push(path);
                    }
                }
                Err(e) => {
                    tracing::warn!("error reading path: {}", e);
                }
            }
        }
    }

    files.sort();
    files.dedup();
    Ok(files)
}

/// Discover files for an ordered list of patterns.
///
/// Files keep the order of the pattern that first matched them, so a
/// caller can list dependencies before dependents.
pub fn discover_ordered(
    base_dir: &Path,
    patterns: &[String],
) -> Result<Vec<PathBuf>, DiscoveryError> {
    let mut seen = HashSet::new();
    let mut ordered = Vec::new();
    for pattern in patterns {
        for file in discover_files(base_dir, pattern)? {
            if seen.insert(file.clone()) {
                ordered.push(file);
            }
        }
    }
    Ok(ordered)
}

/// Compiled set of patterns used to filter watch events.
#[derive(Debug, Clone)]
pub struct PatternSet {
    patterns: Vec<Pattern>,
    roots: Vec<PathBuf>,
}

impl PatternSet {
    /// Compile `patterns` relative to `base_dir`.
    pub fn new(base_dir: &Path, patterns: &[String]) -> Result<Self, DiscoveryError> {
        let mut compiled = Vec::new();
        let mut roots = Vec::new();
        for pattern in patterns {
            for expanded in expand_braces(pattern)? {
                let full = absolute_pattern(base_dir, &expanded);
                let compiled_pattern = Pattern::new(&full)
                    .map_err(|e| DiscoveryError::InvalidPattern(pattern.to_string(), e))?;
                compiled.push(compiled_pattern);
            }
            let root = PathBuf::from(absolute_pattern(base_dir, &glob_base(pattern).to_string_lossy()));
            if !roots.contains(&root) {
                roots.push(root);
            }
        }
        Ok(Self { patterns: compiled, roots })
    }

    /// Whether `path` matches any pattern.
    pub fn matches(&self, path: &Path) -> bool {
        self.patterns.iter().any(|p| p.matches_path(path))
    }

    /// Directories that need watching to observe every match.
    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }

    /// Whether the set is empty.
    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}
