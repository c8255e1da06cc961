//! Module resolution and dependency graph for the bundle strategy.

use super::runtime::json_module;
use super::toolchain::{lower_module, Lowered};
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::fs;
use std::path::{Component, Path, PathBuf};
use thiserror::Error;

/// Extensions tried when a specifier names a file without one
pub const EXTENSIONS: &[&str] = &["js", "jsx", "json"];

/// Error building a module graph
#[derive(Debug, Error)]
pub enum GraphError {
    /// An entry file does not exist
    #[error("Entry module not found: {0}")]
    EntryNotFound(PathBuf),

    /// A specifier could not be resolved
    #[error("Module not found: Can't resolve '{specifier}'")]
    Unresolved {
        /// The specifier as written
        specifier: String,
        /// Module containing it
        from: PathBuf,
    },

    /// A module could not be read
    #[error("Failed to read {0}: {1}")]
    Io(PathBuf, std::io::Error),

    /// A package manifest is malformed
    #[error("Invalid package.json at {0}: {1}")]
    Manifest(PathBuf, serde_json::Error),

    /// A module failed to parse or lower
    #[error("{message}")]
    Syntax {
        /// The module
        path: PathBuf,
        /// Rendered parser diagnostics
        message: String,
    },
}

impl GraphError {
    /// File the error belongs to, if any.
    pub fn file(&self) -> Option<&Path> {
        match self {
            GraphError::EntryNotFound(path) => Some(path.as_path()),
            GraphError::Unresolved { from, .. } => Some(from.as_path()),
            GraphError::Io(path, _) => Some(path.as_path()),
            GraphError::Manifest(path, _) => Some(path.as_path()),
            GraphError::Syntax { path, .. } => Some(path.as_path()),
        }
    }
}

#[derive(Debug, Deserialize)]
struct PackageManifest {
    #[serde(default)]
    main: Option<String>,
}

/// Remove `.` and `..` components without touching the file system.
pub fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Resolves specifiers to files.
#[derive(Debug, Clone)]
pub struct Resolver {
    project_root: PathBuf,
    aliases: BTreeMap<String, String>,
}

impl Resolver {
    /// Create a resolver for a project.
    pub fn new(project_root: impl Into<PathBuf>) -> Self {
        Self { project_root: project_root.into(), aliases: BTreeMap::new() }
    }

    /// Set module aliases (`name` -> replacement specifier).
    pub fn with_aliases(mut self, aliases: BTreeMap<String, String>) -> Self {
        self.aliases = aliases;
        self
    }

    /// Resolve `specifier` as written in `from`.
    pub fn resolve(&self, from: &Path, specifier: &str) -> Result<PathBuf, GraphError> {
        let unresolved =
            || GraphError::Unresolved { specifier: specifier.to_string(), from: from.to_path_buf() };
        let from_dir = from.parent().unwrap_or(self.project_root.as_path());

        let (base_dir, request) = match self.apply_alias(specifier) {
            Some(aliased) if is_relative(&aliased) => (self.project_root.clone(), aliased),
            Some(aliased) => (from_dir.to_path_buf(), aliased),
            None => (from_dir.to_path_buf(), specifier.to_string()),
        };

        if is_relative(&request) || Path::new(&request).is_absolute() {
            return find_file(&normalize(&base_dir.join(&request))).ok_or_else(unresolved);
        }

        self.resolve_package(&base_dir, &request)?.ok_or_else(unresolved)
    }

    fn apply_alias(&self, specifier: &str) -> Option<String> {
        for (name, target) in &self.aliases {
            if specifier == name {
                return Some(target.clone());
            }
            if let Some(rest) = specifier.strip_prefix(name.as_str()) {
                if rest.starts_with('/') {
                    return Some(format!("{}{}", target, rest));
                }
            }
        }
        None
    }

    fn resolve_package(&self, start: &Path, request: &str) -> Result<Option<PathBuf>, GraphError> {
        let (package, subpath) = split_package(request);

        let mut dir = Some(start);
        while let Some(current) = dir {
            let package_dir = current.join("node_modules").join(package);
            if package_dir.is_dir() {
                if let Some(subpath) = subpath {
                    return Ok(find_file(&package_dir.join(subpath)));
                }
                return package_entry(&package_dir);
            }
            dir = current.parent();
        }
        Ok(None)
    }
}

fn is_relative(specifier: &str) -> bool {
    specifier == "." || specifier == ".." || specifier.starts_with("./") || specifier.starts_with("../")
}

/// `@scope/name/sub` -> (`@scope/name`, Some(`sub`)), `name` -> (`name`, None).
fn split_package(request: &str) -> (&str, Option<&str>) {
    let segments = if request.starts_with('@') { 2 } else { 1 };
    let mut split_at = None;
    let mut seen = 0;
    for (i, c) in request.char_indices() {
        if c == '/' {
            seen += 1;
            if seen == segments {
                split_at = Some(i);
                break;
            }
        }
    }
    match split_at {
        Some(i) => (&request[..i], Some(&request[i + 1..])),
        None => (request, None),
    }
}

fn package_entry(package_dir: &Path) -> Result<Option<PathBuf>, GraphError> {
    let manifest_path = package_dir.join("package.json");
    if manifest_path.is_file() {
        let contents =
            fs::read_to_string(&manifest_path).map_err(|e| GraphError::Io(manifest_path.clone(), e))?;
        let manifest: PackageManifest =
            serde_json::from_str(&contents).map_err(|e| GraphError::Manifest(manifest_path.clone(), e))?;
        if let Some(main) = manifest.main {
            if let Some(found) = find_file(&normalize(&package_dir.join(main))) {
                return Ok(Some(found));
            }
        }
    }
    Ok(find_file(&package_dir.join("index")))
}

/// Try `path`, then `path` with each of [`EXTENSIONS`], then
/// `path/index` with each of them.
pub fn find_file(path: &Path) -> Option<PathBuf> {
    if path.is_file() {
        return Some(path.to_path_buf());
    }
    for ext in EXTENSIONS {
        let mut candidate = path.as_os_str().to_owned();
        candidate.push(".");
        candidate.push(ext);
        let candidate = PathBuf::from(candidate);
        if candidate.is_file() {
            return Some(candidate);
        }
    }
    if path.is_dir() {
        for ext in EXTENSIONS {
            let candidate = path.join(format!("index.{}", ext));
            if candidate.is_file() {
                return Some(candidate);
            }
        }
    }
    None
}

/// Lower a module, or wrap a JSON document as one.
fn load(path: &Path, source: &str, production: bool) -> Result<Lowered, String> {
    if path.extension().is_some_and(|ext| ext == "json") {
        let code = json_module(source).map_err(|e| format!("{}: {}", path.display(), e))?;
        return Ok(Lowered { code, specifiers: Vec::new() });
    }
    lower_module(&path.to_string_lossy(), source, production)
}

/// One module of a graph
#[derive(Debug, Clone)]
pub struct Module {
    /// Numeric id, also the module's index in the graph
    pub id: usize,
    /// Resolved file
    pub path: PathBuf,
    /// Lowered module body
    pub code: String,
    /// Specifier -> module id
    pub dependencies: HashMap<String, usize>,
}

/// Modules reachable from a set of entries.
#[derive(Debug, Clone, Default)]
pub struct ModuleGraph {
    /// Modules in discovery order
    pub modules: Vec<Module>,
    /// Ids of the entry modules, in the order given
    pub entries: Vec<usize>,
}

impl ModuleGraph {
    /// Build the graph reachable from `entries`.
    ///
    /// Every module is read and lowered once; ids follow breadth-first
    /// discovery order with entries first. Dependencies come from the
    /// parsed source of each module.
    pub fn build(entries: &[PathBuf], resolver: &Resolver, production: bool) -> Result<Self, GraphError> {
        let mut graph = ModuleGraph::default();
        let mut index: HashMap<PathBuf, usize> = HashMap::new();
        let mut queue = VecDeque::new();

        for entry in entries {
            let path = find_file(&normalize(entry)).ok_or_else(|| GraphError::EntryNotFound(entry.clone()))?;
            let id = graph.intern(&mut index, &mut queue, path, production)?;
            graph.entries.push(id);
        }

        while let Some((id, specifiers)) = queue.pop_front() {
            let from = graph.modules[id].path.clone();
            for specifier in specifiers {
                let resolved = resolver.resolve(&from, &specifier)?;
                let dep = graph.intern(&mut index, &mut queue, resolved, production)?;
                graph.modules[id].dependencies.insert(specifier, dep);
            }
        }

        Ok(graph)
    }

    fn intern(
        &mut self,
        index: &mut HashMap<PathBuf, usize>,
        queue: &mut VecDeque<(usize, Vec<String>)>,
        path: PathBuf,
        production: bool,
    ) -> Result<usize, GraphError> {
        if let Some(id) = index.get(&path) {
            return Ok(*id);
        }
        let source = fs::read_to_string(&path).map_err(|e| GraphError::Io(path.clone(), e))?;
        let lowered = load(&path, &source, production)
            .map_err(|message| GraphError::Syntax { path: path.clone(), message })?;
        let id = self.modules.len();
        self.modules.push(Module { id, path: path.clone(), code: lowered.code, dependencies: HashMap::new() });
        index.insert(path, id);
        queue.push_back((id, lowered.specifiers));
        Ok(id)
    }

    /// Files of every module.
    pub fn files(&self) -> Vec<&Path> {
        self.modules.iter().map(|m| m.path.as_path()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(root: &Path, rel: &str, contents: &str) -> PathBuf {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn test_normalize() {
        assert_eq!(normalize(Path::new("/a/b/../c/./d.js")), PathBuf::from("/a/c/d.js"));
    }

    #[test]
    fn test_split_package() {
        assert_eq!(split_package("lodash"), ("lodash", None));
        assert_eq!(split_package("lodash/fp/map"), ("lodash", Some("fp/map")));
        assert_eq!(split_package("@scope/pkg/x"), ("@scope/pkg", Some("x")));
    }

    #[test]
    fn test_resolve_relative_with_extensions() {
        let temp = TempDir::new().unwrap();
        let from = write(temp.path(), "src/index.js", "");
        write(temp.path(), "src/util.js", "");
        write(temp.path(), "src/view.jsx", "");
        write(temp.path(), "src/data.json", "{}");
        write(temp.path(), "src/lib/index.js", "");

        let resolver = Resolver::new(temp.path());
        assert!(resolver.resolve(&from, "./util").unwrap().ends_with("src/util.js"));
        assert!(resolver.resolve(&from, "./view").unwrap().ends_with("src/view.jsx"));
        assert!(resolver.resolve(&from, "./data").unwrap().ends_with("src/data.json"));
        assert!(resolver.resolve(&from, "./data.json").unwrap().ends_with("src/data.json"));
        assert!(resolver.resolve(&from, "./lib").unwrap().ends_with("src/lib/index.js"));
    }

    #[test]
    fn test_resolve_package_main() {
        let temp = TempDir::new().unwrap();
        let from = write(temp.path(), "src/index.js", "");
        write(temp.path(), "node_modules/widget/package.json", r#"{"main": "dist/widget.js"}"#);
        write(temp.path(), "node_modules/widget/dist/widget.js", "");
        write(temp.path(), "node_modules/plain/index.js", "");

        let resolver = Resolver::new(temp.path());
        assert!(resolver.resolve(&from, "widget").unwrap().ends_with("node_modules/widget/dist/widget.js"));
        assert!(resolver.resolve(&from, "plain").unwrap().ends_with("node_modules/plain/index.js"));
    }

    #[test]
    fn test_resolve_alias() {
        let temp = TempDir::new().unwrap();
        let from = write(temp.path(), "src/code/index.js", "");
        write(temp.path(), "vendor/tween/TweenLite.js", "");

        let mut aliases = BTreeMap::new();
        aliases.insert("TweenLite".to_string(), "./vendor/tween/TweenLite".to_string());
        let resolver = Resolver::new(temp.path()).with_aliases(aliases);

        assert!(resolver.resolve(&from, "TweenLite").unwrap().ends_with("vendor/tween/TweenLite.js"));
    }

    #[test]
    fn test_resolve_missing() {
        let temp = TempDir::new().unwrap();
        let from = write(temp.path(), "src/index.js", "");
        let err = Resolver::new(temp.path()).resolve(&from, "./nope").unwrap_err();
        assert!(matches!(err, GraphError::Unresolved { .. }));
        assert_eq!(err.to_string(), "Module not found: Can't resolve './nope'");
    }

    #[test]
    fn test_graph_dedupes_shared_modules() {
        let temp = TempDir::new().unwrap();
        let entry = write(temp.path(), "src/index.js", "import a from './a';\nimport b from './b';\n");
        write(temp.path(), "src/a.js", "import s from './shared';\nexport default s;\n");
        write(temp.path(), "src/b.js", "const s = require('./shared');\nmodule.exports = s;\n");
        write(temp.path(), "src/shared.js", "export default 1;\n");

        let graph = ModuleGraph::build(&[entry], &Resolver::new(temp.path()), false).unwrap();
        assert_eq!(graph.modules.len(), 4);
        assert_eq!(graph.entries, vec![0]);
        assert_eq!(graph.modules[0].dependencies["./a"], 1);
        assert_eq!(graph.modules[0].dependencies["./b"], 2);
        assert_eq!(graph.modules[1].dependencies["./shared"], 3);
        assert_eq!(graph.modules[2].dependencies["./shared"], 3);
    }

    #[test]
    fn test_graph_handles_cycles() {
        let temp = TempDir::new().unwrap();
        let entry = write(temp.path(), "src/a.js", "require('./b');\n");
        write(temp.path(), "src/b.js", "require('./a');\n");

        let graph = ModuleGraph::build(&[entry], &Resolver::new(temp.path()), false).unwrap();
        assert_eq!(graph.modules.len(), 2);
        assert_eq!(graph.modules[1].dependencies["./a"], 0);
    }

    #[test]
    fn test_graph_follows_require_after_regex_literal() {
        let temp = TempDir::new().unwrap();
        let entry = write(
            temp.path(),
            "src/ops.js",
            "function isOp(s) { return /[/*]/.test(s); }\nvar dep = require('./dep');\n",
        );
        write(temp.path(), "src/dep.js", "module.exports = 1;\n");

        let graph = ModuleGraph::build(&[entry], &Resolver::new(temp.path()), false).unwrap();
        assert_eq!(graph.modules.len(), 2);
        assert_eq!(graph.modules[0].dependencies["./dep"], 1);
    }

    #[test]
    fn test_graph_wraps_json_modules() {
        let temp = TempDir::new().unwrap();
        let entry = write(temp.path(), "src/index.js", "var data = require('./data.json');\n");
        write(temp.path(), "src/data.json", "{ \"name\": \"widget\", \"sizes\": [1, 2] }\n");

        let graph = ModuleGraph::build(&[entry], &Resolver::new(temp.path()), false).unwrap();
        assert_eq!(graph.modules[1].code, "module.exports = {\"name\":\"widget\",\"sizes\":[1,2]};");
        assert!(graph.modules[1].dependencies.is_empty());
    }

    #[test]
    fn test_graph_reports_invalid_json() {
        let temp = TempDir::new().unwrap();
        let entry = write(temp.path(), "src/index.js", "require('./data.json');\n");
        write(temp.path(), "src/data.json", "{ broken\n");

        let err = ModuleGraph::build(&[entry], &Resolver::new(temp.path()), false).unwrap_err();
        assert!(matches!(err, GraphError::Syntax { .. }));
        assert!(err.file().unwrap().ends_with("src/data.json"));
    }

    #[test]
    fn test_graph_missing_entry() {
        let temp = TempDir::new().unwrap();
        let err = ModuleGraph::build(&[temp.path().join("src/none.js")], &Resolver::new(temp.path()), false).unwrap_err();
        assert!(matches!(err, GraphError::EntryNotFound(_)));
    }
}
