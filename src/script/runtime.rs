//! Bundle runtime and output assembly.
//!
//! A bundle is the polyfills, then a loader taking one entry per module,
//! indexed by module id. Each entry pairs the module function with a map
//! from the specifiers the module wrote to module ids, so lowered
//! `require("./x")` calls resolve without rewriting the module body.

use std::collections::{BTreeMap, HashMap};

const PROMISE_POLYFILL: &str = include_str!("polyfill/promise.js");
const FETCH_POLYFILL: &str = include_str!("polyfill/fetch.js");

const LOADER: &str = r#"(function (modules, entries) {
  var installed = {};
  function load(id) {
    if (installed[id]) { return installed[id].exports; }
    var module = installed[id] = { id: id, exports: {} };
    var definition = modules[id];
    definition[0].call(module.exports, module, module.exports, function (specifier) {
      if (!Object.prototype.hasOwnProperty.call(definition[1], specifier)) {
        throw new Error("Cannot find module '" + specifier + "'");
      }
      return load(definition[1][specifier]);
    });
    return module.exports;
  }
  for (var i = 0; i < entries.length; i++) { load(entries[i]); }
})"#;

/// One module ready to be written into a bundle
#[derive(Debug, Clone)]
pub struct RenderedModule {
    /// Module id
    pub id: usize,
    /// Path shown in `pathinfo` comments
    pub label: String,
    /// Lowered module body
    pub body: String,
    /// Specifier as written -> module id
    pub dependencies: HashMap<String, usize>,
}

/// Body of a module built from a JSON document.
pub fn json_module(source: &str) -> Result<String, serde_json::Error> {
    let value: serde_json::Value = serde_json::from_str(source)?;
    Ok(format!("module.exports = {};", value))
}

/// The module body wrapped in its loader function.
pub fn wrap_module(body: &str) -> String {
    format!("function (module, exports, require) {{\n{}\n}}", body.trim_end())
}

fn dependency_map(dependencies: &HashMap<String, usize>) -> String {
    let sorted: BTreeMap<&String, &usize> = dependencies.iter().collect();
    serde_json::to_string(&sorted).unwrap_or_else(|_| "{}".to_string())
}

/// Assemble a bundle.
///
/// `modules` must be ordered by id with ids `0..n`. With `pathinfo` each
/// module is preceded by a comment naming its file.
pub fn render_bundle(modules: &[RenderedModule], entries: &[usize], pathinfo: bool) -> String {
    let mut out = String::new();
    out.push_str(PROMISE_POLYFILL.trim_end());
    out.push('\n');
    out.push_str(FETCH_POLYFILL.trim_end());
    out.push('\n');
    out.push_str(LOADER);
    out.push_str("([\n");

    for (i, module) in modules.iter().enumerate() {
        if pathinfo {
            out.push_str(&format!("/*!*** {} ***!*/\n", module.label.replace("*/", "*\\/")));
        }
        out.push_str(&format!("/* {} */ [", module.id));
        out.push_str(&wrap_module(&module.body));
        out.push_str(", ");
        out.push_str(&dependency_map(&module.dependencies));
        out.push(']');
        if i + 1 < modules.len() {
            out.push(',');
        }
        out.push('\n');
    }

    let entries: Vec<String> = entries.iter().map(|id| id.to_string()).collect();
    out.push_str(&format!("], [{}]);\n", entries.join(", ")));
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn module(id: usize, body: &str, deps: &[(&str, usize)]) -> RenderedModule {
        RenderedModule {
            id,
            label: format!("./src/m{}.js", id),
            body: body.to_string(),
            dependencies: deps.iter().map(|(s, id)| (s.to_string(), *id)).collect(),
        }
    }

    #[test]
    fn test_render_lists_entries_in_order() {
        let out = render_bundle(&[module(0, "a();", &[]), module(1, "b();", &[])], &[1, 0], false);
        assert!(out.trim_end().ends_with("], [1, 0]);"));
    }

    #[test]
    fn test_render_dependency_maps() {
        let out = render_bundle(
            &[module(0, "require('./b');", &[("./b", 1), ("./a", 2)]), module(1, "", &[]), module(2, "", &[])],
            &[0],
            false,
        );
        assert!(out.contains("{\"./a\":2,\"./b\":1}]"));
        assert!(out.contains("/* 1 */ [function (module, exports, require) {\n\n}, {}]"));
    }

    #[test]
    fn test_render_pathinfo() {
        let with = render_bundle(&[module(0, "a();", &[])], &[0], true);
        let without = render_bundle(&[module(0, "a();", &[])], &[0], false);
        assert!(with.contains("/*!*** ./src/m0.js ***!*/"));
        assert!(!without.contains("/*!***"));
    }

    #[test]
    fn test_render_includes_polyfills() {
        let out = render_bundle(&[module(0, "", &[])], &[0], false);
        assert!(out.contains("typeof global.Promise === \"function\""));
        assert!(out.contains("typeof global.fetch === \"function\""));
    }

    #[test]
    fn test_runtime_is_es5() {
        let out = render_bundle(&[module(0, "", &[])], &[0], false);
        assert!(!out.contains("=>"));
        assert!(!out.contains("let "));
        assert!(!out.contains("const "));
        assert!(!out.contains('`'));
    }

    #[test]
    fn test_json_module() {
        assert_eq!(json_module("{ \"a\": [1, true] }").unwrap(), "module.exports = {\"a\":[1,true]};");
        assert!(json_module("{ nope").is_err());
    }

    #[test]
    fn test_wrap_module() {
        assert_eq!(wrap_module("x();\n"), "function (module, exports, require) {\nx();\n}");
    }
}
