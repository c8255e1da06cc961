//! JavaScript parsing, lowering and minification through `swc`.
//!
//! Every call runs in its own source map and error handler, so a failure
//! comes back as rendered diagnostics naming the file it belongs to.
//! Output always targets ES5: modules are lowered with JSX compiled and
//! module syntax turned into CommonJS, and the minifier is held to ES5 so
//! it never reintroduces newer syntax.

use serde_json::{json, Value};
use swc::config::{IsModule, JsMinifyOptions, Options};
use swc::{try_with_handler, Compiler, HandlerOpts, JsMinifyExtras};
use swc_common::errors::{ColorConfig, Handler};
use swc_common::sync::Lrc;
use swc_common::{FileName, SourceFile, SourceMap, GLOBALS};
use swc_ecma_ast::{CallExpr, Callee, EsVersion, ExportAll, Expr, ImportDecl, Lit, NamedExport, Str};
use swc_ecma_parser::{EsSyntax, Syntax};
use swc_ecma_visit::{Visit, VisitWith};

/// `process.env.NODE_ENV` for a mode.
pub fn node_env(production: bool) -> &'static str {
    if production {
        "production"
    } else {
        "development"
    }
}

/// A module lowered to an ES5 CommonJS body
#[derive(Debug, Clone)]
pub struct Lowered {
    /// Module body, expecting `module`, `exports` and `require` in scope
    pub code: String,
    /// Specifiers the module loads, in source order without duplicates
    pub specifiers: Vec<String>,
}

/// Minifier output
#[derive(Debug, Clone)]
pub struct Minified {
    /// Minified code
    pub code: String,
    /// Source map JSON, when an input map was given
    pub map: Option<String>,
}

fn syntax() -> Syntax {
    Syntax::Es(EsSyntax { jsx: true, ..Default::default() })
}

/// Run `op` with a compiler, a handler and `source` registered as `name`.
fn with_compiler<R>(
    name: &str,
    source: &str,
    op: impl FnOnce(&Compiler, &Handler, Lrc<SourceFile>) -> anyhow::Result<R>,
) -> Result<R, String> {
    let cm: Lrc<SourceMap> = Default::default();
    let compiler = Compiler::new(cm.clone());
    let opts = HandlerOpts { color: ColorConfig::Never, skip_filename: false };

    GLOBALS.set(&Default::default(), || {
        try_with_handler(cm.clone(), opts, |handler| {
            let fm = cm.new_source_file(Lrc::new(FileName::Custom(name.to_string())), source.to_string());
            op(&compiler, handler, fm)
        })
        .map_err(|e| e.to_string().trim().to_string())
    })
}

/// Collects every specifier a module loads: static imports, re-exports,
/// dynamic `import()` and `require()` with a string literal.
#[derive(Debug, Default)]
struct SpecifierCollector {
    found: Vec<String>,
}

impl SpecifierCollector {
    fn push(&mut self, src: &Str) {
        let specifier = src.value.to_atom_lossy().to_string();
        if !self.found.contains(&specifier) {
            self.found.push(specifier);
        }
    }
}

impl Visit for SpecifierCollector {
    fn visit_import_decl(&mut self, node: &ImportDecl) {
        self.push(&node.src);
    }

    fn visit_export_all(&mut self, node: &ExportAll) {
        self.push(&node.src);
    }

    fn visit_named_export(&mut self, node: &NamedExport) {
        if let Some(src) = &node.src {
            self.push(src);
        }
    }

    fn visit_call_expr(&mut self, node: &CallExpr) {
        let loads = match &node.callee {
            Callee::Import(_) => true,
            Callee::Expr(callee) => matches!(&**callee, Expr::Ident(ident) if &*ident.sym == "require"),
            _ => false,
        };
        if loads && node.args.len() == 1 && node.args[0].spread.is_none() {
            if let Expr::Lit(Lit::Str(src)) = &*node.args[0].expr {
                self.push(src);
            }
        }
        node.visit_children_with(self);
    }
}

fn module_options(name: &str, production: bool) -> Result<Options, serde_json::Error> {
    serde_json::from_value(json!({
        "filename": name,
        "swcrc": false,
        "isModule": "unknown",
        "inputSourceMap": false,
        "jsc": {
            "parser": { "syntax": "ecmascript", "jsx": true },
            "target": "es5",
            "transform": {
                "react": { "runtime": "classic" },
                "optimizer": {
                    "globals": { "envs": { "NODE_ENV": node_env(production) } },
                    "simplify": production
                }
            }
        },
        "module": { "type": "commonjs" }
    }))
}

/// Lower one module to ES5 with JSX compiled, `process.env.NODE_ENV`
/// replaced and module syntax turned into `require`/`exports`. Production
/// builds also drop statically dead branches.
///
/// Specifiers are collected from the parsed source, before lowering.
pub fn lower_module(name: &str, source: &str, production: bool) -> Result<Lowered, String> {
    let options = module_options(name, production).map_err(|e| e.to_string())?;
    with_compiler(name, source, |compiler, handler, fm| {
        let program = compiler.parse_js(fm, handler, EsVersion::EsNext, syntax(), IsModule::Unknown, None)?;
        let mut collector = SpecifierCollector::default();
        program.visit_with(&mut collector);

        let output = compiler.process_js(handler, program, &options)?;
        Ok(Lowered { code: output.code, specifiers: collector.found })
    })
}

fn minify_options(input_map: Option<&str>) -> Value {
    let source_map = match input_map {
        Some(map) => json!({ "content": map }),
        None => json!(false),
    };
    json!({
        "compress": true,
        "mangle": true,
        "ecma": 5,
        "module": false,
        "toplevel": false,
        "sourceMap": source_map,
    })
}

/// Minify a classic script down to ES5.
///
/// Top-level declarations keep their names so globals shared between
/// scripts survive. With `input_map` the returned map is composed with it
/// and points at the original sources.
pub fn minify(name: &str, code: &str, input_map: Option<&str>) -> Result<Minified, String> {
    let options: JsMinifyOptions = serde_json::from_value(minify_options(input_map)).map_err(|e| e.to_string())?;
    with_compiler(name, code, |compiler, handler, fm| {
        let output = compiler.minify(fm, handler, &options, JsMinifyExtras::default())?;
        Ok(Minified { code: output.code, map: output.map })
    })
}

/// Check that a classic script parses.
pub fn check_syntax(name: &str, source: &str) -> Result<(), String> {
    with_compiler(name, source, |compiler, handler, fm| {
        compiler.parse_js(fm, handler, EsVersion::EsNext, syntax(), IsModule::Bool(false), None)?;
        Ok(())
    })
}
