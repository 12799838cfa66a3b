//! A small built-in runtime.
//!
//! `BasicRuntime` interprets a deliberately tiny, line-oriented script form:
//! enough to import native modules, call their functions with scope values,
//! assign results, and fail on demand. It exists so the engine is usable and
//! testable end-to-end out of the box; embeddings of real interpreters
//! implement [`ScriptRuntime`](super::ScriptRuntime) the same way.
//!
//! Script form, one statement per line:
//!
//! ```text
//! # comment
//! import math
//! total = math.add(total, 2)
//! math.log("checkpoint reached")
//! label = "run a"
//! raise something went wrong
//! ```
//!
//! Arguments are integer, float, `true`/`false`, `null`, or `"string"`
//! literals (no escape sequences), or names resolved from the scope. Calls
//! do not nest.

use std::collections::{HashMap, HashSet};

use anyhow::{Context, anyhow, bail, ensure};
use serde_json::Value;

use crate::module::NativeModule;
use crate::scope::ScriptScope;

use super::ScriptRuntime;

/// The built-in line-oriented runtime.
#[derive(Default)]
pub struct BasicRuntime {
    modules: HashMap<String, NativeModule>,
    initialized: bool,
}

impl BasicRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    fn exec_line(
        &self,
        line: &str,
        scope: &mut ScriptScope,
        imported: &mut HashSet<String>,
    ) -> anyhow::Result<()> {
        if let Some(name) = line.strip_prefix("import ") {
            let name = name.trim();
            ensure!(!name.is_empty(), "import needs a module name");
            ensure!(self.modules.contains_key(name), "no such module: {name}");
            imported.insert(name.to_string());
            return Ok(());
        }

        if line == "raise" {
            bail!("script raised");
        }
        if let Some(message) = line.strip_prefix("raise ") {
            bail!("{}", message.trim());
        }

        if let Some((target, expr)) = split_assignment(line) {
            let value = self.eval_expr(expr, scope, imported)?;
            scope.set(target, value);
            return Ok(());
        }

        // Bare expression; its value is discarded.
        self.eval_expr(line, scope, imported).map(|_| ())
    }

    fn eval_expr(
        &self,
        expr: &str,
        scope: &ScriptScope,
        imported: &HashSet<String>,
    ) -> anyhow::Result<Value> {
        let expr = expr.trim();
        if let Some((module_name, function_name, args)) = parse_call(expr)? {
            ensure!(
                imported.contains(module_name),
                "module '{module_name}' is not imported"
            );
            let module = self
                .modules
                .get(module_name)
                .ok_or_else(|| anyhow!("no such module: {module_name}"))?;
            let function = module.get(function_name).ok_or_else(|| {
                anyhow!("module '{module_name}' has no function '{function_name}'")
            })?;

            let mut values = Vec::with_capacity(args.len());
            for arg in args {
                values.push(eval_atom(arg, scope)?);
            }
            return (function.as_ref())(&values)
                .with_context(|| format!("{module_name}.{function_name} failed"));
        }
        eval_atom(expr, scope)
    }
}

impl ScriptRuntime for BasicRuntime {
    fn install_module(&mut self, name: &str, module: NativeModule) -> anyhow::Result<()> {
        ensure!(
            !self.initialized,
            "modules must be installed before the runtime is initialized"
        );
        ensure!(
            !self.modules.contains_key(name),
            "module '{name}' is already installed"
        );
        self.modules.insert(name.to_string(), module);
        Ok(())
    }

    fn initialize(&mut self) -> anyhow::Result<()> {
        ensure!(!self.initialized, "runtime is already initialized");
        self.initialized = true;
        tracing::debug!("[basic-runtime] initialized ({} modules)", self.modules.len());
        Ok(())
    }

    fn exec(&mut self, code: &str, scope: &mut ScriptScope) -> anyhow::Result<()> {
        ensure!(self.initialized, "runtime is not initialized");
        let mut imported = HashSet::new();
        for (index, raw) in code.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            self.exec_line(line, scope, &mut imported)
                .with_context(|| format!("line {}", index + 1))?;
        }
        Ok(())
    }

    fn shutdown(&mut self) {
        self.initialized = false;
        self.modules.clear();
        tracing::debug!("[basic-runtime] shut down");
    }
}

/// Split `name = expr`, if `line` is an assignment to a plain name.
fn split_assignment(line: &str) -> Option<(&str, &str)> {
    let mut in_string = false;
    for (index, ch) in line.char_indices() {
        match ch {
            '"' => in_string = !in_string,
            '=' if !in_string => {
                let target = line[..index].trim();
                if is_identifier(target) {
                    return Some((target, line[index + 1..].trim()));
                }
                return None;
            }
            _ => {}
        }
    }
    None
}

/// Parse `module.function(args...)`; returns `None` for non-call expressions.
fn parse_call(expr: &str) -> anyhow::Result<Option<(&str, &str, Vec<&str>)>> {
    let Some(open) = expr.find('(') else {
        return Ok(None);
    };
    ensure!(expr.ends_with(')'), "unterminated call: {expr}");

    let head = expr[..open].trim();
    let Some((module_name, function_name)) = head.split_once('.') else {
        bail!("native functions are addressed as module.function: {head}");
    };
    ensure!(
        is_identifier(module_name) && is_identifier(function_name),
        "malformed call target: {head}"
    );

    let inner = &expr[open + 1..expr.len() - 1];
    Ok(Some((module_name, function_name, split_args(inner))))
}

/// Split a call's argument list on commas outside string literals.
fn split_args(inner: &str) -> Vec<&str> {
    let mut args = Vec::new();
    let mut in_string = false;
    let mut start = 0;
    for (index, ch) in inner.char_indices() {
        match ch {
            '"' => in_string = !in_string,
            ',' if !in_string => {
                args.push(inner[start..index].trim());
                start = index + 1;
            }
            _ => {}
        }
    }
    let last = inner[start..].trim();
    if !last.is_empty() || !args.is_empty() {
        args.push(last);
    }
    args
}

/// Evaluate a literal or a scope variable.
fn eval_atom(atom: &str, scope: &ScriptScope) -> anyhow::Result<Value> {
    let atom = atom.trim();
    ensure!(!atom.is_empty(), "empty expression");

    if let Some(rest) = atom.strip_prefix('"') {
        let text = rest
            .strip_suffix('"')
            .ok_or_else(|| anyhow!("unterminated string literal: {atom}"))?;
        return Ok(Value::from(text));
    }
    match atom {
        "true" => return Ok(Value::from(true)),
        "false" => return Ok(Value::from(false)),
        "null" => return Ok(Value::Null),
        _ => {}
    }
    if let Ok(integer) = atom.parse::<i64>() {
        return Ok(Value::from(integer));
    }
    if let Ok(float) = atom.parse::<f64>() {
        return Ok(Value::from(float));
    }
    if is_identifier(atom) {
        return scope
            .get(atom)
            .cloned()
            .ok_or_else(|| anyhow!("undefined variable: {atom}"));
    }
    bail!("unsupported expression: {atom}")
}

fn is_identifier(text: &str) -> bool {
    !text.is_empty()
        && !text.starts_with(|ch: char| ch.is_ascii_digit())
        && text.chars().all(|ch| ch.is_ascii_alphanumeric() || ch == '_')
}

#[cfg(test)]
mod tests {
    use anyhow::anyhow;

    use super::*;

    fn runtime_with_math() -> BasicRuntime {
        let mut runtime = BasicRuntime::new();
        let math = NativeModule::new()
            .function("add", |args: &[Value]| {
                let a = args
                    .first()
                    .and_then(Value::as_i64)
                    .ok_or_else(|| anyhow!("add: expected an integer"))?;
                let b = args
                    .get(1)
                    .and_then(Value::as_i64)
                    .ok_or_else(|| anyhow!("add: expected an integer"))?;
                Ok(Value::from(a + b))
            })
            .function("concat", |args: &[Value]| {
                let mut out = String::new();
                for arg in args {
                    match arg {
                        Value::String(text) => out.push_str(text),
                        other => out.push_str(&other.to_string()),
                    }
                }
                Ok(Value::from(out))
            });
        runtime.install_module("math", math).unwrap();
        runtime.initialize().unwrap();
        runtime
    }

    #[test]
    fn test_literal_assignment() {
        let mut runtime = runtime_with_math();
        let mut scope = ScriptScope::new();
        runtime
            .exec(
                "count = 3\nratio = 1.5\nok = true\nnothing = null\nname = \"alpha\"",
                &mut scope,
            )
            .unwrap();
        assert_eq!(scope.get("count").and_then(Value::as_i64), Some(3));
        assert_eq!(scope.get("ratio").and_then(Value::as_f64), Some(1.5));
        assert_eq!(scope.get("ok").and_then(Value::as_bool), Some(true));
        assert_eq!(scope.get("nothing"), Some(&Value::Null));
        assert_eq!(scope.get("name").and_then(Value::as_str), Some("alpha"));
    }

    #[test]
    fn test_import_and_call() {
        let mut runtime = runtime_with_math();
        let mut scope = ScriptScope::new();
        scope.set("n", 10);
        runtime
            .exec("import math\nn = math.add(n, 2)", &mut scope)
            .unwrap();
        assert_eq!(scope.get("n").and_then(Value::as_i64), Some(12));
    }

    #[test]
    fn test_comments_and_blank_lines() {
        let mut runtime = runtime_with_math();
        let mut scope = ScriptScope::new();
        runtime
            .exec("# setup\n\n  # indented comment\nx = 1\n", &mut scope)
            .unwrap();
        assert_eq!(scope.get("x").and_then(Value::as_i64), Some(1));
    }

    #[test]
    fn test_string_argument_with_comma() {
        let mut runtime = runtime_with_math();
        let mut scope = ScriptScope::new();
        runtime
            .exec("import math\nout = math.concat(\"a, b\", \"=c\")", &mut scope)
            .unwrap();
        assert_eq!(scope.get("out").and_then(Value::as_str), Some("a, b=c"));
    }

    #[test]
    fn test_raise_fails_with_message() {
        let mut runtime = runtime_with_math();
        let mut scope = ScriptScope::new();
        let err = runtime.exec("raise out of cheese", &mut scope).unwrap_err();
        assert!(format!("{err:#}").contains("out of cheese"));
    }

    #[test]
    fn test_call_without_import_fails() {
        let mut runtime = runtime_with_math();
        let mut scope = ScriptScope::new();
        let err = runtime.exec("n = math.add(1, 2)", &mut scope).unwrap_err();
        assert!(format!("{err:#}").contains("not imported"));
    }

    #[test]
    fn test_undefined_variable_fails() {
        let mut runtime = runtime_with_math();
        let mut scope = ScriptScope::new();
        let err = runtime.exec("x = missing", &mut scope).unwrap_err();
        assert!(format!("{err:#}").contains("undefined variable"));
    }

    #[test]
    fn test_unknown_function_fails() {
        let mut runtime = runtime_with_math();
        let mut scope = ScriptScope::new();
        let err = runtime
            .exec("import math\nmath.multiply(2, 3)", &mut scope)
            .unwrap_err();
        assert!(format!("{err:#}").contains("has no function"));
    }

    #[test]
    fn test_error_reports_line_number() {
        let mut runtime = runtime_with_math();
        let mut scope = ScriptScope::new();
        let err = runtime.exec("x = 1\nraise boom", &mut scope).unwrap_err();
        assert!(format!("{err:#}").contains("line 2"));
    }

    #[test]
    fn test_exec_before_initialize_fails() {
        let mut runtime = BasicRuntime::new();
        let mut scope = ScriptScope::new();
        assert!(runtime.exec("x = 1", &mut scope).is_err());
    }
}
