// checkgraph-sandbox/src/lib.rs
// ============================================================================
// Module: Checkgraph Sandbox
// Description: Restricted, single-threaded, synchronous expression evaluator
//              used for `if`, `fail_if`, `run_js`, and `goto_js` (spec §4.4).
// Purpose: Evaluate untrusted check-author expressions against a fixed,
//          enumerated namespace with no network, filesystem, or dynamic code
//          loading, and hard limits on input size, nesting, and step count.
// Dependencies: serde_json
// ============================================================================

//! ## Overview
//! This crate implements a small expression language — not a JS engine — over
//! a recursive-descent parser grounded in the same shape as a hand-rolled,
//! position-tracked DSL parser: explicit lex/parse/eval phases, `SandboxError`
//! variants instead of panics, and const byte/nesting/step limits enforced at
//! every phase.
//!
//! Callers build a [`Value::Object`] namespace (`step`, `outputs`, `pr`, ...)
//! per spec §4.4, evaluate with [`eval_expr`], and read back a [`Value`].
//! `memory.*` and `permissions.*` calls are routed through a host-supplied
//! [`Host`] implementation so this crate never depends on the engine crate.

mod ast;
mod error;
mod eval;
mod host;
mod lexer;
mod parser;
mod value;

pub use error::SandboxError;
pub use host::Host;
pub use host::NullHost;
pub use value::Value;

use std::collections::BTreeMap;

/// Parses and evaluates `source` against `globals`, using `host` for the
/// `memory`/`permissions` namespaces.
///
/// # Errors
///
/// Returns [`SandboxError`] on any lex/parse/eval failure. Callers
/// implementing fail-secure `if`-gating (spec §4.3) should treat any `Err`
/// as "skip"; callers implementing `fail_if`/`run_js`/`goto_js` (spec §4.4)
/// should treat any `Err` as a no-op, per spec §7.
pub fn eval_expr<H: Host>(source: &str, globals: BTreeMap<String, Value>, host: &mut H) -> Result<Value, SandboxError> {
    let ast = parser::parse(source)?;
    let mut scope = eval::Scope::new(globals, host);
    eval::eval(&ast, &mut scope)
}

/// Evaluates `source` as a boolean gate (`if`), treating any evaluation
/// error as `false` (fail-secure), matching spec §4.3's "evaluation errors →
/// skip" and §7's sandbox failure semantics.
#[must_use]
pub fn eval_bool_fail_secure<H: Host>(source: &str, globals: BTreeMap<String, Value>, host: &mut H) -> bool {
    eval_expr(source, globals, host).map(|v| v.is_truthy()).unwrap_or(false)
}

/// Evaluates `source` expecting a single check id or an array of check ids
/// (the `run_js`/`goto_js` return shape from spec §4.4). A `None` return
/// means evaluation failed or produced no ids; callers should treat that as
/// a no-op rather than an error, per spec §7.
#[must_use]
pub fn eval_id_list<H: Host>(source: &str, globals: BTreeMap<String, Value>, host: &mut H) -> Option<Vec<String>> {
    match eval_expr(source, globals, host) {
        Ok(Value::Str(s)) => Some(vec![s]),
        Ok(Value::Array(items)) => Some(items.iter().filter_map(Value::as_str).map(str::to_string).collect()),
        Ok(Value::Null) => Some(Vec::new()),
        _ => None,
    }
}

#[cfg(test)]
mod tests;
