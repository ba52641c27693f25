// checkgraph-sandbox/src/eval.rs
// ============================================================================
// Module: Sandbox Evaluator
// Description: Tree-walking evaluator over the enumerated namespace, with a
//              fixed allow-list of Array/String/Math/JSON/memory/permissions
//              members (spec §4.4).
// Purpose: Evaluate `if`/`fail_if`/`run_js`/`goto_js` expressions without any
//          access to the filesystem, network, or dynamic code loading.
// Dependencies: crate::ast, crate::error, crate::host, crate::value
// ============================================================================

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use crate::ast::BinOp;
use crate::ast::Expr;
use crate::error::MAX_EVAL_STEPS;
use crate::error::SandboxError;
use crate::host::Host;
use crate::value;
use crate::value::LambdaDef;
use crate::value::RegexDef;
use crate::value::Value;

/// Evaluation environment: the enumerated globals plus a small stack of
/// lambda-parameter frames pushed while a `some`/`every`/`map`/`filter`
/// callback runs.
pub struct Scope<'h, H: Host> {
    globals: BTreeMap<String, Value>,
    frames: Vec<(String, Value)>,
    host: &'h mut H,
    steps: usize,
}

impl<'h, H: Host> Scope<'h, H> {
    /// Builds a scope from the enumerated namespace object (`step`,
    /// `outputs`, `pr`, ... — assembled by the host engine per spec §4.4)
    /// and a host bridge for `memory`/`permissions`.
    #[must_use]
    pub fn new(globals: BTreeMap<String, Value>, host: &'h mut H) -> Self {
        Self {
            globals,
            frames: Vec::new(),
            host,
            steps: 0,
        }
    }

    fn lookup(&self, name: &str) -> Option<Value> {
        for (param, value) in self.frames.iter().rev() {
            if param == name {
                return Some(value.clone());
            }
        }
        self.globals.get(name).cloned()
    }

    fn tick(&mut self) -> Result<(), SandboxError> {
        self.steps += 1;
        if self.steps > MAX_EVAL_STEPS {
            return Err(SandboxError::StepLimitExceeded);
        }
        Ok(())
    }
}

/// Evaluates `expr` in `scope`.
///
/// # Errors
///
/// Returns [`SandboxError`] for unknown identifiers, disallowed members,
/// malformed calls, or exceeding the evaluation step limit.
pub fn eval<H: Host>(expr: &Expr, scope: &mut Scope<'_, H>) -> Result<Value, SandboxError> {
    scope.tick()?;
    match expr {
        Expr::Number(n) => Ok(Value::Number(*n)),
        Expr::Str(s) => Ok(Value::Str(s.clone())),
        Expr::Bool(b) => Ok(Value::Bool(*b)),
        Expr::Null => Ok(Value::Null),
        Expr::Ident(name) => scope
            .lookup(name)
            .ok_or_else(|| SandboxError::UnknownIdentifier { name: name.clone() }),
        Expr::Arrow { param, body } => Ok(Value::Lambda(Rc::new(LambdaDef {
            param: param.clone(),
            body: (**body).clone(),
        }))),
        Expr::Not(inner) => Ok(Value::Bool(!eval(inner, scope)?.is_truthy())),
        Expr::Neg(inner) => Ok(Value::Number(-eval(inner, scope)?.coerce_to_number())),
        Expr::Member { base, field } => eval_member(base, field, scope),
        Expr::Index { base, index } => {
            let base_val = eval(base, scope)?;
            let index_val = eval(index, scope)?;
            index_value(&base_val, &index_val)
        }
        Expr::Array(items) => {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                out.push(eval(item, scope)?);
            }
            Ok(Value::Array(out))
        }
        Expr::Object(entries) => {
            let mut out = BTreeMap::new();
            for (key, value_expr) in entries {
                out.insert(key.clone(), eval(value_expr, scope)?);
            }
            Ok(Value::Object(out))
        }
        Expr::Binary { op, lhs, rhs } => eval_binary(*op, lhs, rhs, scope),
        Expr::Ternary { cond, then, else_ } => {
            if eval(cond, scope)?.is_truthy() {
                eval(then, scope)
            } else {
                eval(else_, scope)
            }
        }
        Expr::Call { callee, args } => eval_call(callee, args, scope),
    }
}

fn eval_binary<H: Host>(
    op: BinOp,
    lhs: &Expr,
    rhs: &Expr,
    scope: &mut Scope<'_, H>,
) -> Result<Value, SandboxError> {
    // Short-circuit operators evaluate their right side lazily.
    if matches!(op, BinOp::And) {
        let l = eval(lhs, scope)?;
        return if l.is_truthy() { eval(rhs, scope) } else { Ok(l) };
    }
    if matches!(op, BinOp::Or) {
        let l = eval(lhs, scope)?;
        return if l.is_truthy() { Ok(l) } else { eval(rhs, scope) };
    }
    let l = eval(lhs, scope)?;
    let r = eval(rhs, scope)?;
    Ok(match op {
        BinOp::Add => {
            if matches!(l, Value::Str(_)) || matches!(r, Value::Str(_)) {
                Value::Str(format!("{}{}", l.coerce_to_string(), r.coerce_to_string()))
            } else {
                Value::Number(l.coerce_to_number() + r.coerce_to_number())
            }
        }
        BinOp::Sub => Value::Number(l.coerce_to_number() - r.coerce_to_number()),
        BinOp::Mul => Value::Number(l.coerce_to_number() * r.coerce_to_number()),
        BinOp::Div => Value::Number(l.coerce_to_number() / r.coerce_to_number()),
        BinOp::Mod => Value::Number(l.coerce_to_number() % r.coerce_to_number()),
        BinOp::Lt => Value::Bool(l.partial_compare(&r).is_some_and(std::cmp::Ordering::is_lt)),
        BinOp::Le => Value::Bool(l.partial_compare(&r).is_some_and(std::cmp::Ordering::is_le)),
        BinOp::Gt => Value::Bool(l.partial_compare(&r).is_some_and(std::cmp::Ordering::is_gt)),
        BinOp::Ge => Value::Bool(l.partial_compare(&r).is_some_and(std::cmp::Ordering::is_ge)),
        BinOp::LooseEq => Value::Bool(l.loose_eq(&r)),
        BinOp::LooseNe => Value::Bool(!l.loose_eq(&r)),
        BinOp::StrictEq => Value::Bool(l.strict_eq(&r)),
        BinOp::StrictNe => Value::Bool(!l.strict_eq(&r)),
        BinOp::And | BinOp::Or => unreachable!("handled above via short-circuit"),
    })
}

fn eval_member<H: Host>(base: &Expr, field: &str, scope: &mut Scope<'_, H>) -> Result<Value, SandboxError> {
    // `Math.PI`, `memory.*`, `permissions.*` are pseudo-namespaces with no
    // backing Value — they're recognized by base-identifier name rather than
    // evaluated as an object member lookup.
    if let Expr::Ident(name) = base {
        match name.as_str() {
            "Math" => return eval_math_constant(field),
            "memory" | "permissions" => {
                // Bare `memory.foo` (no call) resolves to a marker string;
                // actual behavior happens in eval_call when these are invoked.
                return Ok(Value::Str(format!("{name}.{field}")));
            }
            _ => {}
        }
    }
    let base_val = eval(base, scope)?;
    member_value(&base_val, field)
}

fn eval_math_constant(field: &str) -> Result<Value, SandboxError> {
    match field {
        "PI" => Ok(Value::Number(std::f64::consts::PI)),
        "E" => Ok(Value::Number(std::f64::consts::E)),
        other => Err(SandboxError::DisallowedMember {
            receiver: "Math",
            name: other.to_string(),
        }),
    }
}

fn member_value(base: &Value, field: &str) -> Result<Value, SandboxError> {
    match base {
        Value::Object(map) => Ok(map.get(field).cloned().unwrap_or(Value::Null)),
        Value::Array(items) => match field {
            "length" => Ok(Value::Number(items.len() as f64)),
            _ => Ok(Value::Null),
        },
        Value::Str(s) => match field {
            "length" => Ok(Value::Number(s.chars().count() as f64)),
            _ => Ok(Value::Null),
        },
        Value::Map(cell) if field == "size" => Ok(Value::Number(cell.borrow().len() as f64)),
        Value::Set(cell) if field == "size" => Ok(Value::Number(cell.borrow().len() as f64)),
        Value::Null => Ok(Value::Null),
        _ => Err(SandboxError::DisallowedMember {
            receiver: value_type_name(base),
            name: field.to_string(),
        }),
    }
}

/// Builds a `Map` from a `Map(entries)` constructor call. `entries` is an
/// array of `[key, value]` pairs; any entry that isn't a 2-element array or
/// whose key doesn't coerce to a string is skipped (fail-secure over
/// throwing for one malformed pair in an otherwise valid literal).
fn construct_map(entries: Option<&Value>) -> Value {
    let mut map = BTreeMap::new();
    if let Some(Value::Array(pairs)) = entries {
        for pair in pairs {
            if let Value::Array(kv) = pair {
                if let [key, val] = kv.as_slice() {
                    map.insert(key.coerce_to_string(), val.clone());
                }
            }
        }
    }
    Value::Map(Rc::new(RefCell::new(map)))
}

/// Builds a `Set` from a `Set(items)` constructor call, deduplicating via
/// strict equality like JS `Set`.
fn construct_set(items: Option<&Value>) -> Value {
    let mut out: Vec<Value> = Vec::new();
    if let Some(Value::Array(items)) = items {
        for item in items {
            if !out.iter().any(|existing| existing.strict_eq(item)) {
                out.push(item.clone());
            }
        }
    }
    Value::Set(Rc::new(RefCell::new(out)))
}

/// Builds a `RegExp` from a `RegExp(pattern, flags)` constructor call. Only
/// `i` (case-insensitive) and `g` (global, tracked for `exec`) are
/// recognized; any other flag character is rejected.
fn construct_regex(values: &[Value]) -> Result<Value, SandboxError> {
    let pattern = values.first().map_or_else(String::new, Value::coerce_to_string);
    let flags = values.get(1).map_or_else(String::new, Value::coerce_to_string);
    let mut case_insensitive = false;
    for flag in flags.chars() {
        match flag {
            'g' => {}
            'i' => case_insensitive = true,
            other => {
                return Err(SandboxError::InvalidArguments {
                    callee: "RegExp".to_string(),
                    reason: format!("unsupported flag '{other}'"),
                });
            }
        }
    }
    let source = if case_insensitive { format!("(?i){pattern}") } else { pattern.clone() };
    let compiled = regex::Regex::new(&source).map_err(|_| SandboxError::InvalidArguments {
        callee: "RegExp".to_string(),
        reason: "invalid pattern".to_string(),
    })?;
    Ok(Value::Regex(Rc::new(RegexDef { source: pattern, compiled })))
}

fn index_value(base: &Value, index: &Value) -> Result<Value, SandboxError> {
    match base {
        Value::Array(items) => {
            let idx = index.coerce_to_number();
            if idx.is_finite() && idx >= 0.0 {
                #[allow(clippy::cast_sign_loss, clippy::cast_possible_truncation)]
                let i = idx as usize;
                Ok(items.get(i).cloned().unwrap_or(Value::Null))
            } else {
                Ok(Value::Null)
            }
        }
        Value::Object(map) => Ok(map.get(&index.coerce_to_string()).cloned().unwrap_or(Value::Null)),
        Value::Str(s) => {
            let idx = index.coerce_to_number();
            if idx.is_finite() && idx >= 0.0 {
                #[allow(clippy::cast_sign_loss, clippy::cast_possible_truncation)]
                let i = idx as usize;
                Ok(s.chars().nth(i).map_or(Value::Null, |c| Value::Str(c.to_string())))
            } else {
                Ok(Value::Null)
            }
        }
        Value::Null => Ok(Value::Null),
        _ => Err(SandboxError::DisallowedMember {
            receiver: value_type_name(base),
            name: "[index]".to_string(),
        }),
    }
}

const fn value_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::Str(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
        Value::Lambda(_) => "function",
        Value::Map(_) => "map",
        Value::Set(_) => "set",
        Value::Date(_) => "date",
        Value::Regex(_) => "regexp",
    }
}

fn eval_call<H: Host>(callee: &Expr, args: &[Expr], scope: &mut Scope<'_, H>) -> Result<Value, SandboxError> {
    // `memory.get(...)`, `permissions.canMerge(...)`, `Math.max(...)`,
    // `JSON.stringify(...)` are resolved from the dotted callee shape rather
    // than evaluating the base as a real object, matching the fixed
    // namespace spec §4.4 enumerates (no user-defined globals exist).
    if let Expr::Member { base, field } = callee {
        if let Expr::Ident(ns) = base.as_ref() {
            match ns.as_str() {
                "memory" => return eval_memory_call(field, args, scope),
                "permissions" => {
                    let values = eval_args(args, scope)?;
                    return Ok(scope.host.permission_check(field, &values));
                }
                "Math" => return eval_math_call(field, args, scope),
                "JSON" => return eval_json_call(field, args, scope),
                "console" => {
                    // Allowed but inert: the host has no stdout/stderr
                    // surface for sandboxed code to write to.
                    let _ = eval_args(args, scope)?;
                    return Ok(Value::Null);
                }
                "Array" if field == "isArray" => {
                    let values = eval_args(args, scope)?;
                    return Ok(Value::Bool(matches!(values.first(), Some(Value::Array(_)))));
                }
                _ => {}
            }
        }
        // Method call on an evaluated receiver: `x.some(...)`, `s.includes(...)`.
        let receiver = eval(base, scope)?;
        return eval_method(&receiver, field, args, scope);
    }
    if let Expr::Ident(name) = callee {
        let values = eval_args(args, scope)?;
        return match name.as_str() {
            "String" => Ok(Value::Str(values.first().map_or_else(String::new, Value::coerce_to_string))),
            "Number" => Ok(Value::Number(values.first().map_or(0.0, Value::coerce_to_number))),
            "Boolean" => Ok(Value::Bool(values.first().is_some_and(Value::is_truthy))),
            "Map" => Ok(construct_map(values.first())),
            "Set" => Ok(construct_set(values.first())),
            "Date" => Ok(Value::Date(values.first().map_or(0.0, value::parse_date_arg))),
            "RegExp" => construct_regex(&values),
            other => Err(SandboxError::UnknownIdentifier { name: other.to_string() }),
        };
    }
    Err(SandboxError::InvalidArguments {
        callee: "<expr>".to_string(),
        reason: "callee is not callable".to_string(),
    })
}

fn eval_args<H: Host>(args: &[Expr], scope: &mut Scope<'_, H>) -> Result<Vec<Value>, SandboxError> {
    args.iter().map(|a| eval(a, scope)).collect()
}

fn eval_memory_call<H: Host>(
    field: &str,
    args: &[Expr],
    scope: &mut Scope<'_, H>,
) -> Result<Value, SandboxError> {
    let values = eval_args(args, scope)?;
    match field {
        "get" => {
            let key = arg_str("memory.get", &values, 0)?;
            Ok(scope.host.memory_get(&key))
        }
        "has" => {
            let key = arg_str("memory.has", &values, 0)?;
            Ok(Value::Bool(scope.host.memory_has(&key)))
        }
        "list" => Ok(Value::Array(scope.host.memory_list().into_iter().map(Value::Str).collect())),
        "getAll" => Ok(scope.host.memory_get_all()),
        "set" => {
            let key = arg_str("memory.set", &values, 0)?;
            let value = values.get(1).cloned().unwrap_or(Value::Null);
            scope.host.memory_set(&key, value);
            Ok(Value::Null)
        }
        "increment" => {
            let key = arg_str("memory.increment", &values, 0)?;
            let by = values.get(1).map_or(1.0, Value::coerce_to_number);
            Ok(Value::Number(scope.host.memory_increment(&key, by)))
        }
        other => Err(SandboxError::DisallowedMember { receiver: "memory", name: other.to_string() }),
    }
}

fn arg_str(callee: &str, values: &[Value], index: usize) -> Result<String, SandboxError> {
    values
        .get(index)
        .map(Value::coerce_to_string)
        .ok_or_else(|| SandboxError::InvalidArguments {
            callee: callee.to_string(),
            reason: format!("expected argument {index}"),
        })
}

fn eval_math_call<H: Host>(field: &str, args: &[Expr], scope: &mut Scope<'_, H>) -> Result<Value, SandboxError> {
    let values = eval_args(args, scope)?;
    let nums: Vec<f64> = values.iter().map(Value::coerce_to_number).collect();
    match field {
        "max" => Ok(Value::Number(nums.into_iter().fold(f64::NEG_INFINITY, f64::max))),
        "min" => Ok(Value::Number(nums.into_iter().fold(f64::INFINITY, f64::min))),
        "abs" => Ok(Value::Number(nums.first().copied().unwrap_or(0.0).abs())),
        "floor" => Ok(Value::Number(nums.first().copied().unwrap_or(0.0).floor())),
        "ceil" => Ok(Value::Number(nums.first().copied().unwrap_or(0.0).ceil())),
        "round" => Ok(Value::Number(nums.first().copied().unwrap_or(0.0).round())),
        other => Err(SandboxError::DisallowedMember { receiver: "Math", name: other.to_string() }),
    }
}

fn eval_json_call<H: Host>(field: &str, args: &[Expr], scope: &mut Scope<'_, H>) -> Result<Value, SandboxError> {
    let values = eval_args(args, scope)?;
    match field {
        "stringify" => {
            let value = values.first().cloned().unwrap_or(Value::Null);
            let json = value.into_json()?;
            Ok(Value::Str(serde_json::to_string(&json).unwrap_or_default()))
        }
        "parse" => {
            let text = arg_str("JSON.parse", &values, 0)?;
            let parsed: serde_json::Value = serde_json::from_str(&text).map_err(|_| SandboxError::InvalidArguments {
                callee: "JSON.parse".to_string(),
                reason: "invalid JSON".to_string(),
            })?;
            Ok(Value::from_json(&parsed))
        }
        other => Err(SandboxError::DisallowedMember { receiver: "JSON", name: other.to_string() }),
    }
}

/// Calls `lambda` with `arg` bound, used by `some`/`every`/`map`/`filter`/`find`.
fn call_lambda<H: Host>(lambda: &Value, arg: Value, scope: &mut Scope<'_, H>) -> Result<Value, SandboxError> {
    let Value::Lambda(def) = lambda else {
        return Err(SandboxError::InvalidArguments {
            callee: "<callback>".to_string(),
            reason: "expected a function".to_string(),
        });
    };
    scope.frames.push((def.param.clone(), arg));
    let result = eval(&def.body, scope);
    scope.frames.pop();
    result
}

#[allow(clippy::too_many_lines)]
fn eval_method<H: Host>(
    receiver: &Value,
    method: &str,
    args: &[Expr],
    scope: &mut Scope<'_, H>,
) -> Result<Value, SandboxError> {
    match receiver {
        Value::Array(items) => match method {
            "length" => Ok(Value::Number(items.len() as f64)),
            "includes" => {
                let values = eval_args(args, scope)?;
                let needle = values.first().cloned().unwrap_or(Value::Null);
                Ok(Value::Bool(items.iter().any(|item| item.strict_eq(&needle))))
            }
            "indexOf" => {
                let values = eval_args(args, scope)?;
                let needle = values.first().cloned().unwrap_or(Value::Null);
                let idx = items.iter().position(|item| item.strict_eq(&needle));
                Ok(Value::Number(idx.map_or(-1.0, |i| i as f64)))
            }
            "join" => {
                let values = eval_args(args, scope)?;
                let sep = values.first().map_or(",".to_string(), Value::coerce_to_string);
                Ok(Value::Str(
                    items.iter().map(Value::coerce_to_string).collect::<Vec<_>>().join(&sep),
                ))
            }
            "some" | "every" | "find" | "filter" | "map" => {
                let lambda = args
                    .first()
                    .map(|a| eval(a, scope))
                    .transpose()?
                    .ok_or_else(|| SandboxError::InvalidArguments {
                        callee: method.to_string(),
                        reason: "expected a callback argument".to_string(),
                    })?;
                match method {
                    "some" => {
                        for item in items {
                            if call_lambda(&lambda, item.clone(), scope)?.is_truthy() {
                                return Ok(Value::Bool(true));
                            }
                        }
                        Ok(Value::Bool(false))
                    }
                    "every" => {
                        for item in items {
                            if !call_lambda(&lambda, item.clone(), scope)?.is_truthy() {
                                return Ok(Value::Bool(false));
                            }
                        }
                        Ok(Value::Bool(true))
                    }
                    "find" => {
                        for item in items {
                            if call_lambda(&lambda, item.clone(), scope)?.is_truthy() {
                                return Ok(item.clone());
                            }
                        }
                        Ok(Value::Null)
                    }
                    "filter" => {
                        let mut out = Vec::new();
                        for item in items {
                            if call_lambda(&lambda, item.clone(), scope)?.is_truthy() {
                                out.push(item.clone());
                            }
                        }
                        Ok(Value::Array(out))
                    }
                    _ => {
                        let mut out = Vec::with_capacity(items.len());
                        for item in items {
                            out.push(call_lambda(&lambda, item.clone(), scope)?);
                        }
                        Ok(Value::Array(out))
                    }
                }
            }
            other => Err(SandboxError::DisallowedMember { receiver: "Array", name: other.to_string() }),
        },
        Value::Str(s) => match method {
            "length" => Ok(Value::Number(s.chars().count() as f64)),
            "toLowerCase" => Ok(Value::Str(s.to_lowercase())),
            "toUpperCase" => Ok(Value::Str(s.to_uppercase())),
            "trim" => Ok(Value::Str(s.trim().to_string())),
            "includes" => {
                let values = eval_args(args, scope)?;
                Ok(Value::Bool(s.contains(&arg_str("includes", &values, 0)?)))
            }
            "startsWith" => {
                let values = eval_args(args, scope)?;
                Ok(Value::Bool(s.starts_with(&arg_str("startsWith", &values, 0)?)))
            }
            "endsWith" => {
                let values = eval_args(args, scope)?;
                Ok(Value::Bool(s.ends_with(&arg_str("endsWith", &values, 0)?)))
            }
            "split" => {
                let values = eval_args(args, scope)?;
                let sep = arg_str("split", &values, 0)?;
                Ok(Value::Array(
                    if sep.is_empty() {
                        s.chars().map(|c| Value::Str(c.to_string())).collect()
                    } else {
                        s.split(sep.as_str()).map(|p| Value::Str(p.to_string())).collect()
                    },
                ))
            }
            other => Err(SandboxError::DisallowedMember { receiver: "String", name: other.to_string() }),
        },
        Value::Object(map) => match method {
            "hasOwnProperty" => {
                let values = eval_args(args, scope)?;
                Ok(Value::Bool(map.contains_key(&arg_str("hasOwnProperty", &values, 0)?)))
            }
            other => Err(SandboxError::DisallowedMember { receiver: "Object", name: other.to_string() }),
        },
        Value::Map(cell) => match method {
            "get" => {
                let values = eval_args(args, scope)?;
                Ok(cell.borrow().get(&arg_str("get", &values, 0)?).cloned().unwrap_or(Value::Null))
            }
            "has" => {
                let values = eval_args(args, scope)?;
                Ok(Value::Bool(cell.borrow().contains_key(&arg_str("has", &values, 0)?)))
            }
            "set" => {
                let values = eval_args(args, scope)?;
                let key = arg_str("set", &values, 0)?;
                let value = values.get(1).cloned().unwrap_or(Value::Null);
                cell.borrow_mut().insert(key, value);
                Ok(receiver.clone())
            }
            "delete" => {
                let values = eval_args(args, scope)?;
                let key = arg_str("delete", &values, 0)?;
                Ok(Value::Bool(cell.borrow_mut().remove(&key).is_some()))
            }
            other => Err(SandboxError::DisallowedMember { receiver: "Map", name: other.to_string() }),
        },
        Value::Set(cell) => match method {
            "has" => {
                let values = eval_args(args, scope)?;
                let needle = values.first().cloned().unwrap_or(Value::Null);
                Ok(Value::Bool(cell.borrow().iter().any(|item| item.strict_eq(&needle))))
            }
            "add" => {
                let values = eval_args(args, scope)?;
                let item = values.first().cloned().unwrap_or(Value::Null);
                let mut items = cell.borrow_mut();
                if !items.iter().any(|existing| existing.strict_eq(&item)) {
                    items.push(item);
                }
                drop(items);
                Ok(receiver.clone())
            }
            "delete" => {
                let values = eval_args(args, scope)?;
                let needle = values.first().cloned().unwrap_or(Value::Null);
                let mut items = cell.borrow_mut();
                let before = items.len();
                items.retain(|item| !item.strict_eq(&needle));
                Ok(Value::Bool(items.len() != before))
            }
            other => Err(SandboxError::DisallowedMember { receiver: "Set", name: other.to_string() }),
        },
        Value::Date(ms) => match method {
            "toISOString" => Ok(Value::Str(value::date_to_iso_string(*ms))),
            "getTime" => Ok(Value::Number(*ms)),
            other => Err(SandboxError::DisallowedMember { receiver: "Date", name: other.to_string() }),
        },
        Value::Regex(def) => match method {
            "test" => {
                let values = eval_args(args, scope)?;
                let haystack = arg_str("test", &values, 0)?;
                Ok(Value::Bool(def.compiled.is_match(&haystack)))
            }
            "exec" => {
                let values = eval_args(args, scope)?;
                let haystack = arg_str("exec", &values, 0)?;
                Ok(def.compiled.captures(&haystack).map_or(Value::Null, |caps| {
                    Value::Array(
                        caps.iter()
                            .map(|group| group.map_or(Value::Null, |m| Value::Str(m.as_str().to_string())))
                            .collect(),
                    )
                }))
            }
            other => Err(SandboxError::DisallowedMember { receiver: "RegExp", name: other.to_string() }),
        },
        Value::Null => Ok(Value::Null),
        other => Err(SandboxError::DisallowedMember { receiver: value_type_name(other), name: method.to_string() }),
    }
}
