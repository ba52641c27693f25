// checkgraph-sandbox/src/value.rs
// ============================================================================
// Module: Sandbox Value
// Description: Dynamic value type shared by the parser, evaluator, and the
//              host engine's namespace objects (`outputs`, `step`, ...).
// Purpose: Give the restricted expression language a small, JSON-shaped
//          runtime value without pulling in a full JS object model.
// Dependencies: serde_json
// ============================================================================

//! ## Overview
//! [`Value`] mirrors `serde_json::Value` plus a few additions: [`Value::Lambda`],
//! produced by evaluating an arrow-function literal (`x => x.valid`) and
//! consumed only by the handful of allow-listed array methods that take a
//! predicate (`some`, `every`, `map`, `filter`, `find`); and [`Value::Map`],
//! [`Value::Set`], [`Value::Date`], [`Value::Regex`], the basic-ops prototypes
//! spec §4.4 enumerates alongside Array/String/Object. None of these five
//! variants ever escape into a result returned to the host —
//! [`Value::into_json`] rejects all of them except `Date`, which serializes
//! to its ISO-8601 string the way `JSON.stringify` treats a JS `Date`.

use std::cell::RefCell;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use serde_json::Value as Json;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use crate::ast::Expr;
use crate::error::SandboxError;

/// A runtime value inside the sandbox.
#[derive(Clone)]
pub enum Value {
    /// `null` / `undefined` (the sandbox does not distinguish them).
    Null,
    /// Boolean literal or comparison result.
    Bool(bool),
    /// Numeric value. The sandbox only models `f64`, matching JS `Number`.
    Number(f64),
    /// UTF-8 string.
    Str(String),
    /// Ordered array of values.
    Array(Vec<Value>),
    /// String-keyed object. Backed by a `BTreeMap` so iteration order is
    /// deterministic, matching the journal/outputs-history append order
    /// the host engine builds these objects from.
    Object(BTreeMap<String, Value>),
    /// A one-argument arrow function, e.g. `item => item.valid`. Captures
    /// its defining environment by reference so closures over `outputs`
    /// or `foreach` work without copying the whole namespace.
    Lambda(Rc<LambdaDef>),
    /// A string-keyed `Map`, constructed via `Map(entries)` where `entries`
    /// is an array of `[key, value]` pairs. Shared by reference so `set`
    /// mutates the same map a chained `get` observes.
    Map(Rc<RefCell<BTreeMap<String, Value>>>),
    /// A `Set`, constructed via `Set(items)`. Shared by reference for the
    /// same reason as `Map`.
    Set(Rc<RefCell<Vec<Value>>>),
    /// A point in time stored as milliseconds since the Unix epoch,
    /// constructed via `Date(ms)` or `Date(isoString)`.
    Date(f64),
    /// A compiled regular expression, constructed via `RegExp(pattern, flags)`.
    Regex(Rc<RegexDef>),
}

/// Captured arrow-function body and parameter name.
pub struct LambdaDef {
    /// Bound parameter name.
    pub param: String,
    /// Function body, evaluated with `param` bound in scope.
    pub body: Expr,
}

/// A compiled pattern backing [`Value::Regex`]. Only `test`/`exec` (single
/// match) are implemented, so the `g` flag is accepted for compatibility but
/// has no behavioral effect.
pub struct RegexDef {
    /// Source pattern text, as passed to `RegExp(...)`.
    pub source: String,
    /// Compiled matcher. `regex` has no native `i` switch, so a `(?i)`
    /// group is folded into the pattern at construction time instead.
    pub compiled: regex::Regex,
}

impl Value {
    /// Returns true when the value is JS-truthy (`0`, `""`, `null`, `false`,
    /// and `NaN` are falsy; everything else, including empty arrays/objects,
    /// is truthy — matching JS semantics exactly).
    #[must_use]
    pub fn is_truthy(&self) -> bool {
        match self {
            Self::Null => false,
            Self::Bool(b) => *b,
            Self::Number(n) => *n != 0.0 && !n.is_nan(),
            Self::Str(s) => !s.is_empty(),
            Self::Array(_) | Self::Object(_) | Self::Lambda(_) | Self::Map(_) | Self::Set(_) | Self::Regex(_) => true,
            Self::Date(ms) => !ms.is_nan(),
        }
    }

    /// Returns the value as a string the way JS string coercion would,
    /// used by `+` concatenation and template-style comparisons.
    #[must_use]
    pub fn coerce_to_string(&self) -> String {
        match self {
            Self::Null => "null".to_string(),
            Self::Bool(b) => b.to_string(),
            Self::Number(n) => format_number(*n),
            Self::Str(s) => s.clone(),
            Self::Array(items) => items
                .iter()
                .map(Self::coerce_to_string)
                .collect::<Vec<_>>()
                .join(","),
            Self::Object(_) => "[object Object]".to_string(),
            Self::Lambda(_) => "[function]".to_string(),
            Self::Map(_) => "[object Map]".to_string(),
            Self::Set(_) => "[object Set]".to_string(),
            Self::Date(ms) => date_to_iso_string(*ms),
            Self::Regex(def) => format!("/{}/", def.source),
        }
    }

    /// Returns the value as `f64` using JS-like numeric coercion.
    #[must_use]
    pub fn coerce_to_number(&self) -> f64 {
        match self {
            Self::Null => 0.0,
            Self::Bool(true) => 1.0,
            Self::Bool(false) => 0.0,
            Self::Number(n) | Self::Date(n) => *n,
            Self::Str(s) => {
                let trimmed = s.trim();
                if trimmed.is_empty() {
                    0.0
                } else {
                    trimmed.parse::<f64>().unwrap_or(f64::NAN)
                }
            }
            Self::Array(items) if items.is_empty() => 0.0,
            Self::Array(items) if items.len() == 1 => items[0].coerce_to_number(),
            Self::Array(_) | Self::Object(_) | Self::Lambda(_) | Self::Map(_) | Self::Set(_) | Self::Regex(_) => f64::NAN,
        }
    }

    /// Strict equality (`===`): no coercion, type and value must match.
    #[must_use]
    pub fn strict_eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Null, Self::Null) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Number(a), Self::Number(b)) => a == b,
            (Self::Str(a), Self::Str(b)) => a == b,
            (Self::Date(a), Self::Date(b)) => a == b,
            (Self::Array(a), Self::Array(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.strict_eq(y))
            }
            (Self::Object(a), Self::Object(b)) => {
                a.len() == b.len()
                    && a.iter()
                        .all(|(k, v)| b.get(k).is_some_and(|bv| v.strict_eq(bv)))
            }
            (Self::Map(a), Self::Map(b)) => Rc::ptr_eq(a, b),
            (Self::Set(a), Self::Set(b)) => Rc::ptr_eq(a, b),
            (Self::Regex(a), Self::Regex(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// Loose equality (`==`): numbers and numeric strings compare equal,
    /// `null` only equals `null`. Kept intentionally small; the sandbox
    /// does not special-case every JS coercion corner case.
    #[must_use]
    pub fn loose_eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Null, Self::Null) => true,
            (Self::Null, _) | (_, Self::Null) => false,
            (Self::Number(_), Self::Str(_)) | (Self::Str(_), Self::Number(_)) => {
                self.coerce_to_number() == other.coerce_to_number()
            }
            (Self::Bool(_), _) | (_, Self::Bool(_)) => {
                self.coerce_to_number() == other.coerce_to_number()
            }
            _ => self.strict_eq(other),
        }
    }

    /// Orders two values for `<`/`<=`/`>`/`>=`. Strings compare
    /// lexicographically; everything else coerces to a number.
    #[must_use]
    pub fn partial_compare(&self, other: &Self) -> Option<Ordering> {
        if let (Self::Str(a), Self::Str(b)) = (self, other) {
            return Some(a.cmp(b));
        }
        let (a, b) = (self.coerce_to_number(), other.coerce_to_number());
        a.partial_cmp(&b)
    }

    /// Converts a host `serde_json::Value` into a sandbox [`Value`].
    #[must_use]
    pub fn from_json(value: &Json) -> Self {
        match value {
            Json::Null => Self::Null,
            Json::Bool(b) => Self::Bool(*b),
            Json::Number(n) => Self::Number(n.as_f64().unwrap_or(f64::NAN)),
            Json::String(s) => Self::Str(s.clone()),
            Json::Array(items) => Self::Array(items.iter().map(Self::from_json).collect()),
            Json::Object(map) => Self::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), Self::from_json(v)))
                    .collect(),
            ),
        }
    }

    /// Converts this value back to JSON for handing results to the host.
    ///
    /// # Errors
    ///
    /// Returns [`SandboxError::NotSerializable`] for [`Value::Lambda`],
    /// [`Value::Map`], [`Value::Set`], and [`Value::Regex`], none of which
    /// have a JSON representation. [`Value::Date`] serializes to its
    /// ISO-8601 string, matching `JSON.stringify(new Date(...))` in JS.
    pub fn into_json(self) -> Result<Json, SandboxError> {
        Ok(match self {
            Self::Null => Json::Null,
            Self::Bool(b) => Json::Bool(b),
            Self::Number(n) => serde_json::Number::from_f64(n).map_or(Json::Null, Json::Number),
            Self::Str(s) => Json::String(s),
            Self::Date(ms) => Json::String(date_to_iso_string(ms)),
            Self::Array(items) => {
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    out.push(item.into_json()?);
                }
                Json::Array(out)
            }
            Self::Object(map) => {
                let mut out = serde_json::Map::with_capacity(map.len());
                for (k, v) in map {
                    out.insert(k, v.into_json()?);
                }
                Json::Object(out)
            }
            Self::Lambda(_) | Self::Map(_) | Self::Set(_) | Self::Regex(_) => return Err(SandboxError::NotSerializable),
        })
    }

    /// Best-effort string extraction, used when a routing hook expects an
    /// identifier (`on_success.run_js` returning a check id).
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "null"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Number(n) => write!(f, "{}", format_number(*n)),
            Self::Str(s) => write!(f, "{s:?}"),
            Self::Array(items) => f.debug_list().entries(items).finish(),
            Self::Object(map) => f.debug_map().entries(map.iter()).finish(),
            Self::Lambda(_) => write!(f, "<lambda>"),
            Self::Map(cell) => f.debug_map().entries(cell.borrow().iter()).finish(),
            Self::Set(cell) => f.debug_list().entries(cell.borrow().iter()).finish(),
            Self::Date(ms) => write!(f, "Date({})", date_to_iso_string(*ms)),
            Self::Regex(def) => write!(f, "/{}/", def.source),
        }
    }
}

fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        #[allow(clippy::cast_possible_truncation)]
        let as_int = n as i64;
        as_int.to_string()
    } else {
        n.to_string()
    }
}

/// Formats epoch milliseconds as an ISO-8601/RFC 3339 string, matching JS
/// `Date.prototype.toISOString`. Out-of-range or non-finite input falls
/// back to the Unix epoch rather than producing a malformed string.
#[must_use]
pub fn date_to_iso_string(ms: f64) -> String {
    #[allow(clippy::cast_possible_truncation, reason = "saturates via is_finite guard; out-of-range falls back to the epoch string")]
    let nanos = if ms.is_finite() { (ms * 1_000_000.0) as i128 } else { 0 };
    OffsetDateTime::from_unix_timestamp_nanos(nanos)
        .ok()
        .and_then(|dt| dt.format(&Rfc3339).ok())
        .unwrap_or_else(|| "1970-01-01T00:00:00.000Z".to_string())
}

/// Parses a `Date(...)` constructor argument: a numeric epoch-millis value,
/// or an ISO-8601/RFC 3339 string. Anything else yields `NaN`, matching JS
/// `Date` constructor's "Invalid Date" behavior.
#[must_use]
pub fn parse_date_arg(value: &Value) -> f64 {
    match value {
        Value::Number(ms) => *ms,
        Value::Str(s) => OffsetDateTime::parse(s, &Rfc3339)
            .map(|dt| {
                #[allow(clippy::cast_precision_loss, reason = "millisecond precision does not need i128's full range")]
                let millis = dt.unix_timestamp_nanos() as f64 / 1_000_000.0;
                millis
            })
            .unwrap_or(f64::NAN),
        Value::Date(ms) => *ms,
        _ => f64::NAN,
    }
}
