// checkgraph-sandbox/src/error.rs
// ============================================================================
// Module: Sandbox Errors
// Description: Structured lex/parse/eval failures for the expression language.
// Purpose: Give callers position-tracked diagnostics without panicking.
// Dependencies: std
// ============================================================================

use std::fmt;

/// Maximum allowed expression length in bytes.
pub const MAX_EXPR_INPUT_BYTES: usize = 64 * 1024;
/// Maximum supported nesting depth (parens, calls, arrays, objects).
pub const MAX_EXPR_NESTING: usize = 64;
/// Maximum number of evaluation steps before [`SandboxError::StepLimitExceeded`]
/// is raised; bounds pathological `map`/`filter` chains.
pub const MAX_EVAL_STEPS: usize = 200_000;

/// Errors raised while lexing, parsing, or evaluating a sandboxed expression.
#[derive(Debug, Clone, PartialEq)]
pub enum SandboxError {
    /// Expression source was empty or all whitespace.
    EmptyInput,
    /// Expression exceeded [`MAX_EXPR_INPUT_BYTES`].
    InputTooLarge {
        /// Configured maximum.
        max_bytes: usize,
        /// Observed length.
        actual_bytes: usize,
    },
    /// Expression exceeded [`MAX_EXPR_NESTING`].
    NestingTooDeep {
        /// Configured maximum.
        max_depth: usize,
        /// Byte offset where the limit was hit.
        position: usize,
    },
    /// An unexpected character was found while lexing.
    UnexpectedChar {
        /// The offending character.
        found: char,
        /// Byte offset.
        position: usize,
    },
    /// An unexpected token was found while parsing.
    UnexpectedToken {
        /// Human-readable expectation.
        expected: &'static str,
        /// What was actually found.
        found: String,
        /// Byte offset.
        position: usize,
    },
    /// Trailing input remained after a complete expression was parsed.
    TrailingInput {
        /// Byte offset where the trailing input starts.
        position: usize,
    },
    /// A referenced identifier is not part of the enumerated namespace.
    UnknownIdentifier {
        /// The unresolved name.
        name: String,
    },
    /// A member access or method call targeted a name outside the
    /// allow-listed prototype surface (§4.4: Array/String/Object/Map/Set/
    /// Date/RegExp read-only and non-mutating operations only).
    DisallowedMember {
        /// The receiver's type name, for diagnostics.
        receiver: &'static str,
        /// The member name that was rejected.
        name: String,
    },
    /// A call was made with the wrong number or kind of arguments.
    InvalidArguments {
        /// The function or method name.
        callee: String,
        /// Human-readable reason.
        reason: String,
    },
    /// Evaluation exceeded [`MAX_EVAL_STEPS`].
    StepLimitExceeded,
    /// A [`crate::Value::Lambda`] reached a position that requires a plain
    /// JSON value (e.g. the final result).
    NotSerializable,
    /// Division or modulo by a value that coerces to zero produced `NaN`/
    /// `Infinity` in a context requiring a finite ordering comparison.
    NotComparable,
}

impl fmt::Display for SandboxError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyInput => write!(f, "expression is empty"),
            Self::InputTooLarge {
                max_bytes,
                actual_bytes,
            } => write!(f, "expression exceeds size limit: {actual_bytes} bytes (max {max_bytes})"),
            Self::NestingTooDeep {
                max_depth,
                position,
            } => write!(f, "expression nesting exceeds limit {max_depth} at {position}"),
            Self::UnexpectedChar {
                found,
                position,
            } => write!(f, "unexpected character '{found}' at {position}"),
            Self::UnexpectedToken {
                expected,
                found,
                position,
            } => write!(f, "unexpected token `{found}` at {position}, expected {expected}"),
            Self::TrailingInput {
                position,
            } => write!(f, "unexpected trailing input at {position}"),
            Self::UnknownIdentifier {
                name,
            } => write!(f, "unknown identifier `{name}`"),
            Self::DisallowedMember {
                receiver,
                name,
            } => write!(f, "member `{name}` is not allowed on {receiver}"),
            Self::InvalidArguments {
                callee,
                reason,
            } => write!(f, "invalid arguments to `{callee}`: {reason}"),
            Self::StepLimitExceeded => write!(f, "evaluation exceeded the step limit"),
            Self::NotSerializable => write!(f, "value has no JSON representation"),
            Self::NotComparable => write!(f, "values are not comparable"),
        }
    }
}

impl std::error::Error for SandboxError {}
