// checkgraph-core/src/errors.rs
// ============================================================================
// Module: Engine Errors
// Description: Fatal engine-level error taxonomy (spec §7).
// Purpose: Distinguish failures that prevent a run from producing any result
//          (planning failures) from failures surfaced as issues on the
//          affected step (everything else, which never throws).
// Dependencies: crate::model, thiserror
// ============================================================================

use thiserror::Error;

use crate::model::CheckId;

/// Fatal errors that prevent a run from executing any steps.
///
/// Per spec §7 ("Propagation") these are the *only* two cases; every other
/// failure mode (provider errors, sandbox errors, template errors, retry/loop
/// exhaustion) is instead represented as an [`Issue`](crate::model::Issue) on
/// the affected step and never reaches this type, except when the engine is
/// run in strict mode (spec §7: "In a strict mode ... any `<check>/error` or
/// `/promise-error` issue causes the engine facade to throw at the end of the
/// run"), represented here as [`EngineError::StrictModeFailure`].
#[derive(Debug, Error)]
pub enum EngineError {
    /// A `depends_on` token did not resolve to any known check id.
    #[error("dependency-validation-error: {0}")]
    DependencyValidation(String),
    /// The dependency graph contains a cycle.
    #[error("circular-dependency-error: {0}")]
    CircularDependency(String),
    /// Strict mode was enabled and the run produced at least one `<check>/error`
    /// or `<check>/promise-error` issue.
    #[error("strict mode: {count} check(s) produced an error issue; first offender: {first_check}")]
    StrictModeFailure {
        /// Number of checks that produced a qualifying error issue.
        count: usize,
        /// The first check (in execution order) that produced one.
        first_check: CheckId,
    },
}
