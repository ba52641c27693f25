// checkgraph-providers/src/lib.rs
// ============================================================================
// Crate: checkgraph-providers
// Description: Concrete `Provider` implementations (`log`, `command`) plus
//              the provider registry that resolves a step's `type` to one.
// Purpose: Make the engine runnable end-to-end without pulling AI-call,
//          HTTP, or human-input providers into this workspace.
// Dependencies: async-trait, checkgraph-core, checkgraph-sandbox, serde_json,
//               thiserror, tokio
// ============================================================================

//! # checkgraph-providers
//!
//! Built-in [`checkgraph_core::interfaces::Provider`] implementations:
//!
//! - [`log::LogProvider`] — renders a message template against the step's
//!   dependency view; never fails.
//! - [`command::CommandProvider`] — runs a shell command, enforces a
//!   per-call timeout, and optionally post-processes stdout through a
//!   sandboxed `transform_js` expression.
//!
//! [`registry::CheckgraphProviderRegistry`] resolves a step's `type` string
//! to one of these (or a host-registered provider) and enforces an
//! allow/deny policy before handing out a handle, mirroring the teacher's
//! `ProviderRegistry` (`decision-gate-providers/src/registry.rs`).

pub mod command;
pub mod log;
pub mod registry;

pub use command::CommandProvider;
pub use log::LogProvider;
pub use registry::CheckgraphProviderRegistry;
pub use registry::ProviderAccessPolicy;
