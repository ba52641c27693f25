// checkgraph-core/src/lib.rs
// ============================================================================
// Crate: checkgraph-core
// Description: The DAG-based check-execution engine described in spec §2:
//              dependency planner, wave scheduler, fan-out engine, routing
//              engine, and execution journal, plus the data model and
//              provider boundary they share.
// Purpose: A standalone, runtime-agnostic (beyond tokio) library crate that
//          any host (CLI, server, test harness) can drive by implementing
//          the narrow [`interfaces`] traits and calling into [`runtime`].
// Dependencies: async-trait, checkgraph-sandbox, serde, serde_json, thiserror,
//               tokio
// ============================================================================

//! # checkgraph-core
//!
//! The core of a configurable check-execution engine: a DAG-based workflow
//! orchestrator that runs declaratively-specified checks against an input
//! context, producing structured results, aggregated issues, and a
//! statistics/history record a host can render.
//!
//! This crate deliberately does not know how to run a step — it calls out to
//! a [`interfaces::Provider`] implementation supplied by the host — nor how
//! to load a config document or render results, both of which are host
//! concerns (`checkgraph-config`, `checkgraph-providers`, `checkgraph-cli` in
//! this workspace).
//!
//! Entry points live on [`runtime::WaveScheduler`]: construct one with the
//! host's collaborators (a [`interfaces::ProviderRegistry`], [`interfaces::Memory`],
//! [`interfaces::Templater`], [`interfaces::Analyzer`], [`interfaces::Telemetry`],
//! and permission policy), then call
//! [`runtime::WaveScheduler::execute_grouped_checks`].

pub mod errors;
pub mod interfaces;
pub mod model;
pub mod runtime;

pub use errors::EngineError;
