//! Beacon Core Library
//!
//! Run orchestration and derivation-caching engine for session audits:
//! resolve a plan, gather raw signals in strict order, memoize pure
//! derivations per run, score audits inside failure boundaries, and fold
//! results into weighted category scores.
//!
//! The defining reliability property is containment: one failing
//! collector, derivation, or audit degrades exactly its own entry in the
//! run document. Only configuration errors and explicit cancellation abort
//! a run.

pub mod aggregate;
pub mod auditor;
pub mod cache;
pub mod contract;
pub mod domain;
pub mod gather;
pub mod obs;
pub mod report;
pub mod resolver;
pub mod runner;
pub mod store;
pub mod telemetry;

pub use aggregate::{aggregate, Category, CategoryRef};
pub use cache::{DerivationCache, DerivedOutcome};
pub use contract::{
    Audit, AuditMeta, Collected, Collector, Derivation, InputSpec, ResolvedInputs, SessionHandle,
};
pub use domain::{
    ArtifactDescriptor, ArtifactId, ArtifactStatus, ArtifactValue, AuditError, AuditFailureKind,
    AuditProduct, AuditResult, CategoryResult, CollectionError, ConfigError, DerivationError,
    GatherMode, RunError, RunResult, RunSettings, ShapeId,
};
pub use report::{
    read_run_report_json, render_run_summary_md, write_run_report_json, write_run_summary_md,
    RunReport, REPORT_SCHEMA_VERSION,
};
pub use resolver::{resolve, ExecutionPlan, RunPlan};
pub use runner::{run, CancelHandle, CancelSignal, RunContext};
pub use store::{ArtifactStore, StoreEntry};
pub use telemetry::{init_tracing, LogFormat};

/// Beacon version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
