//! Structured observability hooks for the run lifecycle.
//!
//! This module provides:
//! - Run-scoped tracing spans via the `RunSpan` RAII guard
//! - Emission functions for key lifecycle events: run start, collector
//!   completion, audit completion, category scoring, run finish
//!
//! Events are emitted at `info!` level; per-collector and per-derivation
//! detail stays at `debug!`.

use tracing::{info, warn};

use crate::domain::error::RunError;
use crate::domain::result::AuditResult;
use crate::domain::settings::GatherMode;

/// RAII guard that enters a run-scoped tracing span for the duration of a
/// run, so every event below carries the run id.
pub struct RunSpan {
    _span: tracing::span::EnteredSpan,
}

impl RunSpan {
    /// Create and enter a span tagged with the run id.
    pub fn enter(run_id: &str) -> Self {
        let span = tracing::info_span!("beacon.run", run_id = %run_id);
        Self {
            _span: span.entered(),
        }
    }
}

/// Emit event: run started.
pub fn emit_run_started(run_id: &str, mode: GatherMode, collectors: usize, audits: usize) {
    info!(
        event = "run.started",
        run_id = %run_id,
        mode = ?mode,
        collectors = collectors,
        audits = audits,
    );
}

/// Emit event: one collector finished (successfully or not).
pub fn emit_collector_finished(run_id: &str, artifact_id: &str, ok: bool, duration_ms: u64) {
    info!(
        event = "gather.collector_finished",
        run_id = %run_id,
        artifact_id = %artifact_id,
        ok = ok,
        duration_ms = duration_ms,
    );
}

/// Emit event: one audit completed with a score or a contained error.
pub fn emit_audit_completed(run_id: &str, audit_id: &str, result: &AuditResult) {
    info!(
        event = "audit.completed",
        run_id = %run_id,
        audit_id = %audit_id,
        errored = result.is_errored(),
        score = result.numeric_score(),
    );
}

/// Emit event: category aggregate computed (`None` = not applicable).
pub fn emit_category_scored(run_id: &str, category_id: &str, score: Option<f64>) {
    info!(
        event = "category.scored",
        run_id = %run_id,
        category_id = %category_id,
        score = score,
    );
}

/// Emit event: run finished with a complete result document.
pub fn emit_run_finished(run_id: &str, duration_ms: u64, audits: usize, errored: usize) {
    info!(
        event = "run.finished",
        run_id = %run_id,
        duration_ms = duration_ms,
        audits = audits,
        errored = errored,
    );
}

/// Emit event: run aborted before producing a result (warning level).
pub fn emit_run_aborted(run_id: &str, error: &RunError) {
    warn!(event = "run.aborted", run_id = %run_id, error = %error);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_span_create() {
        // Just ensure RunSpan::enter doesn't panic
        let _span = RunSpan::enter("test-run-id");
    }
}
