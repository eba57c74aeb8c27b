//! Run context and end-to-end run orchestration.
//!
//! One [`RunContext`] exists per invocation: frozen settings, a fresh
//! derivation cache, and a warnings sink. It is created at run start,
//! discarded at run end, and never shared across runs — concurrent runs
//! cannot interfere because nothing here is process-wide.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{watch, Mutex};
use uuid::Uuid;

use crate::aggregate;
use crate::auditor;
use crate::cache::DerivationCache;
use crate::contract::SessionHandle;
use crate::domain::error::RunError;
use crate::domain::result::RunResult;
use crate::domain::settings::{GatherMode, RunSettings};
use crate::gather;
use crate::obs;
use crate::resolver::ExecutionPlan;

// ---------------------------------------------------------------------------
// Cancellation
// ---------------------------------------------------------------------------

/// Sender half of a run cancellation pair.
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl CancelHandle {
    /// Create a cancellation pair for one run.
    pub fn new() -> (Self, CancelSignal) {
        let (tx, rx) = watch::channel(false);
        (
            Self { tx },
            CancelSignal {
                rx,
                _keepalive: None,
            },
        )
    }

    /// Cancel the run. The gather loop stops before the next collector,
    /// the in-flight collector is aborted, and the audit phase never runs.
    pub fn cancel(&self) {
        let _ = self.tx.send(true);
    }
}

/// Receiver half of a run cancellation pair. Cheap to clone.
#[derive(Clone)]
pub struct CancelSignal {
    rx: watch::Receiver<bool>,
    // Keeps the never-cancelling channel alive for signals built with
    // `CancelSignal::none`.
    _keepalive: Option<Arc<watch::Sender<bool>>>,
}

impl CancelSignal {
    /// A signal that never fires, for uncancellable invocations.
    pub fn none() -> Self {
        let (tx, rx) = watch::channel(false);
        Self {
            rx,
            _keepalive: Some(Arc::new(tx)),
        }
    }

    /// Whether cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolve when cancellation is requested; pend forever if the handle
    /// was dropped without cancelling.
    pub async fn cancelled(&mut self) {
        if self.rx.wait_for(|cancelled| *cancelled).await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

// ---------------------------------------------------------------------------
// Run context
// ---------------------------------------------------------------------------

/// Per-invocation bundle handed to every collector, derivation, and audit
/// call. Replaces any notion of process-wide run state.
pub struct RunContext {
    run_id: Uuid,
    settings: Arc<RunSettings>,
    cache: DerivationCache,
    warnings: Mutex<Vec<String>>,
}

impl RunContext {
    /// Freeze settings and create a fresh context with an empty cache.
    pub fn new(settings: RunSettings) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            settings: Arc::new(settings),
            cache: DerivationCache::new(),
            warnings: Mutex::new(Vec::new()),
        }
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// The frozen settings for this run.
    pub fn settings(&self) -> &Arc<RunSettings> {
        &self.settings
    }

    /// The gather mode in effect.
    pub fn gather_mode(&self) -> GatherMode {
        self.settings.gather_mode
    }

    /// The run-scoped derivation cache.
    pub fn cache(&self) -> &DerivationCache {
        &self.cache
    }

    /// Record a run-level warning.
    pub async fn add_warning(&self, warning: impl Into<String>) {
        self.warnings.lock().await.push(warning.into());
    }

    pub(crate) async fn take_warnings(&self) -> Vec<String> {
        std::mem::take(&mut *self.warnings.lock().await)
    }
}

// ---------------------------------------------------------------------------
// Run invocation
// ---------------------------------------------------------------------------

/// Execute one full run: gather, audit, aggregate.
///
/// Always completes with a [`RunResult`] listing a score or a classified
/// error per audit. Only plan/settings validation failures and explicit
/// cancellation abort the invocation.
pub async fn run(
    plan: &ExecutionPlan,
    session: &mut dyn SessionHandle,
    settings: RunSettings,
    cancel: CancelSignal,
) -> Result<RunResult, RunError> {
    settings.validate()?;

    let started_at = Utc::now();
    let ctx = Arc::new(RunContext::new(settings));
    let run_id = ctx.run_id().to_string();
    let _span = obs::RunSpan::enter(&run_id);
    obs::emit_run_started(&run_id, ctx.gather_mode(), plan.collectors.len(), plan.audit_count());

    let store = match gather::gather(plan, session, &ctx, cancel).await {
        Ok(store) => Arc::new(store),
        Err(error) => {
            obs::emit_run_aborted(&run_id, &error);
            return Err(error);
        }
    };

    let audit_results = auditor::audit_all(plan, Arc::clone(&store), Arc::clone(&ctx)).await?;

    let category_results = plan
        .categories
        .iter()
        .map(|category| {
            let result = aggregate::aggregate(category, &audit_results);
            obs::emit_category_scored(&run_id, &category.id, result.score());
            (category.id.clone(), result)
        })
        .collect();

    let finished_at = Utc::now();
    let errored = audit_results.values().filter(|r| r.is_errored()).count();
    obs::emit_run_finished(
        &run_id,
        (finished_at - started_at).num_milliseconds().max(0) as u64,
        audit_results.len(),
        errored,
    );

    Ok(RunResult {
        run_id: ctx.run_id(),
        plan_digest: plan.plan_digest().to_string(),
        gather_mode: ctx.gather_mode(),
        started_at,
        finished_at,
        artifacts: store.statuses(),
        audit_results,
        category_results,
        run_warnings: ctx.take_warnings().await,
    })
}
