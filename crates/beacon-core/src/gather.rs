//! Gather orchestration: strictly sequential collector execution.
//!
//! Ordering is a hard contract, not an optimization — collectors may mutate
//! session state later collectors depend on. A collector failure is
//! contained to its artifact id; cancellation unwinds the phase without
//! leaving a half-populated slot behind.

use std::panic::AssertUnwindSafe;

use futures::FutureExt;

use crate::domain::error::{panic_message, CollectionError, RunError};
use crate::obs;
use crate::resolver::ExecutionPlan;
use crate::runner::{CancelSignal, RunContext};
use crate::store::ArtifactStore;
use crate::contract::SessionHandle;

/// Run every collector in the resolved order against one session,
/// publishing values or per-artifact failures into a fresh store.
pub(crate) async fn gather(
    plan: &ExecutionPlan,
    session: &mut dyn SessionHandle,
    ctx: &RunContext,
    mut cancel: CancelSignal,
) -> Result<ArtifactStore, RunError> {
    let mut store = ArtifactStore::new();
    let run_id = ctx.run_id().to_string();
    let budget = ctx.settings().collect_timeout();
    let budget_ms = ctx.settings().collect_timeout_ms;

    for collector in &plan.collectors {
        if cancel.is_cancelled() {
            return Err(RunError::Cancelled);
        }

        let descriptor = collector.descriptor();
        let id = descriptor.id;
        let started = std::time::Instant::now();

        let collection = tokio::time::timeout(
            budget,
            AssertUnwindSafe(collector.collect(ctx, session)).catch_unwind(),
        );

        let outcome = tokio::select! {
            // Dropping the in-flight collection future discards any
            // partially-produced state; the store never sees it.
            _ = cancel.cancelled() => return Err(RunError::Cancelled),
            outcome = collection => outcome,
        };

        let elapsed_ms = started.elapsed().as_millis() as u64;
        match outcome {
            Err(_) => {
                obs::emit_collector_finished(&run_id, id.as_str(), false, elapsed_ms);
                store.record_failure(id, CollectionError::Timeout { budget_ms })?;
            }
            Ok(Err(payload)) => {
                obs::emit_collector_finished(&run_id, id.as_str(), false, elapsed_ms);
                store.record_failure(id, CollectionError::Crashed(panic_message(payload)))?;
            }
            Ok(Ok(Err(error))) => {
                obs::emit_collector_finished(&run_id, id.as_str(), false, elapsed_ms);
                store.record_failure(id, error)?;
            }
            Ok(Ok(Ok(collected))) => {
                // The registry closed over shapes at resolution time; a
                // value of another shape must not reach consumers.
                if collected.value.shape().type_id() != descriptor.shape.type_id() {
                    let error = CollectionError::Protocol(format!(
                        "collector published {}, declared {}",
                        collected.value.shape(),
                        descriptor.shape
                    ));
                    obs::emit_collector_finished(&run_id, id.as_str(), false, elapsed_ms);
                    store.record_failure(id, error)?;
                } else {
                    obs::emit_collector_finished(&run_id, id.as_str(), true, elapsed_ms);
                    store.publish(id, collected.value, collected.warnings)?;
                }
            }
        }
    }

    Ok(store)
}
