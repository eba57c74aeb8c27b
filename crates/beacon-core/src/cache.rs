//! Per-run memoization of derivation computations.
//!
//! Every unique (derivation, dependency identities) pair computes at most
//! once per run, no matter how many audits request it or how concurrently
//! they do. The guarantee is publish-then-compute: the slot is inserted
//! into the map *before* the computation starts, so a concurrent second
//! request observes the slot and awaits the in-flight computation instead
//! of starting its own. Failures are cached for the rest of the run —
//! derivations are pure, so retrying cannot change the outcome.

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tokio::sync::{Mutex, OnceCell};

use crate::contract::{Derivation, ResolvedInputs};
use crate::domain::artifact::ArtifactValue;
use crate::domain::error::{panic_message, DerivationError};
use crate::domain::settings::RunSettings;

/// Outcome of one derivation computation, cached verbatim.
pub type DerivedOutcome = Result<ArtifactValue, DerivationError>;

type Slot = Arc<OnceCell<DerivedOutcome>>;

/// Cache key: derivation identity plus the pointer identities of each
/// dependency value, in declared order.
///
/// Identity (not equality) is correct here because every raw and derived
/// value is produced exactly once per run — two requests with "the same"
/// dependencies always hold the same allocations. The cache dies with its
/// run context, so identities are never compared across runs.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    derivation: String,
    dependencies: Vec<usize>,
}

/// Run-scoped derivation cache. Owned by exactly one `RunContext` and
/// mutated only through [`DerivationCache::get_or_compute`].
#[derive(Debug, Default)]
pub struct DerivationCache {
    slots: Mutex<HashMap<CacheKey, Slot>>,
}

impl DerivationCache {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Return the memoized value for this derivation and dependency tuple,
    /// computing it exactly once on first request.
    ///
    /// Concurrent callers for the same key all await the same computation
    /// and receive the identical value or identical failure.
    pub async fn get_or_compute(
        &self,
        spec: &Arc<dyn Derivation>,
        inputs: ResolvedInputs,
        settings: &Arc<RunSettings>,
    ) -> DerivedOutcome {
        let key = CacheKey {
            derivation: spec.descriptor().id.to_string(),
            dependencies: inputs
                .values()
                .iter()
                .map(|(_, value)| value.identity())
                .collect(),
        };

        // Publish the slot before the computation can start. The map lock
        // is held only for the slot lookup, never across the computation.
        let slot: Slot = {
            let mut slots = self.slots.lock().await;
            slots
                .entry(key)
                .or_insert_with(|| Arc::new(OnceCell::new()))
                .clone()
        };

        let spec = Arc::clone(spec);
        let settings = Arc::clone(settings);
        slot.get_or_init(move || Self::compute_once(spec, inputs, settings))
            .await
            .clone()
    }

    /// Number of cache entries (in-flight and completed).
    pub async fn len(&self) -> usize {
        self.slots.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.slots.lock().await.is_empty()
    }

    async fn compute_once(
        spec: Arc<dyn Derivation>,
        inputs: ResolvedInputs,
        settings: Arc<RunSettings>,
    ) -> DerivedOutcome {
        let id = spec.descriptor().id;
        tracing::debug!(derivation = %id, "computing derivation");

        let computation = AssertUnwindSafe(spec.compute(&inputs, &settings)).catch_unwind();
        match tokio::time::timeout(settings.derive_timeout(), computation).await {
            Err(_) => Err(DerivationError::Timeout {
                budget_ms: settings.derive_timeout_ms,
            }),
            Ok(Err(payload)) => Err(DerivationError::Crashed(panic_message(payload))),
            Ok(Ok(outcome)) => outcome,
        }
    }
}
