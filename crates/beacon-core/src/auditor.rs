//! Audit orchestration: input resolution, failure boundaries, bounded
//! parallel scoring.
//!
//! Audits are pure functions over already-published immutable inputs, so
//! they score on a bounded worker pool. The derivation cache is the only
//! shared mutable structure they touch. A scoring error, a contract
//! violation, or a panic converts to a contained `Errored` result; an
//! upstream recorded failure short-circuits before the scoring function is
//! ever invoked.

use std::collections::BTreeMap;
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;
use tokio::sync::Semaphore;

use crate::contract::{Audit, Derivation, InputSpec, ResolvedInputs};
use crate::domain::artifact::ArtifactValue;
use crate::domain::error::{panic_message, CollectionError, DerivationError, RunError};
use crate::domain::result::{AuditFailureKind, AuditResult};
use crate::obs;
use crate::resolver::ExecutionPlan;
use crate::runner::RunContext;
use crate::store::{ArtifactStore, StoreEntry};

/// Why a required input could not be handed to a scoring function.
enum UpstreamFailure {
    Collection {
        cause_id: String,
        error: CollectionError,
    },
    Derivation {
        cause_id: String,
        error: DerivationError,
    },
    /// No slot for the id — the gather phase never reached it. The
    /// resolver makes this unreachable for valid plans.
    Missing { cause_id: String },
}

impl UpstreamFailure {
    fn into_result(self) -> AuditResult {
        match self {
            Self::Collection { cause_id, error } => AuditResult::errored_by(
                AuditFailureKind::UpstreamCollection,
                format!("required artifact '{cause_id}' failed to collect: {error}"),
                cause_id,
            ),
            Self::Derivation { cause_id, error } => AuditResult::errored_by(
                AuditFailureKind::UpstreamDerivation,
                format!("required derivation '{cause_id}' failed: {error}"),
                cause_id,
            ),
            Self::Missing { cause_id } => AuditResult::errored_by(
                AuditFailureKind::UpstreamCollection,
                format!("required artifact '{cause_id}' was never gathered"),
                cause_id,
            ),
        }
    }
}

/// Borrowed resolution context, cheap to copy into recursive calls.
#[derive(Clone, Copy)]
struct ResolveCtx<'a> {
    store: &'a ArtifactStore,
    derivations: &'a BTreeMap<String, Arc<dyn Derivation>>,
    ctx: &'a RunContext,
}

/// Resolve one required input: raw values straight from the store, derived
/// values through the run's cache. Recursion is safe — the resolver
/// rejected cyclic derivations before the run started.
fn resolve_input<'a>(
    rcx: ResolveCtx<'a>,
    input: InputSpec,
) -> BoxFuture<'a, Result<ArtifactValue, UpstreamFailure>> {
    async move {
        if let Some(derivation) = rcx.derivations.get(input.id.as_str()) {
            let mut values = Vec::new();
            for nested in derivation.requires() {
                let nested_id = nested.id.clone();
                let value = resolve_input(rcx, nested).await?;
                values.push((nested_id, value));
            }
            rcx.ctx
                .cache()
                .get_or_compute(derivation, ResolvedInputs::new(values), rcx.ctx.settings())
                .await
                .map_err(|error| UpstreamFailure::Derivation {
                    cause_id: input.id.to_string(),
                    error,
                })
        } else {
            match rcx.store.entry(&input.id) {
                Some(StoreEntry::Collected { value, .. }) => Ok(value.clone()),
                Some(StoreEntry::Failed(error)) => Err(UpstreamFailure::Collection {
                    cause_id: input.id.to_string(),
                    error: error.clone(),
                }),
                None => Err(UpstreamFailure::Missing {
                    cause_id: input.id.to_string(),
                }),
            }
        }
    }
    .boxed()
}

/// Score every audit against the frozen store, converting all failures
/// into contained results. Returns a deterministically ordered map.
pub(crate) async fn audit_all(
    plan: &ExecutionPlan,
    store: Arc<ArtifactStore>,
    ctx: Arc<RunContext>,
) -> Result<BTreeMap<String, AuditResult>, RunError> {
    let run_id = ctx.run_id().to_string();
    let workers = ctx.settings().audit_concurrency;
    let semaphore = Arc::new(Semaphore::new(workers));

    let mut handles = Vec::with_capacity(plan.audits.len());
    for audit in &plan.audits {
        let audit = Arc::clone(audit);
        let store = Arc::clone(&store);
        let derivations = Arc::clone(&plan.derivations);
        let ctx = Arc::clone(&ctx);
        let semaphore = Arc::clone(&semaphore);
        let audit_id = audit.meta().id;

        let handle = tokio::spawn(async move {
            let _permit = semaphore.acquire_owned().await.ok();
            score_one(audit, &store, &derivations, &ctx).await
        });
        handles.push((audit_id, handle));
    }

    let mut results = BTreeMap::new();
    for (audit_id, handle) in handles {
        let result = match handle.await {
            Ok(result) => result,
            // The scoring task panicked through the boundary; contain it
            // like any other scoring failure.
            Err(join_error) if join_error.is_panic() => AuditResult::errored(
                AuditFailureKind::Crashed,
                panic_message(join_error.into_panic()),
            ),
            Err(join_error) => {
                return Err(RunError::Internal(format!(
                    "audit task for '{audit_id}' failed: {join_error}"
                )))
            }
        };
        obs::emit_audit_completed(&run_id, &audit_id, &result);
        results.insert(audit_id, result);
    }

    Ok(results)
}

async fn score_one(
    audit: Arc<dyn Audit>,
    store: &ArtifactStore,
    derivations: &BTreeMap<String, Arc<dyn Derivation>>,
    ctx: &RunContext,
) -> AuditResult {
    let rcx = ResolveCtx {
        store,
        derivations,
        ctx,
    };

    let mut values = Vec::new();
    for input in audit.requires() {
        let input_id = input.id.clone();
        match resolve_input(rcx, input).await {
            Ok(value) => values.push((input_id, value)),
            Err(failure) => return failure.into_result(),
        }
    }

    let inputs = ResolvedInputs::new(values);
    match audit.score(&inputs, ctx.settings()).await {
        Err(error) => AuditResult::errored(AuditFailureKind::ScoringFailed, error.to_string()),
        Ok(product) => match product.validate() {
            Err(violation) => AuditResult::errored(AuditFailureKind::InvalidProduct, violation),
            Ok(()) => AuditResult::scored(product),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use crate::contract::{AuditMeta, Collected, Collector, SessionHandle};
    use crate::domain::artifact::{ArtifactDescriptor, ArtifactId};
    use crate::domain::error::AuditError;
    use crate::domain::result::AuditProduct;
    use crate::domain::settings::RunSettings;
    use crate::resolver::{resolve, RunPlan};

    enum Behavior {
        Score(f64),
        Fail,
        OutOfRange,
        Panic,
    }

    struct TestAudit {
        id: &'static str,
        requires: Vec<&'static str>,
        behavior: Behavior,
    }

    #[async_trait]
    impl Audit for TestAudit {
        fn meta(&self) -> AuditMeta {
            AuditMeta::new(self.id, self.id)
        }

        fn requires(&self) -> Vec<InputSpec> {
            self.requires
                .iter()
                .map(|id| InputSpec::of::<u64>(*id))
                .collect()
        }

        async fn score(
            &self,
            _inputs: &ResolvedInputs,
            _settings: &RunSettings,
        ) -> Result<AuditProduct, AuditError> {
            match self.behavior {
                Behavior::Score(score) => Ok(AuditProduct::score(score)),
                Behavior::Fail => Err(AuditError::Scoring("no main document".to_string())),
                Behavior::OutOfRange => Ok(AuditProduct::score(2.5)),
                Behavior::Panic => panic!("divide by zero in scoring"),
            }
        }
    }

    struct StubCollector {
        id: &'static str,
        fail: bool,
    }

    #[async_trait]
    impl Collector for StubCollector {
        fn descriptor(&self) -> ArtifactDescriptor {
            ArtifactDescriptor::of::<u64>(self.id)
        }

        async fn collect(
            &self,
            _ctx: &RunContext,
            _session: &mut dyn SessionHandle,
        ) -> Result<Collected, CollectionError> {
            if self.fail {
                Err(CollectionError::Session("tab crashed".to_string()))
            } else {
                Ok(Collected::value(10u64))
            }
        }
    }

    struct DoublingDerivation {
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Derivation for DoublingDerivation {
        fn descriptor(&self) -> ArtifactDescriptor {
            ArtifactDescriptor::of::<u64>("Doubled")
        }

        fn requires(&self) -> Vec<InputSpec> {
            vec![InputSpec::of::<u64>("Raw")]
        }

        async fn compute(
            &self,
            inputs: &ResolvedInputs,
            _settings: &RunSettings,
        ) -> Result<ArtifactValue, DerivationError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let raw = inputs
                .get::<u64>("Raw")
                .ok_or_else(|| DerivationError::Failed("missing raw".to_string()))?;
            Ok(ArtifactValue::new(raw * 2))
        }
    }

    fn store_with(entries: Vec<(&str, StoreEntry)>) -> Arc<ArtifactStore> {
        let mut store = ArtifactStore::new();
        for (id, entry) in entries {
            match entry {
                StoreEntry::Collected { value, warnings } => {
                    store.publish(ArtifactId::from(id), value, warnings).expect("publish")
                }
                StoreEntry::Failed(error) => {
                    store.record_failure(ArtifactId::from(id), error).expect("record")
                }
            }
        }
        Arc::new(store)
    }

    fn collected(value: u64) -> StoreEntry {
        StoreEntry::Collected {
            value: ArtifactValue::new(value),
            warnings: Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_one_failing_audit_never_affects_the_others() {
        let plan = resolve(
            RunPlan::new()
                .add_audit(TestAudit { id: "a", requires: vec![], behavior: Behavior::Score(1.0) })
                .add_audit(TestAudit { id: "b", requires: vec![], behavior: Behavior::Fail })
                .add_audit(TestAudit { id: "c", requires: vec![], behavior: Behavior::Score(0.5) }),
        )
        .expect("resolve");
        let ctx = Arc::new(RunContext::new(RunSettings::default()));

        let results = audit_all(&plan, store_with(vec![]), ctx).await.expect("audit");

        assert_eq!(results.len(), 3);
        assert_eq!(results["a"].numeric_score(), Some(1.0));
        assert!(matches!(
            &results["b"],
            AuditResult::Errored { kind: AuditFailureKind::ScoringFailed, .. }
        ));
        assert_eq!(results["c"].numeric_score(), Some(0.5));
    }

    #[tokio::test]
    async fn test_contract_violation_reported_not_coerced() {
        let plan = resolve(
            RunPlan::new().add_audit(TestAudit {
                id: "broken-contract",
                requires: vec![],
                behavior: Behavior::OutOfRange,
            }),
        )
        .expect("resolve");
        let ctx = Arc::new(RunContext::new(RunSettings::default()));

        let results = audit_all(&plan, store_with(vec![]), ctx).await.expect("audit");

        assert!(matches!(
            &results["broken-contract"],
            AuditResult::Errored { kind: AuditFailureKind::InvalidProduct, .. }
        ));
    }

    #[tokio::test]
    async fn test_panicking_audit_contained_as_crashed() {
        let plan = resolve(
            RunPlan::new()
                .add_audit(TestAudit { id: "panics", requires: vec![], behavior: Behavior::Panic })
                .add_audit(TestAudit { id: "fine", requires: vec![], behavior: Behavior::Score(1.0) }),
        )
        .expect("resolve");
        let ctx = Arc::new(RunContext::new(RunSettings::default()));

        let results = audit_all(&plan, store_with(vec![]), ctx).await.expect("audit");

        assert!(matches!(
            &results["panics"],
            AuditResult::Errored { kind: AuditFailureKind::Crashed, .. }
        ));
        assert_eq!(results["fine"].numeric_score(), Some(1.0));
    }

    #[tokio::test]
    async fn test_upstream_collection_failure_short_circuits() {
        let plan = resolve(
            RunPlan::new()
                .add_collector(StubCollector { id: "Raw", fail: true })
                .add_audit(TestAudit {
                    id: "needs-raw",
                    requires: vec!["Raw"],
                    behavior: Behavior::Score(1.0),
                }),
        )
        .expect("resolve");
        let ctx = Arc::new(RunContext::new(RunSettings::default()));
        let store = store_with(vec![(
            "Raw",
            StoreEntry::Failed(CollectionError::Session("tab crashed".to_string())),
        )]);

        let results = audit_all(&plan, store, ctx).await.expect("audit");

        match &results["needs-raw"] {
            AuditResult::Errored { kind, cause_id, .. } => {
                assert_eq!(*kind, AuditFailureKind::UpstreamCollection);
                assert_eq!(cause_id.as_deref(), Some("Raw"));
            }
            other => panic!("expected errored, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_failure_behind_derivation_references_raw_cause() {
        let plan = resolve(
            RunPlan::new()
                .add_collector(StubCollector { id: "Raw", fail: true })
                .add_derivation(DoublingDerivation { calls: Arc::new(AtomicUsize::new(0)) })
                .add_audit(TestAudit {
                    id: "needs-doubled",
                    requires: vec!["Doubled"],
                    behavior: Behavior::Score(1.0),
                }),
        )
        .expect("resolve");
        let ctx = Arc::new(RunContext::new(RunSettings::default()));
        let store = store_with(vec![(
            "Raw",
            StoreEntry::Failed(CollectionError::Timeout { budget_ms: 100 }),
        )]);

        let results = audit_all(&plan, store, ctx).await.expect("audit");

        match &results["needs-doubled"] {
            AuditResult::Errored { kind, cause_id, .. } => {
                assert_eq!(*kind, AuditFailureKind::UpstreamCollection);
                assert_eq!(cause_id.as_deref(), Some("Raw"));
            }
            other => panic!("expected errored, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_shared_derivation_computes_once_across_audits() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut plan = RunPlan::new()
            .add_collector(StubCollector { id: "Raw", fail: false })
            .add_derivation(DoublingDerivation { calls: Arc::clone(&calls) });
        for id in ["first", "second", "third", "fourth", "fifth"] {
            plan = plan.add_audit(TestAudit {
                id,
                requires: vec!["Doubled"],
                behavior: Behavior::Score(1.0),
            });
        }
        let plan = resolve(plan).expect("resolve");
        let ctx = Arc::new(RunContext::new(RunSettings::default()));
        let store = store_with(vec![("Raw", collected(10))]);

        let results = audit_all(&plan, store, ctx).await.expect("audit");

        assert_eq!(results.len(), 5);
        assert!(results.values().all(|r| r.numeric_score() == Some(1.0)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
