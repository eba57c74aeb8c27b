use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;

use beacon_core::{
    resolve, ArtifactDescriptor, ArtifactValue, Audit, AuditError, AuditMeta, AuditProduct,
    Collected, CollectionError, Collector, ConfigError, Derivation, DerivationError, InputSpec,
    ResolvedInputs, RunContext, RunPlan, RunSettings, SessionHandle,
};

struct CountingCollector {
    id: &'static str,
    invocations: Arc<AtomicUsize>,
}

#[async_trait]
impl Collector for CountingCollector {
    fn descriptor(&self) -> ArtifactDescriptor {
        ArtifactDescriptor::of::<u64>(self.id)
    }

    async fn collect(
        &self,
        _ctx: &RunContext,
        _session: &mut dyn SessionHandle,
    ) -> Result<Collected, CollectionError> {
        self.invocations.fetch_add(1, Ordering::SeqCst);
        Ok(Collected::value(0u64))
    }
}

struct NeedyAudit {
    id: &'static str,
    requires: Vec<&'static str>,
}

#[async_trait]
impl Audit for NeedyAudit {
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
        Ok(AuditProduct::score(1.0))
    }
}

struct ChainDerivation {
    id: &'static str,
    requires: Vec<&'static str>,
}

#[async_trait]
impl Derivation for ChainDerivation {
    fn descriptor(&self) -> ArtifactDescriptor {
        ArtifactDescriptor::of::<u64>(self.id)
    }

    fn requires(&self) -> Vec<InputSpec> {
        self.requires
            .iter()
            .map(|id| InputSpec::of::<u64>(*id))
            .collect()
    }

    async fn compute(
        &self,
        _inputs: &ResolvedInputs,
        _settings: &RunSettings,
    ) -> Result<ArtifactValue, DerivationError> {
        Ok(ArtifactValue::new(0u64))
    }
}

#[test]
fn unresolved_requirement_fails_before_any_collector_runs() {
    let invocations = Arc::new(AtomicUsize::new(0));
    let plan = RunPlan::new()
        .add_collector(CountingCollector {
            id: "Present",
            invocations: Arc::clone(&invocations),
        })
        .add_audit(NeedyAudit {
            id: "wants-missing",
            requires: vec!["X"],
        });

    let outcome = resolve(plan);

    assert!(matches!(
        outcome,
        Err(ConfigError::UnresolvedRequirements(_))
    ));
    assert_eq!(
        invocations.load(Ordering::SeqCst),
        0,
        "resolution is pre-run; no collector may execute"
    );
}

#[test]
fn every_missing_requirement_is_enumerated() {
    let plan = RunPlan::new()
        .add_audit(NeedyAudit { id: "a", requires: vec!["X"] })
        .add_audit(NeedyAudit { id: "b", requires: vec!["Y"] })
        .add_derivation(ChainDerivation {
            id: "D",
            requires: vec!["Z"],
        })
        .add_audit(NeedyAudit { id: "c", requires: vec!["D"] });

    match resolve(plan) {
        Err(ConfigError::UnresolvedRequirements(missing)) => {
            let mut artifacts: Vec<&str> =
                missing.iter().map(|m| m.artifact.as_str()).collect();
            artifacts.sort_unstable();
            assert_eq!(artifacts, vec!["X", "Y", "Z"]);
        }
        other => panic!("expected exhaustive enumeration, got {other:?}"),
    }
}

#[test]
fn derivation_cycles_are_rejected_statically() {
    let plan = RunPlan::new()
        .add_derivation(ChainDerivation { id: "A", requires: vec!["B"] })
        .add_derivation(ChainDerivation { id: "B", requires: vec!["A"] });

    match resolve(plan) {
        Err(ConfigError::CyclicDerivation(path)) => {
            assert_eq!(path.first(), path.last());
            assert!(path.len() >= 3);
        }
        other => panic!("expected cycle rejection, got {other:?}"),
    }
}

#[test]
fn redefining_an_artifact_id_is_fatal() {
    let invocations = Arc::new(AtomicUsize::new(0));
    let plan = RunPlan::new()
        .add_collector(CountingCollector {
            id: "Trace",
            invocations: Arc::clone(&invocations),
        })
        .add_collector(CountingCollector {
            id: "Trace",
            invocations: Arc::clone(&invocations),
        });

    assert!(matches!(
        resolve(plan),
        Err(ConfigError::DuplicateArtifact(id)) if id == "Trace"
    ));
    assert_eq!(invocations.load(Ordering::SeqCst), 0);
}

#[test]
fn category_referencing_unknown_audit_is_a_config_error() {
    let plan = RunPlan::new()
        .add_audit(NeedyAudit { id: "real", requires: vec![] })
        .add_category(
            beacon_core::Category::new("performance", "Performance")
                .add_ref("real", 1.0)
                .add_ref("imaginary", 2.0),
        );

    match resolve(plan) {
        Err(ConfigError::UnknownAuditRefs(refs)) => {
            assert_eq!(refs.len(), 1);
            assert!(refs[0].contains("imaginary"));
        }
        other => panic!("expected unknown ref rejection, got {other:?}"),
    }
}
