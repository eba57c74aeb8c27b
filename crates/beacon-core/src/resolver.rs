//! Plan validation and execution-plan construction.
//!
//! Everything here is synchronous and fails fast: cycles, unresolved
//! requirements, shape mismatches, and ordering violations are all caught
//! before any session work begins. Unresolved requirements are enumerated
//! exhaustively so configuration bugs get fixed in one pass.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use crate::aggregate::Category;
use crate::contract::{Audit, Collector, Derivation};
use crate::domain::artifact::{ArtifactId, ShapeId};
use crate::domain::digest;
use crate::domain::error::{
    ConfigError, Result, ShapeViolation, UnresolvedRequirement,
};

/// The declared inputs of one run: collectors, derivations, audits, and
/// categories, exactly as configured. Validated by [`resolve`].
#[derive(Default)]
pub struct RunPlan {
    collectors: Vec<Arc<dyn Collector>>,
    derivations: Vec<Arc<dyn Derivation>>,
    audits: Vec<Arc<dyn Audit>>,
    categories: Vec<Category>,
}

impl RunPlan {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a collector. Declaration order is the execution order.
    pub fn add_collector(mut self, collector: impl Collector + 'static) -> Self {
        self.collectors.push(Arc::new(collector));
        self
    }

    /// Declare a derivation.
    pub fn add_derivation(mut self, derivation: impl Derivation + 'static) -> Self {
        self.derivations.push(Arc::new(derivation));
        self
    }

    /// Declare an audit.
    pub fn add_audit(mut self, audit: impl Audit + 'static) -> Self {
        self.audits.push(Arc::new(audit));
        self
    }

    /// Declare a category.
    pub fn add_category(mut self, category: Category) -> Self {
        self.categories.push(category);
        self
    }
}

/// What produces an artifact id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ProducerKind {
    Collector,
    Derivation,
}

/// A validated plan: collector execution order, the derivation registry,
/// audits, categories, and the plan digest. Construction goes through
/// [`resolve`] only.
#[derive(Clone)]
pub struct ExecutionPlan {
    pub(crate) collectors: Vec<Arc<dyn Collector>>,
    pub(crate) derivations: Arc<BTreeMap<String, Arc<dyn Derivation>>>,
    pub(crate) audits: Vec<Arc<dyn Audit>>,
    pub(crate) categories: Vec<Category>,
    plan_digest: String,
}

impl std::fmt::Debug for ExecutionPlan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionPlan")
            .field("collectors", &self.collector_order())
            .field("derivations", &self.derivations.keys().collect::<Vec<_>>())
            .field("audits", &self.audit_count())
            .field("categories", &self.categories)
            .field("plan_digest", &self.plan_digest)
            .finish()
    }
}

impl ExecutionPlan {
    /// SHA256 hex digest of the canonical plan topology.
    pub fn plan_digest(&self) -> &str {
        &self.plan_digest
    }

    /// Artifact ids in collector execution order.
    pub fn collector_order(&self) -> Vec<ArtifactId> {
        self.collectors
            .iter()
            .map(|collector| collector.descriptor().id)
            .collect()
    }

    /// Declared audit count.
    pub fn audit_count(&self) -> usize {
        self.audits.len()
    }
}

/// Validate a declared plan into an executable one.
///
/// Checks, in order: producer uniqueness across the shared raw+derived
/// namespace, audit/category id uniqueness, unresolved requirements
/// (exhaustive), shape agreement between consumers and producers
/// (exhaustive), derivation cycles, collector ordering constraints, and
/// category references. No collector is invoked before this succeeds.
pub fn resolve(plan: RunPlan) -> Result<ExecutionPlan> {
    let RunPlan {
        collectors,
        derivations,
        audits,
        categories,
    } = plan;

    // Producer registry over the single artifact namespace.
    let mut producers: BTreeMap<ArtifactId, (ProducerKind, ShapeId)> = BTreeMap::new();
    for collector in &collectors {
        let descriptor = collector.descriptor();
        if producers
            .insert(descriptor.id.clone(), (ProducerKind::Collector, descriptor.shape))
            .is_some()
        {
            return Err(ConfigError::DuplicateArtifact(descriptor.id.to_string()));
        }
    }
    for derivation in &derivations {
        let descriptor = derivation.descriptor();
        if producers
            .insert(descriptor.id.clone(), (ProducerKind::Derivation, descriptor.shape))
            .is_some()
        {
            return Err(ConfigError::DuplicateArtifact(descriptor.id.to_string()));
        }
    }

    // Audit and category id uniqueness.
    let mut audit_ids: BTreeSet<String> = BTreeSet::new();
    for audit in &audits {
        let id = audit.meta().id;
        if !audit_ids.insert(id.clone()) {
            return Err(ConfigError::DuplicateAudit(id));
        }
    }
    let mut category_ids: BTreeSet<String> = BTreeSet::new();
    for category in &categories {
        if !category_ids.insert(category.id.clone()) {
            return Err(ConfigError::DuplicateCategory(category.id.clone()));
        }
    }

    // Every declared requirement must have a producer; enumerate every
    // missing id, not just the first.
    let mut unresolved = Vec::new();
    let mut shape_violations = Vec::new();
    let mut check_inputs = |consumer: String, inputs: Vec<crate::contract::InputSpec>| {
        for input in inputs {
            match producers.get(&input.id) {
                None => unresolved.push(UnresolvedRequirement {
                    consumer: consumer.clone(),
                    artifact: input.id.to_string(),
                }),
                Some((_, declared_shape)) => {
                    if declared_shape.type_id() != input.shape.type_id() {
                        shape_violations.push(ShapeViolation {
                            consumer: consumer.clone(),
                            artifact: input.id.to_string(),
                            expected: input.shape.name().to_string(),
                            found: declared_shape.name().to_string(),
                        });
                    }
                }
            }
        }
    };
    for derivation in &derivations {
        let id = derivation.descriptor().id;
        check_inputs(format!("derivation '{id}'"), derivation.requires());
    }
    for audit in &audits {
        let id = audit.meta().id;
        check_inputs(format!("audit '{id}'"), audit.requires());
    }
    for collector in &collectors {
        let id = collector.descriptor().id;
        for after in collector.runs_after() {
            if !producers.contains_key(&after) {
                unresolved.push(UnresolvedRequirement {
                    consumer: format!("collector '{id}'"),
                    artifact: after.to_string(),
                });
            }
        }
    }
    if !unresolved.is_empty() {
        return Err(ConfigError::UnresolvedRequirements(unresolved));
    }
    if !shape_violations.is_empty() {
        return Err(ConfigError::ShapeMismatch(shape_violations));
    }

    // Static cycle check over the derivation graph. A cyclic derivation
    // can never be evaluated, so this is rejected here rather than left to
    // runtime recursion or deadlock.
    let derivation_deps: BTreeMap<String, Vec<String>> = derivations
        .iter()
        .map(|derivation| {
            let id = derivation.descriptor().id.to_string();
            let deps = derivation
                .requires()
                .into_iter()
                .filter(|input| {
                    matches!(
                        producers.get(&input.id),
                        Some((ProducerKind::Derivation, _))
                    )
                })
                .map(|input| input.id.to_string())
                .collect();
            (id, deps)
        })
        .collect();
    if let Some(cycle) = find_cycle(&derivation_deps) {
        return Err(ConfigError::CyclicDerivation(cycle));
    }

    // Declared order is the execution order; ordering constraints are
    // validated against it, never used to re-sort.
    let positions: HashMap<ArtifactId, usize> = collectors
        .iter()
        .enumerate()
        .map(|(index, collector)| (collector.descriptor().id, index))
        .collect();
    for (index, collector) in collectors.iter().enumerate() {
        let id = collector.descriptor().id;
        for after in collector.runs_after() {
            let satisfied = positions
                .get(&after)
                .map(|&producer_index| producer_index < index)
                .unwrap_or(false);
            if !satisfied {
                return Err(ConfigError::OrderingViolation {
                    collector: id.to_string(),
                    requires: after.to_string(),
                });
            }
        }
    }

    // Category references must name declared audits with sane weights.
    let mut unknown_refs = Vec::new();
    for category in &categories {
        for reference in &category.refs {
            if !audit_ids.contains(&reference.audit_id) {
                unknown_refs.push(format!(
                    "category '{}' -> audit '{}'",
                    category.id, reference.audit_id
                ));
            }
            if !reference.weight.is_finite() || reference.weight < 0.0 {
                return Err(ConfigError::InvalidWeight {
                    category: category.id.clone(),
                    audit: reference.audit_id.clone(),
                    weight: reference.weight,
                });
            }
        }
    }
    if !unknown_refs.is_empty() {
        return Err(ConfigError::UnknownAuditRefs(unknown_refs));
    }

    let plan_digest = compute_plan_digest(&collectors, &derivations, &audits, &categories)?;

    let derivations = Arc::new(
        derivations
            .into_iter()
            .map(|derivation| (derivation.descriptor().id.to_string(), derivation))
            .collect::<BTreeMap<_, _>>(),
    );

    Ok(ExecutionPlan {
        collectors,
        derivations,
        audits,
        categories,
        plan_digest,
    })
}

/// Iterative three-color DFS over the derivation graph; returns the cycle
/// path (first node repeated at the end) when one exists.
fn find_cycle(deps: &BTreeMap<String, Vec<String>>) -> Option<Vec<String>> {
    #[derive(Clone, Copy, PartialEq)]
    enum Mark {
        Unvisited,
        InProgress,
        Done,
    }

    let mut marks: HashMap<&str, Mark> =
        deps.keys().map(|id| (id.as_str(), Mark::Unvisited)).collect();

    for start in deps.keys() {
        if marks.get(start.as_str()) != Some(&Mark::Unvisited) {
            continue;
        }

        let mut stack: Vec<(&str, usize)> = vec![(start.as_str(), 0)];
        let mut path: Vec<&str> = vec![start.as_str()];
        marks.insert(start.as_str(), Mark::InProgress);

        while let Some(&(node, edge_index)) = stack.last() {
            let edges = deps.get(node).map(Vec::as_slice).unwrap_or(&[]);
            match edges.get(edge_index) {
                Some(next) => {
                    if let Some(top) = stack.last_mut() {
                        top.1 += 1;
                    }
                    match marks.get(next.as_str()).copied() {
                        Some(Mark::InProgress) => {
                            let entry = path
                                .iter()
                                .position(|seen| *seen == next.as_str())
                                .unwrap_or(0);
                            let mut cycle: Vec<String> =
                                path[entry..].iter().map(|s| (*s).to_string()).collect();
                            cycle.push(next.clone());
                            return Some(cycle);
                        }
                        Some(Mark::Unvisited) => {
                            marks.insert(next.as_str(), Mark::InProgress);
                            path.push(next.as_str());
                            stack.push((next.as_str(), 0));
                        }
                        _ => {}
                    }
                }
                None => {
                    marks.insert(node, Mark::Done);
                    path.pop();
                    stack.pop();
                }
            }
        }
    }

    None
}

fn compute_plan_digest(
    collectors: &[Arc<dyn Collector>],
    derivations: &[Arc<dyn Derivation>],
    audits: &[Arc<dyn Audit>],
    categories: &[Category],
) -> Result<String> {
    let topology = serde_json::json!({
        "collectors": collectors
            .iter()
            .map(|c| c.descriptor().id.to_string())
            .collect::<Vec<_>>(),
        "derivations": derivations
            .iter()
            .map(|d| serde_json::json!({
                "id": d.descriptor().id.to_string(),
                "requires": d.requires().iter().map(|i| i.id.to_string()).collect::<Vec<_>>(),
            }))
            .collect::<Vec<_>>(),
        "audits": audits
            .iter()
            .map(|a| serde_json::json!({
                "id": a.meta().id,
                "requires": a.requires().iter().map(|i| i.id.to_string()).collect::<Vec<_>>(),
            }))
            .collect::<Vec<_>>(),
        "categories": categories
            .iter()
            .map(|c| serde_json::json!({
                "id": c.id,
                "refs": c.refs.iter()
                    .map(|r| serde_json::json!({"audit": r.audit_id, "weight": r.weight}))
                    .collect::<Vec<_>>(),
            }))
            .collect::<Vec<_>>(),
    });
    digest::compute_digest(&topology)
        .map_err(|e| ConfigError::InvalidSettings(format!("plan digest: {e}")))
}
