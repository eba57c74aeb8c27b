//! External contracts: session handles, collectors, derivations, audits.
//!
//! The engine orchestrates implementations of these traits but owns none of
//! them — the browser driver, the concrete collection routines, and the
//! per-audit scoring formulas all live outside this crate.

use std::any::Any;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::artifact::{ArtifactDescriptor, ArtifactId, ArtifactValue, ShapeId};
use crate::domain::error::{AuditError, CollectionError, DerivationError};
use crate::domain::result::AuditProduct;
use crate::domain::settings::RunSettings;
use crate::runner::RunContext;

// ---------------------------------------------------------------------------
// Session handle
// ---------------------------------------------------------------------------

/// Handle to the live session being audited. Semantics are entirely
/// external; collectors downcast to their concrete driver.
pub trait SessionHandle: Send {
    /// The concrete driver behind this handle.
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

// ---------------------------------------------------------------------------
// Inputs
// ---------------------------------------------------------------------------

/// A consumer-side requirement: an artifact id plus the shape the consumer
/// demands. Checked against the producer registry at resolution time.
#[derive(Debug, Clone)]
pub struct InputSpec {
    pub id: ArtifactId,
    pub shape: ShapeId,
}

impl InputSpec {
    /// Demand artifact `id` with shape `T`.
    pub fn of<T: Any + Send + Sync>(id: impl Into<ArtifactId>) -> Self {
        Self {
            id: id.into(),
            shape: ShapeId::of::<T>(),
        }
    }
}

/// Inputs handed to a derivation or scoring function, in the consumer's
/// declared order. Every value here resolved successfully — recorded
/// upstream failures short-circuit before this struct is built.
#[derive(Debug, Clone, Default)]
pub struct ResolvedInputs {
    values: Vec<(ArtifactId, ArtifactValue)>,
}

impl ResolvedInputs {
    pub(crate) fn new(values: Vec<(ArtifactId, ArtifactValue)>) -> Self {
        Self { values }
    }

    /// All resolved values, in declared order.
    pub fn values(&self) -> &[(ArtifactId, ArtifactValue)] {
        &self.values
    }

    /// The value resolved for `id`.
    pub fn value(&self, id: &str) -> Option<&ArtifactValue> {
        self.values
            .iter()
            .find(|(input_id, _)| input_id.as_str() == id)
            .map(|(_, value)| value)
    }

    /// The value resolved for `id`, downcast to `T`.
    pub fn get<T: Any + Send + Sync>(&self, id: &str) -> Option<&T> {
        self.value(id).and_then(|value| value.downcast::<T>())
    }
}

// ---------------------------------------------------------------------------
// Collector
// ---------------------------------------------------------------------------

/// A collector's product: the raw artifact value plus any non-fatal
/// warnings gathered along the way.
#[derive(Debug, Clone)]
pub struct Collected {
    pub value: ArtifactValue,
    pub warnings: Vec<String>,
}

impl Collected {
    /// Wrap a collected value with no warnings.
    pub fn value<T: Any + Send + Sync>(value: T) -> Self {
        Self {
            value: ArtifactValue::new(value),
            warnings: Vec::new(),
        }
    }

    /// Attach a non-fatal warning.
    pub fn with_warning(mut self, warning: impl Into<String>) -> Self {
        self.warnings.push(warning.into());
        self
    }
}

/// External routine producing one raw artifact from the live session.
///
/// Collectors run strictly sequentially in the resolved order and may
/// mutate session state later collectors depend on.
#[async_trait]
pub trait Collector: Send + Sync {
    /// The artifact this collector publishes: id and value shape.
    fn descriptor(&self) -> ArtifactDescriptor;

    /// Artifact ids that must already be gathered when this collector runs.
    /// Validated against the declared collector order at resolution time,
    /// never used to re-sort it.
    fn runs_after(&self) -> Vec<ArtifactId> {
        Vec::new()
    }

    /// Read the session and produce the artifact value.
    async fn collect(
        &self,
        ctx: &RunContext,
        session: &mut dyn SessionHandle,
    ) -> Result<Collected, CollectionError>;
}

// ---------------------------------------------------------------------------
// Derivation
// ---------------------------------------------------------------------------

/// A pure, deterministic computation over artifacts.
///
/// `compute` must perform no I/O, have no side effects, and depend on
/// nothing but its inputs and the frozen settings — the derivation cache
/// relies on this to cache failures permanently and to never recompute.
#[async_trait]
pub trait Derivation: Send + Sync {
    /// The derived artifact this computation publishes.
    fn descriptor(&self) -> ArtifactDescriptor;

    /// Ordered inputs: raw artifacts and/or other derivations.
    fn requires(&self) -> Vec<InputSpec>;

    /// Compute the derived value from fully resolved inputs.
    async fn compute(
        &self,
        inputs: &ResolvedInputs,
        settings: &RunSettings,
    ) -> Result<ArtifactValue, DerivationError>;
}

// ---------------------------------------------------------------------------
// Audit
// ---------------------------------------------------------------------------

/// Identity and defaults of an audit.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AuditMeta {
    /// Stable identifier, unique within a plan.
    pub id: String,

    /// Human-readable title for reports.
    pub title: String,

    /// Weight used when a category references this audit without an
    /// explicit one.
    pub default_weight: f64,
}

impl AuditMeta {
    /// Meta with default weight 1.0.
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            default_weight: 1.0,
        }
    }

    /// Override the default weight.
    pub fn with_default_weight(mut self, weight: f64) -> Self {
        self.default_weight = weight;
        self
    }
}

/// A scoring rule over gathered and derived values.
#[async_trait]
pub trait Audit: Send + Sync {
    /// Identity and defaults.
    fn meta(&self) -> AuditMeta;

    /// Ordered required inputs, raw or derived.
    fn requires(&self) -> Vec<InputSpec>;

    /// Score fully resolved inputs. Runs inside a failure boundary; an
    /// error or panic here is contained to this audit's result.
    async fn score(
        &self,
        inputs: &ResolvedInputs,
        settings: &RunSettings,
    ) -> Result<AuditProduct, AuditError>;
}
