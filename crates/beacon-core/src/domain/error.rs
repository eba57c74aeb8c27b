//! Error taxonomy for the audit engine.
//!
//! Only [`ConfigError`] (and explicit cancellation) can abort a run.
//! Collection, derivation, and audit failures are contained to the owning
//! artifact, derivation key, or audit, and travel inside the run result as
//! structured entries — which is why those enums are `Clone + Serialize`.

use serde::{Deserialize, Serialize};

/// A requirement that no declared collector or derivation can satisfy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnresolvedRequirement {
    /// Consumer that declared the requirement, e.g. `audit 'dom-size'`.
    pub consumer: String,
    /// The artifact id nobody produces.
    pub artifact: String,
}

impl std::fmt::Display for UnresolvedRequirement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} requires '{}'", self.consumer, self.artifact)
    }
}

/// A consumer demanding a different shape than the producer declares.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShapeViolation {
    pub consumer: String,
    pub artifact: String,
    pub expected: String,
    pub found: String,
}

impl std::fmt::Display for ShapeViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} demands '{}' as {}, producer declares {}",
            self.consumer, self.artifact, self.expected, self.found
        )
    }
}

fn join<T: std::fmt::Display>(items: &[T]) -> String {
    items
        .iter()
        .map(|i| i.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

/// Fatal, pre-run configuration errors. The run aborts before any session
/// work when any of these is detected.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    /// Two producers declared the same artifact id (raw and derived values
    /// share one namespace).
    #[error("duplicate artifact id: '{0}' declared by more than one producer")]
    DuplicateArtifact(String),

    /// Two audits declared the same audit id.
    #[error("duplicate audit id: '{0}'")]
    DuplicateAudit(String),

    /// Two categories declared the same category id.
    #[error("duplicate category id: '{0}'")]
    DuplicateCategory(String),

    /// A derivation transitively depends on itself. The path starts and
    /// ends at the same derivation id.
    #[error("cyclic derivation dependency: {}", .0.join(" -> "))]
    CyclicDerivation(Vec<String>),

    /// Required artifact ids with no producer, enumerated exhaustively so
    /// configuration bugs are fixed in one pass.
    #[error("unresolved requirements: {}", join(.0))]
    UnresolvedRequirements(Vec<UnresolvedRequirement>),

    /// Consumers demanding shapes the producers do not declare.
    #[error("artifact shape mismatches: {}", join(.0))]
    ShapeMismatch(Vec<ShapeViolation>),

    /// A collector's ordering constraint is not satisfied by the declared
    /// collector order.
    #[error("collector '{collector}' must run after '{requires}' but is ordered before it")]
    OrderingViolation { collector: String, requires: String },

    /// Category references to audit ids that are not part of the plan.
    #[error("categories reference unknown audits: {}", join(.0))]
    UnknownAuditRefs(Vec<String>),

    /// A category weight that is negative or not finite.
    #[error("category '{category}' gives audit '{audit}' invalid weight {weight}")]
    InvalidWeight {
        category: String,
        audit: String,
        weight: f64,
    },

    /// Run settings violating a budget invariant.
    #[error("invalid settings: {0}")]
    InvalidSettings(String),
}

/// Per-artifact collection failures, contained to the owning artifact id.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CollectionError {
    /// The collector exceeded its timeout budget.
    #[error("collection timed out after {budget_ms}ms")]
    Timeout { budget_ms: u64 },

    /// The external driver misbehaved.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The session became unusable.
    #[error("session error: {0}")]
    Session(String),

    /// The collector panicked; the panic was contained by the gather
    /// boundary.
    #[error("collector crashed: {0}")]
    Crashed(String),
}

/// Per-derivation failures, cached for the remainder of the run.
///
/// Derivations are pure and perform no I/O, so a failure indicates a
/// data-shape or logic bug and retrying cannot change the outcome.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DerivationError {
    /// The computation returned an error.
    #[error("derivation failed: {0}")]
    Failed(String),

    /// The computation exceeded its timeout budget.
    #[error("derivation timed out after {budget_ms}ms")]
    Timeout { budget_ms: u64 },

    /// The computation panicked; the panic was contained by the cache
    /// boundary.
    #[error("derivation crashed: {0}")]
    Crashed(String),
}

/// Errors returned by a scoring function. Converted into an
/// `AuditResult::Errored` by the audit orchestrator, never propagated.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuditError {
    /// The scoring logic failed on well-formed inputs.
    #[error("scoring failed: {0}")]
    Scoring(String),

    /// A resolved input did not downcast to the demanded shape. The
    /// resolver checks shapes statically, so hitting this is a bug.
    #[error("input '{0}' has unexpected shape")]
    InputShape(String),
}

/// Run-level outcomes that abort the invocation.
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    /// The plan failed validation; no session work happened.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The run was cancelled; gather was unwound and no audit ran.
    #[error("run cancelled")]
    Cancelled,

    /// A programming error in the engine, e.g. a duplicate artifact
    /// publication that the resolver should have made impossible.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Result alias for engine operations.
pub type Result<T, E = ConfigError> = std::result::Result<T, E>;

/// Render a contained panic payload for a classified `Crashed` error.
pub(crate) fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unresolved_requirements_enumerates_all() {
        let err = ConfigError::UnresolvedRequirements(vec![
            UnresolvedRequirement {
                consumer: "audit 'dom-size'".to_string(),
                artifact: "DomStats".to_string(),
            },
            UnresolvedRequirement {
                consumer: "derivation 'MainThreadBusy'".to_string(),
                artifact: "Trace".to_string(),
            },
        ]);
        let msg = err.to_string();
        assert!(msg.contains("DomStats"));
        assert!(msg.contains("Trace"));
    }

    #[test]
    fn test_cyclic_derivation_display() {
        let err = ConfigError::CyclicDerivation(vec![
            "A".to_string(),
            "B".to_string(),
            "A".to_string(),
        ]);
        assert_eq!(
            err.to_string(),
            "cyclic derivation dependency: A -> B -> A"
        );
    }

    #[test]
    fn test_collection_error_serde_roundtrip() {
        let err = CollectionError::Timeout { budget_ms: 500 };
        let json = serde_json::to_string(&err).expect("serialize");
        let back: CollectionError = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(err, back);
    }

    #[test]
    fn test_derivation_error_display() {
        let err = DerivationError::Failed("empty trace".to_string());
        assert!(err.to_string().contains("empty trace"));
    }
}
