//! Audit products, contained audit results, and the serializable run
//! document.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::error::CollectionError;
use crate::domain::settings::GatherMode;

/// What a scoring function returns on success.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AuditProduct {
    /// Score in 0.0–1.0, or `None` for informative audits that do not
    /// apply to this session.
    pub score: Option<f64>,

    /// Raw measured value behind the score (milliseconds, bytes, counts).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub numeric_value: Option<f64>,

    /// Structured detail rows embedded in the report. This is the only part
    /// of an artifact value that ever reaches the serialized document.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,

    /// Non-fatal scoring warnings.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

impl AuditProduct {
    /// A product with the given score and nothing else.
    pub fn score(score: f64) -> Self {
        Self {
            score: Some(score),
            numeric_value: None,
            details: None,
            warnings: Vec::new(),
        }
    }

    /// A null-score product for audits that do not apply.
    pub fn not_applicable() -> Self {
        Self {
            score: None,
            numeric_value: None,
            details: None,
            warnings: Vec::new(),
        }
    }

    /// Attach the raw measured value.
    pub fn with_numeric_value(mut self, value: f64) -> Self {
        self.numeric_value = Some(value);
        self
    }

    /// Attach detail rows.
    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Attach a warning.
    pub fn with_warning(mut self, warning: impl Into<String>) -> Self {
        self.warnings.push(warning.into());
        self
    }

    /// Check the product against the scoring contract: a score must be
    /// finite and within 0.0–1.0 (or absent), a numeric value must be
    /// finite. Violations are reported, never coerced.
    pub fn validate(&self) -> std::result::Result<(), String> {
        if let Some(score) = self.score {
            if !score.is_finite() || !(0.0..=1.0).contains(&score) {
                return Err(format!("score {score} outside [0, 1]"));
            }
        }
        if let Some(value) = self.numeric_value {
            if !value.is_finite() {
                return Err(format!("numeric_value {value} is not finite"));
            }
        }
        Ok(())
    }
}

/// Classification of a contained audit failure.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AuditFailureKind {
    /// The scoring function returned an error.
    ScoringFailed,
    /// The scoring function returned a product violating its contract.
    InvalidProduct,
    /// A required raw artifact carries a recorded collection failure.
    UpstreamCollection,
    /// A required derivation carries a recorded derivation failure.
    UpstreamDerivation,
    /// The scoring function panicked.
    Crashed,
}

/// Outcome of one audit: either a validated product or a contained,
/// classified error. One failing audit never aborts the run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuditResult {
    Scored {
        score: Option<f64>,
        #[serde(skip_serializing_if = "Option::is_none")]
        numeric_value: Option<f64>,
        #[serde(skip_serializing_if = "Option::is_none")]
        details: Option<serde_json::Value>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        warnings: Vec<String>,
    },
    Errored {
        kind: AuditFailureKind,
        message: String,
        /// Id of the upstream artifact or derivation whose recorded failure
        /// caused this error, when there is one.
        #[serde(skip_serializing_if = "Option::is_none")]
        cause_id: Option<String>,
    },
}

impl AuditResult {
    /// Wrap a validated product.
    pub fn scored(product: AuditProduct) -> Self {
        Self::Scored {
            score: product.score,
            numeric_value: product.numeric_value,
            details: product.details,
            warnings: product.warnings,
        }
    }

    /// A contained failure without an upstream cause.
    pub fn errored(kind: AuditFailureKind, message: impl Into<String>) -> Self {
        Self::Errored {
            kind,
            message: message.into(),
            cause_id: None,
        }
    }

    /// A contained failure referencing the originating upstream id.
    pub fn errored_by(
        kind: AuditFailureKind,
        message: impl Into<String>,
        cause_id: impl Into<String>,
    ) -> Self {
        Self::Errored {
            kind,
            message: message.into(),
            cause_id: Some(cause_id.into()),
        }
    }

    /// The numeric score, when this result is scored and applicable.
    pub fn numeric_score(&self) -> Option<f64> {
        match self {
            Self::Scored { score, .. } => *score,
            Self::Errored { .. } => None,
        }
    }

    /// Whether this result is a contained failure.
    pub fn is_errored(&self) -> bool {
        matches!(self, Self::Errored { .. })
    }
}

/// Per-artifact outcome of the gather phase, as recorded in the run
/// document. Values themselves are not serialized — only their declared
/// shape and warnings, or the classified failure.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ArtifactStatus {
    Collected {
        shape: String,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        warnings: Vec<String>,
    },
    Failed {
        error: CollectionError,
    },
}

/// Aggregate score of a category, or an explicit "not applicable" when no
/// reference contributes. Never NaN, never a silent zero.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CategoryResult {
    Score { score: f64 },
    NotApplicable,
}

impl CategoryResult {
    /// The numeric score, when applicable.
    pub fn score(&self) -> Option<f64> {
        match self {
            Self::Score { score } => Some(*score),
            Self::NotApplicable => None,
        }
    }
}

/// The complete, serializable outcome of one run.
///
/// A run always completes with this document unless plan validation failed
/// or the run was cancelled: every audit lands here with either a score or
/// a classified error.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunResult {
    /// Unique identifier for this run.
    pub run_id: Uuid,

    /// SHA256 hex digest of the resolved plan topology.
    pub plan_digest: String,

    /// Gather mode the run executed under.
    pub gather_mode: GatherMode,

    /// When the gather phase started.
    pub started_at: DateTime<Utc>,

    /// When aggregation finished.
    pub finished_at: DateTime<Utc>,

    /// Per-artifact gather outcomes, keyed by artifact id.
    pub artifacts: BTreeMap<String, ArtifactStatus>,

    /// Per-audit outcomes, keyed by audit id.
    pub audit_results: BTreeMap<String, AuditResult>,

    /// Per-category aggregates, keyed by category id.
    pub category_results: BTreeMap<String, CategoryResult>,

    /// Run-level warnings from collectors and the engine.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub run_warnings: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_product_validation_accepts_bounds() {
        assert!(AuditProduct::score(0.0).validate().is_ok());
        assert!(AuditProduct::score(1.0).validate().is_ok());
        assert!(AuditProduct::not_applicable().validate().is_ok());
    }

    #[test]
    fn test_product_validation_rejects_out_of_range() {
        assert!(AuditProduct::score(1.2).validate().is_err());
        assert!(AuditProduct::score(-0.1).validate().is_err());
        assert!(AuditProduct::score(f64::NAN).validate().is_err());
    }

    #[test]
    fn test_product_validation_rejects_infinite_numeric_value() {
        let product = AuditProduct::score(0.5).with_numeric_value(f64::INFINITY);
        assert!(product.validate().is_err());
    }

    #[test]
    fn test_audit_result_serde_roundtrip() {
        let result = AuditResult::scored(
            AuditProduct::score(0.75)
                .with_numeric_value(630.0)
                .with_details(serde_json::json!({"items": [{"url": "https://example.com/"}]})),
        );
        let json = serde_json::to_string(&result).expect("serialize");
        let back: AuditResult = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(result, back);
    }

    #[test]
    fn test_errored_result_carries_cause() {
        let result = AuditResult::errored_by(
            AuditFailureKind::UpstreamCollection,
            "required artifact 'Trace' failed to collect",
            "Trace",
        );
        match result {
            AuditResult::Errored { kind, cause_id, .. } => {
                assert_eq!(kind, AuditFailureKind::UpstreamCollection);
                assert_eq!(cause_id.as_deref(), Some("Trace"));
            }
            _ => panic!("expected errored result"),
        }
    }

    #[test]
    fn test_category_result_score_accessor() {
        assert_eq!(CategoryResult::Score { score: 0.625 }.score(), Some(0.625));
        assert_eq!(CategoryResult::NotApplicable.score(), None);
    }
}
