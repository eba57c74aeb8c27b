//! Weighted category aggregation.
//!
//! Folds per-audit results into category scores: Σ(weight·score)/Σ(weight)
//! over every reference with positive weight and an applicable score. A
//! category with no contributing reference is explicitly "not applicable",
//! never a silent zero.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::contract::AuditMeta;
use crate::domain::result::{AuditResult, CategoryResult};

/// One weighted audit reference inside a category.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CategoryRef {
    /// Id of the referenced audit.
    pub audit_id: String,
    /// Contribution weight; must be finite and >= 0. Weight 0 keeps the
    /// audit in the report without letting it move the category score.
    pub weight: f64,
}

/// A weighted grouping of audits used to compute a summary score.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Category {
    /// Stable identifier, unique within a plan.
    pub id: String,

    /// Human-readable title for reports.
    pub title: String,

    /// Ordered audit references.
    pub refs: Vec<CategoryRef>,
}

impl Category {
    /// Create an empty category.
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            refs: Vec::new(),
        }
    }

    /// Reference an audit with an explicit weight.
    pub fn add_ref(mut self, audit_id: impl Into<String>, weight: f64) -> Self {
        self.refs.push(CategoryRef {
            audit_id: audit_id.into(),
            weight,
        });
        self
    }

    /// Reference an audit at its declared default weight.
    pub fn add_audit(self, meta: &AuditMeta) -> Self {
        let weight = meta.default_weight;
        self.add_ref(meta.id.clone(), weight)
    }
}

/// Aggregate audit results into one category score.
///
/// References with weight 0, and references whose audit has a null score or
/// a contained error, are excluded from both the numerator and the
/// denominator. A zero denominator yields [`CategoryResult::NotApplicable`].
///
/// The resolver guarantees every referenced audit id is present in
/// `audit_results`; this function assumes a complete result set.
pub fn aggregate(
    category: &Category,
    audit_results: &BTreeMap<String, AuditResult>,
) -> CategoryResult {
    let mut weighted_sum = 0.0;
    let mut weight_sum = 0.0;

    for reference in &category.refs {
        if reference.weight <= 0.0 {
            continue;
        }
        let score = audit_results
            .get(&reference.audit_id)
            .and_then(AuditResult::numeric_score);
        if let Some(score) = score {
            weighted_sum += reference.weight * score;
            weight_sum += reference.weight;
        }
    }

    if weight_sum == 0.0 {
        CategoryResult::NotApplicable
    } else {
        CategoryResult::Score {
            score: weighted_sum / weight_sum,
        }
    }
}
