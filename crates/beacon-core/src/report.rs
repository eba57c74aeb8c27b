//! Persisted run report artifacts.
//!
//! The run result serializes to one flat, versioned JSON document, plus a
//! compact markdown summary for PR comments and terminals. Full report
//! layouts (HTML and friends) live outside this crate.

use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::result::{ArtifactStatus, AuditResult, CategoryResult, RunResult};

/// Schema version stamped into every written report.
pub const REPORT_SCHEMA_VERSION: &str = "1.0";

/// Versioned envelope around a [`RunResult`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunReport {
    pub schema_version: String,
    pub generated_at: DateTime<Utc>,
    pub run: RunResult,
}

impl RunReport {
    /// Wrap a finished run, stamped with the current schema version.
    pub fn new(run: RunResult) -> Self {
        Self {
            schema_version: REPORT_SCHEMA_VERSION.to_string(),
            generated_at: Utc::now(),
            run,
        }
    }
}

/// Write the report as pretty JSON.
pub fn write_run_report_json(path: &Path, report: &RunReport) -> Result<()> {
    let content = serde_json::to_string_pretty(report).context("serialize run report")?;
    std::fs::write(path, content).with_context(|| format!("write {path:?}"))?;
    Ok(())
}

/// Read a previously written report.
pub fn read_run_report_json(path: &Path) -> Result<RunReport> {
    let content = std::fs::read_to_string(path).with_context(|| format!("read {path:?}"))?;
    serde_json::from_str(&content).context("parse run report")
}

/// Render a markdown summary: category scores, errored audits, failed
/// artifacts.
pub fn render_run_summary_md(report: &RunReport) -> String {
    let run = &report.run;
    let mut out = String::new();

    out.push_str(&format!("# Audit Run `{}`\n\n", run.run_id));
    out.push_str(&format!(
        "- mode: {:?}\n- plan: `{}`\n- audits: {}\n\n",
        run.gather_mode,
        &run.plan_digest[..run.plan_digest.len().min(12)],
        run.audit_results.len(),
    ));

    out.push_str("## Categories\n");
    if run.category_results.is_empty() {
        out.push_str("- none declared\n");
    }
    for (id, result) in &run.category_results {
        match result {
            CategoryResult::Score { score } => {
                out.push_str(&format!("- {id}: {score:.2}\n"));
            }
            CategoryResult::NotApplicable => {
                out.push_str(&format!("- {id}: not applicable\n"));
            }
        }
    }
    out.push('\n');

    let errored: Vec<(&String, &AuditResult)> = run
        .audit_results
        .iter()
        .filter(|(_, result)| result.is_errored())
        .collect();
    if !errored.is_empty() {
        out.push_str("## Errored Audits\n");
        for (id, result) in errored {
            if let AuditResult::Errored { kind, message, .. } = result {
                out.push_str(&format!("- `{id}` ({kind:?}): {message}\n"));
            }
        }
        out.push('\n');
    }

    let failed: Vec<&String> = run
        .artifacts
        .iter()
        .filter(|(_, status)| matches!(status, ArtifactStatus::Failed { .. }))
        .map(|(id, _)| id)
        .collect();
    if !failed.is_empty() {
        out.push_str("## Failed Artifacts\n");
        for id in failed {
            if let Some(ArtifactStatus::Failed { error }) = run.artifacts.get(id) {
                out.push_str(&format!("- `{id}`: {error}\n"));
            }
        }
        out.push('\n');
    }

    if !run.run_warnings.is_empty() {
        out.push_str("## Warnings\n");
        for warning in &run.run_warnings {
            out.push_str(&format!("- {warning}\n"));
        }
    }

    out
}

/// Write the markdown summary.
pub fn write_run_summary_md(path: &Path, report: &RunReport) -> Result<()> {
    let md = render_run_summary_md(report);
    std::fs::write(path, md).with_context(|| format!("write {path:?}"))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    use uuid::Uuid;

    use crate::domain::error::CollectionError;
    use crate::domain::result::{AuditFailureKind, AuditProduct};
    use crate::domain::settings::GatherMode;

    fn sample_report() -> RunReport {
        let mut audit_results = BTreeMap::new();
        audit_results.insert(
            "dom-size".to_string(),
            AuditResult::scored(AuditProduct::score(0.9).with_numeric_value(1500.0)),
        );
        audit_results.insert(
            "trace-busy".to_string(),
            AuditResult::errored_by(
                AuditFailureKind::UpstreamCollection,
                "required artifact 'Trace' failed to collect",
                "Trace",
            ),
        );

        let mut artifacts = BTreeMap::new();
        artifacts.insert(
            "DomStats".to_string(),
            ArtifactStatus::Collected {
                shape: "DomStats".to_string(),
                warnings: vec![],
            },
        );
        artifacts.insert(
            "Trace".to_string(),
            ArtifactStatus::Failed {
                error: CollectionError::Timeout { budget_ms: 30_000 },
            },
        );

        let mut category_results = BTreeMap::new();
        category_results.insert(
            "performance".to_string(),
            CategoryResult::Score { score: 0.625 },
        );
        category_results.insert("pwa".to_string(), CategoryResult::NotApplicable);

        RunReport::new(RunResult {
            run_id: Uuid::new_v4(),
            plan_digest: "deadbeef".repeat(8),
            gather_mode: GatherMode::Navigation,
            started_at: Utc::now(),
            finished_at: Utc::now(),
            artifacts,
            audit_results,
            category_results,
            run_warnings: vec!["viewport emulation unavailable".to_string()],
        })
    }

    #[test]
    fn test_summary_lists_categories_and_failures() {
        let md = render_run_summary_md(&sample_report());
        assert!(md.contains("- performance: 0.63"));
        assert!(md.contains("- pwa: not applicable"));
        assert!(md.contains("`trace-busy`"));
        assert!(md.contains("`Trace`"));
        assert!(md.contains("viewport emulation unavailable"));
    }

    #[test]
    fn test_report_json_roundtrip_on_disk() {
        let report = sample_report();
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("run_report.json");

        write_run_report_json(&path, &report).expect("write");
        let loaded = read_run_report_json(&path).expect("read");

        assert_eq!(loaded.schema_version, REPORT_SCHEMA_VERSION);
        assert_eq!(loaded.run, report.run);
    }
}
