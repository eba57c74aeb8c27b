//! Per-run settings and gather modes.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::domain::error::{ConfigError, Result};

/// Default per-collector timeout in milliseconds (30 seconds).
pub const DEFAULT_COLLECT_TIMEOUT_MS: u64 = 30_000;
/// Default per-derivation timeout in milliseconds (10 seconds).
pub const DEFAULT_DERIVE_TIMEOUT_MS: u64 = 10_000;
/// Default bound on concurrently scoring audits.
pub const DEFAULT_AUDIT_CONCURRENCY: usize = 8;

/// How the session is observed during the gather phase.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum GatherMode {
    /// Full load of the page under observation.
    Navigation,
    /// Observation of an arbitrary user-driven time span.
    Timespan,
    /// Single point-in-time inspection of the current state.
    Snapshot,
}

impl Default for GatherMode {
    fn default() -> Self {
        Self::Navigation
    }
}

/// Frozen configuration for one run.
///
/// Created once per invocation, wrapped in an `Arc` by the run context, and
/// never mutated afterwards. Collector-, derivation-, and audit-specific
/// knobs go into `params` rather than process-wide state, so concurrent
/// runs cannot interfere.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunSettings {
    /// Gather mode in effect for this run.
    pub gather_mode: GatherMode,

    /// Per-collector timeout budget in milliseconds.
    pub collect_timeout_ms: u64,

    /// Per-derivation timeout budget in milliseconds.
    pub derive_timeout_ms: u64,

    /// Maximum number of audits scoring concurrently.
    pub audit_concurrency: usize,

    /// Free-form parameters consulted by collectors, derivations, and
    /// audits (thresholds, device class, and the like).
    pub params: serde_json::Value,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            gather_mode: GatherMode::default(),
            collect_timeout_ms: DEFAULT_COLLECT_TIMEOUT_MS,
            derive_timeout_ms: DEFAULT_DERIVE_TIMEOUT_MS,
            audit_concurrency: DEFAULT_AUDIT_CONCURRENCY,
            params: serde_json::Value::Null,
        }
    }
}

impl RunSettings {
    /// Create settings for the given gather mode with default budgets.
    pub fn new(gather_mode: GatherMode) -> Self {
        Self {
            gather_mode,
            ..Self::default()
        }
    }

    /// Override the per-collector timeout budget.
    pub fn with_collect_timeout_ms(mut self, ms: u64) -> Self {
        self.collect_timeout_ms = ms;
        self
    }

    /// Override the per-derivation timeout budget.
    pub fn with_derive_timeout_ms(mut self, ms: u64) -> Self {
        self.derive_timeout_ms = ms;
        self
    }

    /// Override the audit worker-pool bound.
    pub fn with_audit_concurrency(mut self, workers: usize) -> Self {
        self.audit_concurrency = workers;
        self
    }

    /// Attach free-form parameters.
    pub fn with_params(mut self, params: serde_json::Value) -> Self {
        self.params = params;
        self
    }

    /// Validate budget invariants.
    pub fn validate(&self) -> Result<()> {
        if self.collect_timeout_ms == 0 {
            return Err(ConfigError::InvalidSettings(
                "collect_timeout_ms must be > 0".to_string(),
            ));
        }
        if self.derive_timeout_ms == 0 {
            return Err(ConfigError::InvalidSettings(
                "derive_timeout_ms must be > 0".to_string(),
            ));
        }
        if self.audit_concurrency == 0 {
            return Err(ConfigError::InvalidSettings(
                "audit_concurrency must be > 0".to_string(),
            ));
        }
        Ok(())
    }

    /// Per-collector timeout as a `Duration`.
    pub fn collect_timeout(&self) -> Duration {
        Duration::from_millis(self.collect_timeout_ms)
    }

    /// Per-derivation timeout as a `Duration`.
    pub fn derive_timeout(&self) -> Duration {
        Duration::from_millis(self.derive_timeout_ms)
    }
}
