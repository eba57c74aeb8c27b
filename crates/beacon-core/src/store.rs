//! Write-once artifact store for one run.
//!
//! The gather orchestrator populates the store; after that it is frozen
//! behind an `Arc` and only ever read. A collection failure occupies the
//! owning artifact's slot, so downstream consumers can tell "failed to
//! collect" from "never declared".

use std::collections::{BTreeMap, HashMap};

use crate::domain::artifact::{ArtifactId, ArtifactValue};
use crate::domain::error::{CollectionError, RunError};
use crate::domain::result::ArtifactStatus;

/// One artifact slot: the published value or the classified failure.
#[derive(Debug, Clone)]
pub enum StoreEntry {
    Collected {
        value: ArtifactValue,
        warnings: Vec<String>,
    },
    Failed(CollectionError),
}

/// Identity-keyed store of raw values produced during the gather phase.
#[derive(Debug, Default)]
pub struct ArtifactStore {
    entries: HashMap<ArtifactId, StoreEntry>,
}

impl ArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish a collected value under `id`. Each id is write-once for the
    /// whole run; a second publication is a programming error the resolver
    /// should have made impossible.
    pub fn publish(
        &mut self,
        id: ArtifactId,
        value: ArtifactValue,
        warnings: Vec<String>,
    ) -> Result<(), RunError> {
        self.insert(id, StoreEntry::Collected { value, warnings })
    }

    /// Record a classified collection failure under `id`. The failure is
    /// contained to this artifact; it occupies the slot like a value would.
    pub fn record_failure(&mut self, id: ArtifactId, error: CollectionError) -> Result<(), RunError> {
        self.insert(id, StoreEntry::Failed(error))
    }

    fn insert(&mut self, id: ArtifactId, entry: StoreEntry) -> Result<(), RunError> {
        if self.entries.contains_key(&id) {
            return Err(RunError::Internal(format!(
                "duplicate artifact publication: '{id}'"
            )));
        }
        self.entries.insert(id, entry);
        Ok(())
    }

    /// The slot for `id`, if the gather phase reached it.
    pub fn entry(&self, id: &ArtifactId) -> Option<&StoreEntry> {
        self.entries.get(id)
    }

    /// The published value for `id`, if it was collected successfully.
    pub fn value(&self, id: &ArtifactId) -> Option<&ArtifactValue> {
        match self.entries.get(id) {
            Some(StoreEntry::Collected { value, .. }) => Some(value),
            _ => None,
        }
    }

    /// Number of occupied slots (values and failures).
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Serializable per-artifact statuses for the run document, keyed
    /// deterministically.
    pub fn statuses(&self) -> BTreeMap<String, ArtifactStatus> {
        self.entries
            .iter()
            .map(|(id, entry)| {
                let status = match entry {
                    StoreEntry::Collected { value, warnings } => ArtifactStatus::Collected {
                        shape: value.shape().name().to_string(),
                        warnings: warnings.clone(),
                    },
                    StoreEntry::Failed(error) => ArtifactStatus::Failed {
                        error: error.clone(),
                    },
                };
                (id.to_string(), status)
            })
            .collect()
    }
}
