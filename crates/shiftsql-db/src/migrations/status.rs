use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::catalog::Catalog;
use super::ledger::AppliedRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MigrationState {
    Applied,
    Pending,
}

impl fmt::Display for MigrationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Applied => f.write_str("applied"),
            Self::Pending => f.write_str("pending"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusEntry {
    pub version: i64,
    pub name: String,
    pub state: MigrationState,
    pub applied_at: Option<DateTime<Utc>>,
}

/// Per-version view of the catalog against the ledger.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StatusReport {
    /// One entry per catalog migration, ascending by version.
    pub entries: Vec<StatusEntry>,
    /// Ledger rows whose migration files are no longer in the catalog.
    pub orphaned: Vec<AppliedRecord>,
}

impl StatusReport {
    pub fn build(catalog: &Catalog, applied: &[AppliedRecord]) -> Self {
        let mut by_version: BTreeMap<i64, &AppliedRecord> =
            applied.iter().map(|r| (r.version, r)).collect();

        let entries = catalog
            .iter()
            .map(|migration| {
                let record = by_version.remove(&migration.version);
                StatusEntry {
                    version: migration.version,
                    name: migration.name.clone(),
                    state: if record.is_some() {
                        MigrationState::Applied
                    } else {
                        MigrationState::Pending
                    },
                    applied_at: record.map(|r| r.applied_at),
                }
            })
            .collect();

        Self {
            entries,
            orphaned: by_version.into_values().cloned().collect(),
        }
    }

    pub fn count(&self, state: MigrationState) -> usize {
        self.entries.iter().filter(|e| e.state == state).count()
    }

    pub fn state_of(&self, version: i64) -> Option<MigrationState> {
        self.entries
            .iter()
            .find(|e| e.version == version)
            .map(|e| e.state)
    }
}
