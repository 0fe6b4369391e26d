//! Versioned SQL migrations.
//!
//! Migrations live on disk as `<version>_<name>.up.sql` and
//! `<version>_<name>.down.sql` pairs. The [`Migrator`] discovers them through a
//! [`ScriptSource`], records what has been applied in the `schema_migrations`
//! ledger table, and applies or reverses each one inside a single transaction
//! together with its ledger update.

pub mod catalog;
pub mod error;
pub mod executor;
pub mod ledger;
pub mod parser;
pub mod source;
pub mod status;

use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use catalog::{Catalog, DuplicateVersion};
pub use error::MigrationError;
pub use executor::{MigrationId, Migrator, ResetReport, UpReport};
pub use ledger::{AppliedRecord, LEDGER_TABLE, Ledger};
pub use parser::parse_fragment;
pub use source::{DirectorySource, MemorySource, ScriptFile, ScriptSource};
pub use status::{MigrationState, StatusEntry, StatusReport};

/// Direction a migration is applied in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Up,
    Down,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Up => "up",
            Self::Down => "down",
        }
    }

    /// File suffix identifying scripts for this direction.
    pub fn suffix(&self) -> &'static str {
        match self {
            Self::Up => ".up.sql",
            Self::Down => ".down.sql",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One versioned schema change, merged from its up and down files.
///
/// Either script may be empty when its file is absent; the migration is then
/// only usable in the other direction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Migration {
    pub version: i64,
    pub name: String,
    pub up_script: String,
    pub down_script: String,
    /// Latest modification time among the files this migration came from.
    pub source_timestamp: Option<DateTime<Utc>>,
}

impl Migration {
    pub fn script(&self, direction: Direction) -> &str {
        match direction {
            Direction::Up => &self.up_script,
            Direction::Down => &self.down_script,
        }
    }

    pub fn has_script(&self, direction: Direction) -> bool {
        !self.script(direction).is_empty()
    }
}

/// Half of a migration, as parsed from a single file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationFragment {
    pub version: i64,
    pub name: String,
    pub direction: Direction,
    pub script: String,
    pub path: PathBuf,
    pub modified: Option<DateTime<Utc>>,
}
