use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::Serialize;
use tracing::{info, warn};

use super::error::MigrationError;
use super::parser::parse_fragment;
use super::source::{ScriptFile, ScriptSource};
use super::{Direction, Migration, MigrationFragment};

/// Two files claiming the same version slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DuplicateVersion {
    pub version: i64,
    pub first: PathBuf,
    pub second: PathBuf,
}

impl From<&DuplicateVersion> for MigrationError {
    fn from(dup: &DuplicateVersion) -> Self {
        MigrationError::DuplicateVersion {
            version: dup.version,
            first: dup.first.clone(),
            second: dup.second.clone(),
        }
    }
}

/// All migrations discovered for one run, ordered by ascending version.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    migrations: Vec<Migration>,
    duplicates: Vec<DuplicateVersion>,
    skipped: Vec<PathBuf>,
}

struct Slot {
    migration: Migration,
    up_path: Option<PathBuf>,
    down_path: Option<PathBuf>,
}

impl Slot {
    fn new(fragment: &MigrationFragment) -> Self {
        Self {
            migration: Migration {
                version: fragment.version,
                name: fragment.name.clone(),
                up_script: String::new(),
                down_script: String::new(),
                source_timestamp: None,
            },
            up_path: None,
            down_path: None,
        }
    }

    fn any_path(&self) -> PathBuf {
        self.up_path
            .clone()
            .or_else(|| self.down_path.clone())
            .unwrap_or_default()
    }

    /// Fill in the fragment's half, or report the path already holding it.
    fn merge(&mut self, fragment: MigrationFragment) -> Result<(), PathBuf> {
        if fragment.name != self.migration.name {
            return Err(self.any_path());
        }

        let (path_slot, script_slot) = match fragment.direction {
            Direction::Up => (&mut self.up_path, &mut self.migration.up_script),
            Direction::Down => (&mut self.down_path, &mut self.migration.down_script),
        };
        if let Some(existing) = path_slot {
            return Err(existing.clone());
        }

        *path_slot = Some(fragment.path);
        *script_slot = fragment.script;
        self.migration.source_timestamp = self.migration.source_timestamp.max(fragment.modified);
        Ok(())
    }
}

impl Catalog {
    /// Read every script from `source` and build the catalog.
    pub fn load(source: &dyn ScriptSource) -> Result<Self, MigrationError> {
        let files = source.scripts()?;
        let catalog = Self::from_scripts(files);
        info!(
            "loaded {} migrations from {} ({} files skipped, {} duplicate versions)",
            catalog.len(),
            source.describe(),
            catalog.skipped().len(),
            catalog.duplicates().len()
        );
        Ok(catalog)
    }

    /// Parse and merge already-read files. Files that fail to parse are
    /// logged and left out.
    pub fn from_scripts(files: impl IntoIterator<Item = ScriptFile>) -> Self {
        let mut slots: BTreeMap<i64, Slot> = BTreeMap::new();
        let mut duplicates = Vec::new();
        let mut skipped = Vec::new();

        for file in files {
            let fragment = match parse_fragment(&file.path, &file.content, file.modified) {
                Ok(fragment) => fragment,
                Err(e) => {
                    warn!("skipping invalid migration file {}: {e}", file.path.display());
                    skipped.push(file.path);
                    continue;
                }
            };

            let version = fragment.version;
            let second = fragment.path.clone();
            let slot = slots
                .entry(version)
                .or_insert_with(|| Slot::new(&fragment));

            if let Err(first) = slot.merge(fragment) {
                warn!(
                    "duplicate migration version {version}: {} conflicts with {}",
                    second.display(),
                    first.display()
                );
                duplicates.push(DuplicateVersion {
                    version,
                    first,
                    second,
                });
            }
        }

        Self {
            migrations: slots.into_values().map(|slot| slot.migration).collect(),
            duplicates,
            skipped,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Migration> {
        self.migrations.iter()
    }

    pub fn get(&self, version: i64) -> Option<&Migration> {
        self.migrations
            .binary_search_by_key(&version, |m| m.version)
            .ok()
            .map(|idx| &self.migrations[idx])
    }

    pub fn len(&self) -> usize {
        self.migrations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.migrations.is_empty()
    }

    pub fn duplicates(&self) -> &[DuplicateVersion] {
        &self.duplicates
    }

    /// Files left out because their names did not parse.
    pub fn skipped(&self) -> &[PathBuf] {
        &self.skipped
    }

    /// Fail on the first version claimed by more than one file.
    pub fn ensure_unique(&self) -> Result<(), MigrationError> {
        match self.duplicates.first() {
            Some(dup) => Err(dup.into()),
            None => Ok(()),
        }
    }
}
