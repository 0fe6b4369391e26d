use std::path::PathBuf;
use std::time::Instant;

use serde::Serialize;
use tracing::{debug, info, warn};

use super::catalog::Catalog;
use super::error::MigrationError;
use super::ledger::Ledger;
use super::source::{DirectorySource, ScriptSource};
use super::status::StatusReport;
use super::{Direction, Migration};
use crate::context::OpContext;
use crate::engine::{EngineError, SqliteEngine};

/// Version and name of a migration the runner acted on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MigrationId {
    pub version: i64,
    pub name: String,
}

impl From<&Migration> for MigrationId {
    fn from(migration: &Migration) -> Self {
        Self {
            version: migration.version,
            name: migration.name.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UpReport {
    /// Migrations applied by this run, in application order.
    pub applied: Vec<MigrationId>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ResetReport {
    /// Migrations rolled back by this run, highest version first.
    pub rolled_back: Vec<MigrationId>,
}

/// Applies and reverses migrations against one database.
///
/// The catalog is re-read from the script source on every operation. Each
/// migration runs in its own transaction together with its ledger update, so
/// a failure leaves the database at the last committed migration.
pub struct Migrator {
    engine: SqliteEngine,
    source: Box<dyn ScriptSource>,
}

impl Migrator {
    pub fn new(engine: SqliteEngine, source: Box<dyn ScriptSource>) -> Self {
        Self { engine, source }
    }

    pub fn from_dir(engine: SqliteEngine, dir: impl Into<PathBuf>) -> Self {
        Self::new(engine, Box::new(DirectorySource::new(dir)))
    }

    pub fn engine(&self) -> &SqliteEngine {
        &self.engine
    }

    fn ledger(&self) -> Ledger<'_> {
        Ledger::new(&self.engine)
    }

    fn load_catalog(&self) -> Result<Catalog, MigrationError> {
        Catalog::load(self.source.as_ref())
    }

    /// Apply every pending migration in ascending version order, stopping at
    /// the first failure.
    pub fn up(&self, ctx: &OpContext) -> Result<UpReport, MigrationError> {
        info!("starting migration up");
        let ledger = self.ledger();
        ledger.ensure_table(ctx)?;

        let catalog = self.load_catalog()?;
        catalog.ensure_unique()?;

        let applied = ledger.applied_versions(ctx)?;
        let pending: Vec<&Migration> = catalog
            .iter()
            .filter(|m| !applied.contains(&m.version))
            .collect();

        if pending.is_empty() {
            info!("no pending migrations");
            return Ok(UpReport::default());
        }

        info!("applying {} migrations", pending.len());
        let mut report = UpReport::default();
        for migration in pending {
            self.apply(ctx, migration, Direction::Up)?;
            report.applied.push(migration.into());
        }

        info!("all migrations applied successfully");
        Ok(report)
    }

    /// Roll back the applied migration with the highest version number.
    /// Returns `None` when nothing is applied.
    pub fn down(&self, ctx: &OpContext) -> Result<Option<MigrationId>, MigrationError> {
        info!("starting migration down");
        let ledger = self.ledger();
        ledger.ensure_table(ctx)?;

        let Some(version) = ledger.latest_version(ctx)? else {
            info!("no migrations to roll back");
            return Ok(None);
        };

        let catalog = self.load_catalog()?;
        catalog.ensure_unique()?;

        let migration = catalog
            .get(version)
            .ok_or(MigrationError::MigrationFileMissing { version })?;
        self.apply(ctx, migration, Direction::Down)?;

        info!(
            "migration {} ({}) rolled back successfully",
            migration.version, migration.name
        );
        Ok(Some(migration.into()))
    }

    /// Report every catalog migration as applied or pending.
    pub fn status(&self, ctx: &OpContext) -> Result<StatusReport, MigrationError> {
        let ledger = self.ledger();
        ledger.ensure_table(ctx)?;

        let catalog = self.load_catalog()?;
        let applied = ledger.applied_records(ctx)?;
        let report = StatusReport::build(&catalog, &applied);

        for entry in &report.entries {
            debug!("migration {} ({}): {}", entry.version, entry.name, entry.state);
        }
        for record in &report.orphaned {
            warn!(
                "applied migration {} ({}) has no migration file",
                record.version, record.name
            );
        }

        Ok(report)
    }

    /// Roll back every applied migration, highest version first.
    ///
    /// All rollback targets are checked before anything runs: a missing
    /// migration file or down script fails the reset with the database
    /// untouched.
    pub fn reset(&self, ctx: &OpContext) -> Result<ResetReport, MigrationError> {
        warn!("resetting all migrations");
        let ledger = self.ledger();
        ledger.ensure_table(ctx)?;

        let versions = ledger.versions_descending(ctx)?;
        if versions.is_empty() {
            info!("no migrations to reset");
            return Ok(ResetReport::default());
        }

        let catalog = self.load_catalog()?;
        catalog.ensure_unique()?;

        let plan = versions
            .iter()
            .map(|&version| {
                let migration = catalog
                    .get(version)
                    .ok_or(MigrationError::MigrationFileMissing { version })?;
                if !migration.has_script(Direction::Down) {
                    return Err(missing_script(migration, Direction::Down));
                }
                Ok(migration)
            })
            .collect::<Result<Vec<_>, _>>()?;

        let mut report = ResetReport::default();
        for migration in plan {
            self.apply(ctx, migration, Direction::Down)?;
            report.rolled_back.push(migration.into());
        }

        info!("all migrations reset successfully");
        Ok(report)
    }

    /// Run one migration's script and its ledger update in a single
    /// transaction.
    fn apply(
        &self,
        ctx: &OpContext,
        migration: &Migration,
        direction: Direction,
    ) -> Result<(), MigrationError> {
        let script = migration.script(direction);
        if script.is_empty() {
            return Err(missing_script(migration, direction));
        }

        info!(
            "applying migration {} ({}) {direction}",
            migration.version, migration.name
        );
        let started = Instant::now();
        let fail = |source: EngineError| MigrationError::TransactionFailure {
            version: migration.version,
            name: migration.name.clone(),
            direction,
            source,
        };

        let tx = self.engine.begin(ctx).map_err(fail)?;
        tx.exec_batch(script).map_err(fail)?;
        let bookkeeping = match direction {
            Direction::Up => Ledger::record(&tx, migration.version, &migration.name),
            Direction::Down => Ledger::erase(&tx, migration.version),
        };
        bookkeeping.map_err(fail)?;
        tx.commit().map_err(fail)?;

        info!(
            "migration {} ({}) {direction} applied in {:?}",
            migration.version,
            migration.name,
            started.elapsed()
        );
        Ok(())
    }
}

fn missing_script(migration: &Migration, direction: Direction) -> MigrationError {
    MigrationError::MissingScript {
        version: migration.version,
        name: migration.name.clone(),
        direction,
    }
}
