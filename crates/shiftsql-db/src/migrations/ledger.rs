use std::collections::BTreeSet;

use chrono::{DateTime, NaiveDateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{Row, params};
use serde::Serialize;
use tracing::debug;

use super::error::MigrationError;
use crate::context::OpContext;
use crate::engine::{EngineError, EngineTx, SqliteEngine};

/// Table recording which migration versions are applied.
pub const LEDGER_TABLE: &str = "schema_migrations";


/// One applied migration as stored in the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AppliedRecord {
    pub version: i64,
    pub name: String,
    pub applied_at: DateTime<Utc>,
}

/// Read side of the ledger table. Writes happen only through
/// [`Ledger::record`] and [`Ledger::erase`] inside a migration transaction.
pub struct Ledger<'e> {
    engine: &'e SqliteEngine,
}

impl<'e> Ledger<'e> {
    pub fn new(engine: &'e SqliteEngine) -> Self {
        Self { engine }
    }

    /// Create the ledger table if absent. Safe to call repeatedly.
    pub fn ensure_table(&self, ctx: &OpContext) -> Result<(), MigrationError> {
        self.engine
            .exec_batch(
                ctx,
                &format!(
                    "CREATE TABLE IF NOT EXISTS {LEDGER_TABLE} (
                        version INTEGER PRIMARY KEY,
                        name TEXT NOT NULL,
                        applied_at TEXT NOT NULL DEFAULT (datetime('now'))
                    );"
                ),
            )
            .map_err(MigrationError::LedgerBootstrapFailure)?;
        debug!("migrations table ensured");
        Ok(())
    }

    pub fn applied_versions(&self, ctx: &OpContext) -> Result<BTreeSet<i64>, MigrationError> {
        let versions = self
            .engine
            .query(
                ctx,
                &format!("SELECT version FROM {LEDGER_TABLE} ORDER BY version"),
                [],
                |row| row.get::<_, i64>(0),
            )
            .map_err(MigrationError::Ledger)?;
        Ok(versions.into_iter().collect())
    }

    /// Applied versions, newest version first.
    pub fn versions_descending(&self, ctx: &OpContext) -> Result<Vec<i64>, MigrationError> {
        self.engine
            .query(
                ctx,
                &format!("SELECT version FROM {LEDGER_TABLE} ORDER BY version DESC"),
                [],
                |row| row.get::<_, i64>(0),
            )
            .map_err(MigrationError::Ledger)
    }

    pub fn applied_records(&self, ctx: &OpContext) -> Result<Vec<AppliedRecord>, MigrationError> {
        self.engine
            .query(
                ctx,
                &format!("SELECT version, name, applied_at FROM {LEDGER_TABLE} ORDER BY version"),
                [],
                row_to_record,
            )
            .map_err(MigrationError::Ledger)
    }

    /// Greatest applied version number, regardless of when it was applied.
    pub fn latest_version(&self, ctx: &OpContext) -> Result<Option<i64>, MigrationError> {
        self.engine
            .query_row(
                ctx,
                &format!("SELECT version FROM {LEDGER_TABLE} ORDER BY version DESC LIMIT 1"),
                [],
                |row| row.get::<_, i64>(0),
            )
            .map_err(MigrationError::Ledger)
    }

    pub fn record(tx: &EngineTx<'_>, version: i64, name: &str) -> Result<(), EngineError> {
        tx.exec(
            &format!("INSERT INTO {LEDGER_TABLE} (version, name) VALUES (?1, ?2)"),
            params![version, name],
        )?;
        Ok(())
    }

    pub fn erase(tx: &EngineTx<'_>, version: i64) -> Result<(), EngineError> {
        tx.exec(
            &format!("DELETE FROM {LEDGER_TABLE} WHERE version = ?1"),
            params![version],
        )?;
        Ok(())
    }
}

fn row_to_record(row: &Row<'_>) -> rusqlite::Result<AppliedRecord> {
    let raw: String = row.get(2)?;
    let applied_at = parse_timestamp(&raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(2, Type::Text, e.into()))?;

    Ok(AppliedRecord {
        version: row.get(0)?,
        name: row.get(1)?,
        applied_at,
    })
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, String> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Ok(ts.with_timezone(&Utc));
    }

    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S") {
        return Ok(DateTime::<Utc>::from_naive_utc_and_offset(naive, Utc));
    }

    Err(format!("invalid timestamp format: {raw}"))
}

#[cfg(test)]
mod tests {
    use super::{LEDGER_TABLE, Ledger, parse_timestamp};
    use crate::context::OpContext;
    use crate::engine::SqliteEngine;

    #[test]
    fn ensure_table_is_idempotent() {
        let engine = SqliteEngine::in_memory().expect("failed to open in-memory engine");
        let ctx = OpContext::background();
        let ledger = Ledger::new(&engine);

        ledger.ensure_table(&ctx).expect("first bootstrap should succeed");
        ledger.ensure_table(&ctx).expect("second bootstrap should succeed");

        let columns: Vec<String> = engine
            .query(
                &ctx,
                &format!("PRAGMA table_info({LEDGER_TABLE})"),
                [],
                |row| row.get::<_, String>(1),
            )
            .expect("failed to read table info");
        assert_eq!(columns, vec!["version", "name", "applied_at"]);
    }

    #[test]
    fn record_and_erase_inside_transaction() {
        let engine = SqliteEngine::in_memory().expect("failed to open in-memory engine");
        let ctx = OpContext::background();
        let ledger = Ledger::new(&engine);
        ledger.ensure_table(&ctx).expect("bootstrap should succeed");

        let tx = engine.begin(&ctx).expect("begin should succeed");
        Ledger::record(&tx, 3, "third").expect("record should succeed");
        Ledger::record(&tx, 1, "first").expect("record should succeed");
        tx.commit().expect("commit should succeed");

        let versions = ledger.applied_versions(&ctx).expect("read should succeed");
        assert_eq!(versions.into_iter().collect::<Vec<_>>(), vec![1, 3]);
        assert_eq!(
            ledger.latest_version(&ctx).expect("read should succeed"),
            Some(3)
        );
        assert_eq!(
            ledger.versions_descending(&ctx).expect("read should succeed"),
            vec![3, 1]
        );

        let records = ledger.applied_records(&ctx).expect("read should succeed");
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].name, "first");

        let tx = engine.begin(&ctx).expect("begin should succeed");
        Ledger::erase(&tx, 3).expect("erase should succeed");
        tx.commit().expect("commit should succeed");

        assert_eq!(
            ledger.latest_version(&ctx).expect("read should succeed"),
            Some(1)
        );
    }

    #[test]
    fn latest_version_is_none_for_empty_ledger() {
        let engine = SqliteEngine::in_memory().expect("failed to open in-memory engine");
        let ctx = OpContext::background();
        let ledger = Ledger::new(&engine);
        ledger.ensure_table(&ctx).expect("bootstrap should succeed");

        assert_eq!(ledger.latest_version(&ctx).expect("read should succeed"), None);
        assert!(ledger.applied_versions(&ctx).expect("read should succeed").is_empty());
    }

    #[test]
    fn parses_sqlite_and_rfc3339_timestamps() {
        let sqlite = parse_timestamp("2026-01-02 03:04:05").expect("sqlite format should parse");
        let rfc = parse_timestamp("2026-01-02T03:04:05Z").expect("rfc3339 should parse");
        assert_eq!(sqlite, rfc);
        assert!(parse_timestamp("yesterday").is_err());
    }
}
