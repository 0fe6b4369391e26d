use std::ffi::c_int;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use rusqlite::hooks::{AuthAction, AuthContext, Authorization};
use rusqlite::{Connection, ErrorCode, OptionalExtension, Params, Row};
use shiftsql_common::{Error, Result};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::context::OpContext;

/// Number of SQLite VM instructions between deadline checks.
const PROGRESS_OPS: c_int = 1_000;

const PREVIEW_CHARS: usize = 80;

/// Failure of a single call made through [`SqliteEngine`] or [`EngineTx`].
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("deadline exceeded")]
    DeadlineExceeded,

    #[error("operation cancelled")]
    Cancelled,

    #[error("transaction control statements are not allowed inside a transaction")]
    TransactionControl,

    #[error("database connection lock poisoned")]
    LockPoisoned,
}

impl EngineError {
    /// True when the call was stopped by its context rather than by SQLite.
    pub fn is_interruption(&self) -> bool {
        matches!(self, Self::DeadlineExceeded | Self::Cancelled)
    }
}

#[derive(Debug, Clone)]
pub struct EngineOptions {
    pub busy_timeout: Duration,
    pub foreign_keys: bool,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            busy_timeout: Duration::from_secs(5),
            foreign_keys: true,
        }
    }
}

/// Instrumented SQLite handle used by the migration runner.
///
/// Every call takes an [`OpContext`]; an expired or cancelled context
/// interrupts the running statement.
pub struct SqliteEngine {
    conn: Mutex<Connection>,
}

impl SqliteEngine {
    pub fn open(db_path: &Path, options: &EngineOptions) -> Result<Self> {
        info!("opening database at {}", db_path.display());
        let conn = Connection::open(db_path)
            .map_err(|e| Error::Database(format!("failed to open database: {e}")))?;

        Self::configure(conn, options)
    }

    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| Error::Database(format!("failed to open in-memory database: {e}")))?;

        Self::configure(conn, &EngineOptions::default())
    }

    fn configure(conn: Connection, options: &EngineOptions) -> Result<Self> {
        conn.busy_timeout(options.busy_timeout)
            .map_err(|e| Error::Database(format!("failed to set busy timeout: {e}")))?;

        let foreign_keys = if options.foreign_keys { "ON" } else { "OFF" };
        conn.execute_batch(&format!("PRAGMA foreign_keys={foreign_keys};"))
            .map_err(|e| Error::Database(format!("failed to set pragmas: {e}")))?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn connection(&self) -> std::result::Result<MutexGuard<'_, Connection>, EngineError> {
        self.conn.lock().map_err(|_| EngineError::LockPoisoned)
    }

    pub fn ping(&self, ctx: &OpContext) -> std::result::Result<(), EngineError> {
        self.query_row(ctx, "SELECT 1", [], |row| row.get::<_, i64>(0))
            .map(|_| ())
    }

    /// Execute one statement, returning the number of rows changed.
    pub fn exec<P: Params>(
        &self,
        ctx: &OpContext,
        sql: &str,
        params: P,
    ) -> std::result::Result<usize, EngineError> {
        let conn = self.connection()?;
        run(&conn, ctx, "exec", sql, |c| c.execute(sql, params))
    }

    /// Execute a script of zero or more `;`-separated statements.
    pub fn exec_batch(&self, ctx: &OpContext, sql: &str) -> std::result::Result<(), EngineError> {
        let conn = self.connection()?;
        run(&conn, ctx, "exec_batch", sql, |c| c.execute_batch(sql))
    }

    pub fn query<T, P, F>(
        &self,
        ctx: &OpContext,
        sql: &str,
        params: P,
        map: F,
    ) -> std::result::Result<Vec<T>, EngineError>
    where
        P: Params,
        F: FnMut(&Row<'_>) -> rusqlite::Result<T>,
    {
        let conn = self.connection()?;
        run(&conn, ctx, "query", sql, |c| {
            let mut stmt = c.prepare(sql)?;
            let rows = stmt.query_map(params, map)?;
            rows.collect()
        })
    }

    /// Query at most one row; `None` when the result set is empty.
    pub fn query_row<T, P, F>(
        &self,
        ctx: &OpContext,
        sql: &str,
        params: P,
        map: F,
    ) -> std::result::Result<Option<T>, EngineError>
    where
        P: Params,
        F: FnOnce(&Row<'_>) -> rusqlite::Result<T>,
    {
        let conn = self.connection()?;
        run(&conn, ctx, "query_row", sql, |c| {
            c.query_row(sql, params, map).optional()
        })
    }

    /// Open a transaction holding the connection until commit or rollback.
    pub fn begin(&self, ctx: &OpContext) -> std::result::Result<EngineTx<'_>, EngineError> {
        let conn = self.connection()?;
        run(&conn, ctx, "begin", "BEGIN", |c| c.execute_batch("BEGIN"))?;

        Ok(EngineTx {
            conn,
            ctx: ctx.clone(),
            started: Instant::now(),
            finished: false,
        })
    }
}

/// An open transaction. Dropping it without [`EngineTx::commit`] rolls back.
pub struct EngineTx<'e> {
    conn: MutexGuard<'e, Connection>,
    ctx: OpContext,
    started: Instant,
    finished: bool,
}

impl EngineTx<'_> {
    pub fn exec<P: Params>(&self, sql: &str, params: P) -> std::result::Result<usize, EngineError> {
        run(&self.conn, &self.ctx, "tx exec", sql, |c| c.execute(sql, params))
    }

    /// Execute a script inside the transaction. `BEGIN`, `COMMIT`, `END` and
    /// `ROLLBACK` are refused when prepared, so the script cannot close the
    /// transaction it runs in.
    pub fn exec_batch(&self, sql: &str) -> std::result::Result<(), EngineError> {
        self.conn.authorizer(Some(deny_transaction_control));
        let result = run(&self.conn, &self.ctx, "tx exec_batch", sql, |c| {
            c.execute_batch(sql)
        });
        self.conn.authorizer(None::<fn(AuthContext<'_>) -> Authorization>);
        result?;

        if self.conn.is_autocommit() {
            return Err(EngineError::TransactionControl);
        }
        Ok(())
    }

    /// Commit, unless the context has already expired, in which case the
    /// transaction is rolled back and the interruption reported.
    pub fn commit(mut self) -> std::result::Result<(), EngineError> {
        if let Err(e) = check(&self.ctx) {
            self.rollback_in_place();
            return Err(e);
        }

        match self.conn.execute_batch("COMMIT") {
            Ok(()) => {
                self.finished = true;
                debug!("transaction committed after {:?}", self.started.elapsed());
                Ok(())
            }
            Err(e) => {
                warn!("transaction commit failed: {e}");
                self.rollback_in_place();
                Err(EngineError::Sqlite(e))
            }
        }
    }

    fn rollback_in_place(&mut self) {
        self.finished = true;
        if let Err(e) = self.rollback_conn() {
            warn!("failed to roll back transaction: {e}");
        }
    }

    fn rollback_conn(&self) -> std::result::Result<(), EngineError> {
        // SQLite may already have aborted the transaction after an interrupt.
        if self.conn.is_autocommit() {
            debug!("transaction already closed by sqlite");
            return Ok(());
        }
        self.conn.execute_batch("ROLLBACK")?;
        debug!("transaction rolled back after {:?}", self.started.elapsed());
        Ok(())
    }
}

impl Drop for EngineTx<'_> {
    fn drop(&mut self) {
        if !self.finished {
            self.rollback_in_place();
        }
    }
}

fn deny_transaction_control(ctx: AuthContext<'_>) -> Authorization {
    match ctx.action {
        AuthAction::Transaction { .. } => Authorization::Deny,
        _ => Authorization::Allow,
    }
}

fn check(ctx: &OpContext) -> std::result::Result<(), EngineError> {
    if ctx.is_cancelled() {
        return Err(EngineError::Cancelled);
    }
    if ctx.is_expired() {
        return Err(EngineError::DeadlineExceeded);
    }
    Ok(())
}

/// Run one call with the context's interrupt hook installed and log its
/// duration.
fn run<T>(
    conn: &Connection,
    ctx: &OpContext,
    op: &str,
    sql: &str,
    call: impl FnOnce(&Connection) -> rusqlite::Result<T>,
) -> std::result::Result<T, EngineError> {
    check(ctx)?;

    let start = Instant::now();
    conn.progress_handler(PROGRESS_OPS, Some(ctx.interrupt_hook()));
    let result = call(conn);
    conn.progress_handler(0, None::<fn() -> bool>);
    let elapsed = start.elapsed();

    match result {
        Ok(value) => {
            debug!("{op} completed in {elapsed:?}: {}", preview(sql));
            Ok(value)
        }
        Err(e) => {
            let err = classify(e, ctx);
            debug!("{op} failed after {elapsed:?}: {}: {err}", preview(sql));
            Err(err)
        }
    }
}

fn classify(err: rusqlite::Error, ctx: &OpContext) -> EngineError {
    match &err {
        rusqlite::Error::SqliteFailure(failure, _)
            if failure.code == ErrorCode::OperationInterrupted =>
        {
            if ctx.is_cancelled() {
                EngineError::Cancelled
            } else {
                EngineError::DeadlineExceeded
            }
        }
        // Only the transaction-control authorizer denies statements.
        rusqlite::Error::SqliteFailure(failure, _)
            if failure.code == ErrorCode::AuthorizationForStatementDenied =>
        {
            EngineError::TransactionControl
        }
        _ => EngineError::Sqlite(err),
    }
}

/// First line of a statement, shortened for log output.
fn preview(sql: &str) -> String {
    let line = sql.trim().lines().next().unwrap_or_default();
    if line.chars().count() > PREVIEW_CHARS {
        let cut: String = line.chars().take(PREVIEW_CHARS).collect();
        format!("{cut}...")
    } else {
        line.to_string()
    }
}
