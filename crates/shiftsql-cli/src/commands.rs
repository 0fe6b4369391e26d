use std::time::Duration;

use anyhow::{Context, Result};
use shiftsql_config::AppConfig;
use shiftsql_db::migrations::MigrationId;
use shiftsql_db::{
    EngineOptions, MigrationError, Migrator, OpContext, ResetReport, SqliteEngine, StatusReport,
    UpReport,
};
use tracing::{info, warn};

use crate::Command;
use crate::output;

const PING_TIMEOUT: Duration = Duration::from_secs(10);

/// Result of one runner operation, handed back from the blocking task.
#[derive(Debug)]
pub enum Outcome {
    Up(UpReport),
    Down(Option<MigrationId>),
    Status(StatusReport),
    Reset(ResetReport),
}

/// Run `command` against the configured database. Returns `Ok(false)` when
/// the user declined the reset prompt.
pub async fn run(command: Command, config: &AppConfig) -> Result<bool> {
    if let Command::Reset { yes: false } = command {
        if !confirm_reset(config)? {
            println!("Reset cancelled.");
            return Ok(false);
        }
    }

    let migrator = open_migrator(config)?;
    let ctx = OpContext::with_timeout(config.migrations.timeout());

    let cancel = ctx.clone();
    let watcher = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, cancelling");
            cancel.cancel();
        }
    });

    let result = tokio::task::spawn_blocking(move || execute(&migrator, command, &ctx))
        .await
        .context("migration task panicked");
    watcher.abort();

    let outcome = result??;
    match (&outcome, command) {
        (Outcome::Status(report), Command::Status { json: true }) => {
            println!("{}", serde_json::to_string_pretty(report)?);
        }
        _ => output::print_outcome(&outcome),
    }

    Ok(true)
}

fn open_migrator(config: &AppConfig) -> Result<Migrator> {
    let options = EngineOptions {
        busy_timeout: config.database.busy_timeout(),
        foreign_keys: config.database.foreign_keys,
    };
    let engine = SqliteEngine::open(&config.database.path, &options).with_context(|| {
        format!(
            "failed to open database {}",
            config.database.path.display()
        )
    })?;

    engine
        .ping(&OpContext::with_timeout(PING_TIMEOUT))
        .context("failed to ping database")?;
    info!(
        "using migrations from {}",
        config.migrations.dir.display()
    );

    Ok(Migrator::from_dir(engine, &config.migrations.dir))
}

pub fn execute(
    migrator: &Migrator,
    command: Command,
    ctx: &OpContext,
) -> std::result::Result<Outcome, MigrationError> {
    match command {
        Command::Up => migrator.up(ctx).map(Outcome::Up),
        Command::Down => migrator.down(ctx).map(Outcome::Down),
        Command::Status { .. } => migrator.status(ctx).map(Outcome::Status),
        Command::Reset { .. } => migrator.reset(ctx).map(Outcome::Reset),
    }
}

fn confirm_reset(config: &AppConfig) -> Result<bool> {
    dialoguer::Confirm::new()
        .with_prompt(format!(
            "Roll back every applied migration in {}?",
            config.database.path.display()
        ))
        .default(false)
        .interact()
        .context("failed to read confirmation")
}
