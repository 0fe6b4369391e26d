mod commands;
mod output;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use shiftsql_config::{AppConfig, ConfigLoader, LogFormat};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "shiftsql",
    version,
    about = "shiftsql - versioned SQL schema migrations for SQLite"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Config file to load instead of ./shiftsql.yml or ./shiftsql.toml
    #[arg(long, env = "SHIFTSQL_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// SQLite database file
    #[arg(long, global = true)]
    database: Option<PathBuf>,

    /// Directory holding <version>_<name>.up.sql / .down.sql files
    #[arg(long, global = true)]
    migrations_dir: Option<PathBuf>,

    /// Deadline for the whole command, in seconds
    #[arg(long, global = true)]
    timeout: Option<u64>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true)]
    log_level: Option<String>,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    /// Apply all pending migrations
    Up,

    /// Roll back the highest applied migration
    Down,

    /// Show applied and pending migrations
    Status {
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Roll back every applied migration
    Reset {
        /// Skip the confirmation prompt
        #[arg(long, short)]
        yes: bool,
    },
}

impl Command {
    fn name(&self) -> &'static str {
        match self {
            Self::Up => "up",
            Self::Down => "down",
            Self::Status { .. } => "status",
            Self::Reset { .. } => "reset",
        }
    }
}

impl Cli {
    fn load_config(&self) -> Result<AppConfig> {
        let mut config = match &self.config {
            Some(path) => ConfigLoader::load_file(path)
                .with_context(|| format!("failed to load config from {}", path.display()))?,
            None => ConfigLoader::new()
                .load()
                .context("failed to load configuration")?,
        };

        self.apply_overrides(&mut config);
        config.validate().context("invalid configuration")?;
        Ok(config)
    }

    fn apply_overrides(&self, config: &mut AppConfig) {
        if let Some(path) = &self.database {
            config.database.path = path.clone();
        }
        if let Some(dir) = &self.migrations_dir {
            config.migrations.dir = dir.clone();
        }
        if let Some(secs) = self.timeout {
            config.migrations.timeout_secs = secs;
        }
        if let Some(level) = &self.log_level {
            config.log_level = Some(level.clone());
        }
    }
}

/// `RUST_LOG` wins; otherwise the configured level, which must parse.
fn log_filter(config: &AppConfig) -> Result<EnvFilter> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }
    let level = config.log_level.as_deref().unwrap_or("info");
    EnvFilter::try_new(level).with_context(|| format!("invalid log level {level:?}"))
}

fn init_tracing(config: &AppConfig) -> Result<()> {
    let filter = log_filter(config)?;

    // Logs go to stderr so `status --json` output stays machine-readable.
    match config.log_format {
        LogFormat::Pretty => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init(),
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init(),
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = cli.load_config()?;
    init_tracing(&config)?;

    let command = cli.command;
    let completed = commands::run(command, &config)
        .await
        .with_context(|| format!("migration command '{}' failed", command.name()))?;

    if completed {
        println!(
            "migration command '{}' completed successfully",
            command.name()
        );
    }
    Ok(())
}
