use serde::{Deserialize, Serialize};
use shiftsql_common::{Error, Result};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub migrations: MigrationsConfig,

    #[serde(default)]
    pub log_level: Option<String>,

    #[serde(default)]
    pub log_format: LogFormat,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig::default(),
            migrations: MigrationsConfig::default(),
            log_level: Some("info".to_string()),
            log_format: LogFormat::default(),
        }
    }
}

impl AppConfig {
    /// Reject settings the runner cannot operate with.
    pub fn validate(&self) -> Result<()> {
        if self.migrations.timeout_secs == 0 {
            return Err(Error::Config(
                "migrations.timeout_secs must be greater than zero".into(),
            ));
        }
        if self.migrations.dir.as_os_str().is_empty() {
            return Err(Error::Config("migrations.dir must not be empty".into()));
        }
        if self.database.path.as_os_str().is_empty() {
            return Err(Error::Config("database.path must not be empty".into()));
        }
        if let Some(level) = &self.log_level {
            if level.parse::<tracing::Level>().is_err() {
                return Err(Error::Config(format!(
                    "log_level must be one of trace, debug, info, warn, error (got {level:?})"
                )));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_database_path")]
    pub path: PathBuf,

    /// How long SQLite waits on a locked database before giving up.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,

    #[serde(default = "default_true")]
    pub foreign_keys: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_database_path(),
            busy_timeout_ms: default_busy_timeout_ms(),
            foreign_keys: true,
        }
    }
}

impl DatabaseConfig {
    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationsConfig {
    #[serde(default = "default_migrations_dir")]
    pub dir: PathBuf,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for MigrationsConfig {
    fn default() -> Self {
        Self {
            dir: default_migrations_dir(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl MigrationsConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

fn default_database_path() -> PathBuf {
    PathBuf::from("shiftsql.db")
}

fn default_busy_timeout_ms() -> u64 {
    5_000
}

fn default_true() -> bool {
    true
}

fn default_migrations_dir() -> PathBuf {
    PathBuf::from("scripts/migrations")
}

fn default_timeout_secs() -> u64 {
    30
}

#[cfg(test)]
mod tests {
    use super::AppConfig;

    #[test]
    fn defaults_are_valid() {
        let config = AppConfig::default();
        config.validate().expect("default config should validate");
        assert_eq!(config.migrations.timeout_secs, 30);
        assert_eq!(config.migrations.dir.to_str(), Some("scripts/migrations"));
    }

    #[test]
    fn log_level_must_name_a_level() {
        let mut config = AppConfig::default();
        config.log_level = Some("garbage".to_string());
        let err = config.validate().expect_err("unknown level must be rejected");
        assert!(err.to_string().contains("log_level"));

        config.log_level = Some("DEBUG".to_string());
        config.validate().expect("levels are case-insensitive");

        config.log_level = None;
        config.validate().expect("unset level falls back to the default");
    }

    #[test]
    fn zero_timeout_is_rejected() {
        let mut config = AppConfig::default();
        config.migrations.timeout_secs = 0;

        let err = config.validate().expect_err("zero timeout must fail");
        assert!(err.to_string().contains("timeout_secs"));
    }
}
