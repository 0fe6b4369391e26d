use std::path::PathBuf;

use thiserror::Error;

use super::Direction;
use crate::engine::EngineError;

#[derive(Error, Debug)]
pub enum MigrationError {
    #[error("invalid migration filename {file}: {reason}")]
    InvalidFilename { file: String, reason: String },

    #[error("invalid version {token:?} in migration filename {file}")]
    InvalidVersion { file: String, token: String },

    #[error("no {direction} script for migration {version} ({name})")]
    MissingScript {
        version: i64,
        name: String,
        direction: Direction,
    },

    #[error("migration file not found for applied version {version}")]
    MigrationFileMissing { version: i64 },

    #[error(
        "duplicate migration version {version}: {} conflicts with {}",
        first.display(),
        second.display()
    )]
    DuplicateVersion {
        version: i64,
        first: PathBuf,
        second: PathBuf,
    },

    #[error("failed to apply migration {version} ({name}) {direction}")]
    TransactionFailure {
        version: i64,
        name: String,
        direction: Direction,
        #[source]
        source: EngineError,
    },

    #[error("failed to create migrations table")]
    LedgerBootstrapFailure(#[source] EngineError),

    #[error("failed to read migrations table")]
    Ledger(#[source] EngineError),

    #[error("failed to read migrations directory {}", dir.display())]
    CatalogLoad {
        dir: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
