pub mod context;
pub mod engine;
pub mod migrations;

pub use context::OpContext;
pub use engine::{EngineError, EngineOptions, EngineTx, SqliteEngine};
pub use migrations::{
    Direction, MigrationError, MigrationId, MigrationState, Migrator, ResetReport, StatusReport,
    UpReport,
};
