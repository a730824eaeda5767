use thiserror::Error;

pub type Result<T> = core::result::Result<T, Error>;

/// Defines the migration engine error types.
///
/// The first four variants are the engine's own failure taxonomy. Store
/// backends classify driver errors into one of them at the call site, so the
/// orchestrator can report which phase of a run went wrong.
///
#[derive(Debug, Error)]
pub enum Error {
    #[error("Schema preparation error: {0}")]
    SchemaPreparation(String),
    #[error("Read error: {0}")]
    Read(String),
    #[error("Mapping error: {0}")]
    Mapping(String),
    #[error("Write error: {0}")]
    Write(String),
    #[error("Invalid state: {0}")]
    State(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Not supported: {0}")]
    NotSupported(String),

    #[error("Environment error: {0}")]
    Environment(#[from] dotenv::Error),
    #[error("Config error: {0}")]
    Config(#[from] config::ConfigError),
    #[error("Failed to set logger: {0}")]
    Logger(#[from] tracing::log::SetLoggerError),
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("Database migration error: {0}")]
    DatabaseMigration(#[from] sqlx::migrate::MigrateError),
    #[error("Telemetry error: {0}")]
    Telemetry(#[from] tracing::dispatcher::SetGlobalDefaultError),
}

impl Error {
    /// Wraps a DDL failure.
    pub fn schema(error: impl std::fmt::Display) -> Self {
        Self::SchemaPreparation(error.to_string())
    }

    /// Wraps a source cursor failure.
    pub fn read(error: impl std::fmt::Display) -> Self {
        Self::Read(error.to_string())
    }

    /// Wraps a chunk insert or commit failure.
    pub fn write(error: impl std::fmt::Display) -> Self {
        Self::Write(error.to_string())
    }
}
