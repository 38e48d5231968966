use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Core(#[from] tally_core::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("{entity} not found for id/prefix: {query}")]
    RecordNotFound { entity: &'static str, query: String },
    #[error("{0}")]
    AmbiguousId(String),
    #[error("Invalid date '{0}', expected YYYY-MM-DD")]
    InvalidDate(String),
    #[error(
        "Sync is not configured. Run `tally config init --backend-url <URL> --user <ID>` first."
    )]
    SyncNotConfigured,
}
