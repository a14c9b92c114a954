use std::path::PathBuf;
use streamfit_abstraction::{EngineError, Record};
use thiserror::Error;

pub type StreamResult<T> = std::result::Result<T, StreamError>;

#[derive(Debug, Error)]
pub enum StreamError {
    /// Missing setting or invalid combination of settings.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Target or stratification field absent from a stream, or typed
    /// differently in the training and test streams.
    #[error("schema mismatch: {0}")]
    SchemaMismatch(String),

    #[error(
        "stratification value '{key}' of field '{field}' reappeared after its group was finalized (input must be sorted by '{field}')"
    )]
    OrderingViolation {
        field: String,
        key: String,
        /// Output of groups flushed by the same call before the violation.
        emitted: Vec<Record>,
    },

    #[error("unsupported attribute type for field '{0}'")]
    UnsupportedAttributeType(String),

    /// A host call arrived in a state that cannot accept it.
    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error("failed to persist model to {}: {source}", path.display())]
    Persistence { path: PathBuf, source: EngineError },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("failed to parse configuration: {0}")]
    ConfigParse(#[from] toml::de::Error),
}
