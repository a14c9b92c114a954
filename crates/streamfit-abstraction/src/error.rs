use thiserror::Error;

pub type EngineResult<T> = std::result::Result<T, EngineError>;

/// Failure reported by an external collaborator (training, scoring,
/// evaluation or persistence). The orchestrator treats every variant as fatal.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// The scheme options could not be applied.
    #[error("invalid scheme options: {0}")]
    InvalidOptions(String),

    /// The engine cannot handle the requested schema or operation.
    #[error("unsupported by engine: {0}")]
    Unsupported(String),

    /// Building or updating a model failed.
    #[error("training failed: {0}")]
    Training(String),

    /// Producing predictions failed.
    #[error("scoring failed: {0}")]
    Scoring(String),

    /// Accumulating or summarising evaluation statistics failed.
    #[error("evaluation failed: {0}")]
    Evaluation(String),

    /// Writing a model artifact failed.
    #[error("persistence failed: {0}")]
    Persistence(String),

    /// A model snapshot could not be encoded.
    #[error("serialization failed: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for EngineError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<std::io::Error> for EngineError {
    fn from(err: std::io::Error) -> Self {
        Self::Persistence(err.to_string())
    }
}
