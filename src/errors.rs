use thiserror::Error;

/// Errors surfaced by the analysis core.
///
/// Every fallible operation reports at operation granularity; nothing is
/// swallowed. `EmptyFeatureVector` is advisory: callers that batch-extract
/// log it and continue.
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("out of memory: {0}")]
    OutOfMemory(String),

    #[error("empty feature vector from '{0}'")]
    EmptyFeatureVector(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, AnalysisError>;
