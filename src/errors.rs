//! Error types for the profiler core

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ProfilerError>;

#[derive(Error, Debug)]
pub enum ProfilerError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("data access error: {0}")]
    Access(String),

    #[error("unknown column: {0}")]
    UnknownColumn(String),

    #[error("invalid distance threshold: {0}")]
    InvalidThreshold(f64),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("other error: {0}")]
    Other(String),
}
