use std::io;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, GraphError>;

#[derive(Debug, Error)]
pub enum GraphError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("{0} not found")]
    NotFound(String),
    #[error("lock failure: {0}")]
    Lock(String),
    #[error("store I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("store corruption: {0}")]
    Corruption(String),
    #[error("cache state violation: {0}")]
    CacheState(String),
}

impl GraphError {
    pub fn not_found(kind: &str, id: u64) -> Self {
        GraphError::NotFound(format!("{kind}[{id}]"))
    }

    /// Folds a batch of lock-release failures into a single error after
    /// every sibling release has been attempted.
    pub fn release_failures(failures: Vec<GraphError>) -> Self {
        let joined = failures
            .iter()
            .map(|e| e.to_string())
            .collect::<Vec<_>>()
            .join("; ");
        GraphError::Lock(format!(
            "unable to release {} lock(s): {joined}",
            failures.len()
        ))
    }
}
