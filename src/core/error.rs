use std::fmt;
use thiserror::Error;

/// Commit phase a failed statement belonged to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Update,
    Insert,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Update => write!(f, "update"),
            Phase::Insert => write!(f, "insert"),
        }
    }
}

#[derive(Error, Debug)]
pub enum BatchError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Aggregation error: {0}")]
    Aggregation(String),

    #[error("Bulk {phase} failed for table '{table}' at chunk {chunk}: {source}")]
    Execution {
        phase: Phase,
        table: String,
        chunk: usize,
        #[source]
        source: Box<BatchError>,
    },

    #[error("Store error: {0}")]
    Store(String),

    #[error("Lock error: {0}")]
    LockError(String),
}

impl BatchError {
    /// Table and chunk index of a failed statement, if this is an execution failure.
    pub fn failed_chunk(&self) -> Option<(&str, usize)> {
        match self {
            BatchError::Execution { table, chunk, .. } => Some((table.as_str(), *chunk)),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, BatchError>;

impl<T> From<std::sync::PoisonError<T>> for BatchError {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        Self::LockError(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_execution_error_message_names_table_and_chunk() {
        let err = BatchError::Execution {
            phase: Phase::Insert,
            table: "users".to_string(),
            chunk: 2,
            source: Box::new(BatchError::Store("disk full".into())),
        };

        assert_eq!(
            err.to_string(),
            "Bulk insert failed for table 'users' at chunk 2: Store error: disk full"
        );
        assert_eq!(err.failed_chunk(), Some(("users", 2)));
        assert_eq!(BatchError::Aggregation("x".into()).failed_chunk(), None);
    }
}
