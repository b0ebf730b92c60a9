use std::time::Duration;
use thiserror::Error;

/// Errors surfaced to callers of the pool.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PoolError {
    /// Admission rejected: the intake queue is at capacity. Callers should
    /// retry later.
    #[error("queue overflow: task {task_id} rejected")]
    QueueFull { task_id: String },

    #[error("worker pool is shut down")]
    Closed,

    #[error("invalid pool configuration: {0}")]
    InvalidConfig(String),

    #[error("metrics registry error: {0}")]
    Metrics(String),
}

/// Failure of a single execution attempt. Drives the retry state machine
/// and never escapes the pool.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WorkError {
    #[error("simulated error")]
    Simulated,

    #[error("{0}")]
    Failed(String),

    #[error("task panicked: {0}")]
    Panicked(String),

    #[error("attempt timed out after {0:?}")]
    TimedOut(Duration),

    #[error("attempt aborted")]
    Aborted,
}

pub type Result<T> = std::result::Result<T, PoolError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = PoolError::QueueFull { task_id: "a".to_string() };
        assert_eq!(err.to_string(), "queue overflow: task a rejected");

        let err = WorkError::Panicked("boom".to_string());
        assert_eq!(err.to_string(), "task panicked: boom");

        let err = WorkError::TimedOut(Duration::from_millis(250));
        assert_eq!(err.to_string(), "attempt timed out after 250ms");
    }
}
