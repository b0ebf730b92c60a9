use crate::handler::WorkHandler;
use std::any::Any;
use std::sync::Arc;
use std::time::Duration;
use taskpool_core::{Task, WorkError};
use tracing::{error, warn};

/// Runs single attempts with panic isolation and an optional timeout
pub struct TaskExecutor {
    handler: Arc<dyn WorkHandler>,
    timeout: Option<Duration>,
}

impl TaskExecutor {
    pub fn new(handler: Arc<dyn WorkHandler>) -> Self {
        TaskExecutor {
            handler,
            timeout: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Execute one attempt.
    ///
    /// The handler runs on its own Tokio task so a panic unwinds that task
    /// only; it is reported as [`WorkError::Panicked`].
    pub async fn execute(&self, task: &Task) -> Result<(), WorkError> {
        let handler = Arc::clone(&self.handler);
        let attempt = task.clone();
        let mut handle = tokio::spawn(async move { handler.execute(attempt).await });

        let joined = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, &mut handle).await {
                Ok(joined) => joined,
                Err(_) => {
                    handle.abort();
                    warn!(task_id = %task.id, timeout = ?limit, "attempt timed out");
                    return Err(WorkError::TimedOut(limit));
                }
            },
            None => handle.await,
        };

        match joined {
            Ok(result) => result,
            Err(e) if e.is_panic() => {
                let message = panic_message(e.into_panic());
                error!(task_id = %task.id, panic = %message, "task panicked");
                Err(WorkError::Panicked(message))
            }
            Err(_) => Err(WorkError::Aborted),
        }
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_executor_success() {
        let executor = TaskExecutor::new(Arc::new(|_task: Task| async { Ok::<(), WorkError>(()) }));
        assert!(executor.execute(&Task::new("ok", "")).await.is_ok());
    }

    #[tokio::test]
    async fn test_executor_passes_failure_through() {
        let executor = TaskExecutor::new(Arc::new(|_task: Task| async {
            Err::<(), WorkError>(WorkError::Failed("nope".to_string()))
        }));

        let result = executor.execute(&Task::new("bad", "")).await;
        assert_eq!(result, Err(WorkError::Failed("nope".to_string())));
    }

    #[tokio::test]
    async fn test_executor_captures_panic() {
        let executor = TaskExecutor::new(Arc::new(|task: Task| async move {
            if task.id == "boom" {
                panic!("handler exploded");
            }
            Ok::<(), WorkError>(())
        }));

        let result = executor.execute(&Task::new("boom", "")).await;
        assert_eq!(result, Err(WorkError::Panicked("handler exploded".to_string())));

        // the executor stays usable after a panic
        assert!(executor.execute(&Task::new("fine", "")).await.is_ok());
    }

    #[tokio::test]
    async fn test_executor_timeout() {
        let executor = TaskExecutor::new(Arc::new(|_task: Task| async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok::<(), WorkError>(())
        }))
        .with_timeout(Some(Duration::from_millis(20)));

        let result = executor.execute(&Task::new("slow", "")).await;
        assert_eq!(result, Err(WorkError::TimedOut(Duration::from_millis(20))));
    }
}
