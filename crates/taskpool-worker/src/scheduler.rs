//! Delay queue that hands backed-off tasks back to the workers.

use futures::StreamExt;
use std::time::Duration;
use taskpool_core::Task;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::time::DelayQueue;
use tracing::{debug, warn};

/// Longest delay the timer wheel accepts comfortably; larger backoffs are
/// clamped to it.
pub const MAX_SCHEDULE_DELAY: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// Handle for scheduling retries. Cheap to clone.
#[derive(Debug, Clone)]
pub struct RetryScheduler {
    requests: mpsc::UnboundedSender<(Task, Duration)>,
}

impl RetryScheduler {
    /// Start the scheduler loop. Expired tasks are sent on `ready` until
    /// `shutdown` is cancelled.
    pub fn spawn(
        ready: mpsc::UnboundedSender<Task>,
        shutdown: CancellationToken,
    ) -> (Self, JoinHandle<()>) {
        let (requests, incoming) = mpsc::unbounded_channel();
        let handle = tokio::spawn(run(incoming, ready, shutdown));
        (RetryScheduler { requests }, handle)
    }

    /// Deliver `task` back to the workers after `delay`.
    ///
    /// Returns the task if the scheduler has already stopped.
    pub fn schedule(&self, task: Task, delay: Duration) -> Result<(), Task> {
        self.requests
            .send((task, delay))
            .map_err(|mpsc::error::SendError((task, _))| task)
    }
}

async fn run(
    mut incoming: mpsc::UnboundedReceiver<(Task, Duration)>,
    ready: mpsc::UnboundedSender<Task>,
    shutdown: CancellationToken,
) {
    let mut delayed: DelayQueue<Task> = DelayQueue::new();

    loop {
        tokio::select! {
            biased;

            _ = shutdown.cancelled() => break,

            Some((task, delay)) = incoming.recv() => {
                debug!(task_id = %task.id, delay_ms = delay.as_millis() as u64, "retry scheduled");
                delayed.insert(task, delay.min(MAX_SCHEDULE_DELAY));
            }

            Some(expired) = delayed.next() => {
                let task = expired.into_inner();
                if let Err(mpsc::error::SendError(task)) = ready.send(task) {
                    warn!(task_id = %task.id, "no worker left to receive retry");
                    break;
                }
            }
        }
    }

    let abandoned = delayed.len();
    if abandoned > 0 {
        warn!(abandoned, "retry scheduler stopped with tasks still backing off");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::Instant;

    #[tokio::test]
    async fn test_delivers_after_delay() {
        let (ready_tx, mut ready_rx) = mpsc::unbounded_channel();
        let shutdown = CancellationToken::new();
        let (scheduler, handle) = RetryScheduler::spawn(ready_tx, shutdown.clone());

        let started = Instant::now();
        scheduler
            .schedule(Task::new("later", ""), Duration::from_millis(50))
            .unwrap();
        scheduler
            .schedule(Task::new("sooner", ""), Duration::from_millis(10))
            .unwrap();

        let first = ready_rx.recv().await.unwrap();
        let second = ready_rx.recv().await.unwrap();
        assert_eq!(first.id, "sooner");
        assert_eq!(second.id, "later");
        assert!(started.elapsed() >= Duration::from_millis(50));

        shutdown.cancel();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_schedule_after_stop_returns_task() {
        let (ready_tx, _ready_rx) = mpsc::unbounded_channel();
        let shutdown = CancellationToken::new();
        let (scheduler, handle) = RetryScheduler::spawn(ready_tx, shutdown.clone());

        shutdown.cancel();
        handle.await.unwrap();

        let rejected = scheduler.schedule(Task::new("late", ""), Duration::ZERO);
        assert_eq!(rejected.unwrap_err().id, "late");
    }

    #[tokio::test]
    async fn test_huge_delay_is_clamped() {
        let (ready_tx, _ready_rx) = mpsc::unbounded_channel();
        let shutdown = CancellationToken::new();
        let (scheduler, handle) = RetryScheduler::spawn(ready_tx, shutdown.clone());

        scheduler
            .schedule(Task::new("forever", ""), Duration::MAX)
            .unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;

        shutdown.cancel();
        handle.await.unwrap();
    }
}
