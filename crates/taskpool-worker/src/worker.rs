use crate::{executor::TaskExecutor, metrics::PoolMetrics, scheduler::RetryScheduler};
use taskpool_core::{RetryPolicy, StateStore, Task, TaskState, WorkError};

use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;

use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// State shared by every worker of a pool
#[derive(Clone)]
pub(crate) struct WorkerContext {
    pub intake: Arc<Mutex<mpsc::Receiver<Task>>>,
    pub retries: Arc<Mutex<mpsc::UnboundedReceiver<Task>>>,
    pub scheduler: RetryScheduler,
    pub executor: Arc<TaskExecutor>,
    pub policy: RetryPolicy,
    pub store: Arc<StateStore>,
    pub metrics: Arc<PoolMetrics>,
    pub shutdown: CancellationToken,
}

/// Consumer loop executing one task at a time
pub(crate) struct Worker {
    id: usize,
    ctx: WorkerContext,
}

impl Worker {
    pub fn new(id: usize, ctx: WorkerContext) -> Self {
        Worker { id, ctx }
    }

    /// Run until shutdown is signalled or the intake queue is closed.
    pub async fn run(self) {
        debug!(worker = self.id, "worker started");

        loop {
            let task = tokio::select! {
                biased;

                _ = self.ctx.shutdown.cancelled() => break,

                next = self.next_task() => match next {
                    Some(task) => task,
                    None => break,
                },
            };

            self.process(task).await;
        }

        debug!(worker = self.id, "worker stopped");
    }

    /// Wait for a retry coming off backoff or a fresh task, whichever is
    /// ready first.
    async fn next_task(&self) -> Option<Task> {
        tokio::select! {
            Some(task) = async { self.ctx.retries.lock().await.recv().await } => Some(task),
            task = async { self.ctx.intake.lock().await.recv().await } => task,
        }
    }

    async fn process(&self, mut task: Task) {
        task.start();
        self.ctx.store.publish(&task);
        info!(worker = self.id, task_id = %task.id, retries = task.retries, "task started");

        self.ctx.metrics.tasks_in_flight.inc();
        let started = Instant::now();
        let outcome = self.ctx.executor.execute(&task).await;
        self.ctx
            .metrics
            .attempt_duration
            .observe(started.elapsed().as_secs_f64());
        self.ctx.metrics.tasks_in_flight.dec();

        match outcome {
            Ok(()) => {
                task.complete();
                self.ctx.store.publish(&task);
                self.ctx.metrics.inc_finished(TaskState::Done);
                info!(
                    worker = self.id,
                    task_id = %task.id,
                    retries = task.retries,
                    "task completed"
                );
            }
            Err(err) => self.handle_failure(task, err),
        }
    }

    fn handle_failure(&self, mut task: Task, err: WorkError) {
        if matches!(err, WorkError::Panicked(_)) {
            self.ctx.metrics.task_panics.inc();
        }

        task.record_failure(&err);

        if task.retries_exhausted() {
            task.fail();
            self.ctx.store.publish(&task);
            self.ctx.metrics.inc_finished(TaskState::Failed);
            error!(
                worker = self.id,
                task_id = %task.id,
                retries = task.retries,
                error = %err,
                "task failed permanently"
            );
            return;
        }

        // still Running, now with the bumped retry count
        self.ctx.store.publish(&task);
        self.ctx.metrics.task_retries.inc();

        let delay = self.ctx.policy.delay(task.retries);
        warn!(
            worker = self.id,
            task_id = %task.id,
            retries = task.retries,
            delay_ms = delay.as_millis() as u64,
            error = %err,
            "task attempt failed, retrying"
        );

        if let Err(task) = self.ctx.scheduler.schedule(task, delay) {
            warn!(task_id = %task.id, "retry scheduler stopped, abandoning task");
        }
    }
}
