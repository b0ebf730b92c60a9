use crate::config::PoolConfig;
use crate::executor::TaskExecutor;
use crate::handler::WorkHandler;
use crate::metrics::PoolMetrics;
use crate::scheduler::RetryScheduler;
use crate::worker::{Worker, WorkerContext};

use futures::future::join_all;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use taskpool_core::{PoolError, Result, StateCounts, StateStore, Task};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Upper bound on the retention reaper's tick
const MAX_REAP_INTERVAL: Duration = Duration::from_secs(60);

/// Point-in-time view of the pool
#[derive(Debug, Clone, Serialize)]
pub struct PoolStats {
    pub workers: usize,
    pub queue_capacity: usize,
    /// Tasks waiting in the intake queue
    pub queued: usize,
    /// Attempts currently executing
    pub in_flight: usize,
    /// Entries held by the state store
    pub tracked: usize,
    pub states: StateCounts,
}

/// Bounded queue plus a fixed set of workers.
///
/// Must be created inside a Tokio runtime. Dropping the pool cancels its
/// background tasks without waiting for them; call [`WorkerPool::shutdown`]
/// to wait for in-flight attempts.
pub struct WorkerPool {
    config: PoolConfig,
    intake: mpsc::Sender<Task>,
    intake_rx: Arc<tokio::sync::Mutex<mpsc::Receiver<Task>>>,
    store: Arc<StateStore>,
    metrics: Arc<PoolMetrics>,
    shutdown: CancellationToken,
    workers: parking_lot::Mutex<Vec<JoinHandle<()>>>,
    background: parking_lot::Mutex<Vec<JoinHandle<()>>>,
}

impl WorkerPool {
    pub fn new(config: PoolConfig, handler: Arc<dyn WorkHandler>) -> Result<Self> {
        config.validate()?;

        let metrics = Arc::new(PoolMetrics::new().map_err(|e| PoolError::Metrics(e.to_string()))?);
        let store = Arc::new(StateStore::new());
        let shutdown = CancellationToken::new();

        let (intake, intake_rx) = mpsc::channel(config.queue_size);
        let intake_rx = Arc::new(tokio::sync::Mutex::new(intake_rx));

        let (ready_tx, ready_rx) = mpsc::unbounded_channel();
        let (scheduler, scheduler_handle) = RetryScheduler::spawn(ready_tx, shutdown.clone());
        let mut background = vec![scheduler_handle];

        if let Some(retention) = config.retention {
            background.push(spawn_reaper(Arc::clone(&store), retention, shutdown.clone()));
        }

        let ctx = WorkerContext {
            intake: Arc::clone(&intake_rx),
            retries: Arc::new(tokio::sync::Mutex::new(ready_rx)),
            scheduler,
            executor: Arc::new(TaskExecutor::new(handler).with_timeout(config.attempt_timeout)),
            policy: config.retry,
            store: Arc::clone(&store),
            metrics: Arc::clone(&metrics),
            shutdown: shutdown.clone(),
        };

        let workers = (0..config.workers)
            .map(|id| tokio::spawn(Worker::new(id, ctx.clone()).run()))
            .collect();

        info!(
            workers = config.workers,
            queue_size = config.queue_size,
            "worker pool started"
        );

        Ok(WorkerPool {
            config,
            intake,
            intake_rx,
            store,
            metrics,
            shutdown,
            workers: parking_lot::Mutex::new(workers),
            background: parking_lot::Mutex::new(background),
        })
    }

    /// Admit a task without blocking.
    ///
    /// Returns [`PoolError::QueueFull`] when the intake queue is at capacity
    /// and [`PoolError::Closed`] once shutdown has begun.
    pub fn enqueue(&self, task: Task) -> Result<()> {
        if self.shutdown.is_cancelled() {
            return Err(PoolError::Closed);
        }

        let task_id = task.id.clone();
        let result = self.store.admit(task, |task| {
            self.intake.try_send(task).map_err(|e| match e {
                TrySendError::Full(_) => PoolError::QueueFull {
                    task_id: task_id.clone(),
                },
                TrySendError::Closed(_) => PoolError::Closed,
            })
        });

        match &result {
            Ok(()) => {
                self.metrics.tasks_enqueued.inc();
                debug!(task_id = %task_id, "task enqueued");
            }
            Err(PoolError::QueueFull { .. }) => {
                self.metrics.tasks_rejected.inc();
                warn!(task_id = %task_id, "queue overflow, task rejected");
            }
            Err(e) => warn!(task_id = %task_id, error = %e, "task rejected"),
        }

        result
    }

    /// Last published snapshot of a task
    pub fn state(&self, id: &str) -> Option<Task> {
        self.store.get(id)
    }

    pub fn stats(&self) -> PoolStats {
        let queued = self.queue_depth();
        self.metrics.queue_depth.set(queued as i64);

        PoolStats {
            workers: self.config.workers,
            queue_capacity: self.config.queue_size,
            queued,
            in_flight: self.metrics.tasks_in_flight.get().max(0) as usize,
            tracked: self.store.len(),
            states: self.store.count_by_state(),
        }
    }

    pub fn metrics(&self) -> Arc<PoolMetrics> {
        Arc::clone(&self.metrics)
    }

    /// Refresh sampled gauges and render the metrics registry
    pub fn render_metrics(&self) -> Result<String> {
        self.metrics.queue_depth.set(self.queue_depth() as i64);
        self.metrics
            .encode()
            .map_err(|e| PoolError::Metrics(e.to_string()))
    }

    pub fn store(&self) -> Arc<StateStore> {
        Arc::clone(&self.store)
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Stop accepting tasks, let every in-flight attempt finish and wait for
    /// the workers to exit.
    ///
    /// Tasks still queued or backing off are abandoned. Calling this again
    /// is a no-op. An abandoned task keeps its last snapshot, so one caught
    /// in backoff still reads as `running` afterwards.
    pub async fn shutdown(&self) {
        let workers = std::mem::take(&mut *self.workers.lock());
        let background = std::mem::take(&mut *self.background.lock());
        if workers.is_empty() && background.is_empty() {
            return;
        }

        info!("shutting down worker pool");
        self.shutdown.cancel();

        for result in join_all(workers).await {
            if let Err(e) = result {
                error!(error = %e, "worker ended abnormally");
            }
        }

        for result in join_all(background).await {
            if let Err(e) = result {
                error!(error = %e, "background task ended abnormally");
            }
        }

        let abandoned = {
            let mut intake = self.intake_rx.lock().await;
            intake.close();
            let mut count = 0usize;
            while intake.try_recv().is_ok() {
                count += 1;
            }
            count
        };
        if abandoned > 0 {
            warn!(abandoned, "queued tasks abandoned at shutdown");
        }
        self.metrics.queue_depth.set(0);

        info!("worker pool stopped");
    }

    fn queue_depth(&self) -> usize {
        self.intake.max_capacity() - self.intake.capacity()
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

fn spawn_reaper(
    store: Arc<StateStore>,
    retention: Duration,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    let period = retention.clamp(Duration::from_millis(100), MAX_REAP_INTERVAL);

    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = interval.tick() => {
                    let removed = store.prune_terminal(retention);
                    if removed > 0 {
                        debug!(removed, "pruned terminal task records");
                    }
                }
            }
        }
    })
}
