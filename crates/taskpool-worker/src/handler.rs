use async_trait::async_trait;
use rand::Rng;
use std::future::Future;
use std::time::Duration;
use taskpool_core::{Task, WorkError};

/// Work capability invoked once per attempt.
///
/// Implementations receive an owned copy of the task as it stood when the
/// attempt started. Panics are caught by the executor and count as a
/// failed attempt.
#[async_trait]
pub trait WorkHandler: Send + Sync {
    async fn execute(&self, task: Task) -> Result<(), WorkError>;
}

#[async_trait]
impl<F, Fut> WorkHandler for F
where
    F: Fn(Task) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), WorkError>> + Send + 'static,
{
    async fn execute(&self, task: Task) -> Result<(), WorkError> {
        (self)(task).await
    }
}

/// Handler that sleeps for a random latency and fails with a fixed
/// probability.
#[derive(Debug, Clone)]
pub struct SimulatedWork {
    min_latency: Duration,
    max_latency: Duration,
    failure_rate: f64,
}

impl SimulatedWork {
    pub fn new(min_latency: Duration, max_latency: Duration, failure_rate: f64) -> Self {
        let max_latency = max_latency.max(min_latency);
        SimulatedWork {
            min_latency,
            max_latency,
            failure_rate: if failure_rate.is_nan() {
                0.0
            } else {
                failure_rate.clamp(0.0, 1.0)
            },
        }
    }

    fn sample(&self) -> (Duration, bool) {
        let mut rng = rand::thread_rng();
        let latency = if self.max_latency > self.min_latency {
            rng.gen_range(self.min_latency..=self.max_latency)
        } else {
            self.min_latency
        };
        (latency, rng.gen_bool(self.failure_rate))
    }
}

impl Default for SimulatedWork {
    fn default() -> Self {
        SimulatedWork::new(Duration::from_millis(100), Duration::from_millis(500), 0.2)
    }
}

#[async_trait]
impl WorkHandler for SimulatedWork {
    async fn execute(&self, _task: Task) -> Result<(), WorkError> {
        let (latency, fail) = self.sample();
        tokio::time::sleep(latency).await;

        if fail {
            Err(WorkError::Simulated)
        } else {
            Ok(())
        }
    }
}
