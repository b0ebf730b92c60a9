pub mod config;
pub mod executor;
pub mod handler;
pub mod metrics;
pub mod pool;
pub mod scheduler;
mod worker;

pub use config::PoolConfig;
pub use executor::TaskExecutor;
pub use handler::{SimulatedWork, WorkHandler};
pub use metrics::PoolMetrics;
pub use pool::{PoolStats, WorkerPool};
pub use scheduler::RetryScheduler;
