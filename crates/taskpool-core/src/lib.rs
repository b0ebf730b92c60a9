mod task;
mod error;
mod backoff;
mod store;

pub use task::{Task, TaskState};
pub use error::{PoolError, WorkError, Result};
pub use backoff::{RetryPolicy, DEFAULT_BASE_DELAY};
pub use store::{StateStore, StateCounts};
