use std::time::Duration;
use taskpool_core::{PoolError, Result, RetryPolicy};

/// Worker pool configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolConfig {
    /// Number of concurrent workers, fixed for the pool's lifetime
    pub workers: usize,
    /// Capacity of the intake queue
    pub queue_size: usize,
    pub retry: RetryPolicy,
    /// Abort an attempt that runs longer than this
    pub attempt_timeout: Option<Duration>,
    /// Evict terminal state entries older than this
    pub retention: Option<Duration>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        PoolConfig {
            workers: 4,
            queue_size: 64,
            retry: RetryPolicy::default(),
            attempt_timeout: None,
            retention: None,
        }
    }
}

impl PoolConfig {
    pub fn validate(&self) -> Result<()> {
        if self.workers == 0 {
            return Err(PoolError::InvalidConfig("workers must be at least 1".to_string()));
        }
        if self.queue_size == 0 {
            return Err(PoolError::InvalidConfig("queue_size must be at least 1".to_string()));
        }
        if self.attempt_timeout == Some(Duration::ZERO) {
            return Err(PoolError::InvalidConfig("attempt_timeout must be positive".to_string()));
        }
        if self.retention == Some(Duration::ZERO) {
            return Err(PoolError::InvalidConfig("retention must be positive".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = PoolConfig::default();
        assert_eq!(config.workers, 4);
        assert_eq!(config.queue_size, 64);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_rejects_zero_sizes() {
        let config = PoolConfig { workers: 0, ..Default::default() };
        assert!(matches!(config.validate(), Err(PoolError::InvalidConfig(_))));

        let config = PoolConfig { queue_size: 0, ..Default::default() };
        assert!(matches!(config.validate(), Err(PoolError::InvalidConfig(_))));

        let config = PoolConfig { retention: Some(Duration::ZERO), ..Default::default() };
        assert!(config.validate().is_err());
    }
}
