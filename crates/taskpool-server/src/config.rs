use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use taskpool_core::RetryPolicy;
use taskpool_worker::{PoolConfig, SimulatedWork};
use thiserror::Error;

const WORKERS_RANGE: (i64, i64) = (1, 32);
const QUEUE_SIZE_RANGE: (i64, i64) = (1, 1024);
const PORT_RANGE: (i64, i64) = (1, 65535);
const RETRY_BASE_MS_RANGE: (i64, i64) = (1, 60_000);
const RETENTION_SECS_RANGE: (i64, i64) = (1, 30 * 24 * 60 * 60);

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub server: HttpConfig,
    pub pool: PoolSettings,
    pub work: WorkConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub host: String,
    pub port: u16,
    pub shutdown_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolSettings {
    pub workers: usize,
    pub queue_size: usize,
    pub retry_base_ms: u64,
    pub retry_max_delay_ms: Option<u64>,
    pub attempt_timeout_secs: Option<u64>,
    pub retention_secs: Option<u64>,
}

/// Parameters of the simulated work handler
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkConfig {
    pub min_latency_ms: u64,
    pub max_latency_ms: u64,
    pub failure_rate: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    Pretty,
}

impl Default for HttpConfig {
    fn default() -> Self {
        HttpConfig {
            host: "0.0.0.0".to_string(),
            port: 8080,
            shutdown_timeout_secs: 30,
        }
    }
}

impl Default for PoolSettings {
    fn default() -> Self {
        PoolSettings {
            workers: 4,
            queue_size: 64,
            retry_base_ms: 100,
            retry_max_delay_ms: None,
            attempt_timeout_secs: None,
            retention_secs: None,
        }
    }
}

impl Default for WorkConfig {
    fn default() -> Self {
        WorkConfig {
            min_latency_ms: 100,
            max_latency_ms: 500,
            failure_rate: 0.2,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: "info".to_string(),
            format: LogFormat::Json,
        }
    }
}

/// An environment override that was ignored
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EnvOverrideError {
    #[error("{key}={value} is not a valid integer, keeping {current}")]
    NotAnInteger {
        key: &'static str,
        value: String,
        current: String,
    },

    #[error("{key}={value} is outside [{min}, {max}], keeping {current}")]
    OutOfRange {
        key: &'static str,
        value: i64,
        min: i64,
        max: i64,
        current: String,
    },

    #[error("{key}={value} is not one of json, pretty, keeping {current}")]
    UnknownFormat {
        key: &'static str,
        value: String,
        current: String,
    },
}

impl ServerConfig {
    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: ServerConfig = serde_yaml::from_str(&contents)?;
        Ok(config)
    }

    /// Apply overrides from environment-style variables.
    ///
    /// Values that fail to parse or fall outside their bounds leave the
    /// current setting untouched and are returned so the caller can report
    /// them.
    pub fn apply_env<F>(&mut self, lookup: F) -> Vec<EnvOverrideError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut ignored = Vec::new();

        if let Some(v) = int_var(
            &lookup,
            "WORKERS",
            WORKERS_RANGE,
            self.pool.workers,
            &mut ignored,
        ) {
            self.pool.workers = v as usize;
        }
        if let Some(v) = int_var(
            &lookup,
            "QUEUE_SIZE",
            QUEUE_SIZE_RANGE,
            self.pool.queue_size,
            &mut ignored,
        ) {
            self.pool.queue_size = v as usize;
        }
        if let Some(v) = int_var(&lookup, "PORT", PORT_RANGE, self.server.port, &mut ignored) {
            self.server.port = v as u16;
        }
        if let Some(v) = int_var(
            &lookup,
            "RETRY_BASE_MS",
            RETRY_BASE_MS_RANGE,
            self.pool.retry_base_ms,
            &mut ignored,
        ) {
            self.pool.retry_base_ms = v as u64;
        }
        let retention = self.pool.retention_secs.map_or("none".to_string(), |s| s.to_string());
        if let Some(v) = int_var(
            &lookup,
            "RETENTION_SECS",
            RETENTION_SECS_RANGE,
            retention,
            &mut ignored,
        ) {
            self.pool.retention_secs = Some(v as u64);
        }

        if let Some(level) = lookup("LOG_LEVEL").filter(|v| !v.is_empty()) {
            self.logging.level = level;
        }
        if let Some(raw) = lookup("LOG_FORMAT").filter(|v| !v.is_empty()) {
            match raw.to_ascii_lowercase().as_str() {
                "json" => self.logging.format = LogFormat::Json,
                "pretty" => self.logging.format = LogFormat::Pretty,
                _ => ignored.push(EnvOverrideError::UnknownFormat {
                    key: "LOG_FORMAT",
                    value: raw,
                    current: format!("{:?}", self.logging.format).to_lowercase(),
                }),
            }
        }

        ignored
    }

    pub fn to_pool_config(&self) -> PoolConfig {
        let mut retry = RetryPolicy::new(Duration::from_millis(self.pool.retry_base_ms));
        if let Some(cap) = self.pool.retry_max_delay_ms {
            retry = retry.with_max_delay(Duration::from_millis(cap));
        }

        PoolConfig {
            workers: self.pool.workers,
            queue_size: self.pool.queue_size,
            retry,
            attempt_timeout: self.pool.attempt_timeout_secs.map(Duration::from_secs),
            retention: self.pool.retention_secs.map(Duration::from_secs),
        }
    }

    pub fn work_handler(&self) -> SimulatedWork {
        SimulatedWork::new(
            Duration::from_millis(self.work.min_latency_ms),
            Duration::from_millis(self.work.max_latency_ms),
            self.work.failure_rate,
        )
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

/// Read an integer variable, rejecting values outside `[min, max]`
fn int_var<F>(
    lookup: &F,
    key: &'static str,
    (min, max): (i64, i64),
    current: impl ToString,
    ignored: &mut Vec<EnvOverrideError>,
) -> Option<i64>
where
    F: Fn(&str) -> Option<String>,
{
    let raw = lookup(key).filter(|v| !v.is_empty())?;

    let value = match raw.trim().parse::<i64>() {
        Ok(value) => value,
        Err(_) => {
            ignored.push(EnvOverrideError::NotAnInteger {
                key,
                value: raw,
                current: current.to_string(),
            });
            return None;
        }
    };

    if value < min || value > max {
        ignored.push(EnvOverrideError::OutOfRange {
            key,
            value,
            min,
            max,
            current: current.to_string(),
        });
        return None;
    }

    Some(value)
}
