use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use taskpool_server::config::LogFormat;
use taskpool_server::{create_router, telemetry, ServerConfig};
use taskpool_worker::WorkerPool;
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "taskpool")]
#[command(about = "Bounded in-process task execution service", long_about = None)]
struct Args {
    /// Path to a YAML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Listen host
    #[arg(long)]
    host: Option<String>,

    /// Listen port
    #[arg(long)]
    port: Option<u16>,

    /// Number of workers
    #[arg(long)]
    workers: Option<usize>,

    /// Intake queue capacity
    #[arg(long)]
    queue_size: Option<usize>,

    /// Log level filter
    #[arg(long)]
    log_level: Option<String>,

    /// Log output format
    #[arg(long, value_enum)]
    log_format: Option<LogFormat>,
}

impl Args {
    fn apply(self, config: &mut ServerConfig) {
        if let Some(host) = self.host {
            config.server.host = host;
        }
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(workers) = self.workers {
            config.pool.workers = workers;
        }
        if let Some(queue_size) = self.queue_size {
            config.pool.queue_size = queue_size;
        }
        if let Some(log_level) = self.log_level {
            config.logging.level = log_level;
        }
        if let Some(log_format) = self.log_format {
            config.logging.format = log_format;
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let mut args = Args::parse();

    let mut config = match args.config.take() {
        Some(path) => ServerConfig::from_file(&path)?,
        None => ServerConfig::default(),
    };
    let ignored = config.apply_env(|key| std::env::var(key).ok());
    args.apply(&mut config);

    telemetry::init_tracing(&config.logging)?;
    for entry in &ignored {
        warn!(%entry, "ignoring environment override");
    }

    info!(
        addr = %config.listen_addr(),
        workers = config.pool.workers,
        queue_size = config.pool.queue_size,
        "starting taskpool"
    );

    let pool = Arc::new(WorkerPool::new(
        config.to_pool_config(),
        Arc::new(config.work_handler()),
    )?);

    let app = create_router(Arc::clone(&pool));
    let listener = tokio::net::TcpListener::bind(config.listen_addr()).await?;
    info!(addr = %listener.local_addr()?, "http server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("http server stopped, draining worker pool");
    let timeout = Duration::from_secs(config.server.shutdown_timeout_secs);
    if tokio::time::timeout(timeout, pool.shutdown()).await.is_err() {
        warn!(timeout_secs = timeout.as_secs(), "worker pool did not stop in time");
    }

    info!("taskpool stopped");
    Ok(())
}

/// Resolve on SIGINT or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received ctrl-c"),
        _ = terminate => info!("received terminate signal"),
    }
}
