//! `netconsoled` receives Linux netconsole logs over UDP, filters them, and stores them in one or more sinks.
#![deny(missing_docs)]

use std::{num::NonZeroUsize, path::PathBuf, sync::Arc, time::Duration};

use anyhow::Context as _;
use clap::Parser;
use netconsoled_app::prelude::*;
use netconsoled_config::{write_default_configuration, Config};
use netconsoled_core::{observability::PipelineMetrics, sinks::SinkError};
use tokio::net::UdpSocket;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

mod listener;
mod netconsole;

mod workers;
use self::workers::WorkerPool;

/// Time allowed for in-flight metrics requests to finish at shutdown.
const METRICS_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Receives netconsole logs, and processes them according to the configuration.
#[derive(Parser)]
#[command(version, about)]
struct Cli {
    /// Path to the configuration file.
    #[arg(short = 'c', long = "config", default_value = "netconsoled.yml")]
    config: PathBuf,

    /// Write a default configuration file to the configuration path and exit.
    #[arg(long)]
    init: bool,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if cli.init {
        let _guard = match initialize_logging("info", false) {
            Ok(guard) => guard,
            Err(e) => {
                fatal_and_exit(format!("failed to initialize logging: {:#}", e));
                return;
            }
        };

        if let Err(e) = write_default_configuration(&cli.config) {
            fatal_and_exit(e.to_string());
        }
        return;
    }

    let config = match Config::from_file(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            fatal_and_exit(format!("failed to load configuration: {}", e));
            return;
        }
    };

    let guard = match initialize_logging(&config.logging.level, config.logging.format_json) {
        Ok(guard) => guard,
        Err(e) => {
            fatal_and_exit(format!("failed to initialize logging: {:#}", e));
            return;
        }
    };

    match run(config).await {
        Ok(()) => info!("netconsoled stopped."),
        Err(e) => {
            error!("{:#}", e);
            // Exiting here skips the logging guard's destructor, so flush it explicitly.
            drop(guard);
            std::process::exit(1);
        }
    }
}

async fn run(config: Config) -> Result<(), GenericError> {
    let registry = config.server.http_addr.map(|_| Arc::new(MetricsRegistry::new()));
    let metrics = match &registry {
        Some(registry) => PipelineMetrics::new(registry.clone()),
        None => PipelineMetrics::disabled(),
    };

    // The pipeline must be fully built before the socket is bound.
    let dispatcher = Arc::new(
        config
            .build_dispatcher()
            .context("failed to build pipeline")?
            .with_metrics(metrics),
    );

    let shutdown = CancellationToken::new();

    let socket = UdpSocket::bind(config.server.udp_addr)
        .await
        .with_context(|| format!("failed to listen on UDP address {}", config.server.udp_addr))?;
    info!(addr = %config.server.udp_addr, "Starting UDP server.");

    let metrics_server = match (config.server.http_addr, registry) {
        (Some(addr), Some(registry)) => {
            let server = MetricsServer::bind(addr).await?;
            Some(tokio::spawn(server.serve(registry, shutdown.clone())))
        }
        _ => None,
    };

    let worker_count = config
        .server
        .workers
        .or_else(|| std::thread::available_parallelism().ok())
        .map_or(1, NonZeroUsize::get);
    let pool = WorkerPool::spawn(Arc::clone(&dispatcher), worker_count);
    info!(workers = worker_count, "Started dispatch workers.");

    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            wait_for_shutdown_signal().await;
            shutdown.cancel();
        }
    });

    let listener_result = listener::run(socket, &pool, shutdown.clone()).await;

    // Stop everything else, and let the workers finish whatever was already received.
    shutdown.cancel();
    pool.shutdown().await;

    if let Some(handle) = metrics_server {
        match tokio::time::timeout(METRICS_SHUTDOWN_TIMEOUT, handle).await {
            Ok(Ok(Ok(()))) => {}
            Ok(Ok(Err(e))) => error!(error = %e, "Metrics server failed."),
            Ok(Err(e)) => error!(error = %e, "Metrics server task panicked."),
            Err(_) => warn!("Timed out waiting for metrics server to stop."),
        }
    }

    // Every worker has exited, so nothing can store to the sinks anymore.
    finish(listener_result, dispatcher.close())
}

/// Combines the listener's result with the result of closing the sinks.
///
/// The sinks are always closed, even when the listener failed. A listener error takes precedence, with any close
/// error logged alongside it.
fn finish(
    listener_result: Result<(), GenericError>, close_result: Result<(), SinkError>,
) -> Result<(), GenericError> {
    match (listener_result, close_result) {
        (Ok(()), Ok(())) => {
            info!("Flushed all sink data.");
            Ok(())
        }
        (Ok(()), Err(e)) => Err(e).context("failed to flush sink data"),
        (Err(e), Ok(())) => {
            info!("Flushed all sink data.");
            Err(e)
        }
        (Err(e), Err(close_error)) => {
            error!(error = %close_error, "Failed to flush sink data.");
            Err(e)
        }
    }
}

#[cfg(unix)]
async fn wait_for_shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(sigterm) => sigterm,
        Err(e) => {
            warn!(error = %e, "Failed to listen for SIGTERM. Only SIGINT will trigger shutdown.");
            wait_for_ctrl_c().await;
            return;
        }
    };

    tokio::select! {
        _ = wait_for_ctrl_c() => {},
        _ = sigterm.recv() => info!("Received SIGTERM, shutting down..."),
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown_signal() {
    wait_for_ctrl_c().await;
}

async fn wait_for_ctrl_c() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Received SIGINT, shutting down..."),
        Err(e) => {
            // Without a signal handler there's no way to stop gracefully, so keep running.
            error!(error = %e, "Failed to listen for SIGINT.");
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use anyhow::anyhow;
    use netconsoled_core::{dispatcher::Dispatcher, filters::NoopFilter, sinks::WriterSink};

    use super::*;

    fn dispatcher() -> Dispatcher {
        Dispatcher::new(NoopFilter, WriterSink::new(Vec::<u8>::new()))
    }

    #[test]
    fn sinks_close_when_listener_fails() {
        let dispatcher = dispatcher();

        let error = finish(Err(anyhow!("receive failed")), dispatcher.close()).unwrap_err();
        assert_eq!(error.to_string(), "receive failed");

        // The sink was already closed above.
        assert!(matches!(dispatcher.close(), Err(SinkError::Closed)));
    }

    #[test]
    fn close_errors_are_reported() {
        let dispatcher = dispatcher();
        dispatcher.close().unwrap();

        let error = finish(Ok(()), dispatcher.close()).unwrap_err();
        assert_eq!(format!("{:#}", error), "failed to flush sink data: sink is closed");

        let error = finish(Err(anyhow!("receive failed")), dispatcher.close()).unwrap_err();
        assert_eq!(error.to_string(), "receive failed");
    }

    #[test]
    fn clean_shutdown() {
        let dispatcher = dispatcher();
        assert!(finish(Ok(()), dispatcher.close()).is_ok());
    }
}
