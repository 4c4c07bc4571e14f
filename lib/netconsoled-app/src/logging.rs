//! Logging.

use anyhow::Context as _;
use tracing::level_filters::LevelFilter;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt as _, util::SubscriberInitExt as _, EnvFilter, Layer as _};

use crate::GenericError;

/// Environment variable that, when set, replaces the configured log filter directives.
pub const LOG_LEVEL_ENV_VAR: &str = "NETCONSOLED_LOG_LEVEL";

/// Logs a message to standard error and exits the process with a non-zero exit code.
pub fn fatal_and_exit(message: String) {
    eprintln!("FATAL: {}", message);
    std::process::exit(1);
}

/// Initializes the logging subsystem for `tracing`.
///
/// `directives` are `EnvFilter` directives, such as `info` or `netconsoled=debug,warn`, and are replaced wholesale by
/// the value of `NETCONSOLED_LOG_LEVEL` when that is set. Logs are written to standard error, leaving standard output
/// to any sink that writes there, either as JSON or in a human-readable format.
///
/// Writes happen on a background thread. The returned guard flushes any pending logs when dropped, and so must be held
/// until the process exits.
///
/// # Errors
///
/// If the filter directives are invalid, or the logging subsystem was already initialized, an error will be returned.
pub fn initialize_logging(directives: &str, format_json: bool) -> Result<WorkerGuard, GenericError> {
    let env_override = std::env::var(LOG_LEVEL_ENV_VAR).ok();
    let filter = build_env_filter(directives, env_override.as_deref())?;

    let (writer, guard) = tracing_appender::non_blocking(std::io::stderr());
    let fmt_layer = if format_json {
        tracing_subscriber::fmt::layer()
            .json()
            .flatten_event(true)
            .with_target(true)
            .with_writer(writer)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer().with_target(true).with_writer(writer).boxed()
    };

    tracing_subscriber::registry()
        .with(fmt_layer.with_filter(filter))
        .try_init()
        .context("failed to install logging subscriber")?;

    Ok(guard)
}

fn build_env_filter(directives: &str, env_override: Option<&str>) -> Result<EnvFilter, GenericError> {
    let directives = match env_override.map(str::trim) {
        Some(value) if !value.is_empty() => value,
        _ => directives,
    };

    EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .parse(directives)
        .with_context(|| format!("invalid log filter directives '{}'", directives))
}
