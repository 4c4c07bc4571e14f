//! Process-level helpers for `netconsoled`: logging, and the metrics registry with its exposition endpoint.
#![deny(missing_docs)]

pub mod logging;
pub mod metrics;

/// A generic error type.
pub type GenericError = anyhow::Error;

/// Common imports.
pub mod prelude {
    pub use super::logging::{fatal_and_exit, initialize_logging};
    pub use super::metrics::{MetricsRegistry, MetricsServer};
    pub use super::GenericError;
}
