//! Core log processing pipeline for `netconsoled`.
//!
//! Records received from a log source are handed to a [`Dispatcher`][dispatcher::Dispatcher], which drives each one
//! through a chain of [filters][filters::Filter] and, if the record survives, a chain of [sinks][sinks::Sink]. The
//! dispatcher reports failures through `tracing` and updates the optional [pipeline metrics][observability].
#![deny(missing_docs)]

pub mod dispatcher;
pub mod filters;
pub mod observability;
pub mod record;
pub mod sinks;

/// Common imports.
pub mod prelude {
    pub use super::dispatcher::Dispatcher;
    pub use super::filters::{Filter, FilterError, FilterOutcome};
    pub use super::observability::PipelineMetrics;
    pub use super::record::{LogEntry, Record, SourceAddress};
    pub use super::sinks::{Close, Sink, SinkBuildError, SinkError};
}
