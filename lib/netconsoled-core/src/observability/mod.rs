//! Observability.

mod metrics;
pub use self::metrics::{Outcome, PipelineMetrics};
