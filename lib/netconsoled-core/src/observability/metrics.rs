use std::{fmt, sync::Arc};

use metrics::{Key, KeyName, Label, Level, Metadata, Recorder, SharedString, Unit};

const RECEIVED_TOTAL: &str = "netconsoled_logs_received_total";
const FILTER_TOTAL: &str = "netconsoled_logs_filter_total";
const SINK_TOTAL: &str = "netconsoled_logs_sink_total";

static METADATA: Metadata<'static> = Metadata::new(module_path!(), Level::INFO, Some(module_path!()));

/// Outcome of a record at a pipeline boundary.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Outcome {
    /// The record made it through the stage.
    Ok,

    /// The record was rejected by the stage.
    Dropped,

    /// The stage failed while handling the record.
    Error,
}

impl Outcome {
    /// Returns the label value for this outcome.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::Dropped => "dropped",
            Self::Error => "error",
        }
    }
}

/// Pipeline metrics.
///
/// Tracks how many records were received from each source host, and what happened to them in the filter and sink
/// chains. Metrics are registered against an explicitly provided [`Recorder`] rather than the process-global one.
///
/// When created with [`disabled`][Self::disabled] (also the default), every update is a no-op: no labels are built, no
/// recorder is consulted, and nothing is allocated.
#[derive(Clone, Default)]
pub struct PipelineMetrics {
    recorder: Option<Arc<dyn Recorder + Send + Sync>>,
}

impl PipelineMetrics {
    /// Creates a `PipelineMetrics` that does nothing.
    pub const fn disabled() -> Self {
        Self { recorder: None }
    }

    /// Creates a `PipelineMetrics` that records into the given recorder.
    ///
    /// Each metric family is described to the recorder once, here.
    pub fn new(recorder: Arc<dyn Recorder + Send + Sync>) -> Self {
        recorder.describe_counter(
            KeyName::from_const_str(RECEIVED_TOTAL),
            Some(Unit::Count),
            SharedString::const_str("Total number of logs received, by source host."),
        );
        recorder.describe_counter(
            KeyName::from_const_str(FILTER_TOTAL),
            Some(Unit::Count),
            SharedString::const_str("Total number of logs processed by the filter chain, by source host and outcome."),
        );
        recorder.describe_counter(
            KeyName::from_const_str(SINK_TOTAL),
            Some(Unit::Count),
            SharedString::const_str("Total number of logs processed by the sink chain, by source host and outcome."),
        );

        Self {
            recorder: Some(recorder),
        }
    }

    /// Returns `true` if metrics are being recorded.
    pub fn is_enabled(&self) -> bool {
        self.recorder.is_some()
    }

    /// Records that a log was received from the given source host.
    pub fn increment_received(&self, source_host: &str) {
        if let Some(recorder) = &self.recorder {
            let labels = vec![Label::new("source_host", source_host.to_string())];
            increment(recorder.as_ref(), RECEIVED_TOTAL, labels);
        }
    }

    /// Records the outcome of the filter chain for a log from the given source host.
    pub fn increment_filter(&self, source_host: &str, outcome: Outcome) {
        if let Some(recorder) = &self.recorder {
            increment(recorder.as_ref(), FILTER_TOTAL, outcome_labels(source_host, outcome));
        }
    }

    /// Records the outcome of the sink chain for a log from the given source host.
    pub fn increment_sink(&self, source_host: &str, outcome: Outcome) {
        if let Some(recorder) = &self.recorder {
            increment(recorder.as_ref(), SINK_TOTAL, outcome_labels(source_host, outcome));
        }
    }
}

impl fmt::Debug for PipelineMetrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineMetrics")
            .field("enabled", &self.is_enabled())
            .finish()
    }
}

fn outcome_labels(source_host: &str, outcome: Outcome) -> Vec<Label> {
    vec![
        Label::new("source_host", source_host.to_string()),
        Label::from_static_parts("outcome", outcome.as_str()),
    ]
}

fn increment(recorder: &(dyn Recorder + Send + Sync), name: &'static str, labels: Vec<Label>) {
    let key = Key::from_parts(name, labels);
    recorder.register_counter(&key, &METADATA).increment(1);
}
