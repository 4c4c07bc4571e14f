use std::borrow::Cow;

use tracing::error;

use super::{Close, Sink, SinkError};
use crate::record::Record;

/// Composite sink.
///
/// Stores each record in zero or more sinks, in order. If any sink fails, the error is returned and the remaining sinks
/// are not invoked. An empty `MultiSink` accepts every record.
///
/// ## Closing
///
/// Closing a `MultiSink` closes every member that exposes the [`Close`] capability. Members are all closed even when
/// an earlier member fails to close: the first error is returned once every member has been attempted, and any later
/// errors are logged.
#[derive(Default)]
pub struct MultiSink {
    sinks: Vec<Box<dyn Sink>>,
}

impl MultiSink {
    /// Creates a new `MultiSink` from the given sinks.
    pub fn new(sinks: Vec<Box<dyn Sink>>) -> Self {
        Self { sinks }
    }

    /// Adds a sink to the end of the chain.
    pub fn with_sink<S>(mut self, sink: S) -> Self
    where
        S: Sink + 'static,
    {
        self.sinks.push(Box::new(sink));
        self
    }

    /// Returns the number of sinks in the chain.
    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    /// Returns `true` if the chain has no sinks.
    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }

    /// Returns the names of the sinks in the chain, in order.
    pub fn stage_names(&self) -> impl Iterator<Item = Cow<'_, str>> + '_ {
        self.sinks.iter().map(|stage| stage.name())
    }
}

impl Sink for MultiSink {
    fn name(&self) -> Cow<'_, str> {
        let names = self.stage_names().collect::<Vec<_>>();
        Cow::Owned(format!("multi[{}]", names.join(", ")))
    }

    fn store(&self, record: &Record) -> Result<(), SinkError> {
        for sink in &self.sinks {
            sink.store(record).map_err(|e| SinkError::Stage {
                stage: sink.name().into_owned(),
                source: Box::new(e),
            })?;
        }

        Ok(())
    }

    fn closer(&self) -> Option<&dyn Close> {
        Some(self)
    }
}

impl Close for MultiSink {
    fn close(&self) -> Result<(), SinkError> {
        let mut first_error = None;

        for sink in &self.sinks {
            let Some(closer) = sink.closer() else {
                continue;
            };

            if let Err(e) = closer.close() {
                let e = SinkError::Stage {
                    stage: sink.name().into_owned(),
                    source: Box::new(e),
                };

                if first_error.is_none() {
                    first_error = Some(e);
                } else {
                    error!(error = %e, "Failed to close sink.");
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
