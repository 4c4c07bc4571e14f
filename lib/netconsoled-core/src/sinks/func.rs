use std::borrow::Cow;

use super::{Sink, SinkError};
use crate::record::Record;

/// Function sink.
///
/// Adapts a closure into a [`Sink`].
pub struct FuncSink<F> {
    func: F,
}

impl<F> FuncSink<F>
where
    F: Fn(&Record) -> Result<(), SinkError> + Send + Sync,
{
    /// Creates a new `FuncSink` from the given closure.
    pub fn new(func: F) -> Self {
        Self { func }
    }
}

impl<F> Sink for FuncSink<F>
where
    F: Fn(&Record) -> Result<(), SinkError> + Send + Sync,
{
    fn name(&self) -> Cow<'_, str> {
        Cow::Borrowed("func")
    }

    fn store(&self, record: &Record) -> Result<(), SinkError> {
        (self.func)(record)
    }
}
