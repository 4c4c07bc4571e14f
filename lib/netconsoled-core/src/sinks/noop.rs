use std::borrow::Cow;

use super::{Sink, SinkError};
use crate::record::Record;

/// No-op sink.
///
/// Discards every record.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopSink;

impl Sink for NoopSink {
    fn name(&self) -> Cow<'_, str> {
        Cow::Borrowed("noop")
    }

    fn store(&self, _: &Record) -> Result<(), SinkError> {
        Ok(())
    }
}
