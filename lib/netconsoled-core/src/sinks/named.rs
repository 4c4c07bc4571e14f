use std::borrow::Cow;

use super::{Close, Sink, SinkError};
use crate::record::Record;

/// Named sink.
///
/// Wraps another sink and replaces its name, forwarding everything else unchanged. This gives composed or configured
/// sinks a name that describes what they are for, rather than how they are built.
pub struct NamedSink<S> {
    name: String,
    inner: S,
}

impl<S> NamedSink<S> {
    /// Creates a new `NamedSink` wrapping `inner` under the given name.
    pub fn new<N: Into<String>>(name: N, inner: S) -> Self {
        Self {
            name: name.into(),
            inner,
        }
    }

    /// Returns a reference to the wrapped sink.
    pub fn inner(&self) -> &S {
        &self.inner
    }
}

impl<S> Sink for NamedSink<S>
where
    S: Sink,
{
    fn name(&self) -> Cow<'_, str> {
        Cow::Borrowed(&self.name)
    }

    fn store(&self, record: &Record) -> Result<(), SinkError> {
        self.inner.store(record)
    }

    fn closer(&self) -> Option<&dyn Close> {
        self.inner.closer()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sinks::{close_sink, NoopSink};

    #[test]
    fn renames_and_forwards() {
        let sink = NamedSink::new("discard", NoopSink);
        assert_eq!(sink.name(), "discard");
        assert_eq!(sink.inner().name(), "noop");
        assert!(sink.closer().is_none());
        assert!(close_sink(&sink).is_ok());
    }
}
