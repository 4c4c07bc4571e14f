use std::borrow::Cow;

use super::{Filter, FilterError, FilterOutcome};
use crate::record::Record;

/// Composite filter.
///
/// Runs zero or more filters in order, feeding the output record of each filter into the next one. Evaluation stops at
/// the first filter that rejects the record or fails, and no subsequent filters are invoked. An empty `MultiFilter`
/// passes every record through unchanged.
#[derive(Default)]
pub struct MultiFilter {
    filters: Vec<Box<dyn Filter>>,
}

impl MultiFilter {
    /// Creates a new `MultiFilter` from the given filters.
    pub fn new(filters: Vec<Box<dyn Filter>>) -> Self {
        Self { filters }
    }

    /// Adds a filter to the end of the chain.
    pub fn with_filter<F>(mut self, filter: F) -> Self
    where
        F: Filter + 'static,
    {
        self.filters.push(Box::new(filter));
        self
    }

    /// Returns the number of filters in the chain.
    pub fn len(&self) -> usize {
        self.filters.len()
    }

    /// Returns `true` if the chain has no filters.
    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    /// Returns the names of the filters in the chain, in order.
    pub fn stage_names(&self) -> impl Iterator<Item = Cow<'_, str>> + '_ {
        self.filters.iter().map(|stage| stage.name())
    }
}

impl Filter for MultiFilter {
    fn name(&self) -> Cow<'_, str> {
        let names = self.stage_names().collect::<Vec<_>>();
        Cow::Owned(format!("multi[{}]", names.join(", ")))
    }

    fn process(&self, mut record: Record) -> Result<FilterOutcome, FilterError> {
        for filter in &self.filters {
            match filter.process(record) {
                Ok(FilterOutcome::Continue(next)) => record = next,
                Ok(FilterOutcome::Reject) => return Ok(FilterOutcome::Reject),
                Err(e) => {
                    return Err(FilterError::Stage {
                        stage: filter.name().into_owned(),
                        source: Box::new(e),
                    })
                }
            }
        }

        Ok(FilterOutcome::Continue(record))
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::{Arc, Mutex},
        time::Duration,
    };

    use super::*;
    use crate::{
        filters::{FuncFilter, NoopFilter},
        record::LogEntry,
    };

    fn record(message: &str) -> Record {
        Record::new("192.168.1.1:6666", LogEntry::new(Duration::from_secs(1), message))
    }

    fn panic_filter() -> FuncFilter<impl Fn(Record) -> Result<FilterOutcome, FilterError> + Send + Sync> {
        FuncFilter::new(|_| panic!("reached panic filter"))
    }

    #[test]
    fn empty_chain_is_identity() {
        let filter = MultiFilter::default();
        let outcome = filter.process(record("hello world")).unwrap();
        assert_eq!(outcome, FilterOutcome::Continue(record("hello world")));
    }

    #[test]
    fn reject_short_circuits() {
        let filter = MultiFilter::default()
            .with_filter(NoopFilter)
            .with_filter(FuncFilter::new(|_| Ok(FilterOutcome::Reject)))
            .with_filter(panic_filter());

        let outcome = filter.process(record("hello world")).unwrap();
        assert_eq!(outcome, FilterOutcome::Reject);
    }

    #[test]
    fn error_short_circuits() {
        let filter = MultiFilter::default()
            .with_filter(NoopFilter)
            .with_filter(FuncFilter::new(|_| {
                Err(FilterError::Failed {
                    message: "lookup failed".to_string(),
                })
            }))
            .with_filter(panic_filter());

        let error = filter.process(record("hello world")).unwrap_err();
        assert_eq!(error.to_string(), "filter 'func' failed: lookup failed");
    }

    #[test]
    fn transform_propagates() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen2 = Arc::clone(&seen);

        let filter = MultiFilter::default()
            .with_filter(FuncFilter::new(|mut record: Record| {
                record.entry.message = record.entry.message.to_uppercase();
                Ok(FilterOutcome::Continue(record))
            }))
            .with_filter(FuncFilter::new(move |record: Record| {
                seen2.lock().unwrap().push(record.entry.message.clone());
                Ok(FilterOutcome::Continue(record))
            }));

        let outcome = filter.process(record("hello world")).unwrap();
        assert_eq!(outcome, FilterOutcome::Continue(record("HELLO WORLD")));
        assert_eq!(*seen.lock().unwrap(), vec!["HELLO WORLD".to_string()]);
    }

    #[test]
    fn name_lists_members() {
        let filter = MultiFilter::default().with_filter(NoopFilter).with_filter(NoopFilter);
        assert_eq!(filter.name(), "multi[noop, noop]");
        assert_eq!(MultiFilter::default().name(), "multi[]");
    }
}
