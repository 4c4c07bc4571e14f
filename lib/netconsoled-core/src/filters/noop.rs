use std::borrow::Cow;

use super::{Filter, FilterError, FilterOutcome};
use crate::record::Record;

/// No-op filter.
///
/// Passes every record through unchanged.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopFilter;

impl Filter for NoopFilter {
    fn name(&self) -> Cow<'_, str> {
        Cow::Borrowed("noop")
    }

    fn process(&self, record: Record) -> Result<FilterOutcome, FilterError> {
        Ok(FilterOutcome::Continue(record))
    }
}
