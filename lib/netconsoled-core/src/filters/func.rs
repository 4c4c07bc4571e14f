use std::borrow::Cow;

use super::{Filter, FilterError, FilterOutcome};
use crate::record::Record;

/// Function filter.
///
/// Adapts a closure into a [`Filter`], which is handy for simple inline rules and for tests.
pub struct FuncFilter<F> {
    func: F,
}

impl<F> FuncFilter<F>
where
    F: Fn(Record) -> Result<FilterOutcome, FilterError> + Send + Sync,
{
    /// Creates a new `FuncFilter` from the given closure.
    pub fn new(func: F) -> Self {
        Self { func }
    }
}

impl<F> Filter for FuncFilter<F>
where
    F: Fn(Record) -> Result<FilterOutcome, FilterError> + Send + Sync,
{
    fn name(&self) -> Cow<'_, str> {
        Cow::Borrowed("func")
    }

    fn process(&self, record: Record) -> Result<FilterOutcome, FilterError> {
        (self.func)(record)
    }
}
