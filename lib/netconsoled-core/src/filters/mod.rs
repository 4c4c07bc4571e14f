//! Filters.
//!
//! A filter decides whether a record continues down the pipeline, and may replace the record with a transformed one
//! while doing so. Filters are composed with [`MultiFilter`], which runs its members in order and stops at the first
//! one that rejects the record or fails.

use std::borrow::Cow;

use snafu::Snafu;

use crate::record::{AddressError, Record};

mod blocklist;
pub use self::blocklist::BlocklistFilter;

mod func;
pub use self::func::FuncFilter;

mod multi;
pub use self::multi::MultiFilter;

mod noop;
pub use self::noop::NoopFilter;

/// Filter errors.
#[derive(Debug, Snafu)]
#[snafu(context(suffix(false)), visibility(pub))]
pub enum FilterError {
    /// The host of the record's source address could not be determined.
    #[snafu(display("failed to determine source host: {}", source))]
    SourceHost {
        /// Error source.
        source: AddressError,
    },

    /// A filter stage failed while processing a record.
    #[snafu(display("{}", message))]
    Failed {
        /// Error description.
        message: String,
    },

    /// A stage within a composite filter failed.
    #[snafu(display("filter '{}' failed: {}", stage, source))]
    Stage {
        /// Name of the failing stage.
        stage: String,

        /// Error source.
        source: Box<FilterError>,
    },
}

/// Result of a filter processing a record.
#[derive(Debug, PartialEq)]
pub enum FilterOutcome {
    /// The record, possibly transformed, continues to the next stage.
    Continue(Record),

    /// The record was rejected and must not be processed any further.
    Reject,
}

/// A pipeline filter.
pub trait Filter: Send + Sync {
    /// Returns the name of the filter.
    fn name(&self) -> Cow<'_, str>;

    /// Processes a record, deciding whether it continues down the pipeline.
    ///
    /// # Errors
    ///
    /// If the filter fails while processing the record, an error is returned. The record is dropped in that case,
    /// exactly as if it had been rejected, but the failure is reported rather than treated as expected.
    fn process(&self, record: Record) -> Result<FilterOutcome, FilterError>;
}

impl<F> Filter for Box<F>
where
    F: Filter + ?Sized,
{
    fn name(&self) -> Cow<'_, str> {
        (**self).name()
    }

    fn process(&self, record: Record) -> Result<FilterOutcome, FilterError> {
        (**self).process(record)
    }
}
