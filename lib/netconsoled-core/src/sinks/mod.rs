//! Sinks.
//!
//! A sink durably stores records that made it through the filter chain. Sinks are composed with [`MultiSink`], which
//! stores each record in every member in order and stops at the first failure.
//!
//! Some sinks own resources, such as open files, that need to be flushed and released before the process exits. These
//! sinks expose the [`Close`] capability through [`Sink::closer`], and composite sinks forward it to their members.

use std::{borrow::Cow, io, path::PathBuf, sync::Arc};

use snafu::Snafu;

use crate::record::Record;

mod func;
pub use self::func::FuncSink;

mod multi;
pub use self::multi::MultiSink;

mod named;
pub use self::named::NamedSink;

mod noop;
pub use self::noop::NoopSink;

mod writer;
pub use self::writer::{open_file, stdout, FileSink, SinkWriter, StdoutSink, WriterSink};

/// Sink errors.
///
/// These are raised by sinks that were built successfully but then failed to store a record, or failed to shut down.
#[derive(Debug, Snafu)]
#[snafu(context(suffix(false)), visibility(pub))]
pub enum SinkError {
    /// Writing a record to the underlying writer failed.
    #[snafu(display("failed to write log: {}", source))]
    Write {
        /// Error source.
        source: io::Error,
    },

    /// Releasing the underlying writer failed.
    #[snafu(display("failed to release writer: {}", source))]
    Release {
        /// Error source.
        source: io::Error,
    },

    /// The sink has already been closed.
    #[snafu(display("sink is closed"))]
    Closed,

    /// A sink stage failed to store a record.
    #[snafu(display("{}", message))]
    Failed {
        /// Error description.
        message: String,
    },

    /// A stage within a composite sink failed.
    #[snafu(display("sink '{}' failed: {}", stage, source))]
    Stage {
        /// Name of the failing stage.
        stage: String,

        /// Error source.
        source: Box<SinkError>,
    },
}

/// Sink construction errors.
///
/// These are raised when a sink cannot be built at all, and are distinct from [`SinkError`], which covers failures of
/// a sink that was built successfully.
#[derive(Debug, Snafu)]
#[snafu(context(suffix(false)), visibility(pub))]
pub enum SinkBuildError {
    /// The sink's target file could not be opened or created.
    #[snafu(display("failed to open '{}': {}", path.display(), source))]
    Open {
        /// Path of the file.
        path: PathBuf,

        /// Error source.
        source: io::Error,
    },
}

/// A pipeline sink.
pub trait Sink: Send + Sync {
    /// Returns the name of the sink.
    fn name(&self) -> Cow<'_, str>;

    /// Stores a record.
    ///
    /// # Errors
    ///
    /// If the record could not be stored, an error is returned.
    fn store(&self, record: &Record) -> Result<(), SinkError>;

    /// Returns the [`Close`] capability of this sink, if it has one.
    ///
    /// Sinks that own no resources needing an orderly shutdown keep the default, which returns `None`.
    fn closer(&self) -> Option<&dyn Close> {
        None
    }
}

/// Orderly shutdown of a sink.
pub trait Close {
    /// Flushes any buffered data and releases the resources held by the sink.
    ///
    /// Must not be called while any other thread may still call [`Sink::store`] on the same sink.
    ///
    /// # Errors
    ///
    /// If the sink could not be flushed or released cleanly, an error is returned.
    fn close(&self) -> Result<(), SinkError>;
}

/// Closes the given sink if it exposes the [`Close`] capability.
///
/// # Errors
///
/// If the sink fails to close, an error is returned.
pub fn close_sink<S>(sink: &S) -> Result<(), SinkError>
where
    S: Sink + ?Sized,
{
    match sink.closer() {
        Some(closer) => closer.close(),
        None => Ok(()),
    }
}

impl<S> Sink for Box<S>
where
    S: Sink + ?Sized,
{
    fn name(&self) -> Cow<'_, str> {
        (**self).name()
    }

    fn store(&self, record: &Record) -> Result<(), SinkError> {
        (**self).store(record)
    }

    fn closer(&self) -> Option<&dyn Close> {
        (**self).closer()
    }
}

impl<S> Sink for Arc<S>
where
    S: Sink + ?Sized,
{
    fn name(&self) -> Cow<'_, str> {
        (**self).name()
    }

    fn store(&self, record: &Record) -> Result<(), SinkError> {
        (**self).store(record)
    }

    fn closer(&self) -> Option<&dyn Close> {
        (**self).closer()
    }
}
