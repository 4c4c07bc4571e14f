use std::{
    borrow::Cow,
    fmt::Write as _,
    fs::{File, OpenOptions},
    io::{self, Stdout, Write},
    path::Path,
    sync::{Mutex, MutexGuard, PoisonError},
};

use snafu::{OptionExt as _, ResultExt as _};
use tracing::debug;

use super::{Close, Closed, NamedSink, Open, Release, Sink, SinkBuildError, SinkError};
use crate::record::Record;

/// A writer-backed sink over standard output.
pub type StdoutSink = NamedSink<WriterSink<Stdout>>;

/// A writer-backed sink over an append-only file.
pub type FileSink = NamedSink<WriterSink<File>>;

/// A byte sink that a [`WriterSink`] can write records to.
///
/// Beyond plain writes, a writer may be able to flush its contents to durable storage, and may own a resource that
/// has to be released explicitly. Both default to flushing any buffered data.
pub trait SinkWriter: Write + Send {
    /// Flushes written data to durable storage.
    ///
    /// # Errors
    ///
    /// If the data could not be flushed, an error is returned. Callers treat this as best-effort, since some
    /// destinations, such as terminals, cannot be synced at all.
    fn sync(&mut self) -> io::Result<()> {
        self.flush()
    }

    /// Releases the writer, returning any error that occurs while doing so.
    ///
    /// # Errors
    ///
    /// If the writer could not be released cleanly, an error is returned.
    fn release(mut self) -> io::Result<()>
    where
        Self: Sized,
    {
        self.flush()
    }
}

impl SinkWriter for File {
    fn sync(&mut self) -> io::Result<()> {
        self.sync_all()
    }
}

impl SinkWriter for Stdout {}

impl SinkWriter for Vec<u8> {}

/// Writer sink.
///
/// Formats each record as a single line and writes it to the underlying [`SinkWriter`]:
///
/// ```text
/// [<source address>] [<elapsed seconds>] <message>
/// ```
///
/// Writes are serialized internally, so a `WriterSink` can be shared between threads. Once closed, the writer is
/// released and all subsequent stores fail.
pub struct WriterSink<W> {
    writer: Mutex<Option<W>>,
}

impl<W> WriterSink<W>
where
    W: SinkWriter,
{
    /// Creates a new `WriterSink` that writes to `writer`.
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(Some(writer)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Option<W>> {
        // A panic while holding the lock can't leave a partially-written record behind that we'd care about, so we
        // carry on with whatever state the writer is in.
        self.writer.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<W> Sink for WriterSink<W>
where
    W: SinkWriter,
{
    fn name(&self) -> Cow<'_, str> {
        Cow::Borrowed("writer")
    }

    fn store(&self, record: &Record) -> Result<(), SinkError> {
        // Format the full line up front so that it reaches the writer in a single call.
        let mut line = String::with_capacity(record.entry.message.len() + 48);
        let _ = writeln!(
            line,
            "[{:>15}] [{:>15.6}] {}",
            record.source,
            record.entry.elapsed.as_secs_f64(),
            record.entry.message
        );

        let mut writer = self.lock();
        let writer = writer.as_mut().context(Closed)?;
        writer.write_all(line.as_bytes()).context(super::Write)
    }

    fn closer(&self) -> Option<&dyn Close> {
        Some(self)
    }
}

impl<W> Close for WriterSink<W>
where
    W: SinkWriter,
{
    fn close(&self) -> Result<(), SinkError> {
        let mut writer = self.lock().take().context(Closed)?;

        // Syncing is best-effort: stdout on Linux, for example, reports "invalid argument" when synced.
        if let Err(e) = writer.sync() {
            debug!(error = %e, "Failed to sync writer. Ignoring.");
        }

        writer.release().context(Release)
    }
}

/// Creates a sink that writes records to standard output.
pub fn stdout() -> StdoutSink {
    NamedSink::new("stdout", WriterSink::new(io::stdout()))
}

/// Creates a sink that appends records to the file at `path`, creating the file if it does not exist.
///
/// Existing contents of the file are never truncated.
///
/// # Errors
///
/// If the file cannot be opened or created, an error is returned.
pub fn open_file<P>(path: P) -> Result<FileSink, SinkBuildError>
where
    P: AsRef<Path>,
{
    let path = path.as_ref();
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .context(Open { path })?;

    Ok(NamedSink::new(format!("file: {:?}", path), WriterSink::new(file)))
}
