//! Byte sinks for cast streams.
//!
//! The writer only needs sequential writes. Pushing bytes to the consumer
//! uses [`Write::flush`]; durable sync and closing the underlying resource
//! are optional capabilities with no-op defaults, so a plain buffer works
//! as well as a file.

use std::fs::File;
use std::io::{self, BufWriter, Cursor, Stdout, Write};
use std::sync::{Arc, Mutex, PoisonError};

/// A byte sink that a [`CastWriter`](crate::CastWriter) can own.
pub trait CastSink: Write + Send {
    /// Durably persist everything written so far.
    ///
    /// Returns `Ok(false)` when the sink has no durable storage to sync.
    fn sync_durable(&mut self) -> io::Result<bool> {
        Ok(false)
    }

    /// Release the underlying resource.
    ///
    /// Called once when the writer closes. The sink is dropped afterwards.
    fn close_sink(&mut self) -> io::Result<()> {
        self.flush()
    }
}

impl CastSink for File {
    fn sync_durable(&mut self) -> io::Result<bool> {
        self.sync_data()?;
        Ok(true)
    }
}

impl CastSink for BufWriter<File> {
    fn sync_durable(&mut self) -> io::Result<bool> {
        self.flush()?;
        self.get_ref().sync_data()?;
        Ok(true)
    }
}

impl CastSink for Vec<u8> {}

impl CastSink for Cursor<Vec<u8>> {}

impl CastSink for Stdout {}

impl<S: CastSink + ?Sized> CastSink for Box<S> {
    fn sync_durable(&mut self) -> io::Result<bool> {
        (**self).sync_durable()
    }

    fn close_sink(&mut self) -> io::Result<()> {
        (**self).close_sink()
    }
}

/// Adapts any [`Write`] into a sink without sync or close capabilities.
#[derive(Debug)]
pub struct PlainSink<W>(pub W);

impl<W: Write> Write for PlainSink<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.0.flush()
    }
}

impl<W: Write + Send> CastSink for PlainSink<W> {}

#[derive(Debug, Default)]
struct MemoryState {
    data: Vec<u8>,
    flushes: usize,
    syncs: usize,
    closed: bool,
}

/// A shared in-memory sink.
///
/// Clones share the same buffer, so one handle can be given to a writer
/// while another reads what was written, e.g. to forward a live stream.
/// Flush, sync and close calls are counted.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    state: Arc<Mutex<MemoryState>>,
}

impl MemorySink {
    /// Create an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Copy of everything written so far.
    #[must_use]
    pub fn contents(&self) -> Vec<u8> {
        self.lock().data.clone()
    }

    /// Everything written so far, lossily decoded.
    #[must_use]
    pub fn contents_string(&self) -> String {
        String::from_utf8_lossy(&self.lock().data).into_owned()
    }

    /// Written lines, without their terminators.
    #[must_use]
    pub fn lines(&self) -> Vec<String> {
        self.contents_string().lines().map(str::to_owned).collect()
    }

    /// Number of `flush` calls.
    #[must_use]
    pub fn flush_count(&self) -> usize {
        self.lock().flushes
    }

    /// Number of durable syncs.
    #[must_use]
    pub fn sync_count(&self) -> usize {
        self.lock().syncs
    }

    /// Whether the sink has been closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }
}

impl Write for MemorySink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut state = self.lock();
        if state.closed {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "sink closed"));
        }
        state.data.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.lock().flushes += 1;
        Ok(())
    }
}

impl CastSink for MemorySink {
    fn sync_durable(&mut self) -> io::Result<bool> {
        self.lock().syncs += 1;
        Ok(true)
    }

    fn close_sink(&mut self) -> io::Result<()> {
        self.lock().closed = true;
        Ok(())
    }
}
