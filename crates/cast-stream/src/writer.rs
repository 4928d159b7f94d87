//! Live cast stream encoding.
//!
//! [`CastWriter`] turns terminal output, input, resize and marker
//! notifications into cast lines on a [`CastSink`]. Output and input are cut
//! at safe boundaries by a [`BoundarySegmenter`] so that no event ends in the
//! middle of a code point or escape sequence.
//!
//! Two background timers run on the Tokio runtime captured at construction:
//!
//! - the flush timer force-emits held bytes [`StreamConfig::flush_delay`]
//!   after they were first held, however many writes arrive meanwhile;
//! - the debounced sync timer issues one durable sync for every batch of
//!   writes within [`StreamConfig::sync_delay`].
//!
//! Held bytes beyond [`StreamConfig::max_held_bytes`] are emitted by the
//! write itself.
//!
//! All mutable state, including the sink, lives behind a single mutex that
//! both the caller's writes and the timer callbacks take.

use std::io::Write;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use tokio::runtime::Handle;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::config::StreamConfig;
use crate::error::{CastError, DiagnosticSource, Result, StreamDiagnostic};
use crate::format::{CastHeader, EventKind, encode_event_line, resize_token};
use crate::segment::BoundarySegmenter;
use crate::sink::CastSink;

/// Kinds whose payloads pass through a segmenter, in flush order.
const SEGMENTED_KINDS: [EventKind; 2] = [EventKind::Output, EventKind::Input];

/// Initial held-byte capacity; most partial sequences are a few bytes.
const INITIAL_HELD_CAPACITY: usize = 64;

/// Mutable session state, guarded by [`Shared::state`].
struct WriterState<W> {
    /// `None` once the writer is closed.
    sink: Option<W>,
    header: CastHeader,
    header_written: bool,
    closed: bool,
    output: BoundarySegmenter,
    input: BoundarySegmenter,
    last_write: Instant,
    events_written: u64,
    flush_timer: Option<JoinHandle<()>>,
    flush_generation: u64,
    sync_timer: Option<JoinHandle<()>>,
    sync_generation: u64,
    needs_sync: bool,
}

impl<W> WriterState<W> {
    fn segmenter_mut(&mut self, kind: EventKind) -> &mut BoundarySegmenter {
        match kind {
            EventKind::Input => &mut self.input,
            _ => &mut self.output,
        }
    }

    fn is_holding(&self) -> bool {
        self.output.is_holding() || self.input.is_holding()
    }

    fn cancel_flush(&mut self) {
        if let Some(timer) = self.flush_timer.take() {
            timer.abort();
        }
    }

    fn cancel_timers(&mut self) {
        self.cancel_flush();
        if let Some(timer) = self.sync_timer.take() {
            timer.abort();
        }
    }
}

/// State shared between the writer handle and its timer tasks.
struct Shared<W> {
    state: Mutex<WriterState<W>>,
    start: Instant,
    started_at: SystemTime,
    config: StreamConfig,
    runtime: Handle,
    diagnostics: broadcast::Sender<StreamDiagnostic>,
}

impl<W: CastSink + 'static> Shared<W> {
    fn lock(&self) -> MutexGuard<'_, WriterState<W>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Write one event line at the current elapsed time and flush the sink.
    fn emit(&self, state: &mut WriterState<W>, kind: EventKind, data: &[u8]) -> Result<()> {
        let elapsed = self.start.elapsed().as_secs_f64();
        let text = String::from_utf8_lossy(data);
        let mut line = encode_event_line(elapsed, kind, &text)?;
        line.push('\n');

        let sink = state.sink.as_mut().ok_or(CastError::Closed)?;
        sink.write_all(line.as_bytes())
            .map_err(|e| CastError::sink_write("writing cast event", e))?;
        sink.flush()
            .map_err(|e| CastError::sink_write("flushing cast sink", e))?;

        state.events_written += 1;
        tracing::trace!(kind = %kind, bytes = data.len(), elapsed, "cast event written");
        Ok(())
    }

    /// Publish a failure that has no caller to return to.
    fn report(&self, source: DiagnosticSource, error: &impl std::fmt::Display) {
        tracing::warn!(source = %source, error = %error, "cast stream background operation failed");
        // No subscribers is fine.
        let _ = self.diagnostics.send(StreamDiagnostic::new(source, error));
    }

    /// Arm the flush timer, replacing any pending one.
    fn schedule_flush(self: &Arc<Self>, state: &mut WriterState<W>) {
        state.cancel_flush();
        state.flush_generation += 1;
        let generation = state.flush_generation;
        let delay = self.config.flush_delay;
        let shared = Arc::clone(self);
        state.flush_timer = Some(self.runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            shared.fire_flush(generation);
        }));
    }

    /// Mark a sync as needed and arm the sync timer, replacing any pending one.
    fn schedule_sync(self: &Arc<Self>, state: &mut WriterState<W>) {
        state.needs_sync = true;
        if let Some(timer) = state.sync_timer.take() {
            timer.abort();
        }
        state.sync_generation += 1;
        let generation = state.sync_generation;
        let delay = self.config.sync_delay;
        let shared = Arc::clone(self);
        state.sync_timer = Some(self.runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            shared.fire_sync(generation);
        }));
    }

    fn fire_flush(self: &Arc<Self>, generation: u64) {
        let mut state = self.lock();
        // A superseded timer may still wake if it was already waiting on the lock.
        if state.closed || state.flush_generation != generation {
            return;
        }
        state.flush_timer = None;

        let mut emitted = false;
        for kind in SEGMENTED_KINDS {
            let pending = state.segmenter_mut(kind).force_flush();
            if pending.is_empty() {
                continue;
            }
            tracing::debug!(kind = %kind, bytes = pending.len(), "force-flushing held bytes");
            match self.emit(&mut state, kind, &pending) {
                Ok(()) => emitted = true,
                Err(e) => self.report(DiagnosticSource::Flush, &e),
            }
        }

        if emitted {
            self.schedule_sync(&mut state);
        }
    }

    fn fire_sync(&self, generation: u64) {
        let mut state = self.lock();
        if state.closed || state.sync_generation != generation {
            return;
        }
        state.sync_timer = None;
        if !state.needs_sync {
            return;
        }
        state.needs_sync = false;

        if let Some(sink) = state.sink.as_mut() {
            match sink.sync_durable() {
                Ok(synced) => tracing::trace!(synced, "batched sync"),
                Err(e) => self.report(DiagnosticSource::Sync, &e),
            }
        }
    }
}

/// Encodes a live terminal session as an asciicast v2 stream.
///
/// The writer owns its sink until [`close`](Self::close), which force-flushes
/// anything still held back and releases the sink. Every write after close
/// fails with [`CastError::Closed`]. Dropping an open writer closes it.
///
/// Methods take `&self`, so a writer can be shared (e.g. behind an [`Arc`])
/// between the task reading PTY output and the one forwarding input.
///
/// # Example
///
/// ```ignore
/// use cast_stream::{CastHeader, CastWriter, MemorySink};
///
/// # async fn demo() -> cast_stream::Result<()> {
/// let sink = MemorySink::new();
/// let writer = CastWriter::new(sink.clone(), CastHeader::new(80, 24))?;
/// writer.write_header()?;
/// writer.write_output(b"hello")?;
/// writer.write_resize(100, 40)?;
/// writer.close()?;
/// assert_eq!(sink.lines().len(), 3);
/// # Ok(())
/// # }
/// ```
pub struct CastWriter<W: CastSink + 'static> {
    shared: Arc<Shared<W>>,
}

impl<W: CastSink + 'static> CastWriter<W> {
    /// Create a writer with the default configuration.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(sink: W, header: CastHeader) -> Result<Self> {
        Self::with_config(sink, header, StreamConfig::default())
    }

    /// Create a writer with a custom configuration.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn with_config(sink: W, header: CastHeader, config: StreamConfig) -> Result<Self> {
        let runtime = Handle::try_current().map_err(|e| {
            CastError::config(format!("no Tokio runtime available for stream timers: {e}"))
        })?;
        Self::with_runtime(sink, header, config, runtime)
    }

    /// Create a writer whose timers run on `runtime`.
    pub fn with_runtime(
        sink: W,
        header: CastHeader,
        config: StreamConfig,
        runtime: Handle,
    ) -> Result<Self> {
        header.validate()?;
        config.validate()?;

        let (diagnostics, _) = broadcast::channel(config.diagnostics_capacity);
        let start = Instant::now();
        let state = WriterState {
            sink: Some(sink),
            header,
            header_written: false,
            closed: false,
            output: BoundarySegmenter::with_capacity(INITIAL_HELD_CAPACITY),
            input: BoundarySegmenter::with_capacity(INITIAL_HELD_CAPACITY),
            last_write: start,
            events_written: 0,
            flush_timer: None,
            flush_generation: 0,
            sync_timer: None,
            sync_generation: 0,
            needs_sync: false,
        };

        Ok(Self {
            shared: Arc::new(Shared {
                state: Mutex::new(state),
                start,
                started_at: SystemTime::now(),
                config,
                runtime,
                diagnostics,
            }),
        })
    }

    /// Write the header line.
    ///
    /// Fills in the timestamp from the writer's start time if it is unset.
    /// Call once, before any event.
    pub fn write_header(&self) -> Result<()> {
        let mut state = self.shared.lock();
        if state.closed {
            return Err(CastError::Closed);
        }
        if state.header_written {
            return Err(CastError::HeaderAlreadyWritten);
        }

        if state.header.timestamp.is_none() {
            let secs = self
                .shared
                .started_at
                .duration_since(UNIX_EPOCH)
                .map_or(0, |d| d.as_secs());
            state.header.timestamp = Some(secs);
        }

        let mut line = state.header.to_json()?;
        line.push('\n');
        let sink = state.sink.as_mut().ok_or(CastError::Closed)?;
        sink.write_all(line.as_bytes())
            .map_err(|e| CastError::sink_write("writing cast header", e))?;
        sink.flush()
            .map_err(|e| CastError::sink_write("flushing cast sink", e))?;

        state.header_written = true;
        tracing::debug!(
            width = state.header.width,
            height = state.header.height,
            "cast header written"
        );
        self.shared.schedule_sync(&mut state);
        Ok(())
    }

    /// Record terminal output.
    pub fn write_output(&self, data: &[u8]) -> Result<()> {
        self.write_segmented(EventKind::Output, data)
    }

    /// Record input sent to the terminal.
    pub fn write_input(&self, data: &[u8]) -> Result<()> {
        self.write_segmented(EventKind::Input, data)
    }

    /// Record a terminal resize.
    pub fn write_resize(&self, cols: u16, rows: u16) -> Result<()> {
        self.write_immediate(EventKind::Resize, &resize_token(cols, rows))
    }

    /// Record a marker.
    pub fn write_marker(&self, label: &str) -> Result<()> {
        self.write_immediate(EventKind::Marker, label)
    }

    fn write_segmented(&self, kind: EventKind, data: &[u8]) -> Result<()> {
        let mut state = self.shared.lock();
        if state.closed {
            return Err(CastError::Closed);
        }
        state.last_write = Instant::now();

        let limit = self.shared.config.max_held_bytes;
        let segmenter = state.segmenter_mut(kind);
        let mut safe = segmenter.segment(data);
        if segmenter.held_len() > limit {
            let held = segmenter.force_flush();
            tracing::debug!(kind = %kind, bytes = held.len(), limit, "held bytes over limit");
            safe = [&safe[..], &held[..]].concat().into();
        }

        if !safe.is_empty() {
            self.shared.emit(&mut state, kind, &safe)?;
            self.shared.schedule_sync(&mut state);
        }

        // The deadline runs from when bytes were first held; later writes
        // must not push it back.
        if !state.is_holding() {
            state.cancel_flush();
        } else if state.flush_timer.is_none() {
            self.shared.schedule_flush(&mut state);
        }
        Ok(())
    }

    fn write_immediate(&self, kind: EventKind, data: &str) -> Result<()> {
        let mut state = self.shared.lock();
        if state.closed {
            return Err(CastError::Closed);
        }
        state.last_write = Instant::now();

        self.shared.emit(&mut state, kind, data.as_bytes())?;
        self.shared.schedule_sync(&mut state);
        Ok(())
    }

    /// Close the stream and release the sink.
    ///
    /// Pending timers are cancelled, held bytes are emitted as-is, and a
    /// pending sync is performed if [`StreamConfig::sync_on_close`] is set.
    /// Failures of that trailing flush or sync are reported as diagnostics;
    /// only a failure to close the sink itself is returned. Calling this
    /// again is a no-op.
    pub fn close(&self) -> Result<()> {
        let mut state = self.shared.lock();
        if state.closed {
            return Ok(());
        }
        state.cancel_timers();

        for kind in SEGMENTED_KINDS {
            let pending = state.segmenter_mut(kind).force_flush();
            if pending.is_empty() {
                continue;
            }
            match self.shared.emit(&mut state, kind, &pending) {
                Ok(()) => state.needs_sync = true,
                Err(e) => self.shared.report(DiagnosticSource::Close, &e),
            }
        }

        state.closed = true;
        let needs_sync = std::mem::take(&mut state.needs_sync);
        let events = state.events_written;
        let Some(mut sink) = state.sink.take() else {
            return Ok(());
        };
        drop(state);

        if needs_sync && self.shared.config.sync_on_close {
            if let Err(e) = sink.sync_durable() {
                self.shared.report(DiagnosticSource::Close, &e);
            }
        }

        tracing::debug!(events, "cast stream closed");
        sink.close_sink()
            .map_err(|e| CastError::sink_write("closing cast sink", e))
    }

    /// Subscribe to failures from the flush, sync and close paths.
    #[must_use]
    pub fn subscribe_diagnostics(&self) -> broadcast::Receiver<StreamDiagnostic> {
        self.shared.diagnostics.subscribe()
    }

    /// Time since the writer was created.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.shared.start.elapsed()
    }

    /// Whether [`close`](Self::close) has run.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.shared.lock().closed
    }

    /// Number of event lines written so far.
    #[must_use]
    pub fn events_written(&self) -> u64 {
        self.shared.lock().events_written
    }

    /// Bytes currently held back waiting for a safe boundary.
    #[must_use]
    pub fn held_len(&self) -> usize {
        let state = self.shared.lock();
        state.output.held_len() + state.input.held_len()
    }

    /// When the last write call was made.
    #[must_use]
    pub fn last_activity(&self) -> Instant {
        self.shared.lock().last_write
    }

    /// The header, including the timestamp once it has been written.
    #[must_use]
    pub fn header(&self) -> CastHeader {
        self.shared.lock().header.clone()
    }

    /// The writer's configuration.
    #[must_use]
    pub fn config(&self) -> &StreamConfig {
        &self.shared.config
    }
}

impl<W: CastSink + 'static> Drop for CastWriter<W> {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            tracing::warn!(error = %e, "failed to close cast stream on drop");
        }
    }
}

impl<W: CastSink + 'static> std::fmt::Debug for CastWriter<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.shared.lock();
        f.debug_struct("CastWriter")
            .field("closed", &state.closed)
            .field("header_written", &state.header_written)
            .field("events_written", &state.events_written)
            .field("config", &self.shared.config)
            .finish()
    }
}
