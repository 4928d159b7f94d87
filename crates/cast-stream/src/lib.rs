//! cast-stream: real-time asciicast v2 recording streams
//!
//! This crate records a live terminal session as an asciicast v2 stream
//! (newline-delimited JSON: one header, then `[elapsed, kind, data]` events)
//! and decodes such streams back into typed records for playback or export.
//!
//! # Features
//!
//! - **Boundary-safe events**: output and input are never split inside a
//!   UTF-8 code point or an ANSI escape sequence
//! - **Bounded latency**: bytes that cannot complete are force-flushed after
//!   a configurable delay
//! - **Batched durability**: one durable sync per burst of writes
//! - **Pull decoder**: header, events and end-of-stream, one record at a time
//!
//! # Example
//!
//! ```ignore
//! use cast_stream::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let file = std::fs::File::create("session.cast")?;
//!     let writer = CastWriter::new(file, CastHeader::new(80, 24).with_command("bash"))?;
//!     writer.write_header()?;
//!     writer.write_output("héllo\r\n".as_bytes())?;
//!     writer.write_resize(120, 40)?;
//!     writer.close()?;
//!
//!     let mut reader = CastReader::new(std::fs::File::open("session.cast")?);
//!     while let Some(record) = reader.next() {
//!         println!("{:?}", record?);
//!     }
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod format;
pub mod prelude;
pub mod reader;
pub mod segment;
pub mod sink;
pub mod transcript;
pub mod writer;

pub use config::{EnvConfig, StreamConfig};
pub use error::{CastError, DiagnosticSource, Result, StreamDiagnostic};
pub use format::{CastEvent, CastHeader, CastRecord, EventKind, StreamMessage};
pub use reader::CastReader;
pub use segment::{BoundarySegmenter, safe_boundary};
pub use sink::{CastSink, MemorySink, PlainSink};
pub use transcript::Transcript;
pub use writer::CastWriter;
