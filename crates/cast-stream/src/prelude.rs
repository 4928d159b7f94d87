//! Convenience re-exports.
//!
//! ```ignore
//! use cast_stream::prelude::*;
//! ```

pub use crate::config::StreamConfig;
pub use crate::error::{CastError, Result, StreamDiagnostic};
pub use crate::format::{CastEvent, CastHeader, CastRecord, EventKind};
pub use crate::reader::CastReader;
pub use crate::sink::{CastSink, MemorySink, PlainSink};
pub use crate::transcript::Transcript;
pub use crate::writer::CastWriter;
