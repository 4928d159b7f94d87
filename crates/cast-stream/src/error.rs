//! Error types for cast-stream.
//!
//! Writer-side failures ([`CastError::Closed`], [`CastError::Encode`],
//! [`CastError::SinkWrite`]) are returned to the caller of the write that
//! triggered them. Failures in background flush and sync timers have no
//! caller; they are logged and published as [`StreamDiagnostic`]s instead.
//! Reader-side failures ([`CastError::MalformedRecord`], [`CastError::Io`])
//! terminate decoding of the stream.

use std::fmt;

use thiserror::Error;

/// The main error type for cast-stream operations.
#[derive(Debug, Error)]
pub enum CastError {
    /// The writer has been closed; no more records can be written.
    #[error("cast stream is closed")]
    Closed,

    /// The header was already written for this stream.
    #[error("cast header has already been written")]
    HeaderAlreadyWritten,

    /// A header or event could not be serialized.
    #[error("failed to encode {what}: {source}")]
    Encode {
        /// What was being encoded.
        what: &'static str,
        /// The underlying serialization error.
        #[source]
        source: serde_json::Error,
    },

    /// Writing to the sink failed.
    #[error("{context}: {source}")]
    SinkWrite {
        /// What operation was being performed.
        context: &'static str,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A line of the stream could not be decoded.
    #[error("malformed record {index}: {reason}")]
    MalformedRecord {
        /// Zero-based record index (0 is the header).
        index: usize,
        /// What is wrong with the record.
        reason: String,
    },

    /// Invalid header values or stream configuration.
    #[error("invalid configuration: {message}")]
    InvalidConfiguration {
        /// Description of the configuration error.
        message: String,
    },

    /// The reader already returned the end of the stream or an error.
    #[error("cast reader has already finished")]
    Finished,

    /// Reading the byte source failed.
    #[error("I/O error reading cast stream: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for cast-stream operations.
pub type Result<T> = std::result::Result<T, CastError>;

impl CastError {
    /// Create a malformed record error.
    pub fn malformed(index: usize, reason: impl Into<String>) -> Self {
        Self::MalformedRecord {
            index,
            reason: reason.into(),
        }
    }

    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::InvalidConfiguration {
            message: message.into(),
        }
    }

    /// Create a sink write error with context.
    #[must_use]
    pub const fn sink_write(context: &'static str, source: std::io::Error) -> Self {
        Self::SinkWrite { context, source }
    }

    /// Create an encode error.
    #[must_use]
    pub const fn encode(what: &'static str, source: serde_json::Error) -> Self {
        Self::Encode { what, source }
    }

    /// Check if this error means the writer is closed.
    #[must_use]
    pub const fn is_closed(&self) -> bool {
        matches!(self, Self::Closed)
    }

    /// Check if this is a decode error for a bad record.
    #[must_use]
    pub const fn is_malformed(&self) -> bool {
        matches!(self, Self::MalformedRecord { .. })
    }
}

/// Which background operation produced a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticSource {
    /// The bounded-delay flush of held partial bytes.
    Flush,
    /// The batched durable sync.
    Sync,
    /// The forced flush performed by `close`.
    Close,
}

impl fmt::Display for DiagnosticSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Flush => write!(f, "flush"),
            Self::Sync => write!(f, "sync"),
            Self::Close => write!(f, "close"),
        }
    }
}

/// A failure reported from a path with no caller to return it to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamDiagnostic {
    /// Where the failure happened.
    pub source: DiagnosticSource,
    /// Rendered error message.
    pub message: String,
}

impl StreamDiagnostic {
    /// Create a diagnostic from an error.
    pub fn new(source: DiagnosticSource, error: &impl fmt::Display) -> Self {
        Self {
            source,
            message: error.to_string(),
        }
    }
}

impl fmt::Display for StreamDiagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} failed: {}", self.source, self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn closed_display() {
        let err = CastError::Closed;
        assert_eq!(err.to_string(), "cast stream is closed");
        assert!(err.is_closed());
    }

    #[test]
    fn malformed_display() {
        let err = CastError::malformed(3, "expected 3 elements, found 2");
        assert_eq!(
            err.to_string(),
            "malformed record 3: expected 3 elements, found 2"
        );
        assert!(err.is_malformed());
        assert!(!err.is_closed());
    }

    #[test]
    fn io_converts() {
        let io_err = std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "eof");
        let err: CastError = io_err.into();
        assert!(matches!(err, CastError::Io(_)));
    }

    #[test]
    fn diagnostic_display() {
        let io_err = std::io::Error::other("disk full");
        let diag = StreamDiagnostic::new(DiagnosticSource::Sync, &io_err);
        assert_eq!(diag.to_string(), "sync failed: disk full");
    }
}
