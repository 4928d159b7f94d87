//! Cast stream decoding.
//!
//! [`CastReader`] pulls one record at a time from any byte source: first
//! the header, then events, then a single [`CastRecord::End`]. The first
//! malformed record ends decoding for good; the reader never skips ahead to
//! look for the next valid line.

use std::io::{BufReader, Read};

use serde_json::Value;
use serde_json::de::{IoRead, StreamDeserializer};

use crate::error::{CastError, Result};
use crate::format::{CastEvent, CastHeader, CastRecord, EventKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Header,
    Events,
    Finished,
}

/// Pull-based decoder for cast streams.
pub struct CastReader<R: Read> {
    values: StreamDeserializer<'static, IoRead<BufReader<R>>, Value>,
    phase: Phase,
    /// Index of the next record; the header is record 0.
    index: usize,
    header: Option<CastHeader>,
}

impl<R: Read> CastReader<R> {
    /// Create a reader over a byte source.
    pub fn new(reader: R) -> Self {
        Self {
            values: serde_json::Deserializer::from_reader(BufReader::new(reader)).into_iter(),
            phase: Phase::Header,
            index: 0,
            header: None,
        }
    }

    /// The header, once it has been decoded.
    #[must_use]
    pub const fn header(&self) -> Option<&CastHeader> {
        self.header.as_ref()
    }

    /// Whether `End` or an error has been returned.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.phase == Phase::Finished
    }

    /// Decode the next record.
    ///
    /// Returns the header first, then one event per call, then
    /// [`CastRecord::End`] once. After `End` or any error, further calls
    /// fail with [`CastError::Finished`].
    pub fn next_record(&mut self) -> Result<CastRecord> {
        if self.phase == Phase::Finished {
            return Err(CastError::Finished);
        }

        let result = self.decode_next();
        match &result {
            Ok(CastRecord::Header(header)) => {
                self.header = Some(header.clone());
                self.phase = Phase::Events;
            }
            Ok(CastRecord::Event(_)) => {}
            Ok(CastRecord::End) | Err(_) => self.phase = Phase::Finished,
        }
        result
    }

    fn decode_next(&mut self) -> Result<CastRecord> {
        let index = self.index;
        let value = match self.values.next() {
            None if self.phase == Phase::Header => {
                return Err(CastError::malformed(index, "stream is empty, expected a header"));
            }
            None => return Ok(CastRecord::End),
            Some(Err(e)) => return Err(decode_error(index, e)),
            Some(Ok(value)) => value,
        };
        self.index += 1;

        match self.phase {
            Phase::Header => parse_header(index, value).map(CastRecord::Header),
            _ => parse_event(index, value).map(CastRecord::Event),
        }
    }
}

impl<R: Read> Iterator for CastReader<R> {
    type Item = Result<CastRecord>;

    /// Yields the header and events; ends at `End` or after the first error.
    fn next(&mut self) -> Option<Self::Item> {
        if self.phase == Phase::Finished {
            return None;
        }
        match self.next_record() {
            Ok(CastRecord::End) => None,
            other => Some(other),
        }
    }
}

impl<R: Read> std::fmt::Debug for CastReader<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CastReader")
            .field("phase", &self.phase)
            .field("index", &self.index)
            .field("header", &self.header)
            .finish()
    }
}

fn decode_error(index: usize, error: serde_json::Error) -> CastError {
    if error.is_io() {
        CastError::Io(error.into())
    } else if error.is_eof() {
        CastError::malformed(index, format!("truncated record: {error}"))
    } else {
        CastError::malformed(index, format!("invalid JSON: {error}"))
    }
}

fn parse_header(index: usize, value: Value) -> Result<CastHeader> {
    serde_json::from_value(value)
        .map_err(|e| CastError::malformed(index, format!("invalid header: {e}")))
}

fn parse_event(index: usize, value: Value) -> Result<CastEvent> {
    let Value::Array(items) = value else {
        return Err(CastError::malformed(index, "expected an event array"));
    };
    let [time, kind, data] = <[Value; 3]>::try_from(items).map_err(|items| {
        CastError::malformed(index, format!("expected 3 elements, found {}", items.len()))
    })?;

    let time = time
        .as_f64()
        .ok_or_else(|| CastError::malformed(index, "elapsed time must be a number"))?;
    let Value::String(kind) = kind else {
        return Err(CastError::malformed(index, "event kind must be a string"));
    };
    let kind = EventKind::from_token(&kind)
        .ok_or_else(|| CastError::malformed(index, format!("unknown event kind {kind:?}")))?;
    let Value::String(data) = data else {
        return Err(CastError::malformed(index, "event data must be a string"));
    };

    Ok(CastEvent { time, kind, data })
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str = r#"{"version":2,"width":80,"height":24}"#;

    fn reader(content: &str) -> CastReader<&[u8]> {
        CastReader::new(content.as_bytes())
    }

    #[test]
    fn decodes_input_event() {
        let content = format!("{HEADER}\n[1.5,\"i\",\"ls\\n\"]\n");
        let mut reader = reader(&content);

        assert!(matches!(reader.next_record().unwrap(), CastRecord::Header(_)));
        let CastRecord::Event(event) = reader.next_record().unwrap() else {
            panic!("expected event");
        };
        assert_eq!(event.kind, EventKind::Input);
        assert!((event.time - 1.5).abs() < f64::EPSILON);
        assert_eq!(event.data, "ls\n");
        assert_eq!(reader.next_record().unwrap(), CastRecord::End);
    }

    #[test]
    fn wrong_arity_is_malformed() {
        let content = format!("{HEADER}\n[1.5,\"i\"]\n");
        let mut reader = reader(&content);
        reader.next_record().unwrap();

        let err = reader.next_record().unwrap_err();
        assert!(err.is_malformed());
        assert!(err.to_string().contains("expected 3 elements, found 2"));
        assert!(matches!(reader.next_record(), Err(CastError::Finished)));
    }

    #[test]
    fn wrong_types_are_malformed() {
        for line in [
            r#"["1.5","o","x"]"#,
            r#"[1.5,7,"x"]"#,
            r#"[1.5,"o",null]"#,
            r#"[1.5,"q","x"]"#,
            r#"{"time":1.5}"#,
        ] {
            let content = format!("{HEADER}\n{line}\n");
            let mut reader = reader(&content);
            reader.next_record().unwrap();
            assert!(reader.next_record().unwrap_err().is_malformed(), "{line}");
        }
    }

    #[test]
    fn integer_times_accepted() {
        let content = format!("{HEADER}\n[2,\"o\",\"x\"]\n");
        let records: Vec<_> = reader(&content).collect::<Result<_>>().unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1], CastRecord::Event(CastEvent::output(2.0, "x")));
    }

    #[test]
    fn invalid_header() {
        let mut reader = reader("[0.1,\"o\",\"x\"]\n");
        let err = reader.next_record().unwrap_err();
        assert!(err.to_string().contains("invalid header"));
    }

    #[test]
    fn header_beyond_u16_range() {
        let mut reader = reader(r#"{"version":3,"width":65536,"height":100000}"#);
        let CastRecord::Header(header) = reader.next_record().unwrap() else {
            panic!("expected header");
        };
        assert_eq!(header.version, 3);
        assert_eq!((header.width, header.height), (65_536, 100_000));
    }

    #[test]
    fn header_missing_width() {
        let mut reader = reader(r#"{"version":2,"height":24}"#);
        assert!(reader.next_record().unwrap_err().is_malformed());
    }

    #[test]
    fn empty_stream() {
        let mut reader = reader("");
        assert!(reader.next_record().unwrap_err().is_malformed());
        assert!(reader.is_finished());
    }

    #[test]
    fn end_only_once() {
        let mut reader = reader(HEADER);
        reader.next_record().unwrap();
        assert_eq!(reader.next_record().unwrap(), CastRecord::End);
        assert!(matches!(reader.next_record(), Err(CastError::Finished)));
    }

    #[test]
    fn truncated_line() {
        let content = format!("{HEADER}\n[0.5,\"o\",\"unfinish");
        let mut reader = reader(&content);
        reader.next_record().unwrap();
        let err = reader.next_record().unwrap_err();
        assert!(err.to_string().contains("truncated record"));
    }

    #[test]
    fn iterator_stops_after_error() {
        let content = format!("{HEADER}\n[0.1,\"o\",\"a\"]\nnot json\n[0.2,\"o\",\"b\"]\n");
        let results: Vec<_> = reader(&content).collect();
        assert_eq!(results.len(), 3);
        assert!(results[2].is_err());
    }

    #[test]
    fn header_remembered() {
        let content = format!("{HEADER}\n");
        let mut reader = reader(&content);
        assert!(reader.header().is_none());
        reader.next_record().unwrap();
        assert_eq!(reader.header().map(|h| h.width), Some(80));
    }
}
