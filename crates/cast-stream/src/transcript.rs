//! In-memory transcripts for export tooling.

use std::io::{Read, Write};
use std::time::Duration;

use crate::error::{CastError, Result};
use crate::format::{CastEvent, CastHeader, CastRecord, EventKind};
use crate::reader::CastReader;

/// A fully decoded cast stream.
#[derive(Debug, Clone, PartialEq)]
pub struct Transcript {
    /// Header.
    pub header: CastHeader,
    /// Events in stream order.
    pub events: Vec<CastEvent>,
}

impl Transcript {
    /// Create an empty transcript.
    #[must_use]
    pub const fn new(header: CastHeader) -> Self {
        Self {
            header,
            events: Vec::new(),
        }
    }

    /// Add an event.
    pub fn push(&mut self, event: CastEvent) {
        self.events.push(event);
    }

    /// Decode a whole cast stream.
    pub fn read_from<R: Read>(reader: R) -> Result<Self> {
        let mut reader = CastReader::new(reader);
        let header = match reader.next_record()? {
            CastRecord::Header(header) => header,
            _ => return Err(CastError::malformed(0, "expected a header")),
        };

        let mut transcript = Self::new(header);
        loop {
            match reader.next_record()? {
                CastRecord::Event(event) => transcript.push(event),
                CastRecord::End => break,
                CastRecord::Header(_) => {
                    return Err(CastError::malformed(transcript.events.len() + 1, "unexpected header"));
                }
            }
        }
        Ok(transcript)
    }

    /// Encode as a cast stream, keeping each event's recorded time.
    pub fn write_to<W: Write>(&self, writer: &mut W) -> Result<()> {
        writeln!(writer, "{}", self.header.to_json()?)
            .map_err(|e| CastError::sink_write("writing cast header", e))?;
        for event in &self.events {
            writeln!(writer, "{}", event.to_json()?)
                .map_err(|e| CastError::sink_write("writing cast event", e))?;
        }
        writer
            .flush()
            .map_err(|e| CastError::sink_write("flushing cast sink", e))
    }

    /// Time of the last event.
    #[must_use]
    pub fn duration(&self) -> Duration {
        self.events.last().map_or(Duration::ZERO, CastEvent::elapsed)
    }

    /// All output concatenated.
    #[must_use]
    pub fn output_text(&self) -> String {
        self.concat(EventKind::Output)
    }

    /// All input concatenated.
    #[must_use]
    pub fn input_text(&self) -> String {
        self.concat(EventKind::Input)
    }

    /// Events of one kind.
    #[must_use]
    pub fn filter(&self, kind: EventKind) -> Vec<&CastEvent> {
        self.events.iter().filter(|e| e.kind == kind).collect()
    }

    fn concat(&self, kind: EventKind) -> String {
        self.events
            .iter()
            .filter(|e| e.kind == kind)
            .map(|e| e.data.as_str())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Transcript {
        let mut transcript = Transcript::new(CastHeader::new(80, 24).with_title("Demo"));
        transcript.push(CastEvent::output(0.1, "$ "));
        transcript.push(CastEvent::input(0.2, "ls\n"));
        transcript.push(CastEvent::output(0.3, "file1.txt\nfile2.txt\n"));
        transcript.push(CastEvent::resize(0.4, 120, 40));
        transcript.push(CastEvent::marker(0.5, "done"));
        transcript
    }

    #[test]
    fn text_accessors() {
        let transcript = sample();
        assert_eq!(transcript.output_text(), "$ file1.txt\nfile2.txt\n");
        assert_eq!(transcript.input_text(), "ls\n");
        assert_eq!(transcript.filter(EventKind::Resize).len(), 1);
        assert_eq!(transcript.duration(), Duration::from_millis(500));
    }

    #[test]
    fn roundtrip() {
        let transcript = sample();
        let mut buf = Vec::new();
        transcript.write_to(&mut buf).unwrap();

        let parsed = Transcript::read_from(buf.as_slice()).unwrap();
        assert_eq!(parsed, transcript);
    }

    #[test]
    fn empty_duration() {
        let transcript = Transcript::new(CastHeader::default());
        assert_eq!(transcript.duration(), Duration::ZERO);
    }

    #[test]
    fn malformed_event_propagates() {
        let content = "{\"version\":2,\"width\":80,\"height\":24}\n[0.1,\"o\"]\n";
        let err = Transcript::read_from(content.as_bytes()).unwrap_err();
        assert!(err.is_malformed());
    }
}
