//! Event boundary detection.
//!
//! Terminal output arrives in arbitrary chunks. A chunk may end halfway
//! through a multi-byte UTF-8 code point or an ANSI escape sequence, and
//! every event in a cast stream must be renderable on its own. The
//! [`BoundarySegmenter`] holds back the incomplete tail of each chunk until
//! the rest of it arrives, or until a forced flush gives up on it.
//!
//! Only sequence boundaries are detected here. Nothing is interpreted.

use bytes::{Bytes, BytesMut};

const ESC: u8 = 0x1b;
const BEL: u8 = 0x07;
const CAN: u8 = 0x18;
const SUB: u8 = 0x1a;

/// Scanner state while walking a buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScanState {
    /// Plain text.
    Ground,
    /// Just saw ESC.
    Escape,
    /// ESC followed by intermediate bytes, e.g. `ESC ( B`.
    EscapeIntermediate,
    /// Control sequence (`ESC [`).
    Csi,
    /// Operating system command (`ESC ]`).
    Osc,
    /// ESC seen inside an OSC; `\` would end it.
    OscEscape,
    /// DCS, SOS, PM or APC string.
    Str,
    /// ESC seen inside a string; `\` would end it.
    StrEscape,
}

/// Decide the state after the byte following an ESC at `i - 1`.
///
/// `start` is updated when `byte` is itself an ESC that opens a new sequence.
const fn dispatch_escape(byte: u8, i: usize, start: &mut usize) -> ScanState {
    match byte {
        b'[' => ScanState::Csi,
        b']' => ScanState::Osc,
        b'P' | b'X' | b'^' | b'_' => ScanState::Str,
        ESC => {
            *start = i;
            ScanState::Escape
        }
        0x20..=0x2f => ScanState::EscapeIntermediate,
        _ => ScanState::Ground,
    }
}

/// Find the start of an escape sequence still open at the end of `buf`.
///
/// Returns `None` if every escape sequence in `buf` has been terminated
/// (or cancelled with CAN/SUB).
#[must_use]
pub fn open_escape_start(buf: &[u8]) -> Option<usize> {
    let mut state = ScanState::Ground;
    let mut start = 0;

    for (i, &byte) in buf.iter().enumerate() {
        state = match state {
            ScanState::Ground => {
                if byte == ESC {
                    start = i;
                    ScanState::Escape
                } else {
                    ScanState::Ground
                }
            }
            ScanState::Escape => match byte {
                CAN | SUB => ScanState::Ground,
                _ => dispatch_escape(byte, i, &mut start),
            },
            ScanState::EscapeIntermediate => match byte {
                ESC => {
                    start = i;
                    ScanState::Escape
                }
                CAN | SUB | 0x30..=0x7e => ScanState::Ground,
                _ => ScanState::EscapeIntermediate,
            },
            ScanState::Csi => match byte {
                ESC => {
                    start = i;
                    ScanState::Escape
                }
                CAN | SUB | 0x40..=0x7e => ScanState::Ground,
                _ => ScanState::Csi,
            },
            ScanState::Osc => match byte {
                BEL | CAN | SUB => ScanState::Ground,
                ESC => ScanState::OscEscape,
                _ => ScanState::Osc,
            },
            ScanState::Str => match byte {
                CAN | SUB => ScanState::Ground,
                ESC => ScanState::StrEscape,
                _ => ScanState::Str,
            },
            ScanState::OscEscape | ScanState::StrEscape => {
                if byte == b'\\' {
                    ScanState::Ground
                } else {
                    // The ESC aborted the string and opened a new sequence.
                    start = i - 1;
                    match byte {
                        CAN | SUB => ScanState::Ground,
                        _ => dispatch_escape(byte, i, &mut start),
                    }
                }
            }
        };
    }

    (state != ScanState::Ground).then_some(start)
}

/// Find the start of a UTF-8 code point cut off at the end of `buf`.
///
/// Only the trailing four bytes are examined. Malformed lead bytes are
/// treated as single bytes and never held back.
#[must_use]
pub fn incomplete_utf8_start(buf: &[u8]) -> Option<usize> {
    let len = buf.len();
    let floor = len.saturating_sub(4);

    for i in (floor..len).rev() {
        let byte = buf[i];
        if byte & 0x80 == 0 {
            return None;
        }
        if byte & 0xc0 == 0xc0 {
            let expected = if byte & 0xe0 == 0xc0 {
                2
            } else if byte & 0xf0 == 0xe0 {
                3
            } else if byte & 0xf8 == 0xf0 {
                4
            } else {
                1
            };
            return (i + expected > len).then_some(i);
        }
    }

    None
}

/// Length of the longest prefix of `buf` that is safe to emit as one event.
///
/// An open escape sequence takes priority: the boundary is where it begins.
/// Otherwise the boundary is the start of a truncated trailing code point,
/// or the end of the buffer.
#[must_use]
pub fn safe_boundary(buf: &[u8]) -> usize {
    if let Some(start) = open_escape_start(buf) {
        return start;
    }
    incomplete_utf8_start(buf).unwrap_or(buf.len())
}

/// Splits incoming chunks at boundaries that are safe to emit.
#[derive(Debug, Default)]
pub struct BoundarySegmenter {
    /// Bytes retained from earlier chunks.
    held: BytesMut,
}

impl BoundarySegmenter {
    /// Create an empty segmenter.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a segmenter with preallocated space for held bytes.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            held: BytesMut::with_capacity(capacity),
        }
    }

    /// Feed a chunk and take the safe prefix of held + new bytes.
    ///
    /// Whatever follows the boundary stays held for the next call.
    pub fn segment(&mut self, data: &[u8]) -> Bytes {
        self.held.extend_from_slice(data);
        let boundary = safe_boundary(&self.held);
        self.held.split_to(boundary).freeze()
    }

    /// Number of bytes currently held back.
    #[must_use]
    pub fn held_len(&self) -> usize {
        self.held.len()
    }

    /// Whether any bytes are held back.
    #[must_use]
    pub fn is_holding(&self) -> bool {
        !self.held.is_empty()
    }

    /// Take every held byte, complete or not.
    pub fn force_flush(&mut self) -> Bytes {
        self.held.split().freeze()
    }
}
