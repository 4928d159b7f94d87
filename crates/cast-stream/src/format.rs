//! Asciicast v2 record types.
//!
//! A cast stream is newline-delimited JSON: one header object, then one
//! `[elapsed, kind, data]` array per event.

use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{CastError, Result};

/// The only format version this crate writes.
pub const CAST_VERSION: u32 = 2;

/// Default terminal width.
pub const DEFAULT_WIDTH: u32 = 80;

/// Default terminal height.
pub const DEFAULT_HEIGHT: u32 = 24;

/// The header line of a cast stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CastHeader {
    /// Format version.
    pub version: u32,
    /// Terminal width in columns.
    pub width: u32,
    /// Terminal height in rows.
    pub height: u32,
    /// Recording start, in unix seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<u64>,
    /// Total duration in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
    /// Idle time limit applied on playback, in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idle_time_limit: Option<f64>,
    /// The recorded command.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    /// Title of the recording.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Captured environment variables.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub env: HashMap<String, String>,
}

impl Default for CastHeader {
    fn default() -> Self {
        Self {
            version: CAST_VERSION,
            width: DEFAULT_WIDTH,
            height: DEFAULT_HEIGHT,
            timestamp: None,
            duration: None,
            idle_time_limit: None,
            command: None,
            title: None,
            env: HashMap::new(),
        }
    }
}

impl CastHeader {
    /// Create a header for a terminal of the given size.
    #[must_use]
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            ..Default::default()
        }
    }

    /// Set the command.
    #[must_use]
    pub fn with_command(mut self, command: impl Into<String>) -> Self {
        self.command = Some(command.into());
        self
    }

    /// Set the title.
    #[must_use]
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Set the start timestamp (unix seconds).
    #[must_use]
    pub const fn with_timestamp(mut self, timestamp: u64) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// Set the idle time limit.
    #[must_use]
    pub const fn with_idle_time_limit(mut self, limit: f64) -> Self {
        self.idle_time_limit = Some(limit);
        self
    }

    /// Add an environment variable.
    #[must_use]
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Check the fields a player needs.
    pub fn validate(&self) -> Result<()> {
        if self.version != CAST_VERSION {
            return Err(CastError::config(format!(
                "unsupported cast version {} (expected {CAST_VERSION})",
                self.version
            )));
        }
        if self.width == 0 || self.height == 0 {
            return Err(CastError::config(format!(
                "terminal size must be non-zero, got {}x{}",
                self.width, self.height
            )));
        }
        Ok(())
    }

    /// Serialize as a single JSON line, without the newline.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| CastError::encode("cast header", e))
    }
}

/// Kind of a cast event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// Output from the terminal.
    Output,
    /// Input sent to the terminal.
    Input,
    /// Terminal resize.
    Resize,
    /// Marker/annotation.
    Marker,
}

impl EventKind {
    /// The wire token for this kind.
    #[must_use]
    pub const fn token(self) -> &'static str {
        match self {
            Self::Output => "o",
            Self::Input => "i",
            Self::Resize => "r",
            Self::Marker => "m",
        }
    }

    /// Parse a wire token.
    #[must_use]
    pub fn from_token(token: &str) -> Option<Self> {
        match token {
            "o" => Some(Self::Output),
            "i" => Some(Self::Input),
            "r" => Some(Self::Resize),
            "m" => Some(Self::Marker),
            _ => None,
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

impl Serialize for EventKind {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.token())
    }
}

impl<'de> Deserialize<'de> for EventKind {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let token = String::deserialize(deserializer)?;
        Self::from_token(&token)
            .ok_or_else(|| serde::de::Error::custom(format!("unknown event kind {token:?}")))
    }
}

/// One event line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CastEvent {
    /// Seconds since the start of the stream.
    pub time: f64,
    /// Event kind.
    #[serde(rename = "type")]
    pub kind: EventKind,
    /// Event payload.
    pub data: String,
}

impl CastEvent {
    /// Create an event.
    pub fn new(time: f64, kind: EventKind, data: impl Into<String>) -> Self {
        Self {
            time,
            kind,
            data: data.into(),
        }
    }

    /// Create an output event.
    pub fn output(time: f64, data: impl Into<String>) -> Self {
        Self::new(time, EventKind::Output, data)
    }

    /// Create an input event.
    pub fn input(time: f64, data: impl Into<String>) -> Self {
        Self::new(time, EventKind::Input, data)
    }

    /// Create a resize event.
    #[must_use]
    pub fn resize(time: f64, cols: u16, rows: u16) -> Self {
        Self::new(time, EventKind::Resize, resize_token(cols, rows))
    }

    /// Create a marker event.
    pub fn marker(time: f64, label: impl Into<String>) -> Self {
        Self::new(time, EventKind::Marker, label)
    }

    /// Elapsed time as a [`Duration`].
    ///
    /// Negative or non-finite times map to zero.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        Duration::try_from_secs_f64(self.time).unwrap_or(Duration::ZERO)
    }

    /// Parse the `<cols>x<rows>` payload of a resize event.
    #[must_use]
    pub fn resize_dimensions(&self) -> Option<(u16, u16)> {
        if self.kind != EventKind::Resize {
            return None;
        }
        let (cols, rows) = self.data.split_once('x')?;
        Some((cols.parse().ok()?, rows.parse().ok()?))
    }

    /// Serialize as a single JSON array line, without the newline.
    pub fn to_json(&self) -> Result<String> {
        encode_event_line(self.time, self.kind, &self.data)
    }
}

/// Format the payload of a resize event.
#[must_use]
pub fn resize_token(cols: u16, rows: u16) -> String {
    format!("{cols}x{rows}")
}

/// Serialize `[time, kind, data]` as one JSON line, without the newline.
pub(crate) fn encode_event_line(time: f64, kind: EventKind, data: &str) -> Result<String> {
    serde_json::to_string(&(time, kind, data)).map_err(|e| CastError::encode("cast event", e))
}

/// A decoded record.
#[derive(Debug, Clone, PartialEq)]
pub enum CastRecord {
    /// The header line.
    Header(CastHeader),
    /// An event line.
    Event(CastEvent),
    /// The byte source is exhausted.
    End,
}

/// JSON envelope for forwarding records to live viewers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamMessage {
    /// `header`, `event`, `end` or `error`.
    #[serde(rename = "type")]
    pub kind: String,
    /// Present for `header` messages.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub header: Option<CastHeader>,
    /// Present for `event` messages.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event: Option<CastEvent>,
    /// Present for `error` messages.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl StreamMessage {
    /// Create an `error` message.
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            kind: "error".to_string(),
            header: None,
            event: None,
            message: Some(message.into()),
        }
    }

    /// Serialize as JSON.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| CastError::encode("stream message", e))
    }
}

impl From<CastRecord> for StreamMessage {
    fn from(record: CastRecord) -> Self {
        let mut message = Self {
            kind: String::new(),
            header: None,
            event: None,
            message: None,
        };
        match record {
            CastRecord::Header(header) => {
                message.kind = "header".to_string();
                message.header = Some(header);
            }
            CastRecord::Event(event) => {
                message.kind = "event".to_string();
                message.event = Some(event);
            }
            CastRecord::End => message.kind = "end".to_string(),
        }
        message
    }
}

impl From<&CastError> for StreamMessage {
    fn from(error: &CastError) -> Self {
        Self::error(error.to_string())
    }
}
