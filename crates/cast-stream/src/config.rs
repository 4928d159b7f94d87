//! Configuration for cast stream writers.
//!
//! Flush and sync timers trade latency for batching. A zero flush delay
//! surfaces incomplete trailing bytes almost immediately; a longer sync
//! delay coalesces more writes into each durable sync.
//!
//! Configuration can come from code, from `CAST_STREAM_*` environment
//! variables, or from a TOML document:
//!
//! ```toml
//! flush_delay_ms = 5
//! sync_delay_ms = 50
//! sync_on_close = true
//! diagnostics_capacity = 64
//! max_held_bytes = 4096
//! ```

pub mod env;

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

pub use env::EnvConfig;

use crate::error::{CastError, Result};

/// Default delay before held partial bytes are force-flushed.
pub const DEFAULT_FLUSH_DELAY: Duration = Duration::from_millis(5);

/// Default delay before a batched durable sync.
pub const DEFAULT_SYNC_DELAY: Duration = Duration::from_millis(50);

/// Default capacity of the diagnostic broadcast channel.
pub const DEFAULT_DIAGNOSTICS_CAPACITY: usize = 64;

/// Default limit on bytes held back per direction.
pub const DEFAULT_MAX_HELD_BYTES: usize = 4096;

/// Configuration for a [`CastWriter`](crate::CastWriter).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamConfig {
    /// How long held partial bytes may wait for completion.
    pub flush_delay: Duration,

    /// How long writes are batched before a durable sync.
    pub sync_delay: Duration,

    /// Whether `close` syncs a pending batch before releasing the sink.
    pub sync_on_close: bool,

    /// Buffered diagnostics per subscriber before old ones are dropped.
    pub diagnostics_capacity: usize,

    /// Held bytes per direction beyond which a write force-flushes
    /// instead of waiting for the flush timer.
    pub max_held_bytes: usize,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            flush_delay: DEFAULT_FLUSH_DELAY,
            sync_delay: DEFAULT_SYNC_DELAY,
            sync_on_close: true,
            diagnostics_capacity: DEFAULT_DIAGNOSTICS_CAPACITY,
            max_held_bytes: DEFAULT_MAX_HELD_BYTES,
        }
    }
}

/// TOML representation; every key is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct StreamConfigFile {
    flush_delay_ms: Option<u64>,
    sync_delay_ms: Option<u64>,
    sync_on_close: Option<bool>,
    diagnostics_capacity: Option<usize>,
    max_held_bytes: Option<usize>,
}

impl StreamConfig {
    /// Create a configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the flush delay.
    #[must_use]
    pub const fn flush_delay(mut self, delay: Duration) -> Self {
        self.flush_delay = delay;
        self
    }

    /// Set the sync delay.
    #[must_use]
    pub const fn sync_delay(mut self, delay: Duration) -> Self {
        self.sync_delay = delay;
        self
    }

    /// Set whether close performs a final sync.
    #[must_use]
    pub const fn sync_on_close(mut self, enabled: bool) -> Self {
        self.sync_on_close = enabled;
        self
    }

    /// Set the diagnostic channel capacity.
    #[must_use]
    pub const fn diagnostics_capacity(mut self, capacity: usize) -> Self {
        self.diagnostics_capacity = capacity;
        self
    }

    /// Set the held-byte limit.
    #[must_use]
    pub const fn max_held_bytes(mut self, limit: usize) -> Self {
        self.max_held_bytes = limit;
        self
    }

    /// Check that the values are usable.
    pub fn validate(&self) -> Result<()> {
        if self.diagnostics_capacity == 0 {
            return Err(CastError::config("diagnostics capacity must be at least 1"));
        }
        if self.max_held_bytes == 0 {
            return Err(CastError::config("max held bytes must be at least 1"));
        }
        Ok(())
    }

    /// Defaults overridden by `CAST_STREAM_*` environment variables.
    ///
    /// Unparseable values are ignored.
    #[must_use]
    pub fn from_env() -> Self {
        Self::default().merge_env(&EnvConfig::default())
    }

    /// Apply values present in `env` on top of `self`.
    #[must_use]
    pub fn merge_env(mut self, env: &EnvConfig) -> Self {
        if let Some(delay) = env.duration_millis(env::vars::FLUSH_DELAY_MS) {
            self.flush_delay = delay;
        }
        if let Some(delay) = env.duration_millis(env::vars::SYNC_DELAY_MS) {
            self.sync_delay = delay;
        }
        if let Some(enabled) = env.bool(env::vars::SYNC_ON_CLOSE) {
            self.sync_on_close = enabled;
        }
        if let Some(capacity) = env.parse(env::vars::DIAGNOSTICS_CAPACITY) {
            self.diagnostics_capacity = capacity;
        }
        if let Some(limit) = env.parse(env::vars::MAX_HELD_BYTES) {
            self.max_held_bytes = limit;
        }
        self
    }

    /// Parse a TOML document; missing keys keep their defaults.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let file: StreamConfigFile = toml::from_str(content)
            .map_err(|e| CastError::config(format!("invalid stream config: {e}")))?;

        let mut config = Self::default();
        if let Some(ms) = file.flush_delay_ms {
            config.flush_delay = Duration::from_millis(ms);
        }
        if let Some(ms) = file.sync_delay_ms {
            config.sync_delay = Duration::from_millis(ms);
        }
        if let Some(enabled) = file.sync_on_close {
            config.sync_on_close = enabled;
        }
        if let Some(capacity) = file.diagnostics_capacity {
            config.diagnostics_capacity = capacity;
        }
        if let Some(limit) = file.max_held_bytes {
            config.max_held_bytes = limit;
        }

        config.validate()?;
        Ok(config)
    }

    /// Load a TOML configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            CastError::config(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&content)
    }
}
