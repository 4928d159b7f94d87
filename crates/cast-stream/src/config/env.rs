//! Environment-based configuration.

use std::collections::HashMap;
use std::time::Duration;

/// Environment configuration prefix.
pub const DEFAULT_PREFIX: &str = "CAST_STREAM";

/// Environment variable reader.
#[derive(Debug, Clone)]
pub struct EnvConfig {
    /// Prefix for environment variables.
    prefix: String,
    /// Values that take precedence over the process environment.
    overrides: HashMap<String, String>,
}

impl Default for EnvConfig {
    fn default() -> Self {
        Self::new(DEFAULT_PREFIX)
    }
}

impl EnvConfig {
    /// Create a new environment config reader.
    #[must_use]
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            overrides: HashMap::new(),
        }
    }

    /// Provide a value without touching the process environment.
    ///
    /// `name` is the unprefixed variable name.
    #[must_use]
    pub fn with_var(mut self, name: &str, value: impl Into<String>) -> Self {
        let var_name = self.var_name(name);
        self.overrides.insert(var_name, value.into());
        self
    }

    /// Build the full environment variable name.
    fn var_name(&self, name: &str) -> String {
        if self.prefix.is_empty() {
            name.to_uppercase()
        } else {
            format!("{}_{}", self.prefix, name.to_uppercase())
        }
    }

    /// Get a string value.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<String> {
        let var_name = self.var_name(name);
        self.overrides
            .get(&var_name)
            .cloned()
            .or_else(|| std::env::var(&var_name).ok())
    }

    /// Get a parsed value.
    #[must_use]
    pub fn parse<T: std::str::FromStr>(&self, name: &str) -> Option<T> {
        self.get(name).and_then(|v| v.trim().parse().ok())
    }

    /// Get a boolean value.
    #[must_use]
    pub fn bool(&self, name: &str) -> Option<bool> {
        self.get(name).map(|v| {
            matches!(
                v.trim().to_lowercase().as_str(),
                "1" | "true" | "yes" | "on" | "enabled"
            )
        })
    }

    /// Get a duration in milliseconds.
    #[must_use]
    pub fn duration_millis(&self, name: &str) -> Option<Duration> {
        self.parse::<u64>(name).map(Duration::from_millis)
    }
}

/// Variable names read by [`StreamConfig::from_env`](super::StreamConfig::from_env).
pub mod vars {
    /// Delay before held partial bytes are force-flushed, in milliseconds.
    pub const FLUSH_DELAY_MS: &str = "FLUSH_DELAY_MS";
    /// Delay before a batched durable sync, in milliseconds.
    pub const SYNC_DELAY_MS: &str = "SYNC_DELAY_MS";
    /// Whether close performs a final sync.
    pub const SYNC_ON_CLOSE: &str = "SYNC_ON_CLOSE";
    /// Capacity of the diagnostic channel.
    pub const DIAGNOSTICS_CAPACITY: &str = "DIAGNOSTICS_CAPACITY";
    /// Held-byte limit per direction before a forced flush.
    pub const MAX_HELD_BYTES: &str = "MAX_HELD_BYTES";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_config_prefix() {
        let config = EnvConfig::new("TEST");
        assert_eq!(config.var_name("foo"), "TEST_FOO");
        assert_eq!(config.var_name("bar_baz"), "TEST_BAR_BAZ");
    }

    #[test]
    fn env_config_no_prefix() {
        let config = EnvConfig::new("");
        assert_eq!(config.var_name("foo"), "FOO");
    }

    #[test]
    fn env_bool_parsing() {
        let config = EnvConfig::new("CAST_STREAM_TEST")
            .with_var("ENABLED", "true")
            .with_var("DISABLED", "off");

        assert_eq!(config.bool("ENABLED"), Some(true));
        assert_eq!(config.bool("DISABLED"), Some(false));
        assert_eq!(config.bool("MISSING_FLAG"), None);
    }

    #[test]
    fn env_duration_parsing() {
        let config = EnvConfig::new("CAST_STREAM_TEST")
            .with_var("DELAY", " 25 ")
            .with_var("BAD", "soon");

        assert_eq!(
            config.duration_millis("DELAY"),
            Some(Duration::from_millis(25))
        );
        assert_eq!(config.duration_millis("BAD"), None);
    }
}
