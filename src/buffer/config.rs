use std::collections::HashSet;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::key::KeyProjection;

/// Largest number of requests a store accepts in one batch write.
pub const DEFAULT_FLUSH_THRESHOLD: usize = 25;

/// Errors in a [`WriteBufferConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("flush threshold must be at least 1")]
    ZeroThreshold,
    #[error("primary key field `{0}` is listed more than once")]
    DuplicateKeyField(String),
    #[error("invalid write buffer config: {0}")]
    Parse(#[from] serde_json::Error),
}

/// How many flush rounds a drain may spend on unprocessed items.
///
/// The default retries forever with no pause, resubmitting whatever the store
/// left unapplied until nothing is left.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Give up after this many rounds. `None` never gives up.
    pub max_rounds: Option<u32>,
    /// Pause between a round that left items unprocessed and the next one.
    #[serde(rename = "backoff_ms", with = "duration_ms")]
    pub backoff: Duration,
}

impl RetryPolicy {
    pub fn unbounded() -> Self {
        Self::default()
    }

    pub fn max_rounds(rounds: u32) -> Self {
        Self {
            max_rounds: Some(rounds),
            ..Self::default()
        }
    }

    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    /// Whether another round may run after `rounds` have completed.
    pub fn allows(&self, rounds: u32) -> bool {
        self.max_rounds.map_or(true, |max| rounds < max)
    }
}

/// Settings recognized by a write buffer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WriteBufferConfig {
    /// Pending request count that triggers an automatic flush.
    pub flush_threshold: usize,
    /// Fields identifying an item; empty disables deduplication.
    pub primary_key: KeyProjection,
    pub retry: RetryPolicy,
}

impl Default for WriteBufferConfig {
    fn default() -> Self {
        Self {
            flush_threshold: DEFAULT_FLUSH_THRESHOLD,
            primary_key: KeyProjection::none(),
            retry: RetryPolicy::default(),
        }
    }
}

impl WriteBufferConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse and validate a JSON config document. Missing fields take defaults.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_flush_threshold(mut self, threshold: usize) -> Self {
        self.flush_threshold = threshold;
        self
    }

    pub fn with_primary_key<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.primary_key = KeyProjection::new(fields);
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.flush_threshold == 0 {
            return Err(ConfigError::ZeroThreshold);
        }
        let mut seen = HashSet::new();
        for field in self.primary_key.fields() {
            if !seen.insert(field.as_str()) {
                return Err(ConfigError::DuplicateKeyField(field.clone()));
            }
        }
        Ok(())
    }
}

mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        let millis = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX);
        serializer.serialize_u64(millis)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
