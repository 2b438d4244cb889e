//! Configuration for the pool and the throttle.
//!
//! Every struct has a `Default`, and [`RealtimeConfig`] can be loaded from
//! JSON where missing fields fall back to those defaults. Durations are
//! written as milliseconds (`"interval_ms": 2000`).

use crate::error::{RealtimeError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Default minimum time between throttled invocations.
pub const DEFAULT_THROTTLE_INTERVAL: Duration = Duration::from_secs(30);

/// Channel pool configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Max distinct topics open at once (None = unlimited).
    pub max_channels: Option<usize>,

    /// Name of the background thread that closes transport channels.
    pub closer_thread_name: String,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_channels: None,
            closer_thread_name: "realtime-closer".to_string(),
        }
    }
}

/// Throttled invoker configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThrottleConfig {
    /// Minimum time between invocations.
    /// Default: 30s
    #[serde(rename = "interval_ms", with = "duration_ms")]
    pub interval: Duration,

    /// Cancel the repeating timer while the host is hidden.
    pub pause_when_hidden: bool,

    /// Fire once immediately on a hidden -> visible transition.
    pub invoke_on_becoming_visible: bool,

    /// Master switch.
    pub enabled: bool,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_THROTTLE_INTERVAL,
            pause_when_hidden: true,
            invoke_on_becoming_visible: true,
            enabled: true,
        }
    }
}

impl ThrottleConfig {
    pub fn with_interval(interval: Duration) -> Self {
        Self {
            interval,
            ..Default::default()
        }
    }
}

/// Top-level configuration grouping pool and throttle settings.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RealtimeConfig {
    pub pool: PoolConfig,
    pub throttle: ThrottleConfig,
}

impl RealtimeConfig {
    /// Parse and validate a JSON document.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: RealtimeConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a JSON file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    pub fn validate(&self) -> Result<()> {
        if self.throttle.interval.is_zero() {
            return Err(RealtimeError::InvalidConfig(
                "throttle interval must be positive".to_string(),
            ));
        }
        if self.pool.max_channels == Some(0) {
            return Err(RealtimeError::InvalidConfig(
                "max_channels must be positive when set".to_string(),
            ));
        }
        if self.pool.closer_thread_name.is_empty() {
            return Err(RealtimeError::InvalidConfig(
                "closer_thread_name must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}
