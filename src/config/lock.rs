//! Lock/ack protocol timing
//!
//! ```toml
//! [lock]
//! default_timeout_ms = 3000
//! poll_interval_ms = 100
//! ```

use std::time::Duration;

use config::ConfigError;
use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::Result;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct LockConfig {
    /// Acquire timeout used when the caller does not supply one
    ///
    /// Range: 100-600000
    /// Default: 3000
    #[serde(default = "default_timeout_ms")]
    pub default_timeout_ms: u64,

    /// How often a waiting acquirer re-checks lease order and the online
    /// participant set even without a watch notification
    ///
    /// Must be smaller than `default_timeout_ms`.
    /// Default: 100
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            default_timeout_ms: default_timeout_ms(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

impl LockConfig {
    /// Validates configuration parameters
    ///
    /// Returns error if:
    /// - `default_timeout_ms` is out of range (100-600000)
    /// - `poll_interval_ms` is zero or not below `default_timeout_ms`
    pub fn validate(&self) -> Result<()> {
        if !(100..=600_000).contains(&self.default_timeout_ms) {
            return Err(Error::Config(ConfigError::Message(format!(
                "lock default_timeout_ms must be between 100 and 600000, got {}",
                self.default_timeout_ms
            ))));
        }

        if self.poll_interval_ms == 0 || self.poll_interval_ms >= self.default_timeout_ms {
            return Err(Error::Config(ConfigError::Message(format!(
                "lock poll_interval_ms must be in 1..{}, got {}",
                self.default_timeout_ms, self.poll_interval_ms
            ))));
        }

        Ok(())
    }

    pub fn default_timeout(&self) -> Duration {
        Duration::from_millis(self.default_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

fn default_timeout_ms() -> u64 {
    3000
}

fn default_poll_interval_ms() -> u64 {
    100
}
