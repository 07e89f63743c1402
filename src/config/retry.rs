use config::ConfigError;
use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::Result;

/// Basic retry policy template
#[derive(Debug, Serialize, Deserialize, Clone, Copy, Default)]
pub struct BackoffPolicy {
    /// Maximum number of retries (0 means unlimited retries)
    #[serde(default = "default_max_retries")]
    pub max_retries: usize,

    /// Single operation timeout (unit: milliseconds)
    #[serde(default = "default_op_timeout_ms")]
    pub timeout_ms: u64,

    /// Backoff base (unit: milliseconds)
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    /// Maximum backoff time (unit: milliseconds)
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

impl BackoffPolicy {
    pub fn validate(
        &self,
        name: &str,
    ) -> Result<()> {
        if self.base_delay_ms == 0 || self.base_delay_ms > self.max_delay_ms {
            return Err(Error::Config(ConfigError::Message(format!(
                "retry.{}: base_delay_ms must be in 1..={}, got {}",
                name, self.max_delay_ms, self.base_delay_ms
            ))));
        }
        if self.timeout_ms == 0 {
            return Err(Error::Config(ConfigError::Message(format!(
                "retry.{}: timeout_ms must be greater than 0",
                name
            ))));
        }
        Ok(())
    }
}

/// Divide strategies by coordination concern
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RetryPolicies {
    // Global lock contention (retract-and-retry when another holder exists)
    #[serde(default)]
    pub lock_contention: BackoffPolicy,

    // Worker id reservation races
    #[serde(default)]
    pub worker_id: BackoffPolicy,
}

// Default value implementation
impl Default for RetryPolicies {
    fn default() -> Self {
        Self {
            lock_contention: BackoffPolicy {
                max_retries: 0,
                timeout_ms: 3000,
                base_delay_ms: 20,
                max_delay_ms: 500,
            },
            worker_id: BackoffPolicy {
                max_retries: 5,
                timeout_ms: 500,
                base_delay_ms: 10,
                max_delay_ms: 200,
            },
        }
    }
}

impl RetryPolicies {
    pub fn validate(&self) -> Result<()> {
        self.lock_contention.validate("lock_contention")?;
        self.worker_id.validate("worker_id")?;
        Ok(())
    }
}

fn default_max_retries() -> usize {
    3
}
fn default_op_timeout_ms() -> u64 {
    100
}
fn default_base_delay_ms() -> u64 {
    50
}
fn default_max_delay_ms() -> u64 {
    1000
}
