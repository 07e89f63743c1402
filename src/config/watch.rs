use config::ConfigError;
use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::Result;

/// Watch dispatch buffers
///
/// - `subscriber_buffer_size`: per-subscriber broadcast capacity; slow
///   subscribers lag and lose the oldest events
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct WatchConfig {
    #[serde(default = "default_subscriber_buffer_size")]
    pub subscriber_buffer_size: usize,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            subscriber_buffer_size: default_subscriber_buffer_size(),
        }
    }
}

impl WatchConfig {
    pub fn validate(&self) -> Result<()> {
        if self.subscriber_buffer_size == 0 {
            return Err(Error::Config(ConfigError::Message(
                "watch subscriber_buffer_size must be greater than 0".into(),
            )));
        }
        Ok(())
    }
}

fn default_subscriber_buffer_size() -> usize {
    128
}
