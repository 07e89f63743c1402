use config::ConfigError;
use serde::Deserialize;
use serde::Serialize;

use crate::constants::DEFAULT_MAX_WORKER_ID;
use crate::Error;
use crate::InstanceType;
use crate::Result;

/// Identity of the local compute node
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct InstanceConfig {
    /// Instance id, used as a path segment under every instance subtree.
    /// Default: a random nanoid generated at load time
    #[serde(default = "default_instance_id")]
    pub id: String,

    /// Role of this process: `proxy` or `jdbc`
    #[serde(default = "default_instance_type")]
    pub instance_type: String,

    /// Type specific metadata (e.g. `host@port` for proxies)
    #[serde(default)]
    pub attributes: String,

    /// Build version advertised in the online node
    #[serde(default = "default_version")]
    pub version: String,

    /// Labels persisted at startup
    #[serde(default)]
    pub labels: Vec<String>,
}

impl Default for InstanceConfig {
    fn default() -> Self {
        Self {
            id: default_instance_id(),
            instance_type: default_instance_type(),
            attributes: String::new(),
            version: default_version(),
            labels: vec![],
        }
    }
}

impl InstanceConfig {
    pub fn validate(&self) -> Result<()> {
        if !is_plain_identifier(&self.id) {
            return Err(Error::Config(ConfigError::Message(format!(
                "instance id must be a non-empty identifier without '/' or '@', got {:?}",
                self.id
            ))));
        }

        self.instance_type.parse::<InstanceType>().map_err(|_| {
            Error::Config(ConfigError::Message(format!(
                "unknown instance_type {:?}, expected proxy or jdbc",
                self.instance_type
            )))
        })?;

        if let Some(label) = self.labels.iter().find(|l| l.trim().is_empty()) {
            return Err(Error::Config(ConfigError::Message(format!(
                "labels must not be blank, got {:?}",
                label
            ))));
        }

        Ok(())
    }

    pub fn instance_type(&self) -> Result<InstanceType> {
        Ok(self.instance_type.parse::<InstanceType>()?)
    }
}

/// Worker id assignment range
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct WorkerIdConfig {
    /// Highest assignable worker id (inclusive)
    /// Default: 1023
    #[serde(default = "default_max_worker_id")]
    pub max_worker_id: u32,
}

impl Default for WorkerIdConfig {
    fn default() -> Self {
        Self {
            max_worker_id: default_max_worker_id(),
        }
    }
}

impl WorkerIdConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_worker_id == 0 {
            return Err(Error::Config(ConfigError::Message(
                "max_worker_id must be greater than 0".into(),
            )));
        }
        Ok(())
    }
}

pub(crate) fn is_plain_identifier(s: &str) -> bool {
    !s.is_empty()
        && s.chars()
            .all(|c| c.is_alphanumeric() || matches!(c, '_' | '-' | '.' | ':'))
}

fn default_instance_id() -> String {
    nanoid::nanoid!()
}
fn default_instance_type() -> String {
    InstanceType::Proxy.as_str().to_string()
}
fn default_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}
fn default_max_worker_id() -> u32 {
    DEFAULT_MAX_WORKER_ID
}
