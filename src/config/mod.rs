//! Configuration management module for the coordination layer.
//!
//! Provides hierarchical configuration loading and validation with:
//! - Default values as code base
//! - Configuration file support (`CONFIG_PATH`)
//! - Environment variable overrides (`COORD__` prefix)
//! - Component-wise validation
mod instance;
mod lock;
mod paths;
mod retry;
mod watch;
pub use instance::*;
pub use lock::*;
pub use paths::*;
pub use retry::*;
pub use watch::*;

#[cfg(test)]
mod lock_test;

use std::env;
use std::fmt::Debug;

use config::Config;
use config::Environment;
use config::File;
use serde::Deserialize;
use serde::Serialize;

use crate::Result;

/// Main configuration container for one coordinating compute node
///
/// Combines all subsystem configurations with hierarchical override support:
/// 1. Default values from code implementation
/// 2. Configuration file specified by `CONFIG_PATH`
/// 3. Environment variables (highest priority)
#[derive(Serialize, Deserialize, Clone, Default)]
pub struct CoordinatorConfig {
    /// Identity of the local compute node
    #[serde(default)]
    pub instance: InstanceConfig,
    /// Store path roots
    #[serde(default)]
    pub paths: PathsConfig,
    /// Lock/ack protocol timing
    #[serde(default)]
    pub lock: LockConfig,
    /// Retry policies for contended operations
    #[serde(default)]
    pub retry: RetryPolicies,
    /// Watch dispatch buffers
    #[serde(default)]
    pub watch: WatchConfig,
    /// Worker id assignment range
    #[serde(default)]
    pub worker_id: WorkerIdConfig,
}

impl Debug for CoordinatorConfig {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("CoordinatorConfig")
            .field("instance", &self.instance)
            .field("paths", &self.paths)
            .finish()
    }
}

impl CoordinatorConfig {
    /// Loads configuration from hierarchical sources without validation.
    ///
    /// Configuration sources are merged in the following order (later sources override earlier):
    /// 1. Type defaults (lowest priority)
    /// 2. Configuration file from `CONFIG_PATH` environment variable (if set)
    /// 3. Environment variables with `COORD__` prefix (highest priority)
    ///
    /// # Note
    /// This method does NOT validate the configuration. Callers MUST call
    /// `validate()` after all overrides are applied.
    ///
    /// # Examples
    /// ```ignore
    /// std::env::set_var("CONFIG_PATH", "config/coordinator.toml");
    /// std::env::set_var("COORD__INSTANCE__ID", "proxy-1");
    /// let cfg = CoordinatorConfig::new()?.validate()?;
    /// ```
    pub fn new() -> Result<Self> {
        let mut builder = Config::builder().add_source(Config::try_from(&Self::default())?);

        if let Ok(config_path) = env::var("CONFIG_PATH") {
            builder = builder.add_source(File::with_name(&config_path).required(true));
        }

        builder = builder.add_source(
            Environment::with_prefix("COORD")
                .separator("__")
                .ignore_empty(true)
                .try_parsing(true),
        );

        let config: Self = builder.build()?.try_deserialize()?;
        Ok(config)
    }

    /// Applies additional configuration overrides from file without validation.
    ///
    /// Merging order (later sources override earlier):
    /// 1. Current configuration values
    /// 2. New configuration file
    /// 3. Latest environment variables (highest priority)
    pub fn with_override_config(
        &self,
        path: &str,
    ) -> Result<Self> {
        let config: Self = Config::builder()
            .add_source(Config::try_from(self)?)
            .add_source(File::with_name(path))
            .add_source(
                Environment::with_prefix("COORD")
                    .separator("__")
                    .ignore_empty(true)
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;
        Ok(config)
    }

    /// Validates configuration and returns validated instance.
    ///
    /// # Errors
    /// Returns validation errors from any subsystem:
    /// - Malformed instance ids or labels
    /// - Relative or overlapping path roots
    /// - Inconsistent lock timings
    pub fn validate(self) -> Result<Self> {
        self.instance.validate()?;
        self.paths.validate()?;
        self.lock.validate()?;
        self.retry.validate()?;
        self.watch.validate()?;
        self.worker_id.validate()?;
        Ok(self)
    }
}
