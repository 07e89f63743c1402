use config::ConfigError;
use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::Result;

/// Store path roots of every coordination subtree
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct PathsConfig {
    /// Root of the cluster-wide lock namespace
    /// Default: "/lock/global"
    #[serde(default = "default_global_lock_root")]
    pub global_lock_root: String,

    /// Root of the per-database lock namespace
    /// Default: "/lock/database"
    #[serde(default = "default_database_lock_root")]
    pub database_lock_root: String,

    /// Root of compute node membership
    /// Default: "/nodes/compute_nodes"
    #[serde(default = "default_instance_root")]
    pub instance_root: String,

    /// Root of worker id reservations
    /// Default: "/reservation/worker_id"
    #[serde(default = "default_worker_id_reservation_root")]
    pub worker_id_reservation_root: String,

    /// Prefix of global rule items, ends with '/'
    /// Default: "/rules/"
    #[serde(default = "default_rule_root")]
    pub rule_root: String,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            global_lock_root: default_global_lock_root(),
            database_lock_root: default_database_lock_root(),
            instance_root: default_instance_root(),
            worker_id_reservation_root: default_worker_id_reservation_root(),
            rule_root: default_rule_root(),
        }
    }
}

impl PathsConfig {
    pub fn validate(&self) -> Result<()> {
        let roots = [
            ("global_lock_root", &self.global_lock_root),
            ("database_lock_root", &self.database_lock_root),
            ("instance_root", &self.instance_root),
            ("worker_id_reservation_root", &self.worker_id_reservation_root),
        ];

        for (name, root) in roots.iter() {
            if !root.starts_with('/') || root.len() < 2 || root.ends_with('/') {
                return Err(Error::Config(ConfigError::Message(format!(
                    "{} must be an absolute path without trailing '/', got {:?}",
                    name, root
                ))));
            }
        }

        // Lock subtrees are watched by prefix, nesting would mix their events
        for (i, (a_name, a)) in roots.iter().enumerate() {
            for (b_name, b) in roots.iter().skip(i + 1) {
                if is_nested(a, b) {
                    return Err(Error::Config(ConfigError::Message(format!(
                        "{} ({}) and {} ({}) must not be nested",
                        a_name, a, b_name, b
                    ))));
                }
            }
        }

        if !self.rule_root.starts_with('/') || !self.rule_root.ends_with('/') {
            return Err(Error::Config(ConfigError::Message(format!(
                "rule_root must start and end with '/', got {:?}",
                self.rule_root
            ))));
        }

        Ok(())
    }
}

fn is_nested(
    a: &str,
    b: &str,
) -> bool {
    a == b || a.starts_with(&format!("{}/", b)) || b.starts_with(&format!("{}/", a))
}

fn default_global_lock_root() -> String {
    "/lock/global".to_string()
}
fn default_database_lock_root() -> String {
    "/lock/database".to_string()
}
fn default_instance_root() -> String {
    "/nodes/compute_nodes".to_string()
}
fn default_worker_id_reservation_root() -> String {
    "/reservation/worker_id".to_string()
}
fn default_rule_root() -> String {
    "/rules/".to_string()
}
