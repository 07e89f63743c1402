//! Compute node membership layout.
//!
//! ```text
//! <instanceRoot>/<type>/online/<instanceId>
//! <instanceRoot>/labels/<instanceId>
//! <instanceRoot>/status/<instanceId>
//! <instanceRoot>/worker-id/<instanceId>
//! <reservationRoot>/<workerId>
//! ```

use regex::Regex;

use crate::constants::IDENTIFIER_PATTERN;
use crate::constants::LABELS_NODE;
use crate::constants::ONLINE_NODE;
use crate::constants::STATUS_NODE;
use crate::constants::WORKER_ID_NODE;
use crate::path::compile;
use crate::path::join_path;
use crate::InstanceType;
use crate::Result;

#[derive(Debug, Clone)]
pub struct ComputeNodePath {
    root: String,
    reservation_root: String,
    online_pattern: Regex,
    labels_pattern: Regex,
    status_pattern: Regex,
    worker_id_pattern: Regex,
}

impl ComputeNodePath {
    pub fn new(
        root: impl Into<String>,
        reservation_root: impl Into<String>,
    ) -> Result<Self> {
        let root = root.into();
        let escaped = regex::escape(&root);
        let types = InstanceType::ALL
            .iter()
            .map(|t| regex::escape(t.as_str()))
            .collect::<Vec<_>>()
            .join("|");

        let child_pattern =
            |node: &str| compile(format!("^{}/{}/({})$", escaped, regex::escape(node), IDENTIFIER_PATTERN));

        Ok(Self {
            online_pattern: compile(format!(
                "^{}/({})/{}/({})$",
                escaped, types, ONLINE_NODE, IDENTIFIER_PATTERN
            ))?,
            labels_pattern: child_pattern(LABELS_NODE)?,
            status_pattern: child_pattern(STATUS_NODE)?,
            worker_id_pattern: child_pattern(WORKER_ID_NODE)?,
            reservation_root: reservation_root.into(),
            root,
        })
    }

    pub fn root(&self) -> &str {
        &self.root
    }

    /// Parent of the online nodes of one instance type
    pub fn online_root(
        &self,
        instance_type: InstanceType,
    ) -> String {
        join_path(&join_path(&self.root, instance_type.as_str()), ONLINE_NODE)
    }

    pub fn online_path(
        &self,
        instance_type: InstanceType,
        instance_id: &str,
    ) -> String {
        join_path(&self.online_root(instance_type), instance_id)
    }

    pub fn labels_root(&self) -> String {
        join_path(&self.root, LABELS_NODE)
    }

    pub fn labels_path(
        &self,
        instance_id: &str,
    ) -> String {
        join_path(&self.labels_root(), instance_id)
    }

    pub fn status_root(&self) -> String {
        join_path(&self.root, STATUS_NODE)
    }

    pub fn status_path(
        &self,
        instance_id: &str,
    ) -> String {
        join_path(&self.status_root(), instance_id)
    }

    pub fn worker_id_root(&self) -> String {
        join_path(&self.root, WORKER_ID_NODE)
    }

    pub fn worker_id_path(
        &self,
        instance_id: &str,
    ) -> String {
        join_path(&self.worker_id_root(), instance_id)
    }

    pub fn reservation_root(&self) -> &str {
        &self.reservation_root
    }

    pub fn worker_id_reservation_path(
        &self,
        worker_id: u32,
    ) -> String {
        join_path(&self.reservation_root, &worker_id.to_string())
    }

    pub fn find_online_instance(
        &self,
        key: &str,
    ) -> Option<(InstanceType, String)> {
        let caps = self.online_pattern.captures(key)?;
        let instance_type = caps.get(1)?.as_str().parse().ok()?;
        Some((instance_type, caps.get(2)?.as_str().to_string()))
    }

    pub fn find_labels_instance(
        &self,
        key: &str,
    ) -> Option<String> {
        capture_instance(&self.labels_pattern, key)
    }

    pub fn find_status_instance(
        &self,
        key: &str,
    ) -> Option<String> {
        capture_instance(&self.status_pattern, key)
    }

    pub fn find_worker_id_instance(
        &self,
        key: &str,
    ) -> Option<String> {
        capture_instance(&self.worker_id_pattern, key)
    }
}

fn capture_instance(
    pattern: &Regex,
    key: &str,
) -> Option<String> {
    pattern
        .captures(key)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}
