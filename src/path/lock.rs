//! Lock namespaces.
//!
//! ```text
//! <globalRoot>/locks/<subject>@<instance>
//! <globalRoot>/ack/<subject>@<instance>
//! <databaseRoot>/<database>/leases/<sequentialId>
//! <databaseRoot>/<database>/ack/<instanceId>
//! ```

use regex::Regex;

use crate::constants::ACK_NODE;
use crate::constants::IDENTIFIER_PATTERN;
use crate::constants::LEASES_NODE;
use crate::constants::LOCKS_NODE;
use crate::path::compile;
use crate::path::join_path;
use crate::LockNameDefinition;
use crate::Result;

/// Flat cluster-wide lock namespace
#[derive(Debug, Clone)]
pub struct GlobalLockNodePath {
    root: String,
    lock_pattern: Regex,
    ack_pattern: Regex,
}

impl GlobalLockNodePath {
    pub fn new(root: impl Into<String>) -> Result<Self> {
        let root = root.into();
        let escaped = regex::escape(&root);
        Ok(Self {
            lock_pattern: compile(format!("^{}/{}/([^/]+)$", escaped, LOCKS_NODE))?,
            ack_pattern: compile(format!("^{}/{}/([^/]+)$", escaped, ACK_NODE))?,
            root,
        })
    }

    pub fn root(&self) -> &str {
        &self.root
    }

    pub fn locks_path(&self) -> String {
        join_path(&self.root, LOCKS_NODE)
    }

    pub fn lock_path(
        &self,
        name: &LockNameDefinition,
    ) -> String {
        join_path(&self.locks_path(), &name.format())
    }

    pub fn acks_path(&self) -> String {
        join_path(&self.root, ACK_NODE)
    }

    pub fn ack_path(
        &self,
        name: &LockNameDefinition,
    ) -> String {
        join_path(&self.acks_path(), &name.format())
    }

    /// Lock name of a `locks/<name>` key; malformed names yield None
    pub fn find_lock_name(
        &self,
        key: &str,
    ) -> Option<LockNameDefinition> {
        let caps = self.lock_pattern.captures(key)?;
        LockNameDefinition::parse(caps.get(1)?.as_str()).ok()
    }

    pub fn find_ack_name(
        &self,
        key: &str,
    ) -> Option<LockNameDefinition> {
        let caps = self.ack_pattern.captures(key)?;
        LockNameDefinition::parse(caps.get(1)?.as_str()).ok()
    }
}

/// Lease node of a database lock
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaseNode {
    pub database: String,
    pub sequence: String,
}

/// Ack node of a database lock
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseAckNode {
    pub database: String,
    pub instance_id: String,
}

/// Per-database lock namespace
#[derive(Debug, Clone)]
pub struct DatabaseLockNodePath {
    root: String,
    lease_pattern: Regex,
    ack_pattern: Regex,
}

impl DatabaseLockNodePath {
    pub fn new(root: impl Into<String>) -> Result<Self> {
        let root = root.into();
        let escaped = regex::escape(&root);
        Ok(Self {
            lease_pattern: compile(format!(
                r"^{}/({})/{}/(\d+)$",
                escaped, IDENTIFIER_PATTERN, LEASES_NODE
            ))?,
            ack_pattern: compile(format!(
                "^{}/({})/{}/({})$",
                escaped, IDENTIFIER_PATTERN, ACK_NODE, IDENTIFIER_PATTERN
            ))?,
            root,
        })
    }

    pub fn root(&self) -> &str {
        &self.root
    }

    pub fn database_path(
        &self,
        database: &str,
    ) -> String {
        join_path(&self.root, database)
    }

    pub fn leases_path(
        &self,
        database: &str,
    ) -> String {
        join_path(&self.database_path(database), LEASES_NODE)
    }

    pub fn lease_path(
        &self,
        database: &str,
        sequence: &str,
    ) -> String {
        join_path(&self.leases_path(database), sequence)
    }

    pub fn acks_path(
        &self,
        database: &str,
    ) -> String {
        join_path(&self.database_path(database), ACK_NODE)
    }

    pub fn ack_path(
        &self,
        database: &str,
        instance_id: &str,
    ) -> String {
        join_path(&self.acks_path(database), instance_id)
    }

    pub fn find_lease(
        &self,
        key: &str,
    ) -> Option<LeaseNode> {
        let caps = self.lease_pattern.captures(key)?;
        Some(LeaseNode {
            database: caps.get(1)?.as_str().to_string(),
            sequence: caps.get(2)?.as_str().to_string(),
        })
    }

    pub fn find_ack(
        &self,
        key: &str,
    ) -> Option<DatabaseAckNode> {
        let caps = self.ack_pattern.captures(key)?;
        Some(DatabaseAckNode {
            database: caps.get(1)?.as_str().to_string(),
            instance_id: caps.get(2)?.as_str().to_string(),
        })
    }
}
