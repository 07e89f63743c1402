use std::fmt;

use crate::config::is_plain_identifier;
use crate::constants::LOCK_NAME_DELIMITER;
use crate::LockError;
use crate::Result;

/// Scope a lock excludes
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum LockScope {
    /// Cluster-wide lock on a named subject (e.g. a schema)
    Global(String),
    /// Lock on one logical database
    Database(String),
}

impl LockScope {
    pub fn global(name: impl Into<String>) -> Self {
        LockScope::Global(name.into())
    }

    pub fn database(name: impl Into<String>) -> Self {
        LockScope::Database(name.into())
    }

    /// Subject name without the scope kind
    pub fn name(&self) -> &str {
        match self {
            LockScope::Global(name) | LockScope::Database(name) => name,
        }
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if !is_plain_identifier(self.name()) {
            return Err(LockError::InvalidLockName(self.to_string()).into());
        }
        Ok(())
    }
}

impl fmt::Display for LockScope {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        match self {
            LockScope::Global(name) => write!(f, "global:{}", name),
            LockScope::Database(name) => write!(f, "database:{}", name),
        }
    }
}

/// Lock or ack node name: `<subject>@<instance_id>`.
///
/// Neither part may contain `@` or `/`, which makes [`Self::parse`] the exact
/// inverse of [`Self::format`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LockNameDefinition {
    subject: String,
    instance_id: String,
}

impl LockNameDefinition {
    pub fn new(
        subject: impl Into<String>,
        instance_id: impl Into<String>,
    ) -> Result<Self> {
        let def = Self {
            subject: subject.into(),
            instance_id: instance_id.into(),
        };
        if !is_plain_identifier(&def.subject) || !is_plain_identifier(&def.instance_id) {
            return Err(LockError::InvalidLockName(def.format()).into());
        }
        Ok(def)
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }

    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    pub fn format(&self) -> String {
        format!("{}{}{}", self.subject, LOCK_NAME_DELIMITER, self.instance_id)
    }

    pub fn parse(name: &str) -> Result<Self> {
        let (subject, instance_id) = name
            .split_once(LOCK_NAME_DELIMITER)
            .ok_or_else(|| LockError::InvalidLockName(name.to_string()))?;
        Self::new(subject, instance_id)
    }
}

impl fmt::Display for LockNameDefinition {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.write_str(&self.format())
    }
}
