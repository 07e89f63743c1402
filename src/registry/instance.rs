use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::Deserialize;
use serde::Serialize;

use crate::RegistryError;

/// Role of a compute node process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstanceType {
    /// Standalone proxy process
    Proxy,
    /// Driver embedded in an application process
    Jdbc,
}

impl InstanceType {
    pub const ALL: [InstanceType; 2] = [InstanceType::Proxy, InstanceType::Jdbc];

    pub fn as_str(&self) -> &'static str {
        match self {
            InstanceType::Proxy => "proxy",
            InstanceType::Jdbc => "jdbc",
        }
    }
}

impl FromStr for InstanceType {
    type Err = RegistryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "proxy" => Ok(InstanceType::Proxy),
            "jdbc" => Ok(InstanceType::Jdbc),
            _ => Err(RegistryError::UnknownInstanceType(s.to_string())),
        }
    }
}

impl fmt::Display for InstanceType {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity and advertised metadata of one compute node
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceMetaData {
    pub id: String,
    pub instance_type: InstanceType,
    /// Type specific blob (e.g. `host:port` of a proxy)
    pub attributes: String,
    pub version: String,
}

impl InstanceMetaData {
    pub fn new(
        id: impl Into<String>,
        instance_type: InstanceType,
        attributes: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            instance_type,
            attributes: attributes.into(),
            version: version.into(),
        }
    }
}

/// Value stored in the online node
#[derive(Debug, Default, Serialize, Deserialize)]
pub(crate) struct OnlineNodeValue {
    #[serde(default)]
    pub attributes: String,
    #[serde(default)]
    pub version: String,
}

/// A compute node as seen through the registry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComputeNodeInstance {
    pub metadata: InstanceMetaData,
    pub labels: BTreeSet<String>,
    /// Status flags; empty means healthy
    pub status: BTreeSet<String>,
    pub worker_id: Option<u32>,
}

impl ComputeNodeInstance {
    pub fn new(metadata: InstanceMetaData) -> Self {
        Self {
            metadata,
            labels: BTreeSet::new(),
            status: BTreeSet::new(),
            worker_id: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.metadata.id
    }

    pub fn is_healthy(&self) -> bool {
        self.status.is_empty()
    }
}
