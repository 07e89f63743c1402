use std::collections::BTreeSet;

use crate::DataChangedEvent;
use crate::InstanceMetaData;
use crate::InstanceType;
use crate::LockEvent;

/// Decodes raw store changes under some key prefixes into domain events.
///
/// `build` runs on the store's notification thread and must not block.
pub trait DispatchEventBuilder: Send + Sync + 'static {
    /// Key prefixes this builder needs a watch on
    fn subscribed_keys(&self) -> Vec<String>;

    /// None when the change carries no meaning for this builder
    fn build(
        &self,
        event: &DataChangedEvent,
    ) -> Option<DispatchEvent>;
}

/// Decoded store change
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchEvent {
    Lock(LockEvent),
    ComputeNode(ComputeNodeEvent),
    RuleItem(RuleItemEvent),
}

/// Membership change of one compute node
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ComputeNodeEvent {
    /// Online node created or rewritten
    Online(InstanceMetaData),
    Offline {
        instance_type: InstanceType,
        instance_id: String,
    },
    /// Deleted labels arrive as an empty set
    LabelsChanged {
        instance_id: String,
        labels: BTreeSet<String>,
    },
    StatusChanged {
        instance_id: String,
        status: BTreeSet<String>,
    },
    WorkerIdChanged {
        instance_id: String,
        worker_id: Option<u32>,
    },
}

/// Change of a versioned rule item
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleItemEvent {
    /// The active version pointer moved to `version`
    RuleItemAltered {
        item_type: String,
        /// None for unique items
        name: Option<String>,
        version: u64,
    },
    RuleItemDropped {
        item_type: String,
        name: Option<String>,
    },
}
