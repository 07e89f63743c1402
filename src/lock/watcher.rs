//! Decoders from raw lock subtree changes to [`LockEvent`]s.
//!
//! Only `Added` and `Deleted` carry meaning on lock paths; `Updated` and
//! `Ignored` notifications are dropped.

use tracing::trace;

use crate::DataChangedEvent;
use crate::DataChangedType;
use crate::DatabaseLockNodePath;
use crate::DispatchEvent;
use crate::DispatchEventBuilder;
use crate::GlobalLockNodePath;
use crate::LockEvent;
use crate::LockScope;
use crate::DROPPED_WATCH_EVENT_METRIC;

fn meaningful(event: &DataChangedEvent) -> bool {
    let keep = matches!(event.event_type, DataChangedType::Added | DataChangedType::Deleted);
    if !keep {
        trace!(key = %event.key, event_type = ?event.event_type, "Lock path change ignored");
        DROPPED_WATCH_EVENT_METRIC
            .with_label_values(&["lock_event_type"])
            .inc();
    }
    keep
}

/// `<globalRoot>/locks/<subject>@<holder>`
#[derive(Debug, Clone)]
pub struct GlobalLocksChangedWatcher {
    paths: GlobalLockNodePath,
}

impl GlobalLocksChangedWatcher {
    pub fn new(paths: GlobalLockNodePath) -> Self {
        Self { paths }
    }

    pub fn decode(
        &self,
        event: &DataChangedEvent,
    ) -> Option<LockEvent> {
        if !meaningful(event) {
            return None;
        }
        let name = self.paths.find_lock_name(&event.key)?;
        let scope = LockScope::Global(name.subject().to_string());
        let token = name.format();

        Some(match event.event_type {
            DataChangedType::Added => LockEvent::Locked {
                scope,
                token,
                holder: Some(name.instance_id().to_string()),
            },
            _ => LockEvent::LockReleased { scope, token },
        })
    }
}

/// `<globalRoot>/ack/<subject>@<instance>`, value is the acked token
#[derive(Debug, Clone)]
pub struct GlobalAckChangedWatcher {
    paths: GlobalLockNodePath,
}

impl GlobalAckChangedWatcher {
    pub fn new(paths: GlobalLockNodePath) -> Self {
        Self { paths }
    }

    pub fn decode(
        &self,
        event: &DataChangedEvent,
    ) -> Option<LockEvent> {
        if !meaningful(event) {
            return None;
        }
        let name = self.paths.find_ack_name(&event.key)?;
        let scope = LockScope::Global(name.subject().to_string());
        let instance_id = name.instance_id().to_string();

        Some(match event.event_type {
            DataChangedType::Added => LockEvent::AckLocked {
                scope,
                instance_id,
                token: event.value_str().to_string(),
            },
            _ => LockEvent::AckLockReleased { scope, instance_id },
        })
    }
}

/// `<databaseRoot>/<db>/leases/<n>` (value: holder id) and
/// `<databaseRoot>/<db>/ack/<instance>` (value: acked token)
#[derive(Debug, Clone)]
pub struct DatabaseLockChangedWatcher {
    paths: DatabaseLockNodePath,
}

impl DatabaseLockChangedWatcher {
    pub fn new(paths: DatabaseLockNodePath) -> Self {
        Self { paths }
    }

    pub fn decode(
        &self,
        event: &DataChangedEvent,
    ) -> Option<LockEvent> {
        if !meaningful(event) {
            return None;
        }
        let added = event.event_type == DataChangedType::Added;

        if let Some(lease) = self.paths.find_lease(&event.key) {
            let scope = LockScope::Database(lease.database);
            let token = lease.sequence;
            return Some(if added {
                LockEvent::Locked {
                    scope,
                    token,
                    holder: event.value.clone().filter(|v| !v.is_empty()),
                }
            } else {
                LockEvent::LockReleased { scope, token }
            });
        }

        let ack = self.paths.find_ack(&event.key)?;
        let scope = LockScope::Database(ack.database);
        Some(if added {
            LockEvent::AckLocked {
                scope,
                instance_id: ack.instance_id,
                token: event.value_str().to_string(),
            }
        } else {
            LockEvent::AckLockReleased {
                scope,
                instance_id: ack.instance_id,
            }
        })
    }
}

impl DispatchEventBuilder for GlobalLocksChangedWatcher {
    fn subscribed_keys(&self) -> Vec<String> {
        vec![self.paths.locks_path()]
    }

    fn build(
        &self,
        event: &DataChangedEvent,
    ) -> Option<DispatchEvent> {
        self.decode(event).map(DispatchEvent::Lock)
    }
}

impl DispatchEventBuilder for GlobalAckChangedWatcher {
    fn subscribed_keys(&self) -> Vec<String> {
        vec![self.paths.acks_path()]
    }

    fn build(
        &self,
        event: &DataChangedEvent,
    ) -> Option<DispatchEvent> {
        self.decode(event).map(DispatchEvent::Lock)
    }
}

impl DispatchEventBuilder for DatabaseLockChangedWatcher {
    fn subscribed_keys(&self) -> Vec<String> {
        vec![self.paths.root().to_string()]
    }

    fn build(
        &self,
        event: &DataChangedEvent,
    ) -> Option<DispatchEvent> {
        self.decode(event).map(DispatchEvent::Lock)
    }
}
