use crate::LockScope;

/// Lock protocol event.
///
/// `token` identifies one lock round: the node name `<subject>@<holder>` for
/// a global lock, the lease's sequential id for a database lock. Ack nodes
/// carry the token of the round they acknowledge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LockEvent {
    /// A lock node appeared (raw), or a foreign round became effective
    /// (coordinator subscribers)
    Locked {
        scope: LockScope,
        token: String,
        holder: Option<String>,
    },
    LockReleased {
        scope: LockScope,
        token: String,
    },
    AckLocked {
        scope: LockScope,
        instance_id: String,
        token: String,
    },
    AckLockReleased {
        scope: LockScope,
        instance_id: String,
    },
}

impl LockEvent {
    pub fn scope(&self) -> &LockScope {
        match self {
            LockEvent::Locked { scope, .. }
            | LockEvent::LockReleased { scope, .. }
            | LockEvent::AckLocked { scope, .. }
            | LockEvent::AckLockReleased { scope, .. } => scope,
        }
    }
}

/// Own intent for one scope
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LockState {
    #[default]
    Unlocked,
    /// Lease written or being written, acks not complete
    Requested,
    Locked,
    Releasing,
}
