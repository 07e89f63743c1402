//! Cluster lock/ack protocol.
//!
//! A lock round is not complete when the lock node is written: every other
//! online compute node must acknowledge it first, after quiescing whatever
//! the lock protects.
mod coordinator;
mod definition;
mod event;
mod watcher;
pub use coordinator::*;
pub use definition::*;
pub use event::*;
pub use watcher::*;
