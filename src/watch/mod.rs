//! Store watch dispatch.
//!
//! Raw [`DataChangedEvent`](crate::DataChangedEvent)s are decoded by
//! [`DispatchEventBuilder`]s into domain events. The repository listener only
//! decodes and enqueues; a single routing task forwards lock events to the
//! lock coordinator and every event to broadcast subscribers.
mod builder;
mod compute_node;
mod dispatcher;
mod rule;
pub use builder::*;
pub use compute_node::*;
pub use dispatcher::*;
pub use rule::*;

#[cfg(test)]
mod dispatcher_test;
#[cfg(test)]
mod rule_test;
