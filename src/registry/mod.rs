//! Compute node registry.
//!
//! Membership is carried entirely by ephemeral nodes: an instance is online
//! exactly while its online node exists. Labels, status and the worker id are
//! separate children written only by the instance they describe.
mod compute_node;
mod instance;
mod worker_id;
pub use compute_node::*;
pub use instance::*;
pub use worker_id::*;
