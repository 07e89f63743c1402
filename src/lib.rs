//! Cluster coordination control plane for database middleware compute nodes.
//!
//! Built on a watchable hierarchical key/value store
//! ([`ClusterPersistRepository`]):
//! - [`VersionPersistService`]: versioned configuration items with an active
//!   version pointer
//! - [`LockCoordinator`]: cluster-wide lock/ack protocol over global and
//!   per-database scopes
//! - [`ComputeNodePersistService`] and [`WorkerIdGenerator`]: ephemeral
//!   membership, labels, status and worker ids
//! - [`WatchDispatcher`]: decodes store notifications into domain events
//!
//! [`ClusterContext`] wires them together for one process.
mod config;
mod constants;
mod context;
mod errors;
mod lock;
mod metrics;
mod path;
mod persist;
mod registry;
mod repository;
pub(crate) mod utils;
mod watch;

pub use config::*;
pub use context::*;
pub use errors::*;
pub use lock::*;
pub use metrics::*;
pub use path::*;
pub use persist::*;
pub use registry::*;
pub use repository::*;
pub use watch::*;

//-----------------------------------------------------------
// Autometrics
/// autometrics: https://docs.autometrics.dev/rust/adding-alerts-and-slos
use autometrics::objectives::Objective;
use autometrics::objectives::ObjectiveLatency;
use autometrics::objectives::ObjectivePercentile;
const API_SLO: Objective = Objective::new("api")
    .success_rate(ObjectivePercentile::P99_9)
    .latency(ObjectiveLatency::Ms10, ObjectivePercentile::P99);
