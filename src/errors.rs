//! Coordination Layer Error Hierarchy
//!
//! Defines error types for the cluster coordination control plane,
//! categorized by layer: store access, content decoding, lock protocol and
//! compute-node registry.

use std::time::Duration;

use config::ConfigError;
use tokio::task::JoinError;

#[doc(hidden)]
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Infrastructure-level failures (store round-trips, serialization)
    #[error(transparent)]
    System(#[from] SystemError),

    /// Configuration loading and validation failures
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Lock protocol, registry and path scheme failures
    #[error(transparent)]
    Coordination(#[from] CoordinationError),

    /// Unrecoverable failures requiring process termination
    #[error("Fatal error: {0}")]
    Fatal(String),
}

#[derive(Debug, thiserror::Error)]
pub enum SystemError {
    // Store layer
    #[error("Repository operation failed: {0}")]
    Repository(#[from] RepositoryError),

    // Serialization
    #[error("Serialization error: {0}")]
    Serialization(#[from] SerializationError),

    #[error("Background task failed: {0}")]
    TaskFailed(#[from] JoinError),

    #[error("{0}")]
    SignalSendFailed(String),

    /// A retried operation did not finish within its per-attempt timeout
    #[error("Operation timed out after {0:?}")]
    RetryTimeout(Duration),

    /// The highest stored version under `path` has no successor
    #[error("Version counter exhausted under {path}")]
    VersionExhausted { path: String },
}

/// Failures reported by the hierarchical store collaborator.
///
/// These are transient from the coordination layer's point of view and are
/// always surfaced to the caller of the operation that hit them.
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    /// Store endpoint unreachable
    #[error("Repository unavailable: {0}")]
    Unavailable(String),

    /// Round-trip exceeded its deadline
    #[error("Repository operation on {key} timed out after {duration:?}")]
    Timeout { key: String, duration: Duration },

    /// The owning session ended, its ephemeral nodes are gone
    #[error("Repository session {0} is closed")]
    SessionClosed(u64),

    /// Key does not follow the `/`-separated absolute layout
    #[error("Invalid repository key: {0}")]
    InvalidKey(String),

    #[error("Repository error: {0}")]
    Other(String),
}

// Serialization is classified separately (it spans stored content of every kind)
#[derive(Debug, thiserror::Error)]
pub enum SerializationError {
    #[error("Json serialization failed: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum CoordinationError {
    /// Lock/ack protocol failures
    #[error(transparent)]
    Lock(#[from] LockError),

    /// Compute-node registry failures
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// Path template failures
    #[error(transparent)]
    Path(#[from] PathError),
}

#[derive(Debug, thiserror::Error)]
pub enum LockError {
    /// Subject or instance id cannot be encoded into a lock node name
    #[error("Invalid lock name: {0}")]
    InvalidLockName(String),

    /// A second acquire was issued for a scope this instance already requested
    #[error("Lock {scope} is already requested by this instance")]
    AlreadyRequested { scope: String },

    /// Release of a scope this instance does not hold
    #[error("Lock {scope} is not held by this instance")]
    NotHeld { scope: String },

    /// Ack requested for a scope with no foreign lock round in progress
    #[error("No lock round in progress for {scope}")]
    NoRoundInProgress { scope: String },

    /// Coordinator processing loop has not been started or already stopped
    #[error("Lock coordinator is not running")]
    NotRunning,

    /// The processing loop can only be started once
    #[error("Lock coordinator already started")]
    AlreadyStarted,
}

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// Every worker id in the configured range is taken
    #[error("No worker id available in 0..={max_worker_id}")]
    WorkerIdExhausted { max_worker_id: u32 },

    /// Instance ids become path segments and must be plain names
    #[error("Invalid instance id: {0}")]
    InvalidInstanceId(String),

    #[error("Unknown instance type: {0}")]
    UnknownInstanceType(String),
}

#[derive(Debug, thiserror::Error)]
pub enum PathError {
    /// A path template produced an invalid pattern (programming error)
    #[error("Invalid path pattern {pattern}: {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    /// Rule type not registered in the rule node path table
    #[error("Unknown rule item type: {0}")]
    UnknownRuleType(String),

    /// Rule type registered twice, or as both named and unique
    #[error("Duplicate rule item type: {0}")]
    DuplicateRuleType(String),

    /// Value cannot be used as a single path segment
    #[error("Invalid path segment: {0:?}")]
    InvalidSegment(String),
}

impl Error {
    /// Store round-trip failures that may succeed when repeated
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::System(SystemError::Repository(
                RepositoryError::Unavailable(_) | RepositoryError::Timeout { .. } | RepositoryError::Other(_)
            )) | Error::System(SystemError::RetryTimeout(_))
        )
    }
}

// ============== Conversion Implementations ============== //
impl From<RepositoryError> for Error {
    fn from(e: RepositoryError) -> Self {
        Error::System(SystemError::Repository(e))
    }
}

impl From<SerializationError> for Error {
    fn from(e: SerializationError) -> Self {
        Error::System(SystemError::Serialization(e))
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        SerializationError::Json(e).into()
    }
}

impl From<JoinError> for Error {
    fn from(err: JoinError) -> Self {
        Error::System(SystemError::TaskFailed(err))
    }
}

// ===== Coordination Error conversions =====

impl From<LockError> for Error {
    fn from(e: LockError) -> Self {
        Error::Coordination(CoordinationError::Lock(e))
    }
}

impl From<RegistryError> for Error {
    fn from(e: RegistryError) -> Self {
        Error::Coordination(CoordinationError::Registry(e))
    }
}

impl From<PathError> for Error {
    fn from(e: PathError) -> Self {
        Error::Coordination(CoordinationError::Path(e))
    }
}
