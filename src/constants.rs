// -
// Path segments

pub(crate) const PATH_SEPARATOR: &str = "/";

/// Versioned item layout
pub(crate) const VERSIONS_NODE: &str = "versions";
pub(crate) const ACTIVE_VERSION_NODE: &str = "active_version";

/// Lock layout
pub(crate) const LOCKS_NODE: &str = "locks";
pub(crate) const ACK_NODE: &str = "ack";
pub(crate) const LEASES_NODE: &str = "leases";
pub(crate) const LOCK_NAME_DELIMITER: char = '@';

/// Compute node layout
pub(crate) const ONLINE_NODE: &str = "online";
pub(crate) const LABELS_NODE: &str = "labels";
pub(crate) const WORKER_ID_NODE: &str = "worker-id";
pub(crate) const STATUS_NODE: &str = "status";

/// Identifier shape accepted for rule item names, lock subjects and instance ids
pub(crate) const IDENTIFIER_PATTERN: &str = r"[\w\-\.:]+";
pub(crate) const RULE_ITEM_NAME_PATTERN: &str = r"[\w\-]+";

/// Sequential child names are zero padded so lexical order is numeric order
pub(crate) const SEQUENTIAL_NODE_WIDTH: usize = 10;

/// Snowflake-style generators reserve 10 bits for the worker id
pub(crate) const DEFAULT_MAX_WORKER_ID: u32 = 1023;
