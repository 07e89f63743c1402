mod cluster_context;
pub use cluster_context::*;
