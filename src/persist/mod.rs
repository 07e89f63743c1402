//! Versioned persistence.
//!
//! [`VersionPersistService`] keeps one current value per item under a
//! [`crate::VersionNodePath`]; [`RulePersistService`] layers typed JSON rule
//! items on top of it.
mod rule;
mod version;
pub use rule::*;
pub use version::*;

#[cfg(test)]
mod version_test;
