//! Warden Policy - control-plane state for the admission filter
//!
//! The stores the hot path reads and the control plane writes:
//! - A longest-prefix-match store with hot-swapped snapshots
//! - The source-identity cache built on it
//! - The hierarchical ban-rule table and its four-probe lookup

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod engine;
pub mod identity;
pub mod store;

pub use engine::{RuleEntry, RuleSpec, RuleTable, DEFAULT_RULE_CAPACITY};
pub use identity::{IdentityCache, PrefixBinding, DEFAULT_IDENTITY_CAPACITY};
pub use store::LpmStore;
