//! Inline packet admission
//!
//! The hot path of the filter: parse just enough of each packet to
//! resolve the sender to an identity, check the identity's ban rules,
//! and return a pass-or-drop verdict. One call per packet, no
//! allocation, no locks.
//!
//! ```text
//! frame ──► ether_type ──► Ipv4/Ipv6 header ──► identity ──► ports
//!                │                │                 │           │
//!              other           short /           unknown      rules ──► Pass / Drop
//!              (Pass)       options (Pass)        (Pass)
//! ```
//!
//! Control-plane writes (identity bindings, ban rules) go through the
//! handles [`PacketFilter::identities`] and [`PacketFilter::rules`]
//! and become visible to in-flight packets atomically.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod filter;
pub mod parse;
pub mod stats;

pub use filter::{EarlyHook, FilterConfig, PacketFilter};
pub use stats::{CounterSnapshot, VerdictCounters};
