//! Warden Common - Shared types for the inline admission filter
//!
//! This crate provides the vocabulary shared by the policy stores and the
//! packet datapath:
//! - Admission verdicts and source identities
//! - Encoded lookup keys and rule specificity levels
//! - Error handling

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod key;

pub use error::*;
pub use key::*;

use serde::{Deserialize, Serialize};
use std::fmt;

/// IP protocol numbers the filter dispatches on.
pub mod proto {
    /// ICMP
    pub const ICMP: u8 = 1;
    /// TCP
    pub const TCP: u8 = 6;
    /// UDP
    pub const UDP: u8 = 17;
    /// ICMPv6
    pub const ICMPV6: u8 = 58;
}

/// Ethertypes the filter classifies.
pub mod ether {
    /// IPv4
    pub const IPV4: u16 = 0x0800;
    /// IPv6
    pub const IPV6: u16 = 0x86DD;
    /// Smallest value that denotes a type rather than an 802.3 length
    pub const TYPE_MIN: u16 = 0x0600;
}

/// Per-packet admission verdict
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Verdict {
    /// Let the packet through unmodified
    Pass,
    /// Discard the packet
    Drop,
}

impl Verdict {
    /// Whether the packet is allowed through
    #[inline(always)]
    pub const fn is_pass(self) -> bool {
        matches!(self, Verdict::Pass)
    }
}

/// Numeric identity tag for a classified source
///
/// Assigned to address ranges by an external identity manager and treated
/// as opaque here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(transparent)]
pub struct Identity(u32);

impl Identity {
    /// Wrap a raw identity value
    #[inline(always)]
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    /// Raw numeric value
    #[inline(always)]
    pub const fn raw(self) -> u32 {
        self.0
    }
}

impl From<u32> for Identity {
    fn from(raw: u32) -> Self {
        Self(raw)
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Address family tag leading an identity-cache key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum AddressFamily {
    /// IPv4
    V4 = 2,
    /// IPv6
    V6 = 10,
}
