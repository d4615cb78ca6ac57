//! Encoded lookup keys for the prefix-matched stores
//!
//! Both stores key on fixed-width byte layouts probed by longest-prefix
//! match. The rule store lays out [protocol | identity | src port | dst
//! port] and emulates wildcard rules by zeroing every field past a cut
//! point and declaring a match length that stops there; the identity
//! cache lays out [family | address] and varies the length past the
//! family byte with the bound prefix. Multi-byte fields are big-endian
//! so a bit prefix over the layout covers whole fields in order.

use crate::{AddressFamily, Identity};
use serde::{Deserialize, Serialize};
use std::net::{Ipv4Addr, Ipv6Addr};

/// Encoded rule key width in bytes
pub const RULE_KEY_LEN: usize = 9;
/// Encoded identity-cache key width in bytes
pub const CACHE_KEY_LEN: usize = 17;

/// Rule match length covering protocol and identity only
pub const IDENTITY_MATCH_BITS: u32 = 40;
/// Rule match length extending through the source port
pub const SRC_PORT_MATCH_BITS: u32 = 56;
/// Rule match length covering the whole tuple
pub const FULL_MATCH_BITS: u32 = 72;

/// Bits of the cache key preceding the address
pub const CACHE_STATIC_BITS: u32 = 8;
/// Full-length cache query for an IPv4 source
pub const V4_LOOKUP_BITS: u32 = CACHE_STATIC_BITS + 32;
/// Full-length cache query for an IPv6 source
pub const V6_LOOKUP_BITS: u32 = CACHE_STATIC_BITS + 128;

/// How much of the rule key a stored rule declares significant
///
/// Destination-port-only rules share the full match length: their zeroed
/// source port is part of the matched bits, which is what keeps them from
/// colliding with exact rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Specificity {
    /// Protocol, identity and both ports
    Exact,
    /// Protocol, identity and destination port; source wildcarded
    DstPort,
    /// Protocol, identity and source port; destination wildcarded
    SrcPort,
    /// Protocol and identity alone
    Identity,
}

impl Specificity {
    /// Declared match length in bits
    #[inline(always)]
    pub const fn match_bits(self) -> u32 {
        match self {
            Specificity::Exact | Specificity::DstPort => FULL_MATCH_BITS,
            Specificity::SrcPort => SRC_PORT_MATCH_BITS,
            Specificity::Identity => IDENTITY_MATCH_BITS,
        }
    }

    /// Derive a rule's specificity from its port wildcards; zero means
    /// wildcard, so no rule can name literal port zero.
    #[inline(always)]
    pub const fn from_ports(src_port: u16, dst_port: u16) -> Self {
        match (src_port, dst_port) {
            (0, 0) => Specificity::Identity,
            (_, 0) => Specificity::SrcPort,
            (0, _) => Specificity::DstPort,
            _ => Specificity::Exact,
        }
    }

    /// Recover a stored rule's specificity from the match length it was
    /// stored at and the source port in its key. Lengths are the ones
    /// [`match_bits`](Self::match_bits) produces; at the full length a
    /// zero source port means the rule wildcards it.
    #[inline(always)]
    pub const fn of_match(bits: u32, src_port: u16) -> Self {
        match bits {
            FULL_MATCH_BITS => {
                if src_port == 0 {
                    Specificity::DstPort
                } else {
                    Specificity::Exact
                }
            }
            SRC_PORT_MATCH_BITS => Specificity::SrcPort,
            _ => Specificity::Identity,
        }
    }
}

/// Encoded ban-rule key: [protocol:1][identity:4][src port:2][dst port:2]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct RuleKey([u8; RULE_KEY_LEN]);

impl RuleKey {
    /// Encode a tuple into the fixed layout
    #[inline(always)]
    pub fn encode(protocol: u8, identity: Identity, src_port: u16, dst_port: u16) -> Self {
        let mut key = [0u8; RULE_KEY_LEN];
        key[0] = protocol;
        key[1..5].copy_from_slice(&identity.raw().to_be_bytes());
        key[5..7].copy_from_slice(&src_port.to_be_bytes());
        key[7..9].copy_from_slice(&dst_port.to_be_bytes());
        Self(key)
    }

    /// Wrap raw key bytes
    #[inline(always)]
    pub const fn from_bytes(bytes: [u8; RULE_KEY_LEN]) -> Self {
        Self(bytes)
    }

    /// Raw key bytes
    #[inline(always)]
    pub const fn as_bytes(&self) -> &[u8; RULE_KEY_LEN] {
        &self.0
    }

    /// Protocol field
    #[inline(always)]
    pub const fn protocol(&self) -> u8 {
        self.0[0]
    }

    /// Identity field
    #[inline(always)]
    pub fn identity(&self) -> Identity {
        Identity::new(u32::from_be_bytes([
            self.0[1], self.0[2], self.0[3], self.0[4],
        ]))
    }

    /// Source-port field
    #[inline(always)]
    pub fn src_port(&self) -> u16 {
        u16::from_be_bytes([self.0[5], self.0[6]])
    }

    /// Destination-port field
    #[inline(always)]
    pub fn dst_port(&self) -> u16 {
        u16::from_be_bytes([self.0[7], self.0[8]])
    }
}

/// Encoded identity-cache key: [family:1][address:16]
///
/// IPv4 addresses occupy the first four address bytes; the rest stay
/// zero. Families never collide because the family byte is inside every
/// match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct CacheKey([u8; CACHE_KEY_LEN]);

impl CacheKey {
    /// Encode an IPv4 address
    #[inline(always)]
    pub fn encode_v4(addr: Ipv4Addr) -> Self {
        let mut key = [0u8; CACHE_KEY_LEN];
        key[0] = AddressFamily::V4 as u8;
        key[1..5].copy_from_slice(&addr.octets());
        Self(key)
    }

    /// Encode an IPv6 address
    #[inline(always)]
    pub fn encode_v6(addr: Ipv6Addr) -> Self {
        let mut key = [0u8; CACHE_KEY_LEN];
        key[0] = AddressFamily::V6 as u8;
        key[1..17].copy_from_slice(&addr.octets());
        Self(key)
    }

    /// Wrap raw key bytes
    #[inline(always)]
    pub const fn from_bytes(bytes: [u8; CACHE_KEY_LEN]) -> Self {
        Self(bytes)
    }

    /// Raw key bytes
    #[inline(always)]
    pub const fn as_bytes(&self) -> &[u8; CACHE_KEY_LEN] {
        &self.0
    }

    /// Family tag, if the byte holds a known family
    #[inline(always)]
    pub fn family(&self) -> Option<AddressFamily> {
        match self.0[0] {
            f if f == AddressFamily::V4 as u8 => Some(AddressFamily::V4),
            f if f == AddressFamily::V6 as u8 => Some(AddressFamily::V6),
            _ => None,
        }
    }

    /// Address bytes read as IPv4
    #[inline(always)]
    pub fn v4_addr(&self) -> Ipv4Addr {
        Ipv4Addr::new(self.0[1], self.0[2], self.0[3], self.0[4])
    }

    /// Address bytes read as IPv6
    #[inline(always)]
    pub fn v6_addr(&self) -> Ipv6Addr {
        let mut octets = [0u8; 16];
        octets.copy_from_slice(&self.0[1..17]);
        Ipv6Addr::from(octets)
    }
}
