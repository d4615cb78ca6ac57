//! Bounds-checked header extraction
//!
//! Every field read is preceded by an explicit length check. Parsers
//! return `None` instead of reaching past the buffer; the caller picks
//! the fallback verdict.

use std::net::{Ipv4Addr, Ipv6Addr};
use warden_common::ether;

/// Ethernet header length
pub const ETH_HLEN: usize = 14;
/// Fixed IPv4 header length; options are not walked
pub const IPV4_HLEN: usize = 20;
/// Fixed IPv6 header length; extension headers are not walked
pub const IPV6_HLEN: usize = 40;
/// Minimum TCP header length
pub const TCP_HLEN: usize = 20;
/// UDP header length
pub const UDP_HLEN: usize = 8;
/// Minimum ICMP / ICMPv6 header length
pub const ICMP_HLEN: usize = 8;

/// Ethertype of an Ethernet II frame, if one can be read
///
/// Values under the Ethernet II threshold are 802.3 lengths, not
/// types; such frames stay unclassified.
#[inline(always)]
pub fn ether_type(frame: &[u8]) -> Option<u16> {
    if frame.len() < ETH_HLEN {
        return None;
    }
    let ety = u16::from_be_bytes([frame[12], frame[13]]);
    if ety < ether::TYPE_MIN {
        return None;
    }
    Some(ety)
}

/// Fields the filter needs from an IPv4 header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ipv4Header {
    /// Carried protocol
    pub protocol: u8,
    /// Source address
    pub src: Ipv4Addr,
}

impl Ipv4Header {
    /// Parse the fixed header. Short buffers and headers carrying
    /// options both come back `None`.
    #[inline(always)]
    pub fn parse(l3: &[u8]) -> Option<Self> {
        if l3.len() < IPV4_HLEN {
            return None;
        }
        // A header length other than five words means options
        if l3[0] & 0x0f != 5 {
            return None;
        }
        Some(Self {
            protocol: l3[9],
            src: Ipv4Addr::new(l3[12], l3[13], l3[14], l3[15]),
        })
    }
}

/// Fields the filter needs from an IPv6 header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ipv6Header {
    /// Next-header protocol
    pub next_header: u8,
    /// Source address
    pub src: Ipv6Addr,
}

impl Ipv6Header {
    /// Parse the fixed header
    #[inline(always)]
    pub fn parse(l3: &[u8]) -> Option<Self> {
        if l3.len() < IPV6_HLEN {
            return None;
        }
        let src: [u8; 16] = l3[8..24].try_into().ok()?;
        Some(Self {
            next_header: l3[6],
            src: Ipv6Addr::from(src),
        })
    }
}

/// Transport-layer port pair
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortPair {
    /// Source port
    pub src: u16,
    /// Destination port
    pub dst: u16,
}

impl PortPair {
    /// Ports from a TCP header, if the minimal header is present
    #[inline(always)]
    pub fn from_tcp(l4: &[u8]) -> Option<Self> {
        if l4.len() < TCP_HLEN {
            return None;
        }
        Some(Self {
            src: u16::from_be_bytes([l4[0], l4[1]]),
            dst: u16::from_be_bytes([l4[2], l4[3]]),
        })
    }

    /// Ports from a UDP header, if the full header is present
    #[inline(always)]
    pub fn from_udp(l4: &[u8]) -> Option<Self> {
        if l4.len() < UDP_HLEN {
            return None;
        }
        Some(Self {
            src: u16::from_be_bytes([l4[0], l4[1]]),
            dst: u16::from_be_bytes([l4[2], l4[3]]),
        })
    }
}
