//! Per-packet dispatcher
//!
//! One synchronous run per packet: validate framing, resolve the source
//! to an identity, parse the transport header, consult the ban rules,
//! record the verdict. Traffic the filter cannot classify passes
//! untouched; a malformed transport header on classified traffic drops.

use crate::parse::{self, Ipv4Header, Ipv6Header, PortPair};
use crate::stats::VerdictCounters;
use tracing::{info, trace};
use warden_common::{ether, proto, Identity, Verdict};
use warden_policy::{IdentityCache, RuleTable, DEFAULT_IDENTITY_CAPACITY, DEFAULT_RULE_CAPACITY};

/// Filter configuration
#[derive(Debug, Clone)]
pub struct FilterConfig {
    /// Counter shards, one per execution context
    pub num_contexts: usize,
    /// Identity-cache capacity
    pub identity_capacity: usize,
    /// Rule-table capacity
    pub rule_capacity: usize,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            num_contexts: available_contexts(),
            identity_capacity: DEFAULT_IDENTITY_CAPACITY,
            rule_capacity: DEFAULT_RULE_CAPACITY,
        }
    }
}

/// Execution contexts available to the host
fn available_contexts() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

/// Pre-classification hook consulted after framing validation
///
/// A hook may short-circuit with a verdict or decline with `None`, in
/// which case classification proceeds. `data` holds the bytes the
/// filter received: the whole frame on framed media, the network
/// header onward otherwise.
pub trait EarlyHook: Send + Sync {
    /// Inspect a packet before classification
    fn inspect(&self, ether_type: u16, data: &[u8]) -> Option<Verdict>;
}

/// The admission filter
///
/// All state is interior and read-only on the hot path, so one filter
/// serves any number of execution contexts concurrently.
pub struct PacketFilter {
    identities: IdentityCache,
    rules: RuleTable,
    counters: VerdictCounters,
    early_hook: Option<Box<dyn EarlyHook>>,
}

impl PacketFilter {
    /// Build a filter from config
    pub fn new(config: FilterConfig) -> Self {
        info!(
            contexts = config.num_contexts,
            identity_capacity = config.identity_capacity,
            rule_capacity = config.rule_capacity,
            "packet filter ready"
        );
        Self {
            identities: IdentityCache::new(config.identity_capacity),
            rules: RuleTable::new(config.rule_capacity),
            counters: VerdictCounters::new(config.num_contexts),
            early_hook: None,
        }
    }

    /// Install a pre-classification hook
    pub fn with_early_hook(mut self, hook: Box<dyn EarlyHook>) -> Self {
        self.early_hook = Some(hook);
        self
    }

    /// Identity cache (write side)
    pub fn identities(&self) -> &IdentityCache {
        &self.identities
    }

    /// Ban-rule table (write side)
    pub fn rules(&self) -> &RuleTable {
        &self.rules
    }

    /// Verdict counters
    pub fn counters(&self) -> &VerdictCounters {
        &self.counters
    }

    /// Admit or refuse one Ethernet frame
    ///
    /// Exactly one verdict comes back and exactly one counter slot
    /// records it, on the shard for `ctx`.
    #[inline]
    pub fn process(&self, ctx: usize, frame: &[u8]) -> Verdict {
        let verdict = self.frame_verdict(frame);
        self.counters.record(ctx, verdict);
        verdict
    }

    /// Admit or refuse a packet from link-layer-less media
    ///
    /// The network-layer protocol arrives out of band and `l3` starts
    /// at the network header. Counted like [`process`](Self::process).
    #[inline]
    pub fn process_l3(&self, ctx: usize, ether_type: u16, l3: &[u8]) -> Verdict {
        let verdict = match self.early_verdict(ether_type, l3) {
            Some(verdict) => verdict,
            None => self.family_verdict(ether_type, l3),
        };
        self.counters.record(ctx, verdict);
        verdict
    }

    /// Verdict for a frame, counters untouched
    fn frame_verdict(&self, frame: &[u8]) -> Verdict {
        let Some(ety) = parse::ether_type(frame) else {
            return Verdict::Pass;
        };
        if let Some(verdict) = self.early_verdict(ety, frame) {
            return verdict;
        }
        self.family_verdict(ety, &frame[parse::ETH_HLEN..])
    }

    #[inline(always)]
    fn early_verdict(&self, ether_type: u16, data: &[u8]) -> Option<Verdict> {
        self.early_hook
            .as_ref()
            .and_then(|hook| hook.inspect(ether_type, data))
    }

    fn family_verdict(&self, ether_type: u16, l3: &[u8]) -> Verdict {
        match ether_type {
            ether::IPV4 => self.ipv4_verdict(l3),
            ether::IPV6 => self.ipv6_verdict(l3),
            // No opinion on other network-layer protocols
            _ => Verdict::Pass,
        }
    }

    /// IPv4 pipeline: parse, resolve, transport check, rule check
    fn ipv4_verdict(&self, l3: &[u8]) -> Verdict {
        let Some(hdr) = Ipv4Header::parse(l3) else {
            return Verdict::Pass;
        };
        let Some(identity) = self.identities.resolve_v4(hdr.src) else {
            return Verdict::Pass;
        };
        trace!(src = %hdr.src, identity = identity.raw(), "source classified");

        self.transport_verdict(hdr.protocol, identity, &l3[parse::IPV4_HLEN..], proto::ICMP)
    }

    /// IPv6 pipeline, same shape with the v6 ICMP variant
    fn ipv6_verdict(&self, l3: &[u8]) -> Verdict {
        let Some(hdr) = Ipv6Header::parse(l3) else {
            return Verdict::Pass;
        };
        let Some(identity) = self.identities.resolve_v6(hdr.src) else {
            return Verdict::Pass;
        };
        trace!(src = %hdr.src, identity = identity.raw(), "source classified");

        self.transport_verdict(
            hdr.next_header,
            identity,
            &l3[parse::IPV6_HLEN..],
            proto::ICMPV6,
        )
    }

    /// Transport dispatch for a classified source
    ///
    /// The identity is already resolved here, so a header too short for
    /// its declared protocol drops, as does a protocol outside the
    /// family's recognized set.
    fn transport_verdict(
        &self,
        protocol: u8,
        identity: Identity,
        l4: &[u8],
        family_icmp: u8,
    ) -> Verdict {
        let (src_port, dst_port) = if protocol == family_icmp {
            if l4.len() < parse::ICMP_HLEN {
                return Verdict::Drop;
            }
            (0, 0)
        } else if protocol == proto::TCP {
            match PortPair::from_tcp(l4) {
                Some(ports) => (ports.src, ports.dst),
                None => return Verdict::Drop,
            }
        } else if protocol == proto::UDP {
            match PortPair::from_udp(l4) {
                Some(ports) => (ports.src, ports.dst),
                None => return Verdict::Drop,
            }
        } else {
            return Verdict::Drop;
        };

        if self.rules.is_banned(protocol, identity, src_port, dst_port) {
            Verdict::Drop
        } else {
            Verdict::Pass
        }
    }
}

impl Default for PacketFilter {
    fn default() -> Self {
        Self::new(FilterConfig::default())
    }
}
