//! Hierarchical ban-rule engine
//!
//! Four specificity levels live in one prefix-matched store over the
//! encoded [protocol | identity | src port | dst port] key. A lookup
//! probes most-specific first: each probe zeroes the fields past its
//! level's cut and declares a match length that stops there, so one
//! store answers for exact tuples and for port or protocol wildcards
//! alike. Port zero is the wildcard sentinel; a rule's stored
//! specificity follows from which ports it leaves set.
//!
//! # Design
//!
//! A probe's own longest-prefix semantics already degrade toward
//! coarser rules: the full-tuple probe can come back with a
//! source-port-only or protocol-wide rule when no exact one exists.
//! The dedicated later probes only cover key patterns the earlier ones
//! cannot reach, which keeps the whole sequence at a fixed four steps.

use crate::store::LpmStore;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};
use warden_common::{
    proto, Identity, RuleKey, Specificity, WardenResult, FULL_MATCH_BITS, IDENTITY_MATCH_BITS,
    RULE_KEY_LEN, SRC_PORT_MATCH_BITS,
};

/// Default rule-table capacity
pub const DEFAULT_RULE_CAPACITY: usize = 1024;

/// A ban rule as the control plane expresses it
///
/// Zero ports are wildcards. Protocols without ports always store at
/// protocol+identity, whatever the ports say.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RuleSpec {
    /// IP protocol number
    pub protocol: u8,
    /// Identity the rule applies to
    pub identity: Identity,
    /// Source port, zero for any
    pub src_port: u16,
    /// Destination port, zero for any
    pub dst_port: u16,
}

impl RuleSpec {
    /// Ban a whole protocol for an identity
    pub const fn protocol_wide(protocol: u8, identity: Identity) -> Self {
        Self {
            protocol,
            identity,
            src_port: 0,
            dst_port: 0,
        }
    }

    /// The specificity this rule stores at
    pub fn specificity(&self) -> Specificity {
        if self.protocol != proto::TCP && self.protocol != proto::UDP {
            return Specificity::Identity;
        }
        Specificity::from_ports(self.src_port, self.dst_port)
    }

    /// Key bytes and match length, fields past the cut zeroed
    fn encoded(&self) -> (RuleKey, u32) {
        let spec = self.specificity();
        let (src_port, dst_port) = match spec {
            Specificity::Exact => (self.src_port, self.dst_port),
            Specificity::DstPort => (0, self.dst_port),
            Specificity::SrcPort => (self.src_port, 0),
            Specificity::Identity => (0, 0),
        };
        (
            RuleKey::encode(self.protocol, self.identity, src_port, dst_port),
            spec.match_bits(),
        )
    }
}

/// Stored per-rule bookkeeping
///
/// Dumps report whatever the control plane stored; the hot path reads
/// rules but never writes these back on a match.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleEntry {
    /// Last recorded refusal (nanoseconds since epoch)
    pub last_access_ns: u64,
    /// Recorded refusal count
    pub refusals: u64,
}

/// Ban-rule table with hierarchical lookup
pub struct RuleTable {
    rules: LpmStore<RULE_KEY_LEN, RuleEntry>,
}

impl RuleTable {
    /// Create an empty table holding at most `capacity` rules
    pub fn new(capacity: usize) -> Self {
        Self {
            rules: LpmStore::new("banlist", capacity),
        }
    }

    /// Insert or refresh a rule, reporting the specificity it stored at
    pub fn insert(&self, rule: &RuleSpec) -> WardenResult<Specificity> {
        let spec = rule.specificity();
        let (key, bits) = rule.encoded();
        self.rules
            .insert(key.as_bytes(), bits, RuleEntry::default())?;
        debug!(
            protocol = rule.protocol,
            identity = rule.identity.raw(),
            src_port = rule.src_port,
            dst_port = rule.dst_port,
            specificity = ?spec,
            "ban rule stored"
        );
        Ok(spec)
    }

    /// Remove a rule. The specificity is re-derived from the ports, so
    /// removal always targets exactly what insert stored. Returns
    /// whether a rule was removed.
    pub fn remove(&self, rule: &RuleSpec) -> bool {
        let (key, bits) = rule.encoded();
        let removed = self.rules.remove(key.as_bytes(), bits);
        if removed {
            debug!(
                protocol = rule.protocol,
                identity = rule.identity.raw(),
                "ban rule removed"
            );
        }
        removed
    }

    /// Drop every rule
    pub fn clear(&self) {
        self.rules.clear();
    }

    /// Number of stored rules
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Whether no rule is stored
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Every stored rule with its specificity and bookkeeping value
    pub fn rules(&self) -> Vec<(RuleSpec, Specificity, RuleEntry)> {
        self.rules
            .entries()
            .into_iter()
            .map(|(bytes, bits, entry)| {
                let key = RuleKey::from_bytes(bytes);
                let rule = RuleSpec {
                    protocol: key.protocol(),
                    identity: key.identity(),
                    src_port: key.src_port(),
                    dst_port: key.dst_port(),
                };
                (rule, Specificity::of_match(bits, key.src_port()), entry)
            })
            .collect()
    }

    /// Hierarchical lookup, most specific first
    ///
    /// Probes run in strict order over one snapshot: the full tuple,
    /// then destination-port-only (skipped when the packet's
    /// destination port is zero), then source-port-only (skipped when
    /// its source port is zero), then protocol+identity. The first hit
    /// wins; no hit means the traffic is not banned.
    #[inline]
    pub fn lookup(
        &self,
        protocol: u8,
        identity: Identity,
        src_port: u16,
        dst_port: u16,
    ) -> Option<Specificity> {
        let table = self.rules.snapshot();

        // Probe 1: full tuple
        let key = RuleKey::encode(protocol, identity, src_port, dst_port);
        if let Some((bits, _)) = table.lookup(key.as_bytes(), FULL_MATCH_BITS) {
            return Some(Specificity::of_match(bits, src_port));
        }

        // Probe 2: destination port only
        if dst_port != 0 {
            let key = RuleKey::encode(protocol, identity, 0, dst_port);
            if let Some((bits, _)) = table.lookup(key.as_bytes(), FULL_MATCH_BITS) {
                return Some(Specificity::of_match(bits, 0));
            }
        }

        // Probe 3: source port only
        if src_port != 0 {
            let key = RuleKey::encode(protocol, identity, src_port, 0);
            if let Some((bits, _)) = table.lookup(key.as_bytes(), SRC_PORT_MATCH_BITS) {
                return Some(Specificity::of_match(bits, src_port));
            }
        }

        // Probe 4: protocol and identity alone
        let key = RuleKey::encode(protocol, identity, 0, 0);
        if let Some((bits, _)) = table.lookup(key.as_bytes(), IDENTITY_MATCH_BITS) {
            return Some(Specificity::of_match(bits, 0));
        }

        trace!(
            identity = identity.raw(),
            protocol,
            "no ban rule matched"
        );
        None
    }

    /// Whether traffic with this tuple is banned at any specificity
    #[inline(always)]
    pub fn is_banned(
        &self,
        protocol: u8,
        identity: Identity,
        src_port: u16,
        dst_port: u16,
    ) -> bool {
        self.lookup(protocol, identity, src_port, dst_port).is_some()
    }
}
