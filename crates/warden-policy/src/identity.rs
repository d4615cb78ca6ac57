//! Source-identity cache
//!
//! CIDR prefixes bound to numeric identities, resolved per packet by
//! longest-prefix match at the source address's full length. Resolution
//! is read-only and fail-open: a source outside every bound prefix stays
//! unclassified.

use crate::store::LpmStore;
use ipnetwork::IpNetwork;
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use tracing::debug;
use warden_common::{
    AddressFamily, CacheKey, Identity, WardenResult, CACHE_KEY_LEN, CACHE_STATIC_BITS,
    V4_LOOKUP_BITS, V6_LOOKUP_BITS,
};

/// Default identity-cache capacity
pub const DEFAULT_IDENTITY_CAPACITY: usize = 512_000;

/// One registered binding, as reported by [`IdentityCache::bindings`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrefixBinding {
    /// Bound network
    pub network: IpNetwork,
    /// Identity every source inside the network resolves to
    pub identity: Identity,
}

/// Longest-prefix source classification
pub struct IdentityCache {
    prefixes: LpmStore<CACHE_KEY_LEN, Identity>,
}

impl IdentityCache {
    /// Create an empty cache holding at most `capacity` prefixes
    pub fn new(capacity: usize) -> Self {
        Self {
            prefixes: LpmStore::new("identity", capacity),
        }
    }

    /// Bind every source inside `network` to `identity`
    pub fn bind(&self, network: IpNetwork, identity: Identity) -> WardenResult<()> {
        let (key, bits) = network_key(&network);
        self.prefixes.insert(key.as_bytes(), bits, identity)?;
        debug!(%network, identity = identity.raw(), "identity bound");
        Ok(())
    }

    /// Parse `cidr` and bind it
    pub fn bind_cidr(&self, cidr: &str, identity: Identity) -> WardenResult<()> {
        let network: IpNetwork = cidr.parse()?;
        self.bind(network, identity)
    }

    /// Remove a binding. Returns whether it existed.
    pub fn unbind(&self, network: IpNetwork) -> bool {
        let (key, bits) = network_key(&network);
        let removed = self.prefixes.remove(key.as_bytes(), bits);
        if removed {
            debug!(%network, "identity binding removed");
        }
        removed
    }

    /// Drop every binding
    pub fn clear(&self) {
        self.prefixes.clear();
    }

    /// Number of bound prefixes
    pub fn len(&self) -> usize {
        self.prefixes.len()
    }

    /// Whether no prefix is bound
    pub fn is_empty(&self) -> bool {
        self.prefixes.is_empty()
    }

    /// Every registered binding
    pub fn bindings(&self) -> Vec<PrefixBinding> {
        self.prefixes
            .entries()
            .into_iter()
            .filter_map(|(bytes, bits, identity)| {
                let key = CacheKey::from_bytes(bytes);
                let prefix = (bits - CACHE_STATIC_BITS) as u8;
                let network = match key.family()? {
                    AddressFamily::V4 => {
                        IpNetwork::new(IpAddr::V4(key.v4_addr()), prefix).ok()?
                    }
                    AddressFamily::V6 => {
                        IpNetwork::new(IpAddr::V6(key.v6_addr()), prefix).ok()?
                    }
                };
                Some(PrefixBinding { network, identity })
            })
            .collect()
    }

    /// Resolve a source address. Never blocks; absent means the source
    /// is unclassified.
    #[inline(always)]
    pub fn resolve(&self, addr: IpAddr) -> Option<Identity> {
        match addr {
            IpAddr::V4(v4) => self.resolve_v4(v4),
            IpAddr::V6(v6) => self.resolve_v6(v6),
        }
    }

    /// Resolve an IPv4 source
    #[inline(always)]
    pub fn resolve_v4(&self, addr: Ipv4Addr) -> Option<Identity> {
        let key = CacheKey::encode_v4(addr);
        self.prefixes
            .lookup(key.as_bytes(), V4_LOOKUP_BITS)
            .map(|(_, identity)| identity)
    }

    /// Resolve an IPv6 source
    #[inline(always)]
    pub fn resolve_v6(&self, addr: Ipv6Addr) -> Option<Identity> {
        let key = CacheKey::encode_v6(addr);
        self.prefixes
            .lookup(key.as_bytes(), V6_LOOKUP_BITS)
            .map(|(_, identity)| identity)
    }
}

impl Default for IdentityCache {
    fn default() -> Self {
        Self::new(DEFAULT_IDENTITY_CAPACITY)
    }
}

/// Cache key and match length for a bound network
fn network_key(network: &IpNetwork) -> (CacheKey, u32) {
    let bits = CACHE_STATIC_BITS + u32::from(network.prefix());
    let key = match network {
        IpNetwork::V4(net) => CacheKey::encode_v4(net.network()),
        IpNetwork::V6(net) => CacheKey::encode_v6(net.network()),
    };
    (key, bits)
}
