//! Longest-prefix-match store with hot-swapped snapshots
//!
//! Fixed-width byte keys are registered under a declared match length
//! and probed longest-first. Readers load an immutable snapshot and
//! never block; writers rebuild the snapshot copy-on-write under a
//! mutex only other writers contend on, so a swap lands between two
//! packets, never inside one.

use arc_swap::{ArcSwap, Guard};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};
use warden_common::{WardenError, WardenResult};

/// Mask `key` down to its first `bits` bits; the rest become zero.
#[inline]
pub(crate) fn mask_key<const N: usize>(key: &[u8; N], bits: u32) -> [u8; N] {
    let mut out = [0u8; N];
    let full = ((bits / 8) as usize).min(N);
    out[..full].copy_from_slice(&key[..full]);
    let rem = bits % 8;
    if rem != 0 && full < N {
        out[full] = key[full] & (0xff << (8 - rem));
    }
    out
}

/// Immutable snapshot of store contents
///
/// Entries are bucketed by match length with keys pre-masked, and the
/// registered lengths are held longest-first so a lookup meets the most
/// specific candidate before any shorter one.
#[derive(Clone)]
pub(crate) struct PrefixTable<const N: usize, V> {
    /// Registered match lengths, descending
    lengths: Vec<u32>,
    /// Entries bucketed by match length
    buckets: HashMap<u32, HashMap<[u8; N], V>>,
    /// Distinct entries across buckets
    entries: usize,
}

impl<const N: usize, V> PrefixTable<N, V> {
    fn empty() -> Self {
        Self {
            lengths: Vec::new(),
            buckets: HashMap::new(),
            entries: 0,
        }
    }

    /// Longest registered match at or under `query_bits` whose masked
    /// key equals the query's.
    #[inline]
    pub(crate) fn lookup(&self, key: &[u8; N], query_bits: u32) -> Option<(u32, &V)> {
        for &bits in &self.lengths {
            if bits > query_bits {
                continue;
            }
            let masked = mask_key(key, bits);
            if let Some(value) = self.buckets.get(&bits).and_then(|b| b.get(&masked)) {
                return Some((bits, value));
            }
        }
        None
    }
}

/// Longest-prefix-match store over fixed-width keys
pub struct LpmStore<const N: usize, V> {
    /// Current snapshot (atomically swappable)
    table: ArcSwap<PrefixTable<N, V>>,
    /// Serializes writers; readers never take it
    write_lock: Mutex<()>,
    /// Maximum distinct entries
    capacity: usize,
    /// Name carried in capacity errors and logs
    name: &'static str,
}

impl<const N: usize, V: Clone> LpmStore<N, V> {
    /// Create an empty store holding at most `capacity` entries
    pub fn new(name: &'static str, capacity: usize) -> Self {
        Self {
            table: ArcSwap::from_pointee(PrefixTable::empty()),
            write_lock: Mutex::new(()),
            capacity,
            name,
        }
    }

    /// Current snapshot, for a probe sequence that must observe one
    /// consistent table throughout.
    #[inline(always)]
    pub(crate) fn snapshot(&self) -> Guard<Arc<PrefixTable<N, V>>> {
        self.table.load()
    }

    /// Longest match at or under `query_bits`. Never blocks.
    #[inline]
    pub fn lookup(&self, key: &[u8; N], query_bits: u32) -> Option<(u32, V)> {
        let table = self.table.load();
        table
            .lookup(key, query_bits)
            .map(|(bits, value)| (bits, value.clone()))
    }

    /// Insert or update the entry for `key` at `bits`. The key is
    /// masked down to `bits` before storage. New entries count against
    /// capacity; updates never do.
    pub fn insert(&self, key: &[u8; N], bits: u32, value: V) -> WardenResult<()> {
        let max = (N * 8) as u32;
        if bits > max {
            return Err(WardenError::InvalidMatchLength { bits, max });
        }
        let masked = mask_key(key, bits);

        let _guard = self.write_lock.lock();
        let current = self.table.load_full();
        let mut next = (*current).clone();

        let bucket = next.buckets.entry(bits).or_default();
        if !bucket.contains_key(&masked) {
            if next.entries >= self.capacity {
                return Err(WardenError::MapFull {
                    map: self.name,
                    capacity: self.capacity,
                });
            }
            next.entries += 1;
        }
        bucket.insert(masked, value);
        if !next.lengths.contains(&bits) {
            next.lengths.push(bits);
            next.lengths.sort_unstable_by(|a, b| b.cmp(a));
        }

        self.table.store(Arc::new(next));
        debug!(map = self.name, bits, "entry stored");
        Ok(())
    }

    /// Remove the entry stored for `key` at `bits`. Returns whether an
    /// entry was removed.
    pub fn remove(&self, key: &[u8; N], bits: u32) -> bool {
        let masked = mask_key(key, bits);

        let _guard = self.write_lock.lock();
        let current = self.table.load_full();
        if !current
            .buckets
            .get(&bits)
            .is_some_and(|b| b.contains_key(&masked))
        {
            return false;
        }

        let mut next = (*current).clone();
        if let Some(bucket) = next.buckets.get_mut(&bits) {
            bucket.remove(&masked);
            if bucket.is_empty() {
                next.buckets.remove(&bits);
                next.lengths.retain(|&l| l != bits);
            }
        }
        next.entries -= 1;

        self.table.store(Arc::new(next));
        debug!(map = self.name, bits, "entry removed");
        true
    }

    /// Drop every entry
    pub fn clear(&self) {
        let _guard = self.write_lock.lock();
        self.table.store(Arc::new(PrefixTable::empty()));
        info!(map = self.name, "map cleared");
    }

    /// Number of stored entries
    pub fn len(&self) -> usize {
        self.table.load().entries
    }

    /// Whether the store holds no entries
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Every stored entry as (masked key, match bits, value), longest
    /// lengths first.
    pub fn entries(&self) -> Vec<([u8; N], u32, V)> {
        let table = self.table.load();
        let mut out = Vec::with_capacity(table.entries);
        for &bits in &table.lengths {
            if let Some(bucket) = table.buckets.get(&bits) {
                for (key, value) in bucket {
                    out.push((*key, bits, value.clone()));
                }
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::sync::Arc;

    #[test]
    fn test_mask_key() {
        let key = [0xff, 0xff, 0xff, 0xff];
        assert_eq!(mask_key(&key, 0), [0, 0, 0, 0]);
        assert_eq!(mask_key(&key, 8), [0xff, 0, 0, 0]);
        assert_eq!(mask_key(&key, 12), [0xff, 0xf0, 0, 0]);
        assert_eq!(mask_key(&key, 17), [0xff, 0xff, 0x80, 0]);
        assert_eq!(mask_key(&key, 32), key);
        // Oversized lengths clamp to the key width
        assert_eq!(mask_key(&key, 64), key);
    }

    #[test]
    fn test_insert_lookup() {
        let store = LpmStore::<4, u32>::new("test", 16);
        store.insert(&[10, 0, 0, 0], 16, 1).unwrap();

        assert_eq!(store.lookup(&[10, 0, 9, 9], 32), Some((16, 1)));
        assert_eq!(store.lookup(&[10, 1, 0, 0], 32), None);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_longest_match_wins() {
        let store = LpmStore::<4, u32>::new("test", 16);
        store.insert(&[10, 0, 0, 0], 8, 1).unwrap();
        store.insert(&[10, 0, 0, 0], 16, 2).unwrap();
        store.insert(&[10, 0, 0, 0], 24, 3).unwrap();

        assert_eq!(store.lookup(&[10, 0, 0, 5], 32), Some((24, 3)));
        assert_eq!(store.lookup(&[10, 0, 7, 5], 32), Some((16, 2)));
        assert_eq!(store.lookup(&[10, 9, 9, 9], 32), Some((8, 1)));
    }

    #[test]
    fn test_query_bits_bound_the_search() {
        let store = LpmStore::<4, u32>::new("test", 16);
        store.insert(&[10, 0, 0, 0], 24, 3).unwrap();

        // A query shorter than the stored length never sees the entry
        assert_eq!(store.lookup(&[10, 0, 0, 0], 16), None);
        assert_eq!(store.lookup(&[10, 0, 0, 0], 24), Some((24, 3)));
    }

    #[test]
    fn test_update_in_place() {
        let store = LpmStore::<4, u32>::new("test", 1);
        store.insert(&[10, 0, 0, 0], 16, 1).unwrap();
        // Same key at capacity: an update, not a new entry
        store.insert(&[10, 0, 0, 0], 16, 9).unwrap();

        assert_eq!(store.len(), 1);
        assert_eq!(store.lookup(&[10, 0, 0, 1], 32), Some((16, 9)));
    }

    #[test]
    fn test_capacity_enforced() {
        let store = LpmStore::<4, u32>::new("test", 2);
        store.insert(&[1, 0, 0, 0], 8, 1).unwrap();
        store.insert(&[2, 0, 0, 0], 8, 2).unwrap();

        let err = store.insert(&[3, 0, 0, 0], 8, 3).unwrap_err();
        assert!(matches!(
            err,
            WardenError::MapFull {
                map: "test",
                capacity: 2
            }
        ));
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_invalid_match_length() {
        let store = LpmStore::<4, u32>::new("test", 16);
        let err = store.insert(&[0; 4], 33, 1).unwrap_err();
        assert!(matches!(
            err,
            WardenError::InvalidMatchLength { bits: 33, max: 32 }
        ));
    }

    #[test]
    fn test_remove() {
        let store = LpmStore::<4, u32>::new("test", 16);
        store.insert(&[10, 0, 0, 0], 16, 1).unwrap();

        assert!(store.remove(&[10, 0, 0, 0], 16));
        assert!(!store.remove(&[10, 0, 0, 0], 16));
        assert_eq!(store.lookup(&[10, 0, 0, 5], 32), None);
        assert!(store.is_empty());
    }

    #[test]
    fn test_clear() {
        let store = LpmStore::<4, u32>::new("test", 16);
        store.insert(&[10, 0, 0, 0], 16, 1).unwrap();
        store.insert(&[11, 0, 0, 0], 8, 2).unwrap();

        store.clear();
        assert!(store.is_empty());
        assert_eq!(store.lookup(&[10, 0, 0, 0], 32), None);
    }

    #[test]
    fn test_keys_premasked_on_insert() {
        let store = LpmStore::<4, u32>::new("test", 16);
        // Noise past the declared length is masked away
        store.insert(&[10, 0, 0xab, 0xcd], 8, 1).unwrap();

        assert_eq!(store.lookup(&[10, 7, 7, 7], 32), Some((8, 1)));
        let entries = store.entries();
        assert_eq!(entries, vec![([10, 0, 0, 0], 8, 1)]);
    }

    #[test]
    fn test_zero_length_catch_all() {
        let store = LpmStore::<4, u32>::new("test", 16);
        store.insert(&[0xff; 4], 0, 42).unwrap();

        assert_eq!(store.lookup(&[1, 2, 3, 4], 32), Some((0, 42)));
        assert_eq!(store.lookup(&[0; 4], 0), Some((0, 42)));
    }

    #[test]
    fn test_concurrent_readers() {
        let store = Arc::new(LpmStore::<4, u32>::new("test", 1024));
        store.insert(&[10, 0, 0, 0], 8, 7).unwrap();

        let mut handles = Vec::new();
        for _ in 0..4 {
            let store = store.clone();
            handles.push(std::thread::spawn(move || {
                for _ in 0..10_000 {
                    // Always present, whatever snapshot the writer has out
                    assert_eq!(store.lookup(&[10, 1, 2, 3], 32), Some((8, 7)));
                }
            }));
        }

        // Writer churns unrelated entries while readers probe
        for i in 0..100u8 {
            store.insert(&[11, i, 0, 0], 16, u32::from(i)).unwrap();
            store.remove(&[11, i, 0, 0], 16);
        }

        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(store.len(), 1);
    }

    /// Brute-force reference: apply ops in order, answer queries by
    /// scanning every stored length.
    fn model_lookup(
        model: &HashMap<(u32, [u8; 4]), u32>,
        key: &[u8; 4],
        query_bits: u32,
    ) -> Option<(u32, u32)> {
        (0..=query_bits.min(32))
            .rev()
            .find_map(|bits| model.get(&(bits, mask_key(key, bits))).map(|v| (bits, *v)))
    }

    proptest! {
        #[test]
        fn lookup_matches_reference_model(
            ops in proptest::collection::vec(
                (proptest::array::uniform4(any::<u8>()), 0u32..=32, any::<u32>()),
                1..64,
            ),
            queries in proptest::collection::vec(
                (proptest::array::uniform4(any::<u8>()), 0u32..=32),
                1..32,
            ),
        ) {
            let store = LpmStore::<4, u32>::new("model", 4096);
            let mut model = HashMap::new();
            for (key, bits, value) in &ops {
                store.insert(key, *bits, *value).unwrap();
                model.insert((*bits, mask_key(key, *bits)), *value);
            }

            for (key, query_bits) in &queries {
                prop_assert_eq!(
                    store.lookup(key, *query_bits),
                    model_lookup(&model, key, *query_bits)
                );
            }
        }
    }
}
