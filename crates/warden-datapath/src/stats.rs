//! Verdict counters
//!
//! Sharded lock-free pass/drop accumulators, one shard per execution
//! context, aggregated on read. No decrement or reset exists here;
//! draining is the metrics reader's business.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use warden_common::Verdict;

/// Per-context counter pair (cache-line aligned)
#[repr(C, align(64))]
#[derive(Debug, Default)]
pub struct CtxCounters {
    passed: AtomicU64,
    dropped: AtomicU64,
}

impl CtxCounters {
    /// Count one passed packet
    #[inline(always)]
    pub fn record_pass(&self) {
        self.passed.fetch_add(1, Ordering::Relaxed);
    }

    /// Count one dropped packet
    #[inline(always)]
    pub fn record_drop(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
    }

    /// Non-atomic view of this shard
    pub fn snapshot(&self) -> CounterSnapshot {
        CounterSnapshot {
            passed: self.passed.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
        }
    }
}

/// Counter snapshot (non-atomic)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CounterSnapshot {
    /// Packets passed
    pub passed: u64,
    /// Packets dropped
    pub dropped: u64,
}

impl CounterSnapshot {
    /// Packets counted in total
    pub fn total(&self) -> u64 {
        self.passed + self.dropped
    }
}

/// Sharded pass/drop counters
pub struct VerdictCounters {
    contexts: Vec<CtxCounters>,
}

impl VerdictCounters {
    /// One shard per execution context; always at least one
    pub fn new(num_contexts: usize) -> Self {
        let n = num_contexts.max(1);
        let mut contexts = Vec::with_capacity(n);
        for _ in 0..n {
            contexts.push(CtxCounters::default());
        }
        Self { contexts }
    }

    /// Number of shards
    pub fn num_contexts(&self) -> usize {
        self.contexts.len()
    }

    /// Shard for one execution context. Indexes wrap, so a caller with
    /// more contexts than shards still lands on a valid one.
    #[inline(always)]
    pub fn context(&self, ctx: usize) -> &CtxCounters {
        &self.contexts[ctx % self.contexts.len()]
    }

    /// Record one verdict on one context's shard
    #[inline(always)]
    pub fn record(&self, ctx: usize, verdict: Verdict) {
        let shard = self.context(ctx);
        match verdict {
            Verdict::Pass => shard.record_pass(),
            Verdict::Drop => shard.record_drop(),
        }
    }

    /// Per-context snapshots, in shard order
    pub fn per_context(&self) -> Vec<CounterSnapshot> {
        self.contexts.iter().map(CtxCounters::snapshot).collect()
    }

    /// Sum across every context
    pub fn totals(&self) -> CounterSnapshot {
        let mut total = CounterSnapshot::default();
        for ctx in &self.contexts {
            let snap = ctx.snapshot();
            total.passed += snap.passed;
            total.dropped += snap.dropped;
        }
        total
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_record_and_totals() {
        let counters = VerdictCounters::new(4);
        counters.record(0, Verdict::Pass);
        counters.record(1, Verdict::Pass);
        counters.record(2, Verdict::Drop);

        let totals = counters.totals();
        assert_eq!(totals.passed, 2);
        assert_eq!(totals.dropped, 1);
        assert_eq!(totals.total(), 3);
    }

    #[test]
    fn test_per_context() {
        let counters = VerdictCounters::new(2);
        counters.record(0, Verdict::Pass);
        counters.record(1, Verdict::Drop);
        counters.record(1, Verdict::Drop);

        let per_ctx = counters.per_context();
        assert_eq!(per_ctx[0].passed, 1);
        assert_eq!(per_ctx[0].dropped, 0);
        assert_eq!(per_ctx[1].dropped, 2);
    }

    #[test]
    fn test_context_index_wraps() {
        let counters = VerdictCounters::new(2);
        counters.record(5, Verdict::Drop);

        assert_eq!(counters.per_context()[1].dropped, 1);
    }

    #[test]
    fn test_zero_contexts_clamps_to_one() {
        let counters = VerdictCounters::new(0);
        counters.record(0, Verdict::Pass);
        assert_eq!(counters.num_contexts(), 1);
        assert_eq!(counters.totals().passed, 1);
    }

    #[test]
    fn test_concurrent_increments_are_exact() {
        let counters = Arc::new(VerdictCounters::new(4));
        let mut handles = Vec::new();
        for ctx in 0..4 {
            let counters = counters.clone();
            handles.push(std::thread::spawn(move || {
                for i in 0..10_000 {
                    let verdict = if i % 2 == 0 {
                        Verdict::Pass
                    } else {
                        Verdict::Drop
                    };
                    counters.record(ctx, verdict);
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }

        let totals = counters.totals();
        assert_eq!(totals.passed, 20_000);
        assert_eq!(totals.dropped, 20_000);
    }
}
