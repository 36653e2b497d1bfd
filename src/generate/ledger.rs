use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::{DashMap, mapref::entry::Entry};

use crate::foundation::core::CombinationKey;

/// Combinations already emitted by the current generation run.
///
/// Backed by a sharded concurrent map; [`Self::try_claim`] is an atomic insert-if-absent so two
/// workers racing on the same key see exactly one success.
#[derive(Debug, Default)]
pub struct CombinationLedger {
    seen: DashMap<CombinationKey, u32>,
    emitted: AtomicU64,
}

impl CombinationLedger {
    /// Empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `key` for exclusive use. Returns `false` (leaving the ledger untouched) if it was
    /// already claimed or recorded.
    pub fn try_claim(&self, key: &CombinationKey) -> bool {
        match self.seen.entry(key.clone()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(1);
                self.emitted.fetch_add(1, Ordering::Relaxed);
                true
            }
        }
    }

    /// Record an emission of `key` regardless of prior occurrences. Returns the new occurrence
    /// count.
    pub fn record(&self, key: &CombinationKey) -> u32 {
        self.emitted.fetch_add(1, Ordering::Relaxed);
        let mut count = self.seen.entry(key.clone()).or_insert(0);
        *count += 1;
        *count
    }

    /// `true` if `key` has been emitted.
    pub fn contains(&self, key: &CombinationKey) -> bool {
        self.seen.contains_key(key)
    }

    /// Number of times `key` has been emitted.
    pub fn occurrences(&self, key: &CombinationKey) -> u32 {
        self.seen.get(key).map(|c| *c).unwrap_or(0)
    }

    /// Distinct keys emitted so far.
    pub fn distinct_len(&self) -> u64 {
        self.seen.len() as u64
    }

    /// Total emissions, counting repeats.
    pub fn emitted(&self) -> u64 {
        self.emitted.load(Ordering::Relaxed)
    }

    /// Emissions that repeated an earlier key.
    pub fn duplicates(&self) -> u64 {
        self.emitted().saturating_sub(self.distinct_len())
    }

    /// Sorted `(key, occurrences)` pairs, for diagnostics.
    pub fn snapshot(&self) -> Vec<(CombinationKey, u32)> {
        let mut out: Vec<_> = self
            .seen
            .iter()
            .map(|e| (e.key().clone(), *e.value()))
            .collect();
        out.sort();
        out
    }
}

#[cfg(test)]
#[path = "../../tests/unit/generate/ledger.rs"]
mod tests;
