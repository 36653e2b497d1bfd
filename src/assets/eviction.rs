use std::{fmt, str::FromStr};

use crate::foundation::error::GenError;

#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize,
)]
#[serde(rename_all = "snake_case")]
/// Rule choosing which resident payload to discard when the cache needs room.
pub enum EvictionPolicy {
    /// Least recently accessed first.
    #[default]
    Lru,
    /// Least frequently accessed first; ties go to the oldest access.
    Lfu,
    /// Largest payload first; ties go to the oldest access.
    SizeAware,
    /// Oldest insertion first.
    Fifo,
}

/// Bookkeeping the policies rank entries by.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct EntryMeta {
    pub(crate) size: usize,
    pub(crate) inserted_at: u64,
    pub(crate) last_access: u64,
    pub(crate) access_count: u64,
}

impl EvictionPolicy {
    /// Every policy, in declaration order.
    pub const ALL: [Self; 4] = [Self::Lru, Self::Lfu, Self::SizeAware, Self::Fifo];

    /// Configuration name of the policy.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Lru => "lru",
            Self::Lfu => "lfu",
            Self::SizeAware => "size_aware",
            Self::Fifo => "fifo",
        }
    }

    /// Eviction rank; the entry with the smallest rank goes first.
    fn rank(self, m: &EntryMeta) -> (u64, u64) {
        match self {
            Self::Lru => (m.last_access, m.inserted_at),
            Self::Lfu => (m.access_count, m.last_access),
            Self::SizeAware => (u64::MAX - m.size as u64, m.last_access),
            Self::Fifo => (m.inserted_at, m.last_access),
        }
    }

    /// Pick the next victim among `entries`, or `None` when there is nothing to evict.
    pub(crate) fn select_victim<'a, K: 'a>(
        self,
        entries: impl IntoIterator<Item = (&'a K, EntryMeta)>,
    ) -> Option<&'a K> {
        entries
            .into_iter()
            .min_by_key(|(_, m)| self.rank(m))
            .map(|(k, _)| k)
    }
}

impl FromStr for EvictionPolicy {
    type Err = GenError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "lru" => Ok(Self::Lru),
            "lfu" => Ok(Self::Lfu),
            "size_aware" | "size" => Ok(Self::SizeAware),
            "fifo" => Ok(Self::Fifo),
            other => Err(GenError::validation(format!(
                "unknown eviction policy '{other}' (expected lru, lfu, size_aware or fifo)"
            ))),
        }
    }
}

impl fmt::Display for EvictionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
#[path = "../../tests/unit/assets/eviction.rs"]
mod tests;
