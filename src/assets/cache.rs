use std::{
    collections::HashMap,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::{Duration, Instant},
};

use crossbeam_channel::RecvTimeoutError;
use parking_lot::{Condvar, Mutex, RwLock};

use crate::{
    assets::decode::TraitPayload,
    assets::eviction::{EntryMeta, EvictionPolicy},
    assets::loader::TraitLoader,
    foundation::core::TraitKey,
    foundation::error::CacheError,
    generate::cancel::CancelToken,
    grid::layout::GridLayout,
};

/// Longest single blocking step while waiting on a decode; cancellation is checked between steps.
const POLL_SLICE: Duration = Duration::from_millis(25);

#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
/// Sizing and loading behavior of a [`TraitCache`].
#[serde(default)]
pub struct CacheConfig {
    /// Byte budget for resident payloads.
    pub capacity_bytes: usize,
    /// Optional bound on the number of resident payloads.
    pub max_entries: Option<usize>,
    /// Victim selection rule.
    pub policy: EvictionPolicy,
    /// Per-attempt decode timeout in milliseconds.
    pub load_timeout_ms: u64,
    /// Extra attempts after a timed-out decode.
    pub load_retries: u32,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity_bytes: 256 * 1024 * 1024,
            max_entries: None,
            policy: EvictionPolicy::Lru,
            load_timeout_ms: 30_000,
            load_retries: 2,
        }
    }
}

impl CacheConfig {
    /// Config with `capacity_bytes` and `policy`, defaults elsewhere.
    pub fn new(capacity_bytes: usize, policy: EvictionPolicy) -> Self {
        Self {
            capacity_bytes,
            policy,
            ..Self::default()
        }
    }

    /// Per-attempt decode timeout.
    pub fn load_timeout(&self) -> Duration {
        Duration::from_millis(self.load_timeout_ms)
    }

    fn attempts(&self) -> u32 {
        self.load_retries.saturating_add(1)
    }

    /// Longest a requester waits on another requester's decode:
    /// `load_timeout × (load_retries + 2)`, one timeout beyond the leader's worst case.
    pub fn waiter_budget(&self) -> Duration {
        self.load_timeout().saturating_mul(self.attempts().saturating_add(1))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
/// How [`TraitCache::get`] served a payload.
pub enum ResolveStatus {
    /// Already resident.
    Hit,
    /// Decoded (by this caller or a concurrent one) and stored.
    Loaded,
    /// Decoded but larger than the whole budget; returned without being stored.
    Passthrough,
}

#[derive(Clone, Debug, PartialEq, Eq)]
/// Payload returned by [`TraitCache::get`].
pub struct Resolved {
    /// Decoded trait image.
    pub payload: TraitPayload,
    /// How it was served.
    pub status: ResolveStatus,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
/// Outcome of [`TraitCache::preload`].
pub struct PreloadSummary {
    /// Keys decoded and stored by this pass.
    pub loaded: usize,
    /// Keys that were already resident.
    pub already_resident: usize,
    /// Keys decoded but too large to store.
    pub passthrough: usize,
    /// Keys that could not be loaded, with the reason.
    pub failures: Vec<CacheError>,
}

impl PreloadSummary {
    /// Number of keys that failed to load.
    pub fn failed(&self) -> usize {
        self.failures.len()
    }
}

#[derive(Clone, Debug, Default, PartialEq, serde::Serialize)]
/// Point-in-time counters of a [`TraitCache`].
pub struct CacheStats {
    /// Lookups served from resident entries.
    pub hits: u64,
    /// Lookups that had to wait for or perform a decode.
    pub misses: u64,
    /// Misses that joined a decode already in flight.
    pub coalesced: u64,
    /// Decodes that produced a payload.
    pub loads: u64,
    /// Entries discarded to make room.
    pub evictions: u64,
    /// Oversized payloads served without being stored.
    pub passthroughs: u64,
    /// Decodes that failed.
    pub load_failures: u64,
    /// Decode attempts that ran past the timeout.
    pub timeouts: u64,
    /// Resident payload count.
    pub entries: usize,
    /// Resident payload bytes.
    pub resident_bytes: usize,
    /// Byte budget.
    pub capacity_bytes: usize,
}

impl CacheStats {
    /// `hits / (hits + misses)`, `0.0` before any lookup.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

#[derive(Debug, Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    coalesced: AtomicU64,
    loads: AtomicU64,
    evictions: AtomicU64,
    passthroughs: AtomicU64,
    load_failures: AtomicU64,
    timeouts: AtomicU64,
}

impl Counters {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

#[derive(Debug)]
struct CacheEntry {
    payload: TraitPayload,
    size: usize,
    inserted_at: u64,
    last_access: AtomicU64,
    access_count: AtomicU64,
}

impl CacheEntry {
    fn meta(&self) -> EntryMeta {
        EntryMeta {
            size: self.size,
            inserted_at: self.inserted_at,
            last_access: self.last_access.load(Ordering::Relaxed),
            access_count: self.access_count.load(Ordering::Relaxed),
        }
    }

    fn touch(&self, tick: u64) {
        self.last_access.fetch_max(tick, Ordering::Relaxed);
        self.access_count.fetch_add(1, Ordering::Relaxed);
    }
}

#[derive(Debug, Default)]
struct Resident {
    entries: HashMap<TraitKey, CacheEntry>,
    bytes: usize,
}

impl Resident {
    fn take(&mut self, key: &TraitKey) -> Option<CacheEntry> {
        let entry = self.entries.remove(key)?;
        self.bytes -= entry.size;
        Some(entry)
    }
}

#[derive(Clone, Debug)]
enum SlotOutcome {
    Settled(Result<Resolved, CacheError>),
    /// The leader was cancelled; waiters go back and elect a new one.
    Abandoned,
}

/// Rendezvous for requesters of one key while its decode is in flight.
#[derive(Debug, Default)]
struct LoadSlot {
    outcome: Mutex<Option<SlotOutcome>>,
    ready: Condvar,
}

impl LoadSlot {
    fn settle(&self, outcome: SlotOutcome) {
        *self.outcome.lock() = Some(outcome);
        self.ready.notify_all();
    }

    /// `None` when the leader abandoned the load.
    fn wait(
        &self,
        key: &TraitKey,
        budget: Duration,
        cancel: &CancelToken,
        config: &CacheConfig,
    ) -> Option<Result<Resolved, CacheError>> {
        let started = Instant::now();
        let mut outcome = self.outcome.lock();
        loop {
            match outcome.as_ref() {
                Some(SlotOutcome::Settled(settled)) => return Some(settled.clone()),
                Some(SlotOutcome::Abandoned) => return None,
                None => {}
            }
            if cancel.is_cancelled() {
                return Some(Err(CacheError::Cancelled { key: key.clone() }));
            }
            let elapsed = started.elapsed();
            if elapsed >= budget {
                return Some(Err(CacheError::LoadTimeout {
                    key: key.clone(),
                    timeout: config.load_timeout(),
                    attempts: config.attempts(),
                }));
            }
            let _ = self
                .ready
                .wait_for(&mut outcome, (budget - elapsed).min(POLL_SLICE));
        }
    }
}

enum AttemptError {
    TimedOut,
    Cancelled,
    Failed(String),
}

/// Bounded-memory store of decoded trait payloads keyed by `(position, variant)`.
///
/// Resident reads share a read lock. Eviction and insertion run under one write lock so the byte
/// budget holds exactly after every mutation. Decoding happens outside every cache lock on a
/// background thread; concurrent misses on one key wait on a single in-flight decode.
pub struct TraitCache {
    config: CacheConfig,
    loader: Arc<dyn TraitLoader>,
    sources: HashMap<TraitKey, String>,
    resident: RwLock<Resident>,
    in_flight: Mutex<HashMap<TraitKey, Arc<LoadSlot>>>,
    clock: AtomicU64,
    counters: Counters,
}

impl std::fmt::Debug for TraitCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TraitCache")
            .field("config", &self.config)
            .field("sources", &self.sources.len())
            .field("stats", &self.stats())
            .finish()
    }
}

impl TraitCache {
    /// Empty cache decoding through `loader`.
    pub fn new(config: CacheConfig, loader: Arc<dyn TraitLoader>) -> Self {
        Self {
            config,
            loader,
            sources: HashMap::new(),
            resident: RwLock::new(Resident::default()),
            in_flight: Mutex::new(HashMap::new()),
            clock: AtomicU64::new(0),
            counters: Counters::default(),
        }
    }

    /// Register the source reference of every variant in `layout`.
    pub fn with_layout(self, layout: &GridLayout) -> Self {
        let sources = layout.positions().iter().flat_map(|p| {
            p.variants()
                .iter()
                .map(|v| (TraitKey::new(p.index(), v.id.clone()), v.source.clone()))
        });
        self.with_sources(sources)
    }

    /// Register source references handed to the loader on a miss.
    pub fn with_sources(mut self, sources: impl IntoIterator<Item = (TraitKey, String)>) -> Self {
        self.sources.extend(sources);
        self
    }

    /// Active configuration.
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Active eviction policy.
    pub fn policy(&self) -> EvictionPolicy {
        self.config.policy
    }

    /// Byte budget.
    pub fn capacity(&self) -> usize {
        self.config.capacity_bytes
    }

    /// Resident payload count.
    pub fn len(&self) -> usize {
        self.resident.read().entries.len()
    }

    /// `true` when nothing is resident.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Resident payload bytes.
    pub fn resident_bytes(&self) -> usize {
        self.resident.read().bytes
    }

    /// `true` if `key` is resident. Does not count as an access.
    pub fn contains(&self, key: &TraitKey) -> bool {
        self.resident.read().entries.contains_key(key)
    }

    /// Resident keys in ascending order.
    pub fn keys(&self) -> Vec<TraitKey> {
        let mut keys: Vec<TraitKey> = self.resident.read().entries.keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Resolve `key`, decoding it on a miss.
    pub fn get(&self, key: &TraitKey) -> Result<Resolved, CacheError> {
        self.get_with_cancel(key, &CancelToken::new())
    }

    /// Resolve `key`, abandoning waits once `cancel` fires.
    ///
    /// Only real load outcomes are shared with concurrent requesters. When the decoding requester
    /// is cancelled, the others elect a new one instead of inheriting the cancellation.
    pub fn get_with_cancel(
        &self,
        key: &TraitKey,
        cancel: &CancelToken,
    ) -> Result<Resolved, CacheError> {
        let mut counted_miss = false;
        loop {
            if let Some(hit) = self.lookup(key) {
                return Ok(hit);
            }

            let (slot, leader) = {
                let mut in_flight = self.in_flight.lock();
                // A leader commits before it clears its slot, so this re-check cannot miss a
                // load that finished since the first lookup.
                if let Some(hit) = self.lookup(key) {
                    return Ok(hit);
                }
                match in_flight.get(key) {
                    Some(slot) => (Arc::clone(slot), false),
                    None => {
                        let slot = Arc::new(LoadSlot::default());
                        in_flight.insert(key.clone(), Arc::clone(&slot));
                        (slot, true)
                    }
                }
            };
            if !counted_miss {
                Counters::bump(&self.counters.misses);
                counted_miss = true;
            }

            if !leader {
                Counters::bump(&self.counters.coalesced);
                match slot.wait(key, self.config.waiter_budget(), cancel, &self.config) {
                    Some(outcome) => return outcome,
                    None => {
                        tracing::debug!(%key, "trait load abandoned by its leader, retrying");
                        continue;
                    }
                }
            }

            let outcome = self.load_with_retries(key, cancel).map(|payload| {
                let status = self.commit(key, payload.clone());
                Resolved { payload, status }
            });
            self.in_flight.lock().remove(key);
            match &outcome {
                Err(CacheError::Cancelled { .. }) => slot.settle(SlotOutcome::Abandoned),
                _ => slot.settle(SlotOutcome::Settled(outcome.clone())),
            }
            return outcome;
        }
    }

    /// Resolve every key in `keys` ahead of a run, through the same coalesced, timeout-bounded
    /// path as [`Self::get_with_cancel`].
    ///
    /// Failed keys are collected in the summary; only cancellation ends the pass early.
    pub fn preload<'k>(
        &self,
        keys: impl IntoIterator<Item = &'k TraitKey>,
        cancel: &CancelToken,
    ) -> Result<PreloadSummary, CacheError> {
        let mut summary = PreloadSummary::default();
        for key in keys {
            if self.contains(key) {
                summary.already_resident += 1;
                continue;
            }
            match self.get_with_cancel(key, cancel) {
                Ok(r) => match r.status {
                    ResolveStatus::Hit => summary.already_resident += 1,
                    ResolveStatus::Loaded => summary.loaded += 1,
                    ResolveStatus::Passthrough => summary.passthrough += 1,
                },
                Err(e @ CacheError::Cancelled { .. }) => return Err(e),
                Err(e) => {
                    tracing::warn!(err = %e, "trait preload failed");
                    summary.failures.push(e);
                }
            }
        }
        tracing::info!(
            loaded = summary.loaded,
            already_resident = summary.already_resident,
            passthrough = summary.passthrough,
            failed = summary.failed(),
            "trait preload complete"
        );
        Ok(summary)
    }

    /// [`Self::preload`] over every registered source, in key order.
    pub fn preload_registered(&self, cancel: &CancelToken) -> Result<PreloadSummary, CacheError> {
        let mut keys: Vec<&TraitKey> = self.sources.keys().collect();
        keys.sort();
        self.preload(keys, cancel)
    }

    /// Store `payload` under `key`, evicting per policy until it fits.
    ///
    /// Fails with [`CacheError::OversizedAsset`] (storing nothing) when the payload alone exceeds
    /// the byte budget.
    pub fn insert(&self, key: TraitKey, payload: TraitPayload) -> Result<(), CacheError> {
        let size = payload.size_bytes();
        if size > self.config.capacity_bytes {
            return Err(CacheError::OversizedAsset {
                key,
                size,
                capacity: self.config.capacity_bytes,
            });
        }
        self.store(&key, payload);
        Ok(())
    }

    /// Drop `key` if resident, returning its payload.
    pub fn remove(&self, key: &TraitKey) -> Option<TraitPayload> {
        self.resident.write().take(key).map(|e| e.payload)
    }

    /// Drop every resident payload. Counters are kept.
    pub fn clear(&self) {
        let mut resident = self.resident.write();
        resident.entries.clear();
        resident.bytes = 0;
    }

    /// Snapshot of counters and occupancy.
    pub fn stats(&self) -> CacheStats {
        let (entries, resident_bytes) = {
            let resident = self.resident.read();
            (resident.entries.len(), resident.bytes)
        };
        let c = &self.counters;
        CacheStats {
            hits: c.hits.load(Ordering::Relaxed),
            misses: c.misses.load(Ordering::Relaxed),
            coalesced: c.coalesced.load(Ordering::Relaxed),
            loads: c.loads.load(Ordering::Relaxed),
            evictions: c.evictions.load(Ordering::Relaxed),
            passthroughs: c.passthroughs.load(Ordering::Relaxed),
            load_failures: c.load_failures.load(Ordering::Relaxed),
            timeouts: c.timeouts.load(Ordering::Relaxed),
            entries,
            resident_bytes,
            capacity_bytes: self.config.capacity_bytes,
        }
    }

    fn tick(&self) -> u64 {
        self.clock.fetch_add(1, Ordering::Relaxed) + 1
    }

    fn lookup(&self, key: &TraitKey) -> Option<Resolved> {
        let resident = self.resident.read();
        let entry = resident.entries.get(key)?;
        entry.touch(self.tick());
        Counters::bump(&self.counters.hits);
        Some(Resolved {
            payload: entry.payload.clone(),
            status: ResolveStatus::Hit,
        })
    }

    fn commit(&self, key: &TraitKey, payload: TraitPayload) -> ResolveStatus {
        let size = payload.size_bytes();
        if size > self.config.capacity_bytes {
            Counters::bump(&self.counters.passthroughs);
            let err = CacheError::OversizedAsset {
                key: key.clone(),
                size,
                capacity: self.config.capacity_bytes,
            };
            tracing::warn!(%err, "serving oversized trait payload without caching");
            return ResolveStatus::Passthrough;
        }
        self.store(key, payload);
        ResolveStatus::Loaded
    }

    fn store(&self, key: &TraitKey, payload: TraitPayload) {
        let size = payload.size_bytes();
        let capacity = self.config.capacity_bytes;
        let max_entries = self.config.max_entries.filter(|m| *m > 0);

        let mut resident = self.resident.write();
        resident.take(key);
        while resident.bytes + size > capacity
            || max_entries.is_some_and(|m| resident.entries.len() >= m)
        {
            let victim = self
                .config
                .policy
                .select_victim(resident.entries.iter().map(|(k, e)| (k, e.meta())))
                .cloned();
            let Some(victim) = victim else { break };
            if let Some(evicted) = resident.take(&victim) {
                Counters::bump(&self.counters.evictions);
                tracing::debug!(key = %victim, size = evicted.size, policy = %self.config.policy, "evicted trait payload");
            }
        }

        let tick = self.tick();
        resident.entries.insert(
            key.clone(),
            CacheEntry {
                payload,
                size,
                inserted_at: tick,
                last_access: AtomicU64::new(tick),
                access_count: AtomicU64::new(0),
            },
        );
        resident.bytes += size;
    }

    fn load_with_retries(
        &self,
        key: &TraitKey,
        cancel: &CancelToken,
    ) -> Result<TraitPayload, CacheError> {
        let Some(source) = self.sources.get(key).cloned() else {
            Counters::bump(&self.counters.load_failures);
            return Err(CacheError::LoadFailed {
                key: key.clone(),
                message: "no source registered for key".to_string(),
            });
        };

        let attempts = self.config.attempts();
        for attempt in 1..=attempts {
            match self.load_once(&source, cancel) {
                Ok(payload) => {
                    Counters::bump(&self.counters.loads);
                    return Ok(payload);
                }
                Err(AttemptError::TimedOut) => {
                    Counters::bump(&self.counters.timeouts);
                    tracing::warn!(%key, attempt, attempts, "trait decode timed out");
                }
                Err(AttemptError::Cancelled) => {
                    return Err(CacheError::Cancelled { key: key.clone() });
                }
                Err(AttemptError::Failed(message)) => {
                    Counters::bump(&self.counters.load_failures);
                    return Err(CacheError::LoadFailed {
                        key: key.clone(),
                        message,
                    });
                }
            }
        }

        Counters::bump(&self.counters.load_failures);
        Err(CacheError::LoadTimeout {
            key: key.clone(),
            timeout: self.config.load_timeout(),
            attempts,
        })
    }

    fn load_once(&self, source: &str, cancel: &CancelToken) -> Result<TraitPayload, AttemptError> {
        if cancel.is_cancelled() {
            return Err(AttemptError::Cancelled);
        }
        let (tx, rx) = crossbeam_channel::bounded(1);
        let loader = Arc::clone(&self.loader);
        let owned = source.to_string();
        std::thread::Builder::new()
            .name("trait-decode".to_string())
            .spawn(move || {
                // The receiver may have given up already.
                let _ = tx.send(loader.decode(&owned));
            })
            .map_err(|e| AttemptError::Failed(format!("spawn decode thread: {e}")))?;

        let timeout = self.config.load_timeout();
        let started = Instant::now();
        loop {
            if cancel.is_cancelled() {
                return Err(AttemptError::Cancelled);
            }
            let elapsed = started.elapsed();
            if elapsed >= timeout {
                return Err(AttemptError::TimedOut);
            }
            match rx.recv_timeout((timeout - elapsed).min(POLL_SLICE)) {
                Ok(Ok(payload)) => return Ok(payload),
                Ok(Err(e)) => return Err(AttemptError::Failed(format!("{e:#}"))),
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(AttemptError::Failed(
                        "decode thread exited without a result".to_string(),
                    ));
                }
            }
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/assets/cache.rs"]
mod tests;
