use std::sync::Arc;

use rayon::prelude::*;

use crate::{
    assets::cache::{CacheStats, PreloadSummary, TraitCache},
    assets::loader::TraitLoader,
    config::model::{CollectionSettings, GenConfig},
    foundation::core::CombinationKey,
    foundation::error::{DistributionError, GenError, GenResult},
    generate::cancel::CancelToken,
    generate::ledger::CombinationLedger,
    generate::sink::{CollectionItem, ItemSink, ResolvedLayer, SinkConfig},
    grid::layout::GridLayout,
    rarity::distribution::{self, DistributionReport},
    rarity::feasibility::{self, FeasibilityReport},
    rarity::sampler::{RandomSource, SamplingPolicy, WeightedSampler},
};

#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
/// Parallelism and retry settings of a generation run.
#[serde(default)]
pub struct GenerationSettings {
    /// Logical workers; item `i` draws from substream `(seed, i % workers, i / workers)`.
    pub workers: u32,
    /// Rayon pool size, `None` for the rayon default.
    pub threads: Option<usize>,
    /// Items resolved per parallel chunk.
    pub chunk_size: usize,
    /// Collision retries while the combination space is untouched.
    pub max_attempts: u32,
    /// Collision retry floor while unused combinations remain.
    pub min_attempts: u32,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        let policy = SamplingPolicy::default();
        Self {
            workers: 1,
            threads: None,
            chunk_size: 64,
            max_attempts: policy.max_attempts,
            min_attempts: policy.min_attempts,
        }
    }
}

impl GenerationSettings {
    /// Collision retry policy.
    pub fn sampling_policy(&self) -> SamplingPolicy {
        SamplingPolicy {
            max_attempts: self.max_attempts,
            min_attempts: self.min_attempts,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
/// Layout plus pre-flight reports of a configuration.
pub struct Preflight {
    /// Grid built from the configuration.
    pub layout: GridLayout,
    /// Collection size verdict.
    pub feasibility: FeasibilityReport,
    /// Tier and monotonicity verdict.
    pub distribution: DistributionReport,
}

impl Preflight {
    /// `true` when any blocking finding exists.
    pub fn is_blocked(&self) -> bool {
        !self.feasibility.errors.is_empty() || !self.distribution.is_valid()
    }

    /// Surface the first blocking family as an error.
    pub fn ensure_runnable(&self) -> GenResult<()> {
        if let Some(e) = self.feasibility.errors.first() {
            return Err(e.clone().into());
        }
        if !self.distribution.is_valid() {
            return Err(DistributionError {
                issues: self.distribution.errors.clone(),
            }
            .into());
        }
        Ok(())
    }
}

/// Validate `config`, build its layout and run the feasibility and distribution checks.
///
/// Configuration errors are returned directly. Blocking report findings are left in the reports
/// so they can be rendered; see [`Preflight::ensure_runnable`].
#[tracing::instrument(skip(config), fields(collection = %config.collection.name))]
pub fn preflight(config: &GenConfig) -> GenResult<Preflight> {
    config.validate()?;
    let layout = config.build_layout()?;
    let feasibility = feasibility::check(
        &layout,
        config.collection.size,
        config.collection.allow_duplicates,
    );
    let distribution =
        distribution::validate_with_simulation(&layout, &config.rarity_tiers, &config.simulation);
    tracing::info!(
        total_combinations = %feasibility.total_combinations,
        level = %feasibility.level,
        distribution_errors = distribution.errors.len(),
        warnings = feasibility.warnings.len() + distribution.warnings.len(),
        "pre-flight complete"
    );
    Ok(Preflight {
        layout,
        feasibility,
        distribution,
    })
}

#[derive(Clone, Debug, Default, PartialEq, serde::Serialize)]
/// Summary of a finished run.
pub struct RunStats {
    /// Items pushed to the sink.
    pub items: u64,
    /// Distinct combinations among them.
    pub distinct_combinations: u64,
    /// Items repeating an earlier combination.
    pub duplicates: u64,
    /// Draws rejected because the combination was taken.
    pub collisions: u64,
    /// Cache counters at the end of the run.
    pub cache: CacheStats,
}

/// Sampling phase output.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SampledCollection {
    /// Keys in item index order.
    pub keys: Vec<CombinationKey>,
    /// Draws rejected because the combination was taken.
    pub collisions: u64,
    /// Distinct keys.
    pub distinct: u64,
}

/// Runs a validated configuration: samples every combination, then resolves payloads through a
/// shared [`TraitCache`] and streams items to an [`ItemSink`].
#[derive(Debug)]
pub struct Generator {
    collection: CollectionSettings,
    settings: GenerationSettings,
    preflight: Preflight,
    cache: Arc<TraitCache>,
}

impl Generator {
    /// Run pre-flight on `config` and prepare a cache decoding through `loader`.
    ///
    /// Fails on any blocking pre-flight finding.
    pub fn new(config: &GenConfig, loader: Arc<dyn TraitLoader>) -> GenResult<Self> {
        let preflight = preflight(config)?;
        preflight.ensure_runnable()?;
        let cache = TraitCache::new(config.cache.clone(), loader).with_layout(&preflight.layout);
        Ok(Self {
            collection: config.collection.clone(),
            settings: config.generation.clone(),
            preflight,
            cache: Arc::new(cache),
        })
    }

    /// Grid being sampled.
    pub fn layout(&self) -> &GridLayout {
        &self.preflight.layout
    }

    /// Pre-flight reports.
    pub fn preflight(&self) -> &Preflight {
        &self.preflight
    }

    /// Shared payload cache.
    pub fn cache(&self) -> &Arc<TraitCache> {
        &self.cache
    }

    /// Decode every trait of the layout into the cache ahead of [`Self::run`].
    ///
    /// Individual load failures are reported in the summary rather than failing the call.
    pub fn preload(&self, cancel: &CancelToken) -> GenResult<PreloadSummary> {
        Ok(self.cache.preload_registered(cancel)?)
    }

    /// Draw every combination of the collection.
    ///
    /// With duplicates allowed items are drawn in parallel; otherwise they are claimed in item
    /// order so the ledger's claim sequence, and with it the output, is fixed. Either way the
    /// result depends only on the seed and the worker count.
    #[tracing::instrument(skip_all, fields(size = self.collection.size))]
    pub fn sample(&self, cancel: &CancelToken) -> GenResult<SampledCollection> {
        let pool = build_thread_pool(self.settings.threads)?;
        let sampler = WeightedSampler::new(self.layout(), self.settings.sampling_policy());
        let ledger = CombinationLedger::new();
        let seed = self.collection.seed;
        let workers = u64::from(self.settings.workers.max(1));
        let allow_duplicates = self.collection.allow_duplicates;

        let draw_item = |i: u64| -> GenResult<(CombinationKey, u32)> {
            cancel.check()?;
            let mut rng = RandomSource::substream(seed, (i % workers) as u32, i / workers);
            Ok(sampler.draw_counted(&mut rng, &ledger, allow_duplicates)?)
        };

        let drawn: Vec<(CombinationKey, u32)> = if allow_duplicates {
            pool.install(|| {
                (0..self.collection.size)
                    .into_par_iter()
                    .map(draw_item)
                    .collect::<GenResult<Vec<_>>>()
            })?
        } else {
            (0..self.collection.size)
                .map(draw_item)
                .collect::<GenResult<Vec<_>>>()?
        };

        let collisions: u64 = drawn
            .iter()
            .map(|(_, attempts)| u64::from(attempts.saturating_sub(1)))
            .sum();
        tracing::info!(
            items = drawn.len(),
            distinct = ledger.distinct_len(),
            collisions,
            "sampling complete"
        );
        Ok(SampledCollection {
            keys: drawn.into_iter().map(|(key, _)| key).collect(),
            collisions,
            distinct: ledger.distinct_len(),
        })
    }

    /// Sample the collection, resolve every payload and push items to `sink` in index order.
    ///
    /// Sampling completes before anything reaches the sink, so a sampling failure emits nothing.
    /// A failure or cancellation during resolution stops the run; items already pushed stay and
    /// `end` is not called.
    #[tracing::instrument(skip_all, fields(collection = %self.collection.name))]
    pub fn run(&self, sink: &mut dyn ItemSink, cancel: &CancelToken) -> GenResult<RunStats> {
        let sampled = self.sample(cancel)?;
        let pool = build_thread_pool(self.settings.threads)?;
        let chunk_size = normalized_chunk_size(self.settings.chunk_size);

        sink.begin(SinkConfig {
            collection: self.collection.name.clone(),
            size: self.collection.size,
            seed: self.collection.seed,
            workers: self.settings.workers.max(1),
            allow_duplicates: self.collection.allow_duplicates,
        })?;

        let mut pushed = 0u64;
        for (chunk_idx, chunk) in sampled.keys.chunks(chunk_size).enumerate() {
            cancel.check()?;
            let base = (chunk_idx * chunk_size) as u64;
            let resolved = pool.install(|| {
                chunk
                    .par_iter()
                    .enumerate()
                    .map(|(offset, key)| self.resolve_item(base + offset as u64, key, cancel))
                    .collect::<Vec<_>>()
            });
            for item in resolved {
                sink.push_item(&item?)?;
                pushed += 1;
            }
        }
        sink.end()?;

        let stats = RunStats {
            items: pushed,
            distinct_combinations: sampled.distinct,
            duplicates: pushed.saturating_sub(sampled.distinct),
            collisions: sampled.collisions,
            cache: self.cache.stats(),
        };
        tracing::info!(
            items = stats.items,
            hit_rate = stats.cache.hit_rate(),
            evictions = stats.cache.evictions,
            "generation complete"
        );
        Ok(stats)
    }

    fn resolve_item(
        &self,
        index: u64,
        key: &CombinationKey,
        cancel: &CancelToken,
    ) -> GenResult<CollectionItem> {
        let mut layers = Vec::new();
        for trait_key in key.trait_keys() {
            cancel.check()?;
            let resolved = self.cache.get_with_cancel(&trait_key, cancel)?;
            layers.push(ResolvedLayer {
                position: trait_key.position,
                variant: trait_key.variant,
                payload: resolved.payload,
                status: resolved.status,
            });
        }
        Ok(CollectionItem {
            index,
            key: key.clone(),
            layers,
        })
    }
}

fn build_thread_pool(threads: Option<usize>) -> GenResult<rayon::ThreadPool> {
    if let Some(n) = threads
        && n == 0
    {
        return Err(GenError::validation("generation 'threads' must be >= 1 when set"));
    }

    let mut builder = rayon::ThreadPoolBuilder::new();
    if let Some(n) = threads {
        builder = builder.num_threads(n);
    }
    builder
        .build()
        .map_err(|e| GenError::validation(format!("failed to build rayon thread pool: {e}")))
}

fn normalized_chunk_size(chunk_size: usize) -> usize {
    chunk_size.max(1)
}

#[cfg(test)]
#[path = "../../tests/unit/generate/pipeline.rs"]
mod tests;
