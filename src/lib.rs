//! genconfig is the rarity engine and trait-asset cache behind 3x3 grid generative image
//! collections.
//!
//! Each of the nine grid positions holds weighted trait variants. A collection of N artworks is
//! produced by drawing one variant per position, with pre-flight checks run before any sampling.
//!
//! # Pipeline overview
//!
//! 1. **Configure**: `GenConfig -> GridLayout` (weights become per-position probability vectors)
//! 2. **Pre-flight**: feasibility of the requested size and tier/monotonicity validation
//! 3. **Sample**: reproducible per-item random substreams draw `CombinationKey`s, with a
//!    concurrent ledger enforcing uniqueness when duplicates are disallowed
//! 4. **Resolve**: every trait of every key is served from a bounded `TraitCache` and handed to
//!    an `ItemSink` in item order
//!
//! The key design constraints:
//!
//! - **No unsafe**: `unsafe` is forbidden in this crate.
//! - **Deterministic-by-seed**: output depends only on the seed and the worker partitioning,
//!   never on thread scheduling.
//! - **Bounded everywhere**: collision retries, cache waits and decode attempts all have limits.
//! - **Premultiplied RGBA8** payloads, shared between items without copying.
#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod assets;
mod config;
mod foundation;
mod generate;
mod grid;
mod rarity;

pub use assets::cache::{
    CacheConfig, CacheStats, PreloadSummary, ResolveStatus, Resolved, TraitCache,
};
pub use assets::decode::{TraitPayload, decode_trait_image};
pub use assets::eviction::EvictionPolicy;
pub use assets::loader::{FsTraitLoader, TraitLoader, normalize_rel_path};
pub use config::model::{CollectionSettings, GenConfig, PositionConfig, VariantConfig};
pub use foundation::core::{
    CombinationKey, GRID_COLUMNS, GRID_SLOTS, PositionIndex, TraitKey, VariantId,
};
pub use foundation::error::{
    CacheError, ConfigurationError, DistributionError, FeasibilityError, GenError, GenResult,
    SamplingError, WeightDefect,
};
pub use generate::cancel::CancelToken;
pub use generate::ledger::CombinationLedger;
pub use generate::pipeline::{
    GenerationSettings, Generator, Preflight, RunStats, SampledCollection, preflight,
};
pub use generate::sink::{
    CollectionItem, InMemorySink, ItemSink, Manifest, ManifestItem, ManifestSink, ResolvedLayer,
    SinkConfig, ensure_parent_dir,
};
pub use grid::layout::{GridLayout, GridPosition, TraitVariant};
pub use rarity::distribution::{
    AccuracyReport, DistributionIssue, DistributionReport, OptionAccuracy, PositionAccuracy,
    PositionSummary, RarityTiers, SimulationSettings, TierBound, balance_score, simulate_accuracy,
    validate as validate_distribution, validate_with_simulation,
};
pub use rarity::feasibility::{
    CHALLENGING_UTILIZATION, FeasibilityLevel, FeasibilityReport, FeasibilityWarning,
    LARGE_COLLECTION, OPTIMAL_UTILIZATION, check as check_feasibility, suggested_sizes,
};
pub use rarity::sampler::{
    RandomSource, SamplingPolicy, WeightedSampler, draw, sample_frequencies,
};
pub use rarity::weights::{
    PROBABILITY_TOLERANCE, ProbabilityVector, WeightSummary, probability_vector, weight_summary,
};
