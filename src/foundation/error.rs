use std::time::Duration;

use crate::foundation::core::{CombinationKey, PositionIndex, TraitKey};

/// Convenience result type used across genconfig.
pub type GenResult<T> = Result<T, GenError>;

/// Top-level error taxonomy used by engine APIs.
#[derive(thiserror::Error, Debug)]
pub enum GenError {
    /// Invalid weights detected while deriving probabilities.
    #[error("configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    /// Requested collection cannot be produced from the combination space.
    #[error("feasibility error: {0}")]
    Feasibility(#[from] FeasibilityError),

    /// Declared weights violate the rarity tier table.
    #[error("distribution error: {0}")]
    Distribution(#[from] DistributionError),

    /// Sampling could not produce a combination within its retry budget.
    #[error("sampling error: {0}")]
    Sampling(#[from] SamplingError),

    /// Trait payload could not be served by the cache.
    #[error("cache error: {0}")]
    Cache(CacheError),

    /// Invalid user-provided configuration data.
    #[error("validation error: {0}")]
    Validation(String),

    /// Errors when serializing or deserializing data structures.
    #[error("serialization error: {0}")]
    Serde(String),

    /// The run was cancelled before it completed.
    #[error("generation cancelled")]
    Cancelled,

    /// Wrapped lower-level error from dependencies or IO.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl GenError {
    /// Build a [`GenError::Validation`] value.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Build a [`GenError::Serde`] value.
    pub fn serde(msg: impl Into<String>) -> Self {
        Self::Serde(msg.into())
    }
}

impl From<CacheError> for GenError {
    /// A cancelled cache wait is a cancelled run, not a cache failure.
    fn from(e: CacheError) -> Self {
        match e {
            CacheError::Cancelled { .. } => Self::Cancelled,
            other => Self::Cache(other),
        }
    }
}

/// What is wrong with a rejected weight.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WeightDefect {
    /// No weight was configured.
    Missing,
    /// Weight is NaN or infinite.
    NonFinite,
    /// Weight is zero or negative.
    NonPositive,
}

impl std::fmt::Display for WeightDefect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Missing => "missing",
            Self::NonFinite => "not finite",
            Self::NonPositive => "not positive",
        })
    }
}

/// Failures raised while turning weights into probabilities.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum ConfigurationError {
    /// A weight is missing, non-finite or not strictly positive.
    #[error("{} weight #{index} ({weight}) is {defect}", fmt_position(.position))]
    InvalidWeight {
        /// Position owning the weight, when known.
        position: Option<PositionIndex>,
        /// Index of the weight inside its position.
        index: usize,
        /// Offending value (`NaN` when missing).
        weight: f64,
        /// Why the weight was rejected.
        defect: WeightDefect,
    },

    /// A position declared no weights at all.
    #[error("{} has no weights", fmt_position(.position))]
    EmptyWeightSet {
        /// Position owning the weight set, when known.
        position: Option<PositionIndex>,
    },
}

impl ConfigurationError {
    /// Attach the owning grid position to the error.
    pub fn at_position(self, p: PositionIndex) -> Self {
        match self {
            Self::InvalidWeight {
                index,
                weight,
                defect,
                ..
            } => Self::InvalidWeight {
                position: Some(p),
                index,
                weight,
                defect,
            },
            Self::EmptyWeightSet { .. } => Self::EmptyWeightSet { position: Some(p) },
        }
    }
}

fn fmt_position(p: &Option<PositionIndex>) -> String {
    match p {
        Some(p) => format!("position {p}"),
        None => "weight set".to_string(),
    }
}

/// Hard pre-flight gate on collection size.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq, serde::Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FeasibilityError {
    /// More unique items were requested than combinations exist.
    #[error(
        "requested {requested} unique items but only {total_combinations} distinct combinations exist"
    )]
    InfeasibleCollectionSize {
        /// Requested collection size.
        requested: u64,
        /// Size of the distinct combination space.
        total_combinations: u128,
    },
}

/// Blocking distribution findings collected by the validator.
#[derive(thiserror::Error, Debug, Clone)]
#[error("{} blocking issue(s); first: {}", .issues.len(), first_issue(.issues))]
pub struct DistributionError {
    /// Every blocking issue, in validation order.
    pub issues: Vec<crate::rarity::distribution::DistributionIssue>,
}

fn first_issue(issues: &[crate::rarity::distribution::DistributionIssue]) -> String {
    issues
        .first()
        .map(|i| i.to_string())
        .unwrap_or_else(|| "<none>".to_string())
}

/// Failures of the combination sampler.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum SamplingError {
    /// Every retry collided with an already-emitted combination.
    #[error(
        "no unused combination found after {attempts} attempt(s) ({emitted} of {total_combinations} already emitted, last collision {last_collision})"
    )]
    ExhaustedCombinationSpace {
        /// Attempts spent on the failing draw.
        attempts: u32,
        /// Combinations already in the ledger.
        emitted: u64,
        /// Size of the distinct combination space.
        total_combinations: u128,
        /// Last colliding key.
        last_collision: CombinationKey,
    },
}

/// Failures of the trait payload cache.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum CacheError {
    /// Payload is larger than the whole cache budget and was not stored.
    #[error("asset {key} is {size} bytes which exceeds cache capacity {capacity}")]
    OversizedAsset {
        /// Cache key of the payload.
        key: TraitKey,
        /// Payload size in bytes.
        size: usize,
        /// Cache byte budget.
        capacity: usize,
    },

    /// Decoding did not settle within the configured duration.
    #[error("loading {key} timed out after {timeout:?} ({attempts} attempt(s))")]
    LoadTimeout {
        /// Cache key being loaded.
        key: TraitKey,
        /// Per-attempt timeout.
        timeout: Duration,
        /// Attempts made before giving up.
        attempts: u32,
    },

    /// The trait loader reported a decode failure.
    #[error("loading {key} failed: {message}")]
    LoadFailed {
        /// Cache key being loaded.
        key: TraitKey,
        /// Loader error message (with context chain).
        message: String,
    },

    /// The run was cancelled while the load was pending.
    #[error("loading {key} was cancelled")]
    Cancelled {
        /// Cache key being loaded.
        key: TraitKey,
    },
}

impl CacheError {
    /// Key the failure is about.
    pub fn key(&self) -> &TraitKey {
        match self {
            Self::OversizedAsset { key, .. }
            | Self::LoadTimeout { key, .. }
            | Self::LoadFailed { key, .. }
            | Self::Cancelled { key } => key,
        }
    }

    /// `true` for failures the run can continue past.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::OversizedAsset { .. })
    }
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/error.rs"]
mod tests;
