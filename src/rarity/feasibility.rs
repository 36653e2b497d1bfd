use std::{fmt, fmt::Write as _};

use crate::{
    foundation::core::{PositionIndex, VariantId},
    foundation::error::FeasibilityError,
    grid::layout::GridLayout,
};

/// Utilization at or below which a unique collection is comfortable.
pub const OPTIMAL_UTILIZATION: f64 = 0.7;
/// Utilization above which generation gets noticeably slower.
pub const CHALLENGING_UTILIZATION: f64 = 0.9;
/// Collection size above which a run is flagged as large.
pub const LARGE_COLLECTION: u64 = 50_000;

const SUGGESTED_PERCENTAGES: [u128; 5] = [10, 30, 70, 90, 100];

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, serde::Serialize)]
#[serde(rename_all = "snake_case")]
/// Coarse grading of how much of the combination space a run consumes.
pub enum FeasibilityLevel {
    /// Utilization up to 70 %.
    Optimal,
    /// Utilization up to 90 %.
    Feasible,
    /// Utilization up to 100 %, or duplicates allowed beyond it.
    Challenging,
    /// The requested size cannot be met.
    Infeasible,
}

impl fmt::Display for FeasibilityLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Optimal => "optimal",
            Self::Feasible => "feasible",
            Self::Challenging => "challenging",
            Self::Infeasible => "infeasible",
        })
    }
}

#[derive(Clone, Debug, PartialEq, serde::Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
/// Advisory, non-blocking feasibility finding.
pub enum FeasibilityWarning {
    /// Variant expected to appear less than once in the collection.
    UnderrepresentedVariant {
        /// Owning position.
        position: PositionIndex,
        /// Affected variant.
        variant: VariantId,
        /// Selection probability.
        probability: f64,
        /// `requested_size * probability`.
        expected_occurrences: f64,
    },
    /// Unique run consumes more than 90 % of the space.
    HighUtilization {
        /// `requested / total`.
        utilization: f64,
    },
    /// Duplicates are allowed and the size exceeds the distinct space.
    DuplicatesRequired {
        /// Requested collection size.
        requested: u64,
        /// Distinct combinations available.
        total_combinations: u128,
    },
    /// Position with a single option contributes nothing to diversity.
    SingleOptionPosition {
        /// Affected position.
        position: PositionIndex,
    },
    /// Requested size above [`LARGE_COLLECTION`].
    LargeCollection {
        /// Requested collection size.
        requested: u64,
    },
}

impl fmt::Display for FeasibilityWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnderrepresentedVariant {
                position,
                variant,
                probability,
                expected_occurrences,
            } => write!(
                f,
                "position {position} variant '{variant}' (p={probability:.6}) is expected {expected_occurrences:.3} time(s) and will likely be absent"
            ),
            Self::HighUtilization { utilization } => write!(
                f,
                "high combination space utilization ({:.1}%) may make generation slow",
                utilization * 100.0
            ),
            Self::DuplicatesRequired {
                requested,
                total_combinations,
            } => write!(
                f,
                "collection of {requested} will repeat combinations (only {total_combinations} distinct)"
            ),
            Self::SingleOptionPosition { position } => {
                write!(f, "position {position} has a single option")
            }
            Self::LargeCollection { requested } => {
                write!(f, "large collection ({requested} items) may take a long time")
            }
        }
    }
}

#[derive(Clone, Debug, PartialEq, serde::Serialize)]
/// Pre-flight verdict on a requested collection size.
pub struct FeasibilityReport {
    /// `false` only when a unique collection larger than the space was requested.
    pub feasible: bool,
    /// Utilization grade.
    pub level: FeasibilityLevel,
    /// Distinct combinations available.
    pub total_combinations: u128,
    /// Requested collection size.
    pub requested_size: u64,
    /// Duplicate policy the report was computed under.
    pub allow_duplicates: bool,
    /// `requested_size / total_combinations`.
    pub utilization: f64,
    /// Blocking findings.
    pub errors: Vec<FeasibilityError>,
    /// Advisory findings.
    pub warnings: Vec<FeasibilityWarning>,
    /// Sizes at 10/30/70/90/100 % of the space, deduplicated and ascending.
    pub suggested_sizes: Vec<u128>,
}

impl FeasibilityReport {
    /// Hard gate: the report when feasible, otherwise its first blocking error.
    pub fn into_result(self) -> Result<Self, FeasibilityError> {
        match self.errors.first() {
            Some(e) => Err(e.clone()),
            None => Ok(self),
        }
    }

    /// Operator-facing text rendering.
    pub fn render(&self) -> String {
        let mut out = String::new();
        let verdict = if self.feasible { "FEASIBLE" } else { "INFEASIBLE" };
        let _ = writeln!(out, "Feasibility: {verdict} ({})", self.level);
        let _ = writeln!(out, "  Requested size: {}", self.requested_size);
        let _ = writeln!(out, "  Distinct combinations: {}", self.total_combinations);
        let _ = writeln!(out, "  Utilization: {:.1}%", self.utilization * 100.0);
        let _ = writeln!(
            out,
            "  Duplicates: {}",
            if self.allow_duplicates { "allowed" } else { "not allowed" }
        );
        if !self.suggested_sizes.is_empty() {
            let sizes: Vec<String> = self.suggested_sizes.iter().map(u128::to_string).collect();
            let _ = writeln!(out, "  Suggested sizes: {}", sizes.join(", "));
        }
        for e in &self.errors {
            let _ = writeln!(out, "  error: {e}");
        }
        for w in &self.warnings {
            let _ = writeln!(out, "  warning: {w}");
        }
        out
    }
}

/// Check `requested_size` against the layout's combination space.
#[tracing::instrument(skip(layout))]
pub fn check(layout: &GridLayout, requested_size: u64, allow_duplicates: bool) -> FeasibilityReport {
    let total = layout.total_combinations();
    let requested = u128::from(requested_size);
    let utilization = if total == 0 {
        f64::INFINITY
    } else {
        requested as f64 / total as f64
    };

    let mut errors = Vec::new();
    if !allow_duplicates && requested > total {
        errors.push(FeasibilityError::InfeasibleCollectionSize {
            requested: requested_size,
            total_combinations: total,
        });
    }
    let feasible = errors.is_empty();

    let level = if !feasible {
        FeasibilityLevel::Infeasible
    } else if utilization <= OPTIMAL_UTILIZATION {
        FeasibilityLevel::Optimal
    } else if utilization <= CHALLENGING_UTILIZATION {
        FeasibilityLevel::Feasible
    } else {
        FeasibilityLevel::Challenging
    };

    let mut warnings = Vec::new();
    if !allow_duplicates && feasible && utilization > CHALLENGING_UTILIZATION {
        warnings.push(FeasibilityWarning::HighUtilization { utilization });
    }
    if allow_duplicates && requested > total {
        warnings.push(FeasibilityWarning::DuplicatesRequired {
            requested: requested_size,
            total_combinations: total,
        });
    }
    for p in layout.positions() {
        if p.option_count() == 1 {
            warnings.push(FeasibilityWarning::SingleOptionPosition {
                position: p.index(),
            });
        }
        for (i, v) in p.variants().iter().enumerate() {
            let probability = p.variant_probability(i).unwrap_or(0.0);
            let expected_occurrences = requested_size as f64 * probability;
            if expected_occurrences < 1.0 {
                warnings.push(FeasibilityWarning::UnderrepresentedVariant {
                    position: p.index(),
                    variant: v.id.clone(),
                    probability,
                    expected_occurrences,
                });
            }
        }
    }
    if requested_size > LARGE_COLLECTION {
        warnings.push(FeasibilityWarning::LargeCollection {
            requested: requested_size,
        });
    }

    if !feasible {
        tracing::debug!(total, "requested collection exceeds combination space");
    }

    FeasibilityReport {
        feasible,
        level,
        total_combinations: total,
        requested_size,
        allow_duplicates,
        utilization,
        errors,
        warnings,
        suggested_sizes: suggested_sizes(total),
    }
}

/// Collection sizes at fixed fractions of `total`, each at least one.
pub fn suggested_sizes(total: u128) -> Vec<u128> {
    if total == 0 {
        return Vec::new();
    }
    let mut sizes: Vec<u128> = SUGGESTED_PERCENTAGES
        .iter()
        .map(|pct| (total.saturating_mul(*pct) / 100).max(1))
        .collect();
    sizes.sort_unstable();
    sizes.dedup();
    sizes
}

#[cfg(test)]
#[path = "../../tests/unit/rarity/feasibility.rs"]
mod tests;
