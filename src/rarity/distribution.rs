use std::{collections::BTreeMap, fmt, fmt::Write as _};

use crate::{
    foundation::core::{GRID_SLOTS, PositionIndex, VariantId},
    foundation::error::DistributionError,
    grid::layout::{GridLayout, GridPosition},
    rarity::sampler::{RandomSource, sample_frequencies},
};

#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
/// Inclusive weight bounds of one rarity tier.
pub struct TierBound {
    /// Smallest weight belonging to the tier.
    pub min_weight: f64,
    /// Largest weight belonging to the tier.
    pub max_weight: f64,
}

impl TierBound {
    /// Build a bound.
    pub fn new(min_weight: f64, max_weight: f64) -> Self {
        Self {
            min_weight,
            max_weight,
        }
    }

    /// `true` when `weight` lies in `[min_weight, max_weight]`.
    pub fn contains(&self, weight: f64) -> bool {
        self.min_weight <= weight && weight <= self.max_weight
    }
}

/// Tier name to weight bounds, iterated in name order.
pub type RarityTiers = BTreeMap<String, TierBound>;

/// One finding of the distribution validator.
///
/// [`Self::is_error`] separates blocking findings from advisories.
#[derive(Clone, Debug, PartialEq, serde::Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DistributionIssue {
    /// Tier whose lower bound exceeds its upper bound.
    InvertedTier {
        /// Tier name.
        tier: String,
        /// Declared lower bound.
        min_weight: f64,
        /// Declared upper bound.
        max_weight: f64,
    },
    /// Variant declares a tier the table does not define.
    UnknownTier {
        /// Owning position.
        position: PositionIndex,
        /// Offending variant.
        variant: VariantId,
        /// Declared tier name.
        tier: String,
    },
    /// Variant weight lies outside the bounds of its declared tier.
    TierMismatch {
        /// Owning position.
        position: PositionIndex,
        /// Offending variant.
        variant: VariantId,
        /// Configured weight.
        weight: f64,
        /// Declared tier name.
        declared: String,
        /// Tiers whose bounds do contain the weight.
        matching: Vec<String>,
    },
    /// Variant weight lies outside every declared tier.
    WeightOutsideTiers {
        /// Owning position.
        position: PositionIndex,
        /// Offending variant.
        variant: VariantId,
        /// Configured weight.
        weight: f64,
    },
    /// A heavier variant did not receive a strictly larger probability.
    MonotonicityViolation {
        /// Owning position.
        position: PositionIndex,
        /// Variant with the larger weight.
        heavier: VariantId,
        /// Variant with the smaller weight.
        lighter: VariantId,
        /// Derived probability of `heavier`.
        heavier_probability: f64,
        /// Derived probability of `lighter`.
        lighter_probability: f64,
    },
    /// Two tiers share part of their weight range.
    OverlappingTiers {
        /// Tier with the lower minimum.
        first: String,
        /// Tier starting inside `first`.
        second: String,
    },
    /// Weight matches several tiers and the variant declares none.
    AmbiguousTier {
        /// Owning position.
        position: PositionIndex,
        /// Affected variant.
        variant: VariantId,
        /// Configured weight.
        weight: f64,
        /// Every tier containing the weight.
        tiers: Vec<String>,
    },
    /// All variants share one weight although the tiers imply intended skew.
    DegenerateDistribution {
        /// Affected position.
        position: PositionIndex,
        /// Shared weight.
        weight: f64,
        /// Number of variants.
        variants: usize,
    },
    /// Fewer than nine grid positions are configured.
    IncompleteGrid {
        /// Configured position count.
        configured: usize,
    },
    /// Simulated selection frequencies strayed from the declared probabilities.
    SimulationDeviation {
        /// Affected position.
        position: PositionIndex,
        /// Largest absolute frequency difference over the position's options.
        max_deviation: f64,
        /// Accepted difference.
        tolerance: f64,
    },
}

impl DistributionIssue {
    /// `true` for findings that block generation.
    pub fn is_error(&self) -> bool {
        matches!(
            self,
            Self::InvertedTier { .. }
                | Self::UnknownTier { .. }
                | Self::TierMismatch { .. }
                | Self::WeightOutsideTiers { .. }
                | Self::MonotonicityViolation { .. }
        )
    }
}

impl fmt::Display for DistributionIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvertedTier {
                tier,
                min_weight,
                max_weight,
            } => write!(
                f,
                "tier '{tier}' has min_weight {min_weight} > max_weight {max_weight}"
            ),
            Self::UnknownTier {
                position,
                variant,
                tier,
            } => write!(
                f,
                "position {position} variant '{variant}' declares unknown tier '{tier}'"
            ),
            Self::TierMismatch {
                position,
                variant,
                weight,
                declared,
                matching,
            } => write!(
                f,
                "position {position} variant '{variant}' weight {weight} is outside its tier '{declared}' (matches: {})",
                join_or_none(matching)
            ),
            Self::WeightOutsideTiers {
                position,
                variant,
                weight,
            } => write!(
                f,
                "position {position} variant '{variant}' weight {weight} matches no rarity tier"
            ),
            Self::MonotonicityViolation {
                position,
                heavier,
                lighter,
                heavier_probability,
                lighter_probability,
            } => write!(
                f,
                "position {position}: '{heavier}' outweighs '{lighter}' but has probability {heavier_probability} <= {lighter_probability}"
            ),
            Self::OverlappingTiers { first, second } => {
                write!(f, "tiers '{first}' and '{second}' have overlapping ranges")
            }
            Self::AmbiguousTier {
                position,
                variant,
                weight,
                tiers,
            } => write!(
                f,
                "position {position} variant '{variant}' weight {weight} matches several tiers: {}",
                join_or_none(tiers)
            ),
            Self::DegenerateDistribution {
                position,
                weight,
                variants,
            } => write!(
                f,
                "position {position}: all {variants} variants share weight {weight} although tiers imply skew"
            ),
            Self::IncompleteGrid { configured } => write!(
                f,
                "only {configured} of {GRID_SLOTS} grid positions are configured"
            ),
            Self::SimulationDeviation {
                position,
                max_deviation,
                tolerance,
            } => write!(
                f,
                "position {position}: simulated frequencies deviate by {max_deviation:.4} (tolerance {tolerance})"
            ),
        }
    }
}

fn join_or_none(names: &[String]) -> String {
    if names.is_empty() {
        "none".to_string()
    } else {
        names.join(", ")
    }
}

#[derive(Clone, Debug, PartialEq, serde::Serialize)]
/// Derived probabilities and balance of one position.
pub struct PositionSummary {
    /// Grid slot.
    pub position: PositionIndex,
    /// Trait category name.
    pub name: String,
    /// Probability per variant, in variant order.
    pub variant_probabilities: Vec<(VariantId, f64)>,
    /// Probability of the slot staying empty (`0.0` when required).
    pub empty_probability: f64,
    /// `1 / (1 + cv)` over variant weights; `1.0` is perfectly even.
    pub balance_score: f64,
}

#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
/// Statistical accuracy simulation run during pre-flight.
#[serde(default)]
pub struct SimulationSettings {
    /// Draws per position; `0` skips the simulation.
    pub samples: usize,
    /// Largest accepted absolute difference between frequency and probability.
    pub tolerance: f64,
    /// Seed of the simulation's random source.
    pub seed: u64,
}

impl Default for SimulationSettings {
    fn default() -> Self {
        Self {
            samples: 10_000,
            tolerance: 0.02,
            seed: 42,
        }
    }
}

#[derive(Clone, Debug, PartialEq, serde::Serialize)]
/// Simulated against declared frequency of one option.
pub struct OptionAccuracy {
    /// Variant, `None` for the empty option of an optional position.
    pub variant: Option<VariantId>,
    /// Declared probability.
    pub expected: f64,
    /// Simulated frequency.
    pub observed: f64,
    /// `|observed - expected|`.
    pub deviation: f64,
}

#[derive(Clone, Debug, PartialEq, serde::Serialize)]
/// Simulation outcome of one position.
pub struct PositionAccuracy {
    /// Grid slot.
    pub position: PositionIndex,
    /// One entry per option, in vector order.
    pub options: Vec<OptionAccuracy>,
    /// Largest option deviation.
    pub max_deviation: f64,
    /// `max_deviation <= tolerance`.
    pub within_tolerance: bool,
}

#[derive(Clone, Debug, PartialEq, serde::Serialize)]
/// Outcome of [`simulate_accuracy`].
pub struct AccuracyReport {
    /// Draws per position.
    pub samples: usize,
    /// Accepted deviation.
    pub tolerance: f64,
    /// Per-position results in position order.
    pub positions: Vec<PositionAccuracy>,
}

impl AccuracyReport {
    /// Largest deviation over every position.
    pub fn max_deviation(&self) -> f64 {
        self.positions
            .iter()
            .map(|p| p.max_deviation)
            .fold(0.0, f64::max)
    }

    /// `true` when every position stayed within tolerance.
    pub fn within_tolerance(&self) -> bool {
        self.positions.iter().all(|p| p.within_tolerance)
    }
}

/// Draw `samples` options per position and compare frequencies with declared probabilities.
///
/// Positions are simulated in index order from the one `rng`.
pub fn simulate_accuracy(
    layout: &GridLayout,
    rng: &mut RandomSource,
    samples: usize,
    tolerance: f64,
) -> AccuracyReport {
    let positions = layout
        .positions()
        .iter()
        .map(|p| {
            let expected = p.probabilities().as_slice();
            let observed = sample_frequencies(p.probabilities(), rng, samples);
            let options: Vec<OptionAccuracy> = expected
                .iter()
                .zip(&observed)
                .enumerate()
                .map(|(i, (&expected, &observed))| OptionAccuracy {
                    variant: p.variants().get(i).map(|v| v.id.clone()),
                    expected,
                    observed,
                    deviation: (observed - expected).abs(),
                })
                .collect();
            let max_deviation = options.iter().map(|o| o.deviation).fold(0.0, f64::max);
            PositionAccuracy {
                position: p.index(),
                options,
                max_deviation,
                within_tolerance: max_deviation <= tolerance,
            }
        })
        .collect();
    AccuracyReport {
        samples,
        tolerance,
        positions,
    }
}

#[derive(Clone, Debug, Default, PartialEq, serde::Serialize)]
/// Outcome of [`validate`]: blocking errors and advisory warnings kept apart.
pub struct DistributionReport {
    /// Findings that block generation.
    pub errors: Vec<DistributionIssue>,
    /// Advisory findings.
    pub warnings: Vec<DistributionIssue>,
    /// Per-position summaries in position order.
    pub positions: Vec<PositionSummary>,
    /// Statistical simulation, when one was run.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accuracy: Option<AccuracyReport>,
}

impl DistributionReport {
    /// Attach a simulation, warning about every position outside its tolerance.
    pub fn with_accuracy(mut self, accuracy: AccuracyReport) -> Self {
        self.warnings.extend(
            accuracy
                .positions
                .iter()
                .filter(|p| !p.within_tolerance)
                .map(|p| DistributionIssue::SimulationDeviation {
                    position: p.position,
                    max_deviation: p.max_deviation,
                    tolerance: accuracy.tolerance,
                }),
        );
        self.accuracy = Some(accuracy);
        self
    }

    /// `true` when no blocking error was found.
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// Mean balance score across positions.
    pub fn balance_score(&self) -> f64 {
        if self.positions.is_empty() {
            return 0.0;
        }
        self.positions.iter().map(|p| p.balance_score).sum::<f64>() / self.positions.len() as f64
    }

    /// Convert into an error when any blocking issue exists.
    pub fn into_result(self) -> Result<Self, DistributionError> {
        if self.is_valid() {
            Ok(self)
        } else {
            Err(DistributionError {
                issues: self.errors,
            })
        }
    }

    /// Operator-facing text rendering.
    pub fn render(&self) -> String {
        let mut out = String::new();
        let status = if self.is_valid() { "VALID" } else { "INVALID" };
        let _ = writeln!(out, "Distribution: {status}");
        let _ = writeln!(out, "  Balance score: {:.3}", self.balance_score());
        for p in &self.positions {
            let _ = writeln!(
                out,
                "  [{}] {} (balance {:.3})",
                p.position, p.name, p.balance_score
            );
            for (id, prob) in &p.variant_probabilities {
                let _ = writeln!(out, "    {id}: {:.2}%", prob * 100.0);
            }
            if p.empty_probability > 0.0 {
                let _ = writeln!(out, "    <empty>: {:.2}%", p.empty_probability * 100.0);
            }
        }
        if let Some(acc) = &self.accuracy {
            let verdict = if acc.within_tolerance() { "ok" } else { "OUT OF TOLERANCE" };
            let _ = writeln!(
                out,
                "  Simulation: {} draws/position, max deviation {:.4} (tolerance {}) {verdict}",
                acc.samples,
                acc.max_deviation(),
                acc.tolerance
            );
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

/// Check the layout's weights and probabilities against `tiers`.
///
/// Tier membership checks only run when at least one tier is declared.
#[tracing::instrument(skip_all, fields(positions = layout.positions().len(), tiers = tiers.len()))]
pub fn validate(layout: &GridLayout, tiers: &RarityTiers) -> DistributionReport {
    let mut issues = check_tier_table(tiers);

    if !layout.is_complete() {
        issues.push(DistributionIssue::IncompleteGrid {
            configured: layout.positions().len(),
        });
    }

    let mut positions = Vec::with_capacity(layout.positions().len());
    for p in layout.positions() {
        if !tiers.is_empty() {
            issues.extend(check_tier_membership(p, tiers));
        }
        let weights: Vec<f64> = p.variants().iter().map(|v| v.weight).collect();
        let ids: Vec<VariantId> = p.variants().iter().map(|v| v.id.clone()).collect();
        let probs = &p.probabilities().as_slice()[..weights.len()];
        issues.extend(check_monotonicity(p.index(), &ids, &weights, probs));
        issues.extend(check_degenerate(p, tiers));
        positions.push(summarize(p, &weights));
    }

    let (errors, warnings): (Vec<_>, Vec<_>) = issues.into_iter().partition(|i| i.is_error());
    if !errors.is_empty() {
        tracing::debug!(errors = errors.len(), "distribution has blocking issues");
    }
    DistributionReport {
        errors,
        warnings,
        positions,
        accuracy: None,
    }
}

/// [`validate`], followed by [`simulate_accuracy`] unless `simulation.samples` is zero.
pub fn validate_with_simulation(
    layout: &GridLayout,
    tiers: &RarityTiers,
    simulation: &SimulationSettings,
) -> DistributionReport {
    let report = validate(layout, tiers);
    if simulation.samples == 0 {
        return report;
    }
    let mut rng = RandomSource::from_seed(simulation.seed);
    let accuracy = simulate_accuracy(layout, &mut rng, simulation.samples, simulation.tolerance);
    tracing::debug!(
        samples = simulation.samples,
        max_deviation = accuracy.max_deviation(),
        "distribution simulation complete"
    );
    report.with_accuracy(accuracy)
}

fn check_tier_table(tiers: &RarityTiers) -> Vec<DistributionIssue> {
    let mut issues = Vec::new();
    for (name, bound) in tiers {
        if bound.min_weight > bound.max_weight {
            issues.push(DistributionIssue::InvertedTier {
                tier: name.clone(),
                min_weight: bound.min_weight,
                max_weight: bound.max_weight,
            });
        }
    }

    let mut ranges: Vec<(&String, &TierBound)> = tiers.iter().collect();
    ranges.sort_by(|a, b| a.1.min_weight.total_cmp(&b.1.min_weight));
    for pair in ranges.windows(2) {
        let (first, a) = pair[0];
        let (second, b) = pair[1];
        if a.max_weight >= b.min_weight {
            issues.push(DistributionIssue::OverlappingTiers {
                first: first.clone(),
                second: second.clone(),
            });
        }
    }
    issues
}

fn check_tier_membership(p: &GridPosition, tiers: &RarityTiers) -> Vec<DistributionIssue> {
    let mut issues = Vec::new();
    for v in p.variants() {
        let matching: Vec<String> = tiers
            .iter()
            .filter(|(_, b)| b.contains(v.weight))
            .map(|(n, _)| n.clone())
            .collect();

        match &v.tier {
            Some(declared) => match tiers.get(declared) {
                None => issues.push(DistributionIssue::UnknownTier {
                    position: p.index(),
                    variant: v.id.clone(),
                    tier: declared.clone(),
                }),
                Some(bound) if !bound.contains(v.weight) => {
                    issues.push(DistributionIssue::TierMismatch {
                        position: p.index(),
                        variant: v.id.clone(),
                        weight: v.weight,
                        declared: declared.clone(),
                        matching,
                    })
                }
                Some(_) => {}
            },
            None if matching.is_empty() => {
                issues.push(DistributionIssue::WeightOutsideTiers {
                    position: p.index(),
                    variant: v.id.clone(),
                    weight: v.weight,
                })
            }
            None if matching.len() > 1 => issues.push(DistributionIssue::AmbiguousTier {
                position: p.index(),
                variant: v.id.clone(),
                weight: v.weight,
                tiers: matching,
            }),
            None => {}
        }
    }
    issues
}

/// Every pair with `weights[i] > weights[j]` must have `probabilities[i] > probabilities[j]`.
pub(crate) fn check_monotonicity(
    position: PositionIndex,
    ids: &[VariantId],
    weights: &[f64],
    probabilities: &[f64],
) -> Vec<DistributionIssue> {
    let mut issues = Vec::new();
    for i in 0..weights.len() {
        for j in 0..weights.len() {
            if weights[i] > weights[j] && probabilities[i] <= probabilities[j] {
                issues.push(DistributionIssue::MonotonicityViolation {
                    position,
                    heavier: ids[i].clone(),
                    lighter: ids[j].clone(),
                    heavier_probability: probabilities[i],
                    lighter_probability: probabilities[j],
                });
            }
        }
    }
    issues
}

fn check_degenerate(p: &GridPosition, tiers: &RarityTiers) -> Option<DistributionIssue> {
    let variants = p.variants();
    let first = variants.first()?.weight;
    if variants.len() < 2 || variants.iter().any(|v| v.weight != first) {
        return None;
    }

    let mut declared: Vec<&str> = variants.iter().filter_map(|v| v.tier.as_deref()).collect();
    declared.sort_unstable();
    declared.dedup();
    let implies_skew = if declared.is_empty() {
        tiers.len() >= 2
    } else {
        declared.len() >= 2
    };

    implies_skew.then(|| DistributionIssue::DegenerateDistribution {
        position: p.index(),
        weight: first,
        variants: variants.len(),
    })
}

fn summarize(p: &GridPosition, weights: &[f64]) -> PositionSummary {
    PositionSummary {
        position: p.index(),
        name: p.name().to_string(),
        variant_probabilities: p
            .variants()
            .iter()
            .enumerate()
            .filter_map(|(i, v)| Some((v.id.clone(), p.variant_probability(i)?)))
            .collect(),
        empty_probability: p.empty_probability(),
        balance_score: balance_score(weights),
    }
}

/// `1 / (1 + coefficient_of_variation)` of `weights`; `0.0` for an empty set.
pub fn balance_score(weights: &[f64]) -> f64 {
    if weights.is_empty() {
        return 0.0;
    }
    let n = weights.len() as f64;
    let mean = weights.iter().sum::<f64>() / n;
    if mean <= 0.0 {
        return 0.0;
    }
    let variance = weights.iter().map(|w| (w - mean).powi(2)).sum::<f64>() / n;
    let cv = variance.sqrt() / mean;
    1.0 / (1.0 + cv)
}

#[cfg(test)]
#[path = "../../tests/unit/rarity/distribution.rs"]
mod tests;
