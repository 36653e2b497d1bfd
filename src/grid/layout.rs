use std::collections::HashSet;

use crate::{
    foundation::core::{CombinationKey, GRID_SLOTS, PositionIndex, TraitKey, VariantId},
    foundation::error::{ConfigurationError, GenError, GenResult},
    foundation::math::saturating_product,
    rarity::weights::{ProbabilityVector, probability_vector},
};

#[derive(Clone, Debug, PartialEq, serde::Serialize)]
/// One trait image usable at a grid position.
pub struct TraitVariant {
    /// Identifier, unique within the position.
    pub id: VariantId,
    /// Normalized relative path handed to the trait loader.
    pub source: String,
    /// Positive finite rarity weight.
    pub weight: f64,
    /// Intended rarity class, when declared.
    pub tier: Option<String>,
}

impl TraitVariant {
    /// Build a variant without a declared tier.
    pub fn new(id: impl Into<VariantId>, source: impl Into<String>, weight: f64) -> Self {
        Self {
            id: id.into(),
            source: source.into(),
            weight,
            tier: None,
        }
    }

    /// Declare the intended rarity class.
    pub fn with_tier(mut self, tier: impl Into<String>) -> Self {
        self.tier = Some(tier.into());
        self
    }
}

#[derive(Clone, Debug, PartialEq, serde::Serialize)]
/// A grid slot with its ordered variants and derived probabilities.
///
/// Variant order is significant: it aligns weights, probabilities and sampled indices. Optional
/// positions carry one trailing "empty" option after the variants.
pub struct GridPosition {
    index: PositionIndex,
    name: String,
    required: bool,
    variants: Vec<TraitVariant>,
    empty_weight: Option<f64>,
    probabilities: ProbabilityVector,
}

impl GridPosition {
    /// Build a position and derive its probability vector.
    ///
    /// For optional positions `empty_weight` is the weight of leaving the slot empty; it
    /// defaults to the smallest variant weight. It is ignored for required positions.
    pub fn new(
        index: PositionIndex,
        name: impl Into<String>,
        required: bool,
        variants: Vec<TraitVariant>,
        empty_weight: Option<f64>,
    ) -> Result<Self, ConfigurationError> {
        let mut weights: Vec<f64> = variants.iter().map(|v| v.weight).collect();
        if weights.is_empty() {
            return Err(ConfigurationError::EmptyWeightSet {
                position: Some(index),
            });
        }

        let empty_weight = if required {
            None
        } else {
            let w = empty_weight
                .unwrap_or_else(|| weights.iter().copied().fold(f64::INFINITY, f64::min));
            weights.push(w);
            Some(w)
        };

        let probabilities = probability_vector(&weights).map_err(|e| e.at_position(index))?;
        Ok(Self {
            index,
            name: name.into(),
            required,
            variants,
            empty_weight,
            probabilities,
        })
    }

    /// Grid slot of this position.
    pub fn index(&self) -> PositionIndex {
        self.index
    }

    /// Human-readable trait category name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether every item must fill this slot.
    pub fn is_required(&self) -> bool {
        self.required
    }

    /// Variants in configuration order.
    pub fn variants(&self) -> &[TraitVariant] {
        &self.variants
    }

    /// Weight of the "empty" option (optional positions only).
    pub fn empty_weight(&self) -> Option<f64> {
        self.empty_weight
    }

    /// Selection probabilities over all options (variants, then "empty" if optional).
    pub fn probabilities(&self) -> &ProbabilityVector {
        &self.probabilities
    }

    /// Number of distinct choices this slot contributes to the combination space.
    pub fn option_count(&self) -> usize {
        self.probabilities.len()
    }

    /// Probability of drawing variant `i`.
    pub fn variant_probability(&self, i: usize) -> Option<f64> {
        if i < self.variants.len() {
            self.probabilities.get(i)
        } else {
            None
        }
    }

    /// Probability of leaving the slot empty (`0.0` for required positions).
    pub fn empty_probability(&self) -> f64 {
        if self.required {
            0.0
        } else {
            self.probabilities.get(self.variants.len()).unwrap_or(0.0)
        }
    }

    /// Variant behind option `option`, or `None` for the "empty" option.
    pub fn option(&self, option: usize) -> Option<&TraitVariant> {
        self.variants.get(option)
    }

    /// Variant with id `id`.
    pub fn find(&self, id: &VariantId) -> Option<&TraitVariant> {
        self.variants.iter().find(|v| &v.id == id)
    }
}

#[derive(Clone, Debug, PartialEq, serde::Serialize)]
/// The configured grid: up to nine positions ordered by index.
pub struct GridLayout {
    positions: Vec<GridPosition>,
}

impl GridLayout {
    /// Build a layout, rejecting duplicate positions and duplicate variant ids.
    pub fn new(mut positions: Vec<GridPosition>) -> GenResult<Self> {
        if positions.is_empty() {
            return Err(GenError::validation(
                "layout must configure at least one position",
            ));
        }
        positions.sort_by_key(|p| p.index);
        for pair in positions.windows(2) {
            if pair[0].index == pair[1].index {
                return Err(GenError::validation(format!(
                    "grid position {} is configured more than once",
                    pair[0].index
                )));
            }
        }
        for p in &positions {
            let mut seen = HashSet::new();
            for v in &p.variants {
                if !seen.insert(&v.id) {
                    return Err(GenError::validation(format!(
                        "variant id '{}' appears more than once in position {}",
                        v.id, p.index
                    )));
                }
            }
        }
        Ok(Self { positions })
    }

    /// Positions in ascending index order.
    pub fn positions(&self) -> &[GridPosition] {
        &self.positions
    }

    /// Position at `index`, if configured.
    pub fn get(&self, index: PositionIndex) -> Option<&GridPosition> {
        self.positions.iter().find(|p| p.index == index)
    }

    /// `true` when all nine slots are configured.
    pub fn is_complete(&self) -> bool {
        self.positions.len() == GRID_SLOTS
    }

    /// Distinct combinations: the product of every position's option count.
    pub fn total_combinations(&self) -> u128 {
        saturating_product(self.positions.iter().map(GridPosition::option_count))
    }

    /// Assemble a key from one option index per configured position.
    pub fn key_for(&self, options: &[usize]) -> CombinationKey {
        let mut key = CombinationKey::default();
        for (p, &option) in self.positions.iter().zip(options) {
            key.set(p.index, p.option(option).map(|v| v.id.clone()));
        }
        key
    }

    /// Source path of the variant behind `key`.
    pub fn source_for(&self, key: &TraitKey) -> Option<&str> {
        self.get(key.position)?
            .find(&key.variant)
            .map(|v| v.source.as_str())
    }
}

#[cfg(test)]
#[path = "../../tests/unit/grid/layout.rs"]
mod tests;
