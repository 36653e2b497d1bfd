use std::{collections::HashSet, fs::File, io::BufReader, path::Path};

use crate::{
    assets::cache::CacheConfig,
    assets::loader::normalize_rel_path,
    foundation::core::{GRID_SLOTS, PositionIndex},
    foundation::error::{ConfigurationError, GenError, GenResult, WeightDefect},
    generate::pipeline::GenerationSettings,
    grid::layout::{GridLayout, GridPosition, TraitVariant},
    rarity::distribution::{RarityTiers, SimulationSettings},
};

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
/// Complete generation configuration.
///
/// Structural validity (field types, required keys) is assumed to be checked upstream; the
/// semantic checks live in [`GenConfig::validate`].
pub struct GenConfig {
    /// Collection target.
    pub collection: CollectionSettings,
    /// Configured grid positions.
    pub positions: Vec<PositionConfig>,
    /// Tier name to weight bounds.
    #[serde(default)]
    pub rarity_tiers: RarityTiers,
    /// Trait payload cache.
    #[serde(default)]
    pub cache: CacheConfig,
    /// Sampling and resolution parallelism.
    #[serde(default)]
    pub generation: GenerationSettings,
    /// Pre-flight accuracy simulation.
    #[serde(default)]
    pub simulation: SimulationSettings,
}

#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
/// What to produce.
pub struct CollectionSettings {
    /// Collection name.
    #[serde(default)]
    pub name: String,
    /// Number of items.
    pub size: u64,
    /// Whether combinations may repeat.
    #[serde(default)]
    pub allow_duplicates: bool,
    /// Global random seed.
    #[serde(default)]
    pub seed: u64,
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
/// One grid slot and its variants.
pub struct PositionConfig {
    /// 1-based grid slot.
    pub position: u8,
    /// Trait category name.
    #[serde(default)]
    pub name: String,
    /// Whether every item fills this slot.
    #[serde(default = "default_required")]
    pub required: bool,
    /// Weight of leaving an optional slot empty.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub empty_weight: Option<f64>,
    /// Variants in significant order.
    pub variants: Vec<VariantConfig>,
}

fn default_required() -> bool {
    true
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
/// One trait image option.
pub struct VariantConfig {
    /// Identifier, unique within the position.
    pub id: String,
    /// Relative path of the trait image.
    pub source: String,
    /// Rarity weight.
    #[serde(default)]
    pub weight: Option<f64>,
    /// Intended rarity tier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tier: Option<String>,
}

impl GenConfig {
    /// Parse a configuration from a JSON reader.
    pub fn from_reader<R: std::io::Read>(r: R) -> GenResult<Self> {
        serde_json::from_reader(r).map_err(|e| GenError::serde(format!("parse config JSON: {e}")))
    }

    /// Parse a configuration from a JSON file on disk.
    pub fn from_path(path: impl AsRef<Path>) -> GenResult<Self> {
        let path = path.as_ref();
        let f = File::open(path).map_err(|e| {
            GenError::validation(format!("open config JSON '{}': {e}", path.display()))
        })?;
        Self::from_reader(BufReader::new(f))
    }

    /// Parse a configuration from a JSON string.
    pub fn from_json_str(s: &str) -> GenResult<Self> {
        serde_json::from_str(s).map_err(|e| GenError::serde(format!("parse config JSON: {e}")))
    }

    /// Pretty JSON rendering.
    pub fn to_json_pretty(&self) -> GenResult<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| GenError::serde(format!("serialize config JSON: {e}")))
    }

    /// Semantic checks the structural validation step cannot express.
    pub fn validate(&self) -> GenResult<()> {
        if self.collection.size == 0 {
            return Err(GenError::validation("collection size must be > 0"));
        }
        if self.positions.is_empty() {
            return Err(GenError::validation("at least one grid position is required"));
        }
        if self.positions.len() > GRID_SLOTS {
            return Err(GenError::validation(format!(
                "at most {GRID_SLOTS} grid positions can be configured"
            )));
        }

        let mut seen_positions = HashSet::new();
        for p in &self.positions {
            let index = PositionIndex::new(p.position)?;
            if !seen_positions.insert(index) {
                return Err(GenError::validation(format!(
                    "grid position {index} is configured more than once"
                )));
            }
            if p.variants.is_empty() {
                return Err(ConfigurationError::EmptyWeightSet {
                    position: Some(index),
                }
                .into());
            }
            let mut seen_ids = HashSet::new();
            for v in &p.variants {
                if v.id.trim().is_empty() {
                    return Err(GenError::validation(format!(
                        "position {index} has a variant with an empty id"
                    )));
                }
                if !seen_ids.insert(v.id.as_str()) {
                    return Err(GenError::validation(format!(
                        "variant id '{}' appears more than once in position {index}",
                        v.id
                    )));
                }
                normalize_rel_path(&v.source)?;
            }
        }

        let g = &self.generation;
        if g.workers == 0 {
            return Err(GenError::validation("generation workers must be >= 1"));
        }
        if g.threads == Some(0) {
            return Err(GenError::validation("generation threads must be >= 1 when set"));
        }
        if g.max_attempts == 0 {
            return Err(GenError::validation("generation max_attempts must be >= 1"));
        }

        let c = &self.cache;
        if c.capacity_bytes == 0 {
            return Err(GenError::validation("cache capacity_bytes must be > 0"));
        }
        if c.max_entries == Some(0) {
            return Err(GenError::validation("cache max_entries must be >= 1 when set"));
        }
        if c.load_timeout_ms == 0 {
            return Err(GenError::validation("cache load_timeout_ms must be > 0"));
        }

        let tolerance = self.simulation.tolerance;
        if !(tolerance.is_finite() && tolerance > 0.0 && tolerance <= 1.0) {
            return Err(GenError::validation("simulation tolerance must be in (0, 1]"));
        }
        Ok(())
    }

    /// Build the grid layout, deriving each position's probability vector once.
    pub fn build_layout(&self) -> GenResult<GridLayout> {
        let mut positions = Vec::with_capacity(self.positions.len());
        for p in &self.positions {
            let index = PositionIndex::new(p.position)?;
            let mut variants = Vec::with_capacity(p.variants.len());
            for (i, v) in p.variants.iter().enumerate() {
                let weight = v.weight.ok_or(ConfigurationError::InvalidWeight {
                    position: Some(index),
                    index: i,
                    weight: f64::NAN,
                    defect: WeightDefect::Missing,
                })?;
                variants.push(TraitVariant {
                    id: v.id.as_str().into(),
                    source: normalize_rel_path(&v.source)?,
                    weight,
                    tier: v.tier.clone(),
                });
            }
            positions.push(GridPosition::new(
                index,
                p.name.clone(),
                p.required,
                variants,
                p.empty_weight,
            )?);
        }
        GridLayout::new(positions)
    }
}

#[cfg(test)]
#[path = "../../tests/unit/config/model.rs"]
mod tests;
