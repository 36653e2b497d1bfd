use std::{fmt, sync::Arc};

use crate::foundation::error::{GenError, GenResult};
use crate::foundation::math::Fnv1a64;

/// Number of fixed slots in a composite artwork.
pub const GRID_SLOTS: usize = 9;

/// Number of columns (and rows) of the square grid.
pub const GRID_COLUMNS: u8 = 3;

/// 1-based grid slot index in `1..=9`, row-major over a 3x3 grid.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
#[serde(try_from = "u8", into = "u8")]
pub struct PositionIndex(u8);

impl PositionIndex {
    /// Validate a raw 1-based index.
    pub fn new(raw: u8) -> GenResult<Self> {
        if raw == 0 || usize::from(raw) > GRID_SLOTS {
            return Err(GenError::validation(format!(
                "grid position must be in 1..={GRID_SLOTS}, got {raw}"
            )));
        }
        Ok(Self(raw))
    }

    /// Position for a 0-based slot offset.
    pub fn from_slot(slot: usize) -> GenResult<Self> {
        let raw = u8::try_from(slot + 1)
            .map_err(|_| GenError::validation(format!("grid slot {slot} out of range")))?;
        Self::new(raw)
    }

    /// Position at `(row, column)` in the 3x3 grid, both 0-based.
    pub fn from_row_column(row: u8, column: u8) -> GenResult<Self> {
        if row >= GRID_COLUMNS || column >= GRID_COLUMNS {
            return Err(GenError::validation(format!(
                "grid coordinate ({row}, {column}) outside the {GRID_COLUMNS}x{GRID_COLUMNS} grid"
            )));
        }
        Self::new(row * GRID_COLUMNS + column + 1)
    }

    /// Raw 1-based index.
    pub fn get(self) -> u8 {
        self.0
    }

    /// 0-based slot offset, usable to index `[_; GRID_SLOTS]` arrays.
    pub fn slot(self) -> usize {
        usize::from(self.0 - 1)
    }

    /// 0-based grid row.
    pub fn row(self) -> u8 {
        (self.0 - 1) / GRID_COLUMNS
    }

    /// 0-based grid column.
    pub fn column(self) -> u8 {
        (self.0 - 1) % GRID_COLUMNS
    }

    /// All nine positions in ascending order.
    pub fn all() -> impl Iterator<Item = Self> {
        (1..=GRID_SLOTS as u8).map(Self)
    }
}

impl TryFrom<u8> for PositionIndex {
    type Error = GenError;

    fn try_from(raw: u8) -> GenResult<Self> {
        Self::new(raw)
    }
}

impl From<PositionIndex> for u8 {
    fn from(p: PositionIndex) -> Self {
        p.0
    }
}

impl fmt::Display for PositionIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a trait variant, unique within its grid position.
#[derive(
    Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
#[serde(from = "String", into = "String")]
pub struct VariantId(Arc<str>);

impl VariantId {
    /// Wrap an id string.
    pub fn new(id: impl AsRef<str>) -> Self {
        Self(Arc::from(id.as_ref()))
    }

    /// Borrow the id text.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for VariantId {
    fn from(s: String) -> Self {
        Self(Arc::from(s))
    }
}

impl From<&str> for VariantId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<VariantId> for String {
    fn from(v: VariantId) -> Self {
        v.0.to_string()
    }
}

impl fmt::Display for VariantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Cache identity of one trait image: `(position, variant)`.
#[derive(
    Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
pub struct TraitKey {
    /// Grid position of the trait.
    pub position: PositionIndex,
    /// Variant id within the position.
    pub variant: VariantId,
}

impl TraitKey {
    /// Build a key.
    pub fn new(position: PositionIndex, variant: impl Into<VariantId>) -> Self {
        Self {
            position,
            variant: variant.into(),
        }
    }
}

impl fmt::Display for TraitKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.position, self.variant)
    }
}

/// Full nine-slot selection identifying one producible artwork.
///
/// Slot `i` holds the variant chosen for position `i + 1`; `None` marks a slot left empty
/// (optional position) or a position the layout does not configure. Two keys are equal iff all
/// nine components match.
#[derive(
    Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
pub struct CombinationKey {
    slots: [Option<VariantId>; GRID_SLOTS],
}

impl CombinationKey {
    /// Build from per-slot selections in position order.
    pub fn from_slots(slots: [Option<VariantId>; GRID_SLOTS]) -> Self {
        Self { slots }
    }

    /// Selection at `position`.
    pub fn get(&self, position: PositionIndex) -> Option<&VariantId> {
        self.slots[position.slot()].as_ref()
    }

    /// Set (or clear) the selection at `position`.
    pub fn set(&mut self, position: PositionIndex, variant: Option<VariantId>) {
        self.slots[position.slot()] = variant;
    }

    /// All slots in position order.
    pub fn slots(&self) -> &[Option<VariantId>; GRID_SLOTS] {
        &self.slots
    }

    /// Filled slots as cache keys, in position order.
    pub fn trait_keys(&self) -> impl Iterator<Item = TraitKey> + '_ {
        self.slots.iter().enumerate().filter_map(|(slot, v)| {
            let variant = v.as_ref()?;
            let position = PositionIndex::from_slot(slot).ok()?;
            Some(TraitKey::new(position, variant.clone()))
        })
    }

    /// Stable 64-bit fingerprint of the key.
    pub fn fingerprint(&self) -> u64 {
        let mut hasher = Fnv1a64::new_default();
        for slot in &self.slots {
            match slot {
                Some(v) => {
                    hasher.write_u8(1);
                    hasher.write_bytes(v.as_str().as_bytes());
                    hasher.write_u8(0);
                }
                None => hasher.write_u8(0),
            }
        }
        hasher.finish()
    }
}

impl fmt::Display for CombinationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (slot, v) in self.slots.iter().enumerate() {
            if slot > 0 {
                f.write_str("|")?;
            }
            match v {
                Some(v) => write!(f, "{}:{v}", slot + 1)?,
                None => write!(f, "{}:-", slot + 1)?,
            }
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/core.rs"]
mod tests;
