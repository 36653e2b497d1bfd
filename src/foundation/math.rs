#[derive(Clone, Copy, Debug)]
pub(crate) struct Fnv1a64(u64);

impl Fnv1a64 {
    pub(crate) const OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0000_0100_0000_01B3;

    pub(crate) fn new_default() -> Self {
        Self(Self::OFFSET_BASIS)
    }

    pub(crate) fn write_u8(&mut self, v: u8) {
        self.write_bytes(&[v]);
    }

    pub(crate) fn write_bytes(&mut self, bytes: &[u8]) {
        let mut h = self.0;
        for &b in bytes {
            h ^= u64::from(b);
            h = h.wrapping_mul(Self::PRIME);
        }
        self.0 = h;
    }

    pub(crate) fn finish(self) -> u64 {
        self.0
    }
}

/// Saturating product of option counts; `u128` keeps nine-slot spaces exact in practice.
pub(crate) fn saturating_product(counts: impl IntoIterator<Item = usize>) -> u128 {
    counts
        .into_iter()
        .fold(1u128, |acc, c| acc.saturating_mul(c as u128))
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/math.rs"]
mod tests;
