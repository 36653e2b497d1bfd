use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::{
    foundation::core::CombinationKey,
    foundation::error::SamplingError,
    generate::ledger::CombinationLedger,
    grid::layout::GridLayout,
    rarity::weights::ProbabilityVector,
};

/// Explicit, reproducible random source threaded through sampling calls.
///
/// Two sources built from the same seed (or the same `(seed, worker, counter)` triple) yield
/// identical draw sequences.
#[derive(Clone, Debug)]
pub struct RandomSource {
    rng: ChaCha8Rng,
}

impl RandomSource {
    /// Source seeded from a single 64-bit seed.
    pub fn from_seed(seed: u64) -> Self {
        Self {
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    /// Independent substream for draw `counter` of worker `worker` under global `seed`.
    ///
    /// The three values are laid out verbatim in the ChaCha key, so distinct triples never
    /// share a stream.
    pub fn substream(seed: u64, worker: u32, counter: u64) -> Self {
        let mut key = [0u8; 32];
        key[0..8].copy_from_slice(&seed.to_le_bytes());
        key[8..12].copy_from_slice(&worker.to_le_bytes());
        key[12..20].copy_from_slice(&counter.to_le_bytes());
        key[20..24].copy_from_slice(b"gcfg");
        Self {
            rng: ChaCha8Rng::from_seed(key),
        }
    }

    /// Uniform value in `[0, 1)`.
    pub fn next_unit(&mut self) -> f64 {
        self.rng.r#gen::<f64>()
    }
}

/// Inverse-transform sampling: draw `u` in `[0, 1)` and return the smallest index whose
/// cumulative probability reaches `u`.
pub fn draw(probabilities: &ProbabilityVector, rng: &mut RandomSource) -> usize {
    let u = rng.next_unit();
    probabilities.index_for(u)
}

/// Empirical selection frequency of each option over `samples` draws.
pub fn sample_frequencies(
    probabilities: &ProbabilityVector,
    rng: &mut RandomSource,
    samples: usize,
) -> Vec<f64> {
    let mut counts = vec![0usize; probabilities.len()];
    for _ in 0..samples {
        counts[draw(probabilities, rng)] += 1;
    }
    let n = samples.max(1) as f64;
    counts.into_iter().map(|c| c as f64 / n).collect()
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
/// Retry bounds for collision handling when duplicates are disallowed.
#[serde(default)]
pub struct SamplingPolicy {
    /// Attempts allowed while the combination space is still untouched.
    pub max_attempts: u32,
    /// Floor for the budget while at least one combination remains unused.
    pub min_attempts: u32,
}

impl Default for SamplingPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 1000,
            min_attempts: 1,
        }
    }
}

impl SamplingPolicy {
    /// Attempts allowed for one draw given how much of the space is already used.
    ///
    /// `ceil(max_attempts * remaining / total)`, floored at `min_attempts`; `0` once the space is
    /// exhausted.
    pub fn retry_budget(&self, total_combinations: u128, emitted: u64) -> u32 {
        let remaining = total_combinations.saturating_sub(u128::from(emitted));
        if remaining == 0 || total_combinations == 0 {
            return 0;
        }
        let fraction = remaining as f64 / total_combinations as f64;
        let scaled = (f64::from(self.max_attempts) * fraction).ceil() as u32;
        scaled.max(self.min_attempts).max(1)
    }
}

/// Draws one option per grid position and assembles [`CombinationKey`]s.
///
/// Positions are sampled independently, in ascending index order, from the caller's
/// [`RandomSource`]; no other state influences the draw.
#[derive(Clone, Copy, Debug)]
pub struct WeightedSampler<'a> {
    layout: &'a GridLayout,
    policy: SamplingPolicy,
}

impl<'a> WeightedSampler<'a> {
    /// Sampler over `layout` using `policy` for collision retries.
    pub fn new(layout: &'a GridLayout, policy: SamplingPolicy) -> Self {
        Self { layout, policy }
    }

    /// Layout being sampled.
    pub fn layout(&self) -> &'a GridLayout {
        self.layout
    }

    /// Draw one key without consulting any ledger.
    pub fn draw_key(&self, rng: &mut RandomSource) -> CombinationKey {
        let mut key = CombinationKey::default();
        for p in self.layout.positions() {
            let option = draw(p.probabilities(), rng);
            key.set(p.index(), p.option(option).map(|v| v.id.clone()));
        }
        key
    }

    /// Draw a combination and register it with `ledger`.
    ///
    /// With duplicates disallowed, colliding draws are retried with fresh randomness up to
    /// [`SamplingPolicy::retry_budget`] attempts; the ledger is only mutated by a successful
    /// claim.
    pub fn draw_combination(
        &self,
        rng: &mut RandomSource,
        ledger: &CombinationLedger,
        allow_duplicates: bool,
    ) -> Result<CombinationKey, SamplingError> {
        self.draw_counted(rng, ledger, allow_duplicates).map(|(key, _)| key)
    }

    /// [`Self::draw_combination`], also returning the number of attempts spent.
    pub fn draw_counted(
        &self,
        rng: &mut RandomSource,
        ledger: &CombinationLedger,
        allow_duplicates: bool,
    ) -> Result<(CombinationKey, u32), SamplingError> {
        if allow_duplicates {
            let key = self.draw_key(rng);
            ledger.record(&key);
            return Ok((key, 1));
        }

        let total = self.layout.total_combinations();
        let budget = self.policy.retry_budget(total, ledger.distinct_len());
        let mut last_collision = CombinationKey::default();
        for attempt in 1..=budget {
            let key = self.draw_key(rng);
            if ledger.try_claim(&key) {
                return Ok((key, attempt));
            }
            tracing::debug!(attempt, key = %key, "combination collision");
            last_collision = key;
        }

        Err(SamplingError::ExhaustedCombinationSpace {
            attempts: budget,
            emitted: ledger.distinct_len(),
            total_combinations: total,
            last_collision,
        })
    }
}

#[cfg(test)]
#[path = "../../tests/unit/rarity/sampler.rs"]
mod tests;
