use crate::foundation::error::{ConfigurationError, WeightDefect};

/// Allowed deviation of a probability vector's sum from `1.0`.
pub const PROBABILITY_TOLERANCE: f64 = 1e-9;

/// Normalized selection probabilities for one grid position.
///
/// Entries align positionally with the weights they were derived from. Every entry lies in
/// `(0, 1]` and the entries sum to `1.0` within [`PROBABILITY_TOLERANCE`].
#[derive(Clone, Debug, PartialEq, serde::Serialize)]
pub struct ProbabilityVector {
    probabilities: Vec<f64>,
    #[serde(skip)]
    cumulative: Vec<f64>,
}

impl ProbabilityVector {
    /// Per-option probabilities in input order.
    pub fn as_slice(&self) -> &[f64] {
        &self.probabilities
    }

    /// Running sums of [`Self::as_slice`]; the last entry is exactly `1.0`.
    pub fn cumulative(&self) -> &[f64] {
        &self.cumulative
    }

    /// Number of options.
    pub fn len(&self) -> usize {
        self.probabilities.len()
    }

    /// Always `false`: empty weight sets are rejected at construction.
    pub fn is_empty(&self) -> bool {
        self.probabilities.is_empty()
    }

    /// Probability of option `index`.
    pub fn get(&self, index: usize) -> Option<f64> {
        self.probabilities.get(index).copied()
    }

    /// Smallest index whose cumulative probability reaches `u`.
    ///
    /// `u` is expected in `[0, 1)`; values at or above the final boundary resolve to the last
    /// option.
    pub fn index_for(&self, u: f64) -> usize {
        let i = self.cumulative.partition_point(|&c| c < u);
        i.min(self.cumulative.len().saturating_sub(1))
    }
}

/// Convert raw weights into a [`ProbabilityVector`].
///
/// `probability_i = weight_i / sum(weights)`, order-preserving with no rounding or
/// renormalization bias.
pub fn probability_vector(weights: &[f64]) -> Result<ProbabilityVector, ConfigurationError> {
    if weights.is_empty() {
        return Err(ConfigurationError::EmptyWeightSet { position: None });
    }
    for (index, &weight) in weights.iter().enumerate() {
        check_weight(index, weight)?;
    }

    let total: f64 = weights.iter().sum();
    if !total.is_finite() {
        // Individually finite weights can still overflow when summed.
        let (index, &weight) = weights
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .unwrap_or((0, &f64::INFINITY));
        return Err(ConfigurationError::InvalidWeight {
            position: None,
            index,
            weight,
            defect: WeightDefect::NonFinite,
        });
    }

    let mut probabilities = Vec::with_capacity(weights.len());
    for (index, &weight) in weights.iter().enumerate() {
        let p = weight / total;
        if p <= 0.0 {
            return Err(ConfigurationError::InvalidWeight {
                position: None,
                index,
                weight,
                defect: WeightDefect::NonPositive,
            });
        }
        probabilities.push(p);
    }

    let mut cumulative = Vec::with_capacity(probabilities.len());
    let mut running = 0.0;
    for p in &probabilities {
        running += p;
        cumulative.push(running);
    }
    if let Some(last) = cumulative.last_mut() {
        *last = 1.0;
    }

    Ok(ProbabilityVector {
        probabilities,
        cumulative,
    })
}

fn check_weight(index: usize, weight: f64) -> Result<(), ConfigurationError> {
    let defect = if !weight.is_finite() {
        WeightDefect::NonFinite
    } else if weight <= 0.0 {
        WeightDefect::NonPositive
    } else {
        return Ok(());
    };
    Err(ConfigurationError::InvalidWeight {
        position: None,
        index,
        weight,
        defect,
    })
}

/// Aggregate view of one weight set and its derived probabilities.
#[derive(Clone, Debug, PartialEq, serde::Serialize)]
pub struct WeightSummary {
    /// Number of weights.
    pub count: usize,
    /// Sum of all weights.
    pub total_weight: f64,
    /// Smallest derived probability.
    pub min_probability: f64,
    /// Largest derived probability.
    pub max_probability: f64,
    /// Sum of the derived probabilities.
    pub probability_sum: f64,
}

/// Summarize `weights` and the vector derived from them.
pub fn weight_summary(weights: &[f64]) -> Result<WeightSummary, ConfigurationError> {
    let pv = probability_vector(weights)?;
    let probs = pv.as_slice();
    Ok(WeightSummary {
        count: weights.len(),
        total_weight: weights.iter().sum(),
        min_probability: probs.iter().copied().fold(f64::INFINITY, f64::min),
        max_probability: probs.iter().copied().fold(0.0, f64::max),
        probability_sum: probs.iter().sum(),
    })
}

#[cfg(test)]
#[path = "../../tests/unit/rarity/weights.rs"]
mod tests;
