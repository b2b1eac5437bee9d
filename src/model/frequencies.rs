//! Frequency sets for root state distributions

use super::{FrequencySet, ModelParameter};
use crate::error::{Error, Result};
use ndarray::Array1;

const SUM_TOLERANCE: f64 = 1e-9;

fn check_distribution(freqs: &Array1<f64>) -> Result<()> {
    if freqs.len() < 2 {
        return Err(Error::invalid_argument(
            "frequencies",
            format!("need at least 2 states, got {}", freqs.len()),
        ));
    }
    if freqs.iter().any(|&f| !(0.0..=1.0).contains(&f)) {
        return Err(Error::invalid_argument(
            "frequencies",
            "every frequency must lie in [0, 1]",
        ));
    }
    let total = freqs.sum();
    if (total - 1.0).abs() > SUM_TOLERANCE {
        return Err(Error::invalid_argument(
            "frequencies",
            format!("frequencies must sum to 1, got {}", total),
        ));
    }
    Ok(())
}

/// Frequencies without free parameters
#[derive(Clone, Debug)]
pub struct FixedFrequencySet {
    freqs: Array1<f64>,
}

impl FixedFrequencySet {
    /// Create from an explicit distribution
    pub fn new(freqs: Array1<f64>) -> Result<Self> {
        check_distribution(&freqs)?;
        Ok(Self { freqs })
    }
}

impl FrequencySet for FixedFrequencySet {
    fn name(&self) -> &str {
        "Fixed"
    }

    fn number_of_states(&self) -> usize {
        self.freqs.len()
    }

    fn parameters(&self) -> Vec<ModelParameter> {
        Vec::new()
    }

    fn frequencies(&self, _params: &[f64]) -> Array1<f64> {
        self.freqs.clone()
    }
}

/// Fully parameterised frequencies using stick-breaking proportions
///
/// With `k` states there are `k - 1` parameters `theta1..theta{k-1}` in
/// `[0, 1]`: `f1 = theta1`, `f2 = (1 - theta1) theta2`, ..., and the last
/// state takes the remaining mass.
#[derive(Clone, Debug)]
pub struct FullFrequencySet {
    initial: Array1<f64>,
}

impl FullFrequencySet {
    /// Create with the given initial frequencies
    pub fn new(initial: Array1<f64>) -> Result<Self> {
        check_distribution(&initial)?;
        Ok(Self { initial })
    }

    /// Uniform initial frequencies over `states` states
    pub fn uniform(states: usize) -> Result<Self> {
        Self::new(Array1::from_elem(states, 1.0 / states.max(1) as f64))
    }

    fn thetas(freqs: &Array1<f64>) -> Vec<f64> {
        let mut remaining = 1.0;
        let mut thetas = Vec::with_capacity(freqs.len() - 1);
        for &f in freqs.iter().take(freqs.len() - 1) {
            let theta = if remaining > 0.0 { f / remaining } else { 0.0 };
            thetas.push(theta.clamp(0.0, 1.0));
            remaining -= f;
        }
        thetas
    }
}

impl FrequencySet for FullFrequencySet {
    fn name(&self) -> &str {
        "Full"
    }

    fn number_of_states(&self) -> usize {
        self.initial.len()
    }

    fn parameters(&self) -> Vec<ModelParameter> {
        Self::thetas(&self.initial)
            .into_iter()
            .enumerate()
            .map(|(i, theta)| ModelParameter::new(format!("theta{}", i + 1), theta))
            .collect()
    }

    fn frequencies(&self, params: &[f64]) -> Array1<f64> {
        let k = self.initial.len();
        let mut freqs = Array1::zeros(k);
        let mut remaining = 1.0;
        for (i, &theta) in params.iter().take(k - 1).enumerate() {
            freqs[i] = remaining * theta;
            remaining *= 1.0 - theta;
        }
        freqs[k - 1] = remaining;
        freqs
    }
}
