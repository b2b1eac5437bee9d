//! Site-rate distributions
//!
//! A rate distribution splits sites into categories evolving at scaled
//! speeds. The tree likelihood builds one conditional-likelihood graph per
//! category, with every branch length multiplied by the category rate, and
//! mixes the per-category site likelihoods by the category probabilities.

use crate::error::{Error, Result};
use std::fmt;

const SUM_TOLERANCE: f64 = 1e-9;

/// One rate category
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct RateCategory {
    /// Multiplier applied to branch lengths
    pub rate: f64,
    /// Prior probability of the category
    pub probability: f64,
}

/// Discrete distribution of site rates
pub trait RateDistribution: fmt::Debug {
    /// Categories with their rates and probabilities
    fn categories(&self) -> Vec<RateCategory>;
}

/// Single category of rate 1
#[derive(Copy, Clone, Debug, Default)]
pub struct ConstantRate;

impl RateDistribution for ConstantRate {
    fn categories(&self) -> Vec<RateCategory> {
        vec![RateCategory {
            rate: 1.0,
            probability: 1.0,
        }]
    }
}

/// Explicit list of rate categories
#[derive(Clone, Debug)]
pub struct DiscreteRates {
    categories: Vec<RateCategory>,
}

impl DiscreteRates {
    /// Create from parallel slices of rates and probabilities
    pub fn new(rates: &[f64], probabilities: &[f64]) -> Result<Self> {
        if rates.is_empty() || rates.len() != probabilities.len() {
            return Err(Error::invalid_argument(
                "rates",
                format!(
                    "need one probability per rate, got {} rates and {} probabilities",
                    rates.len(),
                    probabilities.len()
                ),
            ));
        }
        if rates.iter().any(|&r| !(r.is_finite() && r >= 0.0)) {
            return Err(Error::invalid_argument(
                "rates",
                "rates must be finite and non-negative",
            ));
        }
        if probabilities.iter().any(|&p| !(0.0..=1.0).contains(&p)) {
            return Err(Error::invalid_argument(
                "probabilities",
                "probabilities must lie in [0, 1]",
            ));
        }
        let total: f64 = probabilities.iter().sum();
        if (total - 1.0).abs() > SUM_TOLERANCE {
            return Err(Error::invalid_argument(
                "probabilities",
                format!("probabilities must sum to 1, got {}", total),
            ));
        }
        Ok(Self {
            categories: rates
                .iter()
                .zip(probabilities)
                .map(|(&rate, &probability)| RateCategory { rate, probability })
                .collect(),
        })
    }
}

impl RateDistribution for DiscreteRates {
    fn categories(&self) -> Vec<RateCategory> {
        self.categories.clone()
    }
}
