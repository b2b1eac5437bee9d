//! Equal-rates k-state model (Jukes-Cantor generalisation)
//!
//! Rates are normalised to one expected substitution per unit time, so with
//! `a = k / (k - 1)` and `e = exp(-a t)`:
//! `P_ii = 1/k + (k-1)/k e` and `P_ij = (1 - e)/k`.

use super::{ModelParameter, SubstitutionModel};
use crate::error::{Error, Result};
use ndarray::{Array1, Array2};

/// Symmetric model with uniform stationary distribution
#[derive(Clone, Debug)]
pub struct MkModel {
    states: usize,
    name: String,
}

impl MkModel {
    /// Create a model over `states` states (at least two)
    pub fn new(states: usize) -> Result<Self> {
        if states < 2 {
            return Err(Error::invalid_argument(
                "states",
                format!("an Mk model needs at least 2 states, got {}", states),
            ));
        }
        Ok(Self {
            states,
            name: format!("M{}", states),
        })
    }

    /// Jukes-Cantor model on nucleotides
    pub fn jukes_cantor() -> Self {
        Self {
            states: 4,
            name: "JC69".to_string(),
        }
    }

    fn fill(&self, diagonal: f64, off_diagonal: f64) -> Array2<f64> {
        let k = self.states;
        Array2::from_shape_fn((k, k), |(i, j)| if i == j { diagonal } else { off_diagonal })
    }

    #[inline]
    fn speed(&self) -> f64 {
        let k = self.states as f64;
        k / (k - 1.0)
    }
}

impl SubstitutionModel for MkModel {
    fn name(&self) -> &str {
        &self.name
    }

    fn number_of_states(&self) -> usize {
        self.states
    }

    fn parameters(&self) -> Vec<ModelParameter> {
        Vec::new()
    }

    fn transition_probabilities(&self, _params: &[f64], t: f64) -> Array2<f64> {
        let k = self.states as f64;
        let e = (-self.speed() * t).exp();
        self.fill(1.0 / k + (k - 1.0) / k * e, (1.0 - e) / k)
    }

    fn d_transition_probabilities(&self, _params: &[f64], t: f64) -> Array2<f64> {
        let k = self.states as f64;
        let e = (-self.speed() * t).exp();
        self.fill(-e, e / (k - 1.0))
    }

    fn d2_transition_probabilities(&self, _params: &[f64], t: f64) -> Array2<f64> {
        let k = self.states as f64;
        let a = self.speed();
        let e = (-a * t).exp();
        self.fill(a * e, -a * e / (k - 1.0))
    }

    fn equilibrium_frequencies(&self, _params: &[f64]) -> Array1<f64> {
        Array1::from_elem(self.states, 1.0 / self.states as f64)
    }
}
