//! Two-state gain/loss model
//!
//! Rate matrix `Q = [[-gain, gain], [loss, -loss]]`. With `r = gain + loss`
//! and `e = exp(-r t)` the transition probabilities are
//!
//! ```text
//! P00 = (loss + gain e) / r     P01 = gain (1 - e) / r
//! P10 = loss (1 - e) / r        P11 = (gain + loss e) / r
//! ```
//!
//! and the stationary distribution is `(loss / r, gain / r)`.

use super::{ModelParameter, SubstitutionModel};
use ndarray::{Array1, Array2, array};

/// Total rate below which the chain is treated as frozen
const FROZEN_RATE: f64 = 1e-12;

/// Binary trait evolution model with gain and loss rates
#[derive(Clone, Debug)]
pub struct BinaryModel {
    gain: f64,
    loss: f64,
}

impl BinaryModel {
    /// Create a model with initial gain (`0 -> 1`) and loss (`1 -> 0`) rates
    pub fn new(gain: f64, loss: f64) -> Self {
        Self { gain, loss }
    }

    fn rates(params: &[f64]) -> (f64, f64) {
        (params[0], params[1])
    }
}

impl SubstitutionModel for BinaryModel {
    fn name(&self) -> &str {
        "Binary"
    }

    fn number_of_states(&self) -> usize {
        2
    }

    fn parameters(&self) -> Vec<ModelParameter> {
        vec![
            ModelParameter::new("gain", self.gain),
            ModelParameter::new("loss", self.loss),
        ]
    }

    fn transition_probabilities(&self, params: &[f64], t: f64) -> Array2<f64> {
        let (gain, loss) = Self::rates(params);
        let r = gain + loss;
        if r < FROZEN_RATE {
            return Array2::eye(2);
        }
        let e = (-r * t).exp();
        array![
            [(loss + gain * e) / r, gain * (1.0 - e) / r],
            [loss * (1.0 - e) / r, (gain + loss * e) / r]
        ]
    }

    fn d_transition_probabilities(&self, params: &[f64], t: f64) -> Array2<f64> {
        let (gain, loss) = Self::rates(params);
        let r = gain + loss;
        if r < FROZEN_RATE {
            return Array2::zeros((2, 2));
        }
        let e = (-r * t).exp();
        array![[-gain * e, gain * e], [loss * e, -loss * e]]
    }

    fn d2_transition_probabilities(&self, params: &[f64], t: f64) -> Array2<f64> {
        let (gain, loss) = Self::rates(params);
        let r = gain + loss;
        if r < FROZEN_RATE {
            return Array2::zeros((2, 2));
        }
        let e = (-r * t).exp();
        array![
            [gain * r * e, -gain * r * e],
            [-loss * r * e, loss * r * e]
        ]
    }

    fn equilibrium_frequencies(&self, params: &[f64]) -> Array1<f64> {
        let (gain, loss) = Self::rates(params);
        let r = gain + loss;
        if r < FROZEN_RATE {
            return array![0.5, 0.5];
        }
        array![loss / r, gain / r]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rows_sum_to_one() {
        let model = BinaryModel::new(1.0, 0.5);
        let params = [1.0, 0.5];
        let p = model.transition_probabilities(&params, 0.7);
        for row in p.rows() {
            assert!((row.sum() - 1.0).abs() < 1e-12);
        }
        let dp = model.d_transition_probabilities(&params, 0.7);
        for row in dp.rows() {
            assert!(row.sum().abs() < 1e-12);
        }
    }

    #[test]
    fn test_derivative_matches_finite_difference() {
        let model = BinaryModel::new(1.3, 0.4);
        let params = [1.3, 0.4];
        let (t, h) = (0.35, 1e-5);
        let plus = model.transition_probabilities(&params, t + h);
        let minus = model.transition_probabilities(&params, t - h);
        let fd = (&plus - &minus) / (2.0 * h);
        let dp = model.d_transition_probabilities(&params, t);
        for (a, b) in fd.iter().zip(dp.iter()) {
            assert!((a - b).abs() < 1e-8);
        }

        let dplus = model.d_transition_probabilities(&params, t + h);
        let dminus = model.d_transition_probabilities(&params, t - h);
        let fd2 = (&dplus - &dminus) / (2.0 * h);
        let d2p = model.d2_transition_probabilities(&params, t);
        for (a, b) in fd2.iter().zip(d2p.iter()) {
            assert!((a - b).abs() < 1e-8);
        }
    }

    #[test]
    fn test_stationary_distribution() {
        let model = BinaryModel::new(1.5, 2.0);
        let pi = model.equilibrium_frequencies(&[1.5, 2.0]);
        assert!((pi.sum() - 1.0).abs() < 1e-12);
        assert!(pi[0] > pi[1]);

        // pi P(t) = pi
        let p = model.transition_probabilities(&[1.5, 2.0], 3.0);
        let moved = pi.dot(&p);
        for (a, b) in moved.iter().zip(pi.iter()) {
            assert!((a - b).abs() < 1e-12);
        }
    }
}
