//! Scaled forward and backward recursions of a hidden Markov model
//!
//! Inputs are a starting distribution `start` (`n`), a transition matrix
//! `trans` (`n x n`, rows are "from" states) and emission probabilities
//! `emis` (`n x m`, one column per site).
//!
//! The forward recursion normalises every column:
//!
//! ```text
//! beta_0 = start            beta_j = trans^T . alpha_{j-1}
//! u_j    = beta_j * e_j     c_j    = sum(u_j)
//! alpha_j = u_j / c_j
//! ```
//!
//! and reports `s_j = ln c_j`, so the log-likelihood is `sum_j s_j`. The
//! derivative recursions differentiate these equations, treating `start`,
//! `trans` and `emis` as functions of one scalar parameter.

use ndarray::{Array1, Array2};

/// Output of a forward recursion or one of its derivatives
#[derive(Clone, Debug)]
pub struct ForwardPass {
    /// Per-site log scale (or its derivative)
    pub scales: Array1<f64>,
    /// Normalised conditional hidden-state matrix (or its derivative)
    pub conditional: Array2<f64>,
}

impl ForwardPass {
    fn zeros(states: usize, sites: usize) -> Self {
        Self {
            scales: Array1::zeros(sites),
            conditional: Array2::zeros((states, sites)),
        }
    }
}

/// Primal forward recursion
///
/// A site with zero total probability gets scale `-inf` and an all-zero
/// column, so every later site also reports `-inf`.
pub fn forward(start: &Array1<f64>, trans: &Array2<f64>, emis: &Array2<f64>) -> ForwardPass {
    let (states, sites) = emis.dim();
    let mut out = ForwardPass::zeros(states, sites);
    for j in 0..sites {
        let predicted = if j == 0 {
            start.clone()
        } else {
            trans.t().dot(&out.conditional.column(j - 1))
        };
        let unnormalised = &predicted * &emis.column(j);
        let c = unnormalised.sum();
        let mut column = out.conditional.column_mut(j);
        if c > 0.0 {
            column.assign(&(unnormalised / c));
        } else {
            column.fill(0.0);
        }
        out.scales[j] = c.ln();
    }
    out
}

/// First derivative of the forward recursion
///
/// `primal` is the output of [`forward`] on the same inputs; `dstart`,
/// `dtrans` and `demis` are the derivatives of the inputs.
pub fn forward_d1(
    start: &Array1<f64>,
    trans: &Array2<f64>,
    emis: &Array2<f64>,
    primal: &ForwardPass,
    dstart: &Array1<f64>,
    dtrans: &Array2<f64>,
    demis: &Array2<f64>,
) -> ForwardPass {
    let (states, sites) = emis.dim();
    let mut out = ForwardPass::zeros(states, sites);
    for j in 0..sites {
        let (predicted, dpredicted) = if j == 0 {
            (start.clone(), dstart.clone())
        } else {
            let prev = primal.conditional.column(j - 1);
            let dprev = out.conditional.column(j - 1);
            (
                trans.t().dot(&prev),
                dtrans.t().dot(&prev) + trans.t().dot(&dprev),
            )
        };
        let e = emis.column(j);
        let de = demis.column(j);
        let du = &dpredicted * &e + &predicted * &de;

        let c = primal.scales[j].exp();
        let dc = du.sum();
        let alpha = primal.conditional.column(j);
        let dalpha = (du - &alpha * dc) / c;

        out.conditional.column_mut(j).assign(&dalpha);
        out.scales[j] = dc / c;
    }
    out
}

/// Second derivative of the forward recursion along one parameter
///
/// `first` is the output of [`forward_d1`] for the same parameter.
#[allow(clippy::too_many_arguments)]
pub fn forward_d2(
    start: &Array1<f64>,
    trans: &Array2<f64>,
    emis: &Array2<f64>,
    primal: &ForwardPass,
    dstart: &Array1<f64>,
    dtrans: &Array2<f64>,
    demis: &Array2<f64>,
    first: &ForwardPass,
    d2start: &Array1<f64>,
    d2trans: &Array2<f64>,
    d2emis: &Array2<f64>,
) -> ForwardPass {
    let (states, sites) = emis.dim();
    let mut out = ForwardPass::zeros(states, sites);
    for j in 0..sites {
        let (predicted, dpredicted, d2predicted) = if j == 0 {
            (start.clone(), dstart.clone(), d2start.clone())
        } else {
            let prev = primal.conditional.column(j - 1);
            let dprev = first.conditional.column(j - 1);
            let d2prev = out.conditional.column(j - 1);
            (
                trans.t().dot(&prev),
                dtrans.t().dot(&prev) + trans.t().dot(&dprev),
                d2trans.t().dot(&prev) + dtrans.t().dot(&dprev) * 2.0 + trans.t().dot(&d2prev),
            )
        };
        let e = emis.column(j);
        let de = demis.column(j);
        let d2e = d2emis.column(j);
        let d2u = &d2predicted * &e + (&dpredicted * &de) * 2.0 + &predicted * &d2e;

        let c = primal.scales[j].exp();
        let ds = first.scales[j];
        let dc = ds * c;
        let d2c = d2u.sum();
        let alpha = primal.conditional.column(j);
        let dalpha = first.conditional.column(j);
        let d2alpha = (d2u - &dalpha * (2.0 * dc) - &alpha * d2c) / c;

        out.conditional.column_mut(j).assign(&d2alpha);
        out.scales[j] = d2c / c - ds * ds;
    }
    out
}

/// Scaled backward recursion
///
/// Uses the forward scales so that `alpha_j * b_j` is the posterior
/// distribution of the hidden state at site `j`:
///
/// ```text
/// b_{m-1} = 1
/// b_j     = trans . (e_{j+1} * b_{j+1}) / c_{j+1}
/// ```
pub fn backward(scales: &Array1<f64>, trans: &Array2<f64>, emis: &Array2<f64>) -> Array2<f64> {
    let (states, sites) = emis.dim();
    let mut out = Array2::zeros((states, sites));
    if sites == 0 {
        return out;
    }
    out.column_mut(sites - 1).fill(1.0);
    for j in (0..sites - 1).rev() {
        let weighted = &emis.column(j + 1) * &out.column(j + 1);
        let c = scales[j + 1].exp();
        let column = trans.dot(&weighted) / c;
        out.column_mut(j).assign(&column);
    }
    out
}
