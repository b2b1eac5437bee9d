//! Felsenstein pruning kernels
//!
//! Conditional likelihood matrices are `states x sites`: entry `(i, s)` is
//! the probability of the data below a node at site `s` given state `i` at
//! that node.

use ndarray::{Array1, Array2};

/// Propagate conditional likelihoods up a branch: `P . C`
pub fn forward_likelihood(transition: &Array2<f64>, conditional: &Array2<f64>) -> Array2<f64> {
    transition.dot(conditional)
}

/// Combine the forward likelihoods of a node's children
pub fn conditional_likelihood(children: &[&Array2<f64>]) -> Array2<f64> {
    let mut iter = children.iter();
    let mut acc = match iter.next() {
        Some(first) => (*first).clone(),
        None => return Array2::zeros((0, 0)),
    };
    for child in iter {
        acc *= *child;
    }
    acc
}

/// Per-site likelihood at the root: `pi^T . C`
pub fn site_likelihoods(frequencies: &Array1<f64>, conditional: &Array2<f64>) -> Array1<f64> {
    frequencies.dot(conditional)
}

/// `sum_s ln L_s`
pub fn total_log_likelihood(sites: &Array1<f64>) -> f64 {
    sites.iter().map(|l| l.ln()).sum()
}
