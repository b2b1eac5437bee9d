//! Central finite differences over a parameter vector

use crate::error::Result;
use ndarray::{Array, Dimension as Shape};

/// Mixed central difference of `f` along the parameters listed in `orders`
///
/// Each entry of `orders` is a parameter index; `[k]` gives `df/dp_k`,
/// `[k, l]` gives `d2f/(dp_k dp_l)`. An empty list evaluates `f` itself.
pub fn central_difference<D, F>(params: &[f64], orders: &[usize], step: f64, f: &F) -> Result<Array<f64, D>>
where
    D: Shape,
    F: Fn(&[f64]) -> Result<Array<f64, D>>,
{
    let Some((&k, rest)) = orders.split_first() else {
        return f(params);
    };
    let mut shifted = params.to_vec();
    shifted[k] = params[k] + step;
    let mut upper = central_difference(&shifted, rest, step, f)?;
    shifted[k] = params[k] - step;
    let lower = central_difference(&shifted, rest, step, f)?;
    let width = 2.0 * step;
    upper.zip_mut_with(&lower, |u, &l| *u = (*u - l) / width);
    Ok(upper)
}
