//! Element-wise arithmetic on node values
//!
//! Shapes are checked when nodes are created, so a shape disagreement
//! here means a corrupted graph and is reported as an internal error.

use crate::error::{Error, Result};
use crate::tensor::Value;
use ndarray::{Array1, Array2, Zip};

/// Binary element-wise operation kind
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum BinaryOp {
    /// Multiplication: a * b
    Mul,
    /// Division: a / b
    Div,
}

impl BinaryOp {
    #[inline]
    fn apply(self, a: f64, b: f64) -> f64 {
        match self {
            BinaryOp::Mul => a * b,
            BinaryOp::Div => a / b,
        }
    }
}

/// Apply a binary operation entry by entry
pub fn binary(op: BinaryOp, a: &Value, b: &Value) -> Result<Value> {
    match (a, b) {
        (Value::Scalar(x), Value::Scalar(y)) => Ok(Value::Scalar(op.apply(*x, *y))),
        (Value::Vector(x), Value::Vector(y)) if x.len() == y.len() => Ok(Value::Vector(
            Zip::from(x).and(y).map_collect(|&p, &q| op.apply(p, q)),
        )),
        (Value::Matrix(x), Value::Matrix(y)) if x.dim() == y.dim() => Ok(Value::Matrix(
            Zip::from(x).and(y).map_collect(|&p, &q| op.apply(p, q)),
        )),
        _ => Err(shape_error(op, a, b)),
    }
}

fn shape_error(op: BinaryOp, a: &Value, b: &Value) -> Error {
    Error::Internal(format!(
        "{:?} on incompatible values {} and {}",
        op,
        a.dimension(),
        b.dimension()
    ))
}

/// Sum of same-shape values
pub fn add(terms: &[&Value]) -> Result<Value> {
    let (first, rest) = terms
        .split_first()
        .ok_or_else(|| Error::Internal("Add over no operands".to_string()))?;
    let mut acc = (*first).clone();
    for term in rest {
        match (&mut acc, term) {
            (Value::Scalar(x), Value::Scalar(y)) => *x += y,
            (Value::Vector(x), Value::Vector(y)) if x.len() == y.len() => *x += y,
            (Value::Matrix(x), Value::Matrix(y)) if x.dim() == y.dim() => *x += y,
            (acc, term) => {
                return Err(Error::Internal(format!(
                    "Add on incompatible values {} and {}",
                    acc.dimension(),
                    term.dimension()
                )));
            }
        }
    }
    Ok(acc)
}

/// `s * x`
pub fn scale(s: f64, x: &Value) -> Value {
    match x {
        Value::Scalar(v) => Value::Scalar(s * v),
        Value::Vector(v) => Value::Vector(v * s),
        Value::Matrix(m) => Value::Matrix(m * s),
    }
}

/// `-x`
pub fn negate(x: &Value) -> Value {
    scale(-1.0, x)
}

/// Sum of all entries
pub fn sum(x: &Value) -> f64 {
    match x {
        Value::Scalar(v) => *v,
        Value::Vector(v) => v.sum(),
        Value::Matrix(m) => m.sum(),
    }
}

/// Stack equal-length vectors as matrix rows
pub fn stack_rows(rows: &[&Array1<f64>]) -> Result<Array2<f64>> {
    let cols = rows.first().map_or(0, |r| r.len());
    let mut out = Array2::zeros((rows.len(), cols));
    for (i, row) in rows.iter().enumerate() {
        if row.len() != cols {
            return Err(Error::Internal(format!(
                "StackRows row {} has length {}, expected {}",
                i,
                row.len(),
                cols
            )));
        }
        out.row_mut(i).assign(*row);
    }
    Ok(out)
}
