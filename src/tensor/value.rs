//! Value type: the numeric payload carried by dataflow nodes

use super::{Dimension, ValueKind};
use crate::error::{Error, Result};
use ndarray::{Array1, Array2};
use std::fmt;
use std::hash::{Hash, Hasher};

/// A scalar, vector or matrix of `f64`
///
/// Equality and hashing are structural: two values are equal when they have
/// the same shape and bit-identical entries. This is what lets numeric
/// constants take part in node cache keys.
#[derive(Clone)]
pub enum Value {
    /// A single value
    Scalar(f64),
    /// A one-dimensional array
    Vector(Array1<f64>),
    /// A two-dimensional array
    Matrix(Array2<f64>),
}

impl Value {
    /// Zero-filled value of the given shape
    pub fn zeros(dim: Dimension) -> Self {
        match dim {
            Dimension::Scalar => Value::Scalar(0.0),
            Dimension::Vector(n) => Value::Vector(Array1::zeros(n)),
            Dimension::Matrix { rows, cols } => Value::Matrix(Array2::zeros((rows, cols))),
        }
    }

    /// Shape of this value
    pub fn dimension(&self) -> Dimension {
        match self {
            Value::Scalar(_) => Dimension::Scalar,
            Value::Vector(v) => Dimension::Vector(v.len()),
            Value::Matrix(m) => Dimension::matrix(m.nrows(), m.ncols()),
        }
    }

    /// Category of this value
    #[inline]
    pub fn kind(&self) -> ValueKind {
        self.dimension().kind()
    }

    /// Read as a scalar
    pub fn as_scalar(&self) -> Result<f64> {
        match self {
            Value::Scalar(x) => Ok(*x),
            other => Err(Error::Internal(format!(
                "expected a scalar value, got {}",
                other.dimension()
            ))),
        }
    }

    /// Read as a vector
    pub fn as_vector(&self) -> Result<&Array1<f64>> {
        match self {
            Value::Vector(v) => Ok(v),
            other => Err(Error::Internal(format!(
                "expected a vector value, got {}",
                other.dimension()
            ))),
        }
    }

    /// Read as a matrix
    pub fn as_matrix(&self) -> Result<&Array2<f64>> {
        match self {
            Value::Matrix(m) => Ok(m),
            other => Err(Error::Internal(format!(
                "expected a matrix value, got {}",
                other.dimension()
            ))),
        }
    }

    /// Whether every entry is exactly zero
    pub fn is_zero(&self) -> bool {
        self.entries().all(|x| x == 0.0)
    }

    fn entries(&self) -> Box<dyn Iterator<Item = f64> + '_> {
        match self {
            Value::Scalar(x) => Box::new(std::iter::once(*x)),
            Value::Vector(v) => Box::new(v.iter().copied()),
            Value::Matrix(m) => Box::new(m.iter().copied()),
        }
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::Scalar(x)
    }
}

impl From<Array1<f64>> for Value {
    fn from(v: Array1<f64>) -> Self {
        Value::Vector(v)
    }
}

impl From<Array2<f64>> for Value {
    fn from(m: Array2<f64>) -> Self {
        Value::Matrix(m)
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.dimension() == other.dimension()
            && self
                .entries()
                .zip(other.entries())
                .all(|(a, b)| a.to_bits() == b.to_bits())
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.dimension().hash(state);
        for x in self.entries() {
            x.to_bits().hash(state);
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Scalar(x) => write!(f, "Scalar({})", x),
            Value::Vector(v) => write!(f, "Vector({})", v),
            Value::Matrix(m) => write!(f, "Matrix({})", m),
        }
    }
}
