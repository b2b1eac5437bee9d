//! Dimension type: shape contract of a node value

use std::fmt;

/// Category of a value, independent of its extents
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ValueKind {
    /// A single `f64`
    Scalar,
    /// A one-dimensional array
    Vector,
    /// A two-dimensional array
    Matrix,
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueKind::Scalar => write!(f, "scalar"),
            ValueKind::Vector => write!(f, "vector"),
            ValueKind::Matrix => write!(f, "matrix"),
        }
    }
}

/// Shape of a node value
///
/// Vectors carry no orientation: whether a vector is read as a row (site
/// likelihoods, forward scales) or as a column (state frequencies, HMM
/// starting probabilities) is fixed by the node kind consuming it.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Dimension {
    /// A single value
    Scalar,
    /// A vector of the given length
    Vector(usize),
    /// A `rows x cols` matrix
    Matrix {
        /// Number of rows
        rows: usize,
        /// Number of columns
        cols: usize,
    },
}

impl Dimension {
    /// Shorthand for `Dimension::Matrix { rows, cols }`
    #[inline]
    pub const fn matrix(rows: usize, cols: usize) -> Self {
        Dimension::Matrix { rows, cols }
    }

    /// Shorthand for a `states x sites` conditional likelihood matrix
    #[inline]
    pub const fn conditional_likelihood(states: usize, sites: usize) -> Self {
        Dimension::Matrix {
            rows: states,
            cols: sites,
        }
    }

    /// Shorthand for a square transition matrix
    #[inline]
    pub const fn transition_matrix(states: usize) -> Self {
        Dimension::Matrix {
            rows: states,
            cols: states,
        }
    }

    /// Category of values of this shape
    #[inline]
    pub fn kind(&self) -> ValueKind {
        match self {
            Dimension::Scalar => ValueKind::Scalar,
            Dimension::Vector(_) => ValueKind::Vector,
            Dimension::Matrix { .. } => ValueKind::Matrix,
        }
    }

    /// Total number of entries
    #[inline]
    pub fn numel(&self) -> usize {
        match *self {
            Dimension::Scalar => 1,
            Dimension::Vector(n) => n,
            Dimension::Matrix { rows, cols } => rows * cols,
        }
    }

    /// Number of rows for matrices, length for vectors, 1 for scalars
    #[inline]
    pub fn rows(&self) -> usize {
        match *self {
            Dimension::Scalar => 1,
            Dimension::Vector(n) => n,
            Dimension::Matrix { rows, .. } => rows,
        }
    }

    /// Number of columns for matrices, 1 otherwise
    #[inline]
    pub fn cols(&self) -> usize {
        match *self {
            Dimension::Matrix { cols, .. } => cols,
            _ => 1,
        }
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dimension::Scalar => write!(f, "scalar"),
            Dimension::Vector(n) => write!(f, "vector({})", n),
            Dimension::Matrix { rows, cols } => write!(f, "matrix({}x{})", rows, cols),
        }
    }
}
