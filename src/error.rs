//! Error types for phyloflow

use crate::dataflow::NodeId;
use crate::tensor::Dimension;
use thiserror::Error;

/// Result type alias using phyloflow's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while building or evaluating a likelihood graph
///
/// Construction errors are raised before any node is registered, so a failed
/// `create` never leaves a half-built node in the context.
#[derive(Error, Debug)]
pub enum Error {
    /// A dependency handle does not refer to a node of this context
    #[error("{node}: dependency {position} ({id}) is not a node of this context")]
    NullDependency {
        /// Node kind being constructed
        node: &'static str,
        /// Position of the offending dependency
        position: usize,
        /// The unresolved handle
        id: NodeId,
    },

    /// Wrong number of dependencies for a node kind
    #[error("{node}: expected {expected} dependencies, got {got}")]
    DependencyCount {
        /// Node kind being constructed
        node: &'static str,
        /// Expected dependency count (or lower bound, see the node kind)
        expected: usize,
        /// Supplied dependency count
        got: usize,
    },

    /// A dependency has the wrong kind of value or node type
    #[error("{node}: dependency {position} should be {expected}, got {got}")]
    DependencyType {
        /// Node kind being constructed
        node: &'static str,
        /// Position of the offending dependency
        position: usize,
        /// Expected value kind or node type
        expected: String,
        /// Actual value kind or node type
        got: String,
    },

    /// Shape mismatch between a declared contract and a supplied value
    #[error("Dimension mismatch for {what}: expected {expected}, got {got}")]
    DimensionMismatch {
        /// What was being checked
        what: String,
        /// Expected dimension
        expected: Dimension,
        /// Actual dimension
        got: Dimension,
    },

    /// Likelihood graphs can only be built on rooted trees
    #[error("Tree must be rooted to build a likelihood graph")]
    UnrootedTree,

    /// A leaf name has no matching row in the site container
    #[error("Unknown sequence '{name}' in site data")]
    UnknownSequence {
        /// The unresolved leaf name
        name: String,
    },

    /// Invalid argument provided to an operation
    #[error("Invalid argument '{arg}': {reason}")]
    InvalidArgument {
        /// The argument name
        arg: &'static str,
        /// Reason for invalidity
        reason: String,
    },

    /// Generic internal error
    #[error("Internal error: {0}")]
    Internal(String),

    /// Feature not yet implemented
    #[error("Not implemented: {feature}")]
    NotImplemented {
        /// Description of the unimplemented feature
        feature: &'static str,
    },
}

impl Error {
    /// Create a dimension mismatch error
    pub fn dimension_mismatch(what: impl Into<String>, expected: Dimension, got: Dimension) -> Self {
        Self::DimensionMismatch {
            what: what.into(),
            expected,
            got,
        }
    }

    /// Create a dependency type error
    pub fn dependency_type(
        node: &'static str,
        position: usize,
        expected: impl ToString,
        got: impl ToString,
    ) -> Self {
        Self::DependencyType {
            node,
            position,
            expected: expected.to_string(),
            got: got.to_string(),
        }
    }

    /// Create an invalid argument error
    pub fn invalid_argument(arg: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            arg,
            reason: reason.into(),
        }
    }
}
