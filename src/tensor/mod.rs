//! Value containers and their shape descriptors
//!
//! Node values are plain `ndarray` containers; this module adds the
//! `Dimension` contract checked at node construction and the `Value` enum
//! that carries a node's result.

mod dimension;
mod value;

pub use dimension::{Dimension, ValueKind};
pub use value::Value;
