//! Node: one computation in the dataflow graph

use super::{NodeId, Op};
use crate::tensor::{Dimension, Value};
use ndarray::Array2;
use smallvec::SmallVec;

/// Dependency list of a node
pub type Dependencies = SmallVec<[NodeId; 4]>;

/// A node of the dataflow graph
///
/// The kind and dependency list are fixed at construction. The cached value
/// starts absent, is filled on first evaluation and is marked dirty (not
/// dropped) when an upstream parameter changes.
///
/// # Generations
///
/// `generation` counts invalidations of this node. A value read at
/// generation `g` is still current as long as the generation has not moved.
pub struct Node {
    op: Op,
    deps: Dependencies,
    dim: Dimension,
    value: Option<Value>,
    /// Auxiliary matrix kept by forward recursion nodes
    retained: Option<Array2<f64>>,
    dirty: bool,
    generation: u64,
    computations: u64,
}

impl Node {
    pub(crate) fn new(op: Op, deps: Dependencies, dim: Dimension) -> Self {
        Self {
            op,
            deps,
            dim,
            value: None,
            retained: None,
            dirty: true,
            generation: 0,
            computations: 0,
        }
    }

    /// Kind of computation
    #[inline]
    pub fn op(&self) -> &Op {
        &self.op
    }

    /// Dependencies, in signature order
    #[inline]
    pub fn dependencies(&self) -> &[NodeId] {
        &self.deps
    }

    /// Declared output shape
    #[inline]
    pub fn dimension(&self) -> Dimension {
        self.dim
    }

    /// Cached value, possibly stale
    #[inline]
    pub fn cached(&self) -> Option<&Value> {
        self.value.as_ref()
    }

    /// Matrix retained by a forward recursion, possibly stale
    #[inline]
    pub fn retained(&self) -> Option<&Array2<f64>> {
        self.retained.as_ref()
    }

    /// Whether a current value is cached
    #[inline]
    pub fn is_valid(&self) -> bool {
        !self.dirty && self.value.is_some()
    }

    /// Whether the cached value (if any) must be recomputed before use
    #[inline]
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Number of invalidations so far
    #[inline]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Number of times `compute` ran for this node
    #[inline]
    pub fn computations(&self) -> u64 {
        self.computations
    }

    /// Store a freshly computed value
    pub(crate) fn store(&mut self, value: Value, retained: Option<Array2<f64>>) {
        self.value = Some(value);
        self.retained = retained;
        self.dirty = false;
        self.computations += 1;
    }

    /// Set a parameter value directly (no computation involved)
    pub(crate) fn assign(&mut self, value: Value) {
        self.value = Some(value);
        self.dirty = false;
        self.generation += 1;
    }

    /// Mark dirty; returns `false` if the node already was
    pub(crate) fn invalidate(&mut self) -> bool {
        if self.dirty {
            return false;
        }
        self.dirty = true;
        self.generation += 1;
        true
    }
}

impl std::fmt::Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Node")
            .field("op", &self.op.name())
            .field("deps", &self.deps)
            .field("dim", &self.dim)
            .field("valid", &self.is_valid())
            .field("generation", &self.generation)
            .finish()
    }
}
