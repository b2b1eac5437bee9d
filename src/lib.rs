//! # phyloflow
//!
//! **Incremental dataflow graphs for phylogenetic likelihoods and their derivatives.**
//!
//! phyloflow builds likelihood computations as a DAG of typed nodes held in
//! a [`Context`](dataflow::Context). Identical computations are shared,
//! values are computed on demand and cached, and changing a parameter only
//! invalidates the nodes downstream of it. Any scalar node can be
//! differentiated (to second order) with respect to any scalar node; the
//! derivative is itself a node of the same graph.
//!
//! ## Features
//!
//! - **Dataflow core**: structural caching, lazy evaluation, targeted invalidation
//! - **Tree likelihood**: Felsenstein pruning over a rooted tree, per-branch
//!   models, rate categories
//! - **Hidden Markov chains**: scaled forward recursion with first and second
//!   derivatives, backward recursion and posteriors
//! - **Models**: binary gain/loss, k-state equal-rates, parameterised root
//!   frequencies
//!
//! ## Quick Start
//!
//! ```rust
//! use phyloflow::prelude::*;
//! use std::sync::Arc;
//!
//! let mut tree = PhyloTree::rooted();
//! let root = tree.add_root()?;
//! tree.add_leaf(root, "A", 0.1)?;
//! tree.add_leaf(root, "B", 0.2)?;
//! let sites = SiteContainer::from_sequences(Alphabet::Binary, [("A", "0011"), ("B", "0111")])?;
//!
//! let mut ctx = Context::new();
//! let model = ctx.configure_model(Arc::new(BinaryModel::new(1.0, 0.5)))?;
//! let lik = TreeLikelihoodBuilder::new(&tree, &sites, &model).build(&mut ctx)?;
//!
//! let nll = ctx.scalar(lik.negative_log_likelihood())?;
//! let brlen = lik.branch_length(1).expect("branch above leaf A");
//! let gradient = ctx.derive(lik.negative_log_likelihood(), brlen)?;
//! let slope = ctx.scalar(gradient)?;
//! assert!(nll > 0.0 && slope.is_finite());
//! # Ok::<(), phyloflow::error::Error>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod dataflow;
pub mod error;
pub mod hmm;
pub mod model;
pub mod ops;
pub mod phylo;
pub mod tensor;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::dataflow::{Context, ContextOptions, NodeId, Op};
    pub use crate::error::{Error, Result};
    pub use crate::hmm::{HmmLikelihood, PhyloHmm, auto_correlation_matrix};
    pub use crate::model::{
        BinaryModel, ConfiguredFrequencySet, ConfiguredModel, ConstantRate, DiscreteRates,
        FixedFrequencySet, FrequencySet, FullFrequencySet, MkModel, RateDistribution,
        SubstitutionModel,
    };
    pub use crate::phylo::{Alphabet, PhyloTree, SiteContainer, TreeLikelihood, TreeLikelihoodBuilder};
    pub use crate::tensor::{Dimension, Value};
}
