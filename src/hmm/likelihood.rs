//! HMM likelihood graphs

use super::recursion;
use crate::dataflow::{Context, NodeId};
use crate::error::{Error, Result};
use crate::phylo::TreeLikelihood;
use crate::tensor::{Dimension, Value};
use log::debug;
use ndarray::{Array1, Array2};

/// Transition matrix `lambda I + (1 - lambda) 1 pi^T`
///
/// With probability `lambda` the chain keeps its state, otherwise it
/// redraws from `pi`. Built from generic nodes, so it is differentiable in
/// both `lambda` and `pi`.
pub fn auto_correlation_matrix(ctx: &mut Context, lambda: NodeId, pi: NodeId) -> Result<NodeId> {
    let states = match ctx.dimension(pi)? {
        Dimension::Vector(n) => n,
        other => {
            return Err(Error::dimension_mismatch(
                "auto-correlation frequencies",
                Dimension::Vector(other.rows()),
                other,
            ));
        }
    };
    let identity = ctx.constant(Value::Matrix(Array2::eye(states)))?;
    let redraw = ctx.stack_rows(&vec![pi; states])?;
    let one = ctx.one()?;
    let minus_lambda = ctx.negate(lambda)?;
    let complement = ctx.add(&[one, minus_lambda])?;
    let stay = ctx.scale(lambda, identity)?;
    let jump = ctx.scale(complement, redraw)?;
    ctx.add(&[stay, jump])
}

/// Likelihood of an HMM over sites
///
/// ```
/// use phyloflow::prelude::*;
/// use ndarray::array;
///
/// let mut ctx = Context::new();
/// let start = ctx.constant(array![0.5, 0.5])?;
/// let trans = ctx.constant(array![[0.9, 0.1], [0.1, 0.9]])?;
/// let emis = ctx.constant(array![[0.8, 0.3], [0.2, 0.7]])?;
/// let hmm = HmmLikelihood::new(&mut ctx, start, trans, emis)?;
/// let ll = ctx.scalar(hmm.log_likelihood())?;
/// assert!(ll < 0.0);
/// # Ok::<(), phyloflow::error::Error>(())
/// ```
#[derive(Clone, Debug)]
pub struct HmmLikelihood {
    start: NodeId,
    trans: NodeId,
    emis: NodeId,
    forward: NodeId,
    log_likelihood: NodeId,
    negative_log_likelihood: NodeId,
}

impl HmmLikelihood {
    /// Build the forward recursion and log-likelihood nodes
    pub fn new(ctx: &mut Context, start: NodeId, trans: NodeId, emis: NodeId) -> Result<Self> {
        let forward = recursion::forward(ctx, start, trans, emis)?;
        let log_likelihood = ctx.sum(forward)?;
        let negative_log_likelihood = ctx.negate(log_likelihood)?;
        Ok(Self {
            start,
            trans,
            emis,
            forward,
            log_likelihood,
            negative_log_likelihood,
        })
    }

    /// Starting distribution node
    #[inline]
    pub fn start(&self) -> NodeId {
        self.start
    }

    /// Transition matrix node
    #[inline]
    pub fn transition_matrix(&self) -> NodeId {
        self.trans
    }

    /// Emission matrix node
    #[inline]
    pub fn emissions(&self) -> NodeId {
        self.emis
    }

    /// Forward node: per-site log scales
    #[inline]
    pub fn forward(&self) -> NodeId {
        self.forward
    }

    /// Scalar log-likelihood, the sum of the forward log scales
    #[inline]
    pub fn log_likelihood(&self) -> NodeId {
        self.log_likelihood
    }

    /// Scalar negative log-likelihood
    #[inline]
    pub fn negative_log_likelihood(&self) -> NodeId {
        self.negative_log_likelihood
    }

    /// Normalised forward hidden-state matrix
    pub fn forward_conditional(&self, ctx: &mut Context) -> Result<NodeId> {
        recursion::forward_conditional(ctx, self.forward)
    }

    /// Backward matrix, built on first request
    pub fn backward(&self, ctx: &mut Context) -> Result<NodeId> {
        recursion::backward(ctx, self.forward)
    }

    /// Posterior hidden-state probabilities per site
    pub fn posterior(&self, ctx: &mut Context) -> Result<NodeId> {
        let backward = self.backward(ctx)?;
        recursion::posterior(ctx, self.forward, backward)
    }
}

/// Rate-across-sites HMM on top of a tree likelihood
///
/// Hidden states are the rate categories of the tree likelihood. Emission
/// row `c` holds the site likelihoods of category `c`, the chain starts
/// from the category probabilities and moves with an auto-correlation
/// matrix of parameter `lambda`.
#[derive(Clone, Debug)]
pub struct PhyloHmm {
    tree: TreeLikelihood,
    lambda: NodeId,
    hmm: HmmLikelihood,
}

impl PhyloHmm {
    /// Build the chain over the categories of `tree`
    pub fn new(ctx: &mut Context, tree: TreeLikelihood, lambda: NodeId) -> Result<Self> {
        let probabilities: Array1<f64> = tree.categories().iter().map(|c| c.probability).collect();
        let start = ctx.constant(Value::Vector(probabilities))?;
        let trans = auto_correlation_matrix(ctx, lambda, start)?;
        let emis = ctx.stack_rows(tree.category_site_likelihoods())?;
        let hmm = HmmLikelihood::new(ctx, start, trans, emis)?;
        debug!(
            "phylo-HMM over {} rate categories",
            tree.categories().len()
        );
        Ok(Self { tree, lambda, hmm })
    }

    /// Underlying tree likelihood
    pub fn tree(&self) -> &TreeLikelihood {
        &self.tree
    }

    /// Auto-correlation parameter node
    #[inline]
    pub fn lambda(&self) -> NodeId {
        self.lambda
    }

    /// Chain likelihood
    pub fn hmm(&self) -> &HmmLikelihood {
        &self.hmm
    }

    /// Scalar negative log-likelihood of the chain
    #[inline]
    pub fn negative_log_likelihood(&self) -> NodeId {
        self.hmm.negative_log_likelihood()
    }
}
