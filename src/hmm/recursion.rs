//! Node builders for the forward and backward recursions

use crate::dataflow::{Context, NodeId, Op};
use crate::error::{Error, Result};
use crate::tensor::{Dimension, ValueKind};

/// Hidden-state and site counts implied by a starting vector and emission matrix
fn extents(ctx: &Context, node: &'static str, start: NodeId, emis: NodeId) -> Result<(usize, usize)> {
    let states = match ctx.dimension(start)? {
        Dimension::Vector(n) => n,
        other => {
            return Err(Error::dependency_type(node, 0, ValueKind::Vector, other.kind()));
        }
    };
    let sites = match ctx.dimension(emis)? {
        Dimension::Matrix { cols, .. } => cols,
        other => {
            return Err(Error::dependency_type(node, 2, ValueKind::Matrix, other.kind()));
        }
    };
    Ok((states, sites))
}

/// Forward recursion node: per-site log scales, retaining the conditional matrix
///
/// The number of hidden states is the length of `start`; `trans` must be
/// `n x n` and `emis` `n x m`, otherwise creation fails with a dimension
/// error naming both extents.
pub fn forward(ctx: &mut Context, start: NodeId, trans: NodeId, emis: NodeId) -> Result<NodeId> {
    let (states, sites) = extents(ctx, "HmmForward", start, emis)?;
    ctx.create(Op::HmmForward { states, sites }, &[start, trans, emis])
}

/// Normalised hidden-state matrix retained by a forward node of any order
pub fn forward_conditional(ctx: &mut Context, forward: NodeId) -> Result<NodeId> {
    ctx.create(Op::HmmConditional, &[forward])
}

/// Scaled backward recursion over the inputs of `forward`
///
/// The transition and emission matrices are read from the forward node's
/// own dependencies, so the two passes always describe the same chain.
pub fn backward(ctx: &mut Context, forward: NodeId) -> Result<NodeId> {
    let (states, sites) = match ctx.op(forward)? {
        Op::HmmForward { states, sites } => (*states, *sites),
        other => {
            return Err(Error::dependency_type(
                "HmmBackward",
                0,
                "HmmForward",
                other.name(),
            ));
        }
    };
    let (trans, emis) = match ctx.dependencies(forward)? {
        &[_, trans, emis] => (trans, emis),
        other => {
            return Err(Error::Internal(format!(
                "HmmForward {} has {} dependencies",
                forward,
                other.len()
            )));
        }
    };
    ctx.create(Op::HmmBackward { states, sites }, &[forward, trans, emis])
}

/// Posterior hidden-state probabilities, `states x sites`
///
/// Each column sums to one.
pub fn posterior(ctx: &mut Context, forward: NodeId, backward: NodeId) -> Result<NodeId> {
    let conditional = forward_conditional(ctx, forward)?;
    ctx.cwise_product(conditional, backward)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_forward_dimension_errors() {
        let mut ctx = Context::new();
        let start = ctx.constant(array![0.5, 0.5]).unwrap();
        let trans3 = ctx.constant(ndarray::Array2::<f64>::eye(3)).unwrap();
        let emis = ctx.constant(array![[0.1, 0.2], [0.3, 0.4]]).unwrap();
        let n = ctx.len();
        let err = forward(&mut ctx, start, trans3, emis).unwrap_err();
        match err {
            Error::DimensionMismatch { expected, got, .. } => {
                assert_eq!(expected, Dimension::matrix(2, 2));
                assert_eq!(got, Dimension::matrix(3, 3));
            }
            other => panic!("unexpected error {:?}", other),
        }
        assert_eq!(ctx.len(), n);

        let err = forward(&mut ctx, emis, emis, emis).unwrap_err();
        assert!(matches!(err, Error::DependencyType { position: 0, .. }));
    }

    #[test]
    fn test_backward_needs_forward_node() {
        let mut ctx = Context::new();
        let scales = ctx.constant(array![0.1, 0.2]).unwrap();
        let err = backward(&mut ctx, scales).unwrap_err();
        assert!(matches!(err, Error::DependencyType { position: 0, .. }));
    }

    #[test]
    fn test_backward_rejects_foreign_scales() {
        let mut ctx = Context::new();
        let start = ctx.constant(array![0.5, 0.5]).unwrap();
        let trans = ctx.constant(array![[0.9, 0.1], [0.2, 0.8]]).unwrap();
        let other = ctx.constant(array![[0.5, 0.5], [0.5, 0.5]]).unwrap();
        let emis = ctx.constant(array![[0.1, 0.2], [0.3, 0.4]]).unwrap();
        let f = forward(&mut ctx, start, trans, emis).unwrap();
        let scales = ctx.constant(array![0.1, 0.2]).unwrap();
        let size = ctx.len();

        // plain vectors are not forward scales
        let op = Op::HmmBackward { states: 2, sites: 2 };
        let err = ctx.create(op.clone(), &[scales, trans, emis]).unwrap_err();
        assert!(matches!(err, Error::DependencyType { position: 0, .. }));

        // the forward node must run over the same matrices
        let err = ctx.create(op.clone(), &[f, other, emis]).unwrap_err();
        assert!(matches!(err, Error::DependencyType { position: 0, .. }));
        assert_eq!(ctx.len(), size);

        let b = backward(&mut ctx, f).unwrap();
        assert_eq!(ctx.dependencies(b).unwrap(), &[f, trans, emis]);
        assert_eq!(ctx.create(op, &[f, trans, emis]).unwrap(), b);
    }
}
