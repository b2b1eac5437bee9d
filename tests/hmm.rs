//! Tests for HMM forward, derivative and backward nodes

mod common;

use common::{assert_allclose_f64, assert_close, central_difference, random_binary_sites, star_tree};
use ndarray::{Array2, array};
use phyloflow::prelude::*;
use std::sync::Arc;

const STEP: f64 = 1e-5;

fn phylo_hmm(seed: u64) -> (Context, PhyloHmm) {
    let tree = star_tree();
    let sites = random_binary_sites(&["A", "B", "C"], 30, seed);
    let mut ctx = Context::new();
    let model = ctx
        .configure_model(Arc::new(BinaryModel::new(0.7, 1.1)))
        .unwrap();
    let lik = TreeLikelihoodBuilder::new(&tree, &sites, &model)
        .with_rate_distribution(DiscreteRates::new(&[0.4, 1.6], &[0.5, 0.5]).unwrap())
        .build(&mut ctx)
        .unwrap();
    let lambda = ctx.parameter("lambda", 0.4).unwrap();
    let hmm = PhyloHmm::new(&mut ctx, lik, lambda).unwrap();
    (ctx, hmm)
}

/// Central difference of every entry of a matrix node
fn matrix_difference(ctx: &mut Context, f: NodeId, p: NodeId, h: f64) -> Array2<f64> {
    let x = ctx.parameter_value(p).unwrap();
    ctx.set_parameter(p, x + h).unwrap();
    let upper = ctx.matrix(f).unwrap().clone();
    ctx.set_parameter(p, x - h).unwrap();
    let lower = ctx.matrix(f).unwrap().clone();
    ctx.set_parameter(p, x).unwrap();
    (upper - lower) / (2.0 * h)
}

#[test]
fn test_forward_matches_path_enumeration() {
    let start = array![0.5, 0.5];
    let trans = array![[0.7, 0.3], [0.2, 0.8]];
    let emis = array![[0.9, 0.4, 0.1], [0.2, 0.5, 0.6]];

    let mut expected = 0.0;
    for s0 in 0..2 {
        for s1 in 0..2 {
            for s2 in 0..2 {
                expected += start[s0]
                    * emis[[s0, 0]]
                    * trans[[s0, s1]]
                    * emis[[s1, 1]]
                    * trans[[s1, s2]]
                    * emis[[s2, 2]];
            }
        }
    }

    let mut ctx = Context::new();
    let start = ctx.constant(start).unwrap();
    let trans = ctx.constant(trans).unwrap();
    let emis = ctx.constant(emis).unwrap();
    let hmm = HmmLikelihood::new(&mut ctx, start, trans, emis).unwrap();
    assert_eq!(ctx.dimension(hmm.forward()).unwrap(), Dimension::Vector(3));
    let ll = ctx.scalar(hmm.log_likelihood()).unwrap();
    assert_close(ll, expected.ln(), 1e-12, "log-likelihood");
    let nll = ctx.scalar(hmm.negative_log_likelihood()).unwrap();
    assert_eq!(nll, -ll);

    // every column of the conditional matrix is a distribution
    let cond = hmm.forward_conditional(&mut ctx).unwrap();
    let alpha = ctx.matrix(cond).unwrap();
    for column in alpha.columns() {
        assert!((column.sum() - 1.0).abs() < 1e-12);
    }
}

#[test]
fn test_posterior_columns_sum_to_one() {
    let (mut ctx, hmm) = phylo_hmm(3);
    let posterior = hmm.hmm().posterior(&mut ctx).unwrap();
    let value = ctx.matrix(posterior).unwrap();
    assert_eq!(value.dim(), (2, 30));
    let sums: Vec<f64> = value.columns().into_iter().map(|c| c.sum()).collect();
    assert_allclose_f64(&sums, &vec![1.0; 30], 0.0, 1e-10, "posterior columns");

    // the backward node is shared between requests
    let again = hmm.hmm().backward(&mut ctx).unwrap();
    assert_eq!(ctx.dependencies(posterior).unwrap()[1], again);
}

#[test_log::test]
fn test_lambda_derivatives_match_finite_difference() {
    let (mut ctx, hmm) = phylo_hmm(17);
    let nll = hmm.negative_log_likelihood();
    let lambda = hmm.lambda();

    let d1 = ctx.derive(nll, lambda).unwrap();
    let analytic = ctx.scalar(d1).unwrap();
    let numeric = central_difference(&mut ctx, nll, lambda, STEP);
    assert_close(analytic, numeric, 1e-6, "d nll / d lambda");

    let d2 = ctx.derive(d1, lambda).unwrap();
    let analytic = ctx.scalar(d2).unwrap();
    let numeric = central_difference(&mut ctx, d1, lambda, STEP);
    assert_close(analytic, numeric, 1e-5, "d2 nll / d lambda2");

    // the D2 node has no further derivative
    assert!(matches!(
        ctx.derive(d2, lambda),
        Err(Error::NotImplemented { .. })
    ));
}

#[test]
fn test_branch_length_derivative_through_emissions() {
    let (mut ctx, hmm) = phylo_hmm(29);
    let nll = hmm.negative_log_likelihood();
    let brlen = hmm.tree().branch_length(3).unwrap();

    let d1 = ctx.derive(nll, brlen).unwrap();
    let analytic = ctx.scalar(d1).unwrap();
    let numeric = central_difference(&mut ctx, nll, brlen, STEP);
    assert_close(analytic, numeric, 1e-6, "d nll / d brlen");

    let d2 = ctx.derive(d1, brlen).unwrap();
    let analytic = ctx.scalar(d2).unwrap();
    let numeric = central_difference(&mut ctx, d1, brlen, STEP);
    assert_close(analytic, numeric, 1e-4, "d2 nll / d brlen2");
}

#[test]
fn test_conditional_derivative_matches_finite_difference() {
    let (mut ctx, hmm) = phylo_hmm(5);
    let lambda = hmm.lambda();
    let cond = hmm.hmm().forward_conditional(&mut ctx).unwrap();
    let dcond = ctx.derive(cond, lambda).unwrap();
    assert!(matches!(ctx.op(dcond).unwrap(), Op::HmmConditional));
    let analytic = ctx.matrix(dcond).unwrap().clone();
    let numeric = matrix_difference(&mut ctx, cond, lambda, STEP);
    assert_allclose_f64(
        analytic.as_slice().unwrap(),
        numeric.as_slice().unwrap(),
        1e-5,
        1e-7,
        "d alpha / d lambda",
    );
}

#[test]
fn test_mixed_second_derivative() {
    let (mut ctx, hmm) = phylo_hmm(11);
    let nll = hmm.negative_log_likelihood();
    let lambda = hmm.lambda();
    let brlen = hmm.tree().branch_length(1).unwrap();
    let unrelated = ctx.parameter("unrelated", 2.0).unwrap();

    let d_lambda = ctx.derive(nll, lambda).unwrap();
    let size = ctx.len();
    let err = ctx.derive(d_lambda, brlen).unwrap_err();
    assert!(matches!(err, Error::NotImplemented { .. }));
    // nodes built before the failure are dropped again
    assert_eq!(ctx.len(), size);

    let d_brlen = ctx.derive(nll, brlen).unwrap();
    assert!(ctx.scalar(d_brlen).unwrap().is_finite());
    let size = ctx.len();
    assert!(matches!(
        ctx.derive(d_brlen, lambda),
        Err(Error::NotImplemented { .. })
    ));
    assert_eq!(ctx.len(), size);
    assert_eq!(ctx.derive(nll, brlen).unwrap(), d_brlen);

    // a parameter nothing depends on gives a zero derivative
    let d = ctx.derive(d_lambda, unrelated).unwrap();
    assert!(matches!(ctx.op(d).unwrap(), Op::Zero(_)));
    assert_eq!(ctx.scalar(d).unwrap(), 0.0);
}

#[test]
fn test_backward_has_no_derivative() {
    let (mut ctx, hmm) = phylo_hmm(2);
    let backward = hmm.hmm().backward(&mut ctx).unwrap();
    let err = ctx.derive(backward, hmm.lambda()).unwrap_err();
    assert!(matches!(err, Error::NotImplemented { .. }));
}

#[test]
fn test_forward_rejects_mismatched_emissions() {
    let mut ctx = Context::new();
    let start = ctx.constant(array![0.2, 0.3, 0.5]).unwrap();
    let trans = ctx.constant(Array2::<f64>::eye(3)).unwrap();
    let emis = ctx.constant(array![[0.1, 0.2], [0.3, 0.4]]).unwrap();
    let size = ctx.len();
    let err = HmmLikelihood::new(&mut ctx, start, trans, emis).unwrap_err();
    assert!(matches!(err, Error::DimensionMismatch { .. }));
    assert_eq!(ctx.len(), size);
}

#[test]
fn test_derivative_recursions_check_their_primal() {
    let mut ctx = Context::new();
    let x = ctx.parameter("x", 0.5).unwrap();
    let y = ctx.parameter("y", 0.5).unwrap();
    let start = ctx.constant(array![0.5, 0.5]).unwrap();
    let trans = ctx.constant(array![[0.9, 0.1], [0.2, 0.8]]).unwrap();
    let emis = ctx.constant(array![[0.1, 0.2, 0.3], [0.3, 0.4, 0.5]]).unwrap();
    let other_emis = ctx.constant(array![[0.3, 0.2, 0.1], [0.5, 0.4, 0.3]]).unwrap();
    let short_emis = ctx.constant(array![[0.1], [0.3]]).unwrap();
    let dstart = ctx.zero(Dimension::Vector(2)).unwrap();
    let dtrans = ctx.zero(Dimension::matrix(2, 2)).unwrap();
    let demis = ctx.zero(Dimension::matrix(2, 3)).unwrap();

    let short = HmmLikelihood::new(&mut ctx, start, trans, short_emis).unwrap();
    let other = HmmLikelihood::new(&mut ctx, start, trans, other_emis).unwrap();
    let primal = HmmLikelihood::new(&mut ctx, start, trans, emis).unwrap();
    let d1_op = |wrt| Op::HmmForwardD1 {
        states: 2,
        sites: 3,
        wrt,
    };
    let size = ctx.len();

    // a primal over one site cannot drive a recursion over three
    let deps = [start, trans, emis, short.forward(), dstart, dtrans, demis];
    let err = ctx.create(d1_op(x), &deps).unwrap_err();
    match err {
        Error::DimensionMismatch { expected, got, .. } => {
            assert_eq!(expected, Dimension::matrix(2, 3));
            assert_eq!(got, Dimension::matrix(2, 1));
        }
        other => panic!("expected a dimension mismatch, got {:?}", other),
    }

    // same extents, but built over other emissions
    let deps = [start, trans, emis, other.forward(), dstart, dtrans, demis];
    let err = ctx.create(d1_op(x), &deps).unwrap_err();
    assert!(matches!(err, Error::DependencyType { position: 3, .. }));
    assert_eq!(ctx.len(), size);

    let deps = [start, trans, emis, primal.forward(), dstart, dtrans, demis];
    let d1 = ctx.create(d1_op(x), &deps).unwrap();
    assert_eq!(ctx.vector(d1).unwrap(), &ndarray::Array1::<f64>::zeros(3));

    // the first-order node must be taken against the same parameter
    let mut d2_deps = deps.to_vec();
    d2_deps.extend_from_slice(&[d1, dstart, dtrans, demis]);
    let d2_op = |wrt| Op::HmmForwardD2 {
        states: 2,
        sites: 3,
        wrt,
    };
    let size = ctx.len();
    let err = ctx.create(d2_op(y), &d2_deps).unwrap_err();
    assert!(matches!(err, Error::DependencyType { position: 7, .. }));

    let mut swapped = d2_deps.clone();
    swapped[2] = other_emis;
    swapped[3] = other.forward();
    let err = ctx.create(d2_op(x), &swapped).unwrap_err();
    assert!(matches!(err, Error::DependencyType { position: 7, .. }));
    assert_eq!(ctx.len(), size);

    assert!(ctx.create(d2_op(x), &d2_deps).is_ok());
}
