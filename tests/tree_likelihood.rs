//! Tests for the tree likelihood graph and its derivatives

mod common;

use common::{
    assert_close, balanced_tree, central_difference, random_binary_sites, random_dna_sites,
    star_tree,
};
use phyloflow::prelude::*;
use std::sync::Arc;

const STEP: f64 = 1e-5;

fn binary_star(seed: u64) -> (Context, TreeLikelihood) {
    let tree = star_tree();
    let sites = random_binary_sites(&["A", "B", "C"], 40, seed);
    let mut ctx = Context::new();
    let model = ctx
        .configure_model(Arc::new(BinaryModel::new(0.6, 0.9)))
        .unwrap();
    let lik = TreeLikelihoodBuilder::new(&tree, &sites, &model)
        .build(&mut ctx)
        .unwrap();
    (ctx, lik)
}

#[test_log::test]
fn test_branch_length_derivative_matches_finite_difference() {
    let (mut ctx, lik) = binary_star(5);
    let nll = lik.negative_log_likelihood();
    for (&branch, &brlen) in lik.branch_lengths() {
        let d = ctx.derive(nll, brlen).unwrap();
        let analytic = ctx.scalar(d).unwrap();
        let numeric = central_difference(&mut ctx, nll, brlen, STEP);
        assert!(
            (analytic - numeric).abs() < 1e-6,
            "branch {}: {} vs {}",
            branch,
            analytic,
            numeric
        );
    }
}

#[test]
fn test_second_derivative_matches_finite_difference() {
    let (mut ctx, lik) = binary_star(8);
    let nll = lik.negative_log_likelihood();
    let brlen = lik.branch_length(2).unwrap();
    let d1 = ctx.derive(nll, brlen).unwrap();
    let d2 = ctx.derive(d1, brlen).unwrap();
    let analytic = ctx.scalar(d2).unwrap();
    let numeric = central_difference(&mut ctx, d1, brlen, STEP);
    assert_close(analytic, numeric, 1e-5, "d2 nll / dt2");
}

#[test]
fn test_model_parameter_derivatives() {
    let tree = star_tree();
    let sites = random_binary_sites(&["A", "B", "C"], 30, 21);
    let mut ctx = Context::new();
    let model = ctx
        .configure_model(Arc::new(BinaryModel::new(0.6, 0.9)))
        .unwrap();
    let lik = TreeLikelihoodBuilder::new(&tree, &sites, &model)
        .build(&mut ctx)
        .unwrap();
    let nll = lik.negative_log_likelihood();

    for &p in model.parameters() {
        let d = ctx.derive(nll, p).unwrap();
        let analytic = ctx.scalar(d).unwrap();
        let numeric = central_difference(&mut ctx, nll, p, STEP);
        assert_close(analytic, numeric, 1e-5, "d nll / d model parameter");
    }

    let gain = model.parameters()[0];
    let d1 = ctx.derive(nll, gain).unwrap();
    let d2 = ctx.derive(d1, gain).unwrap();
    let analytic = ctx.scalar(d2).unwrap();
    let numeric = central_difference(&mut ctx, d1, gain, 1e-4);
    assert_close(analytic, numeric, 1e-3, "d2 nll / d gain2");

    // third order in a model parameter is not available
    assert!(matches!(
        ctx.derive(d2, gain),
        Err(Error::NotImplemented { .. })
    ));
}

#[test]
fn test_root_frequency_set_derivative() {
    let tree = star_tree();
    let sites = random_dna_sites(&["A", "B", "C"], 30, 2);
    let mut ctx = Context::new();
    let model = ctx
        .configure_model(Arc::new(MkModel::jukes_cantor()))
        .unwrap();
    let set = ctx
        .configure_frequency_set(
            Arc::new(FullFrequencySet::new(ndarray::array![0.1, 0.2, 0.3, 0.4]).unwrap()),
            "Root",
        )
        .unwrap();
    let freqs = ctx.frequencies(&set).unwrap();
    let lik = TreeLikelihoodBuilder::new(&tree, &sites, &model)
        .with_root_frequencies(freqs)
        .build(&mut ctx)
        .unwrap();
    let nll = lik.negative_log_likelihood();
    assert_eq!(set.parameters().len(), 3);
    let theta2 = set.parameters()[1];
    let d = ctx.derive(nll, theta2).unwrap();
    let analytic = ctx.scalar(d).unwrap();
    let numeric = central_difference(&mut ctx, nll, theta2, STEP);
    assert_close(analytic, numeric, 1e-5, "d nll / d theta2");
}

#[test]
fn test_invalidation_stays_on_path_to_root() {
    let (tree, n) = balanced_tree();
    let sites = random_binary_sites(&["A", "B", "C", "D"], 20, 13);
    let mut ctx = Context::new();
    let model = ctx
        .configure_model(Arc::new(BinaryModel::new(1.0, 0.5)))
        .unwrap();
    let lik = TreeLikelihoodBuilder::new(&tree, &sites, &model)
        .build(&mut ctx)
        .unwrap();
    let nll = lik.negative_log_likelihood();
    ctx.scalar(nll).unwrap();

    let cond = |node| lik.conditional_likelihood(0, node).unwrap();
    for node in [n.root, n.x, n.y, n.a, n.b, n.c, n.d] {
        assert!(!ctx.is_dirty(cond(node)).unwrap());
    }

    let brlen_a = lik.branch_length(n.a).unwrap();
    ctx.set_parameter(brlen_a, 0.35).unwrap();

    assert!(ctx.is_dirty(cond(n.x)).unwrap());
    assert!(ctx.is_dirty(cond(n.root)).unwrap());
    assert!(ctx.is_dirty(nll).unwrap());
    for node in [n.y, n.c, n.d, n.a, n.b] {
        assert!(!ctx.is_dirty(cond(node)).unwrap(), "tree node {}", node);
    }
    let sibling = lik.branch_length(n.b).unwrap();
    let p_b = ctx.dependents(sibling).unwrap()[0];
    assert!(!ctx.is_dirty(p_b).unwrap());

    let before = ctx.computations(cond(n.y)).unwrap();
    ctx.scalar(nll).unwrap();
    assert_eq!(ctx.computations(cond(n.y)).unwrap(), before);
    assert_eq!(ctx.computations(cond(n.x)).unwrap(), 2);
}

#[test]
fn test_unrooted_tree_is_rejected_without_nodes() {
    let mut tree = PhyloTree::unrooted();
    let base = tree.add_root().unwrap();
    tree.add_leaf(base, "A", 0.1).unwrap();
    tree.add_leaf(base, "B", 0.2).unwrap();
    tree.add_leaf(base, "C", 0.3).unwrap();
    let sites = random_binary_sites(&["A", "B", "C"], 5, 1);

    let mut ctx = Context::new();
    let model = ctx
        .configure_model(Arc::new(BinaryModel::new(1.0, 1.0)))
        .unwrap();
    let size = ctx.len();
    let err = TreeLikelihoodBuilder::new(&tree, &sites, &model)
        .build(&mut ctx)
        .unwrap_err();
    assert!(matches!(err, Error::UnrootedTree));
    assert_eq!(ctx.len(), size);
}

#[test]
fn test_same_topology_with_other_lengths_needs_own_parameters() {
    let mut longer = PhyloTree::rooted();
    let root = longer.add_root().unwrap();
    longer.add_leaf(root, "A", 0.9).unwrap();
    longer.add_leaf(root, "B", 1.7).unwrap();
    longer.add_leaf(root, "C", 0.4).unwrap();
    let sites = random_binary_sites(&["A", "B", "C"], 20, 6);

    let expected = {
        let mut fresh = Context::new();
        let model = fresh
            .configure_model(Arc::new(BinaryModel::new(0.6, 0.9)))
            .unwrap();
        let lik = TreeLikelihoodBuilder::new(&longer, &sites, &model)
            .build(&mut fresh)
            .unwrap();
        fresh.scalar(lik.negative_log_likelihood()).unwrap()
    };

    let mut ctx = Context::new();
    let model = ctx
        .configure_model(Arc::new(BinaryModel::new(0.6, 0.9)))
        .unwrap();
    let first = TreeLikelihoodBuilder::new(&star_tree(), &sites, &model)
        .build(&mut ctx)
        .unwrap();

    // BrLen1 already holds 0.1
    let size = ctx.len();
    let err = TreeLikelihoodBuilder::new(&longer, &sites, &model)
        .build(&mut ctx)
        .unwrap_err();
    assert!(matches!(err, Error::InvalidArgument { .. }));
    assert_eq!(ctx.len(), size);

    let second = TreeLikelihoodBuilder::new(&longer, &sites, &model)
        .with_parameter_prefix("long.")
        .build(&mut ctx)
        .unwrap();
    assert_ne!(first.branch_length(1), second.branch_length(1));
    let brlen = second.branch_length(2).unwrap();
    assert_eq!(ctx.parameter_value(brlen).unwrap(), 1.7);
    let nll = ctx.scalar(second.negative_log_likelihood()).unwrap();
    assert_close(nll, expected, 1e-12, "nll in a shared context");
}

#[test]
fn test_model_state_count_must_match_data() {
    let tree = star_tree();
    let sites = random_dna_sites(&["A", "B", "C"], 5, 1);
    let mut ctx = Context::new();
    let model = ctx
        .configure_model(Arc::new(BinaryModel::new(1.0, 1.0)))
        .unwrap();
    let err = TreeLikelihoodBuilder::new(&tree, &sites, &model)
        .build(&mut ctx)
        .unwrap_err();
    assert!(matches!(err, Error::DimensionMismatch { .. }));
}

#[test]
fn test_branch_model_changes_only_its_branch() {
    let tree = star_tree();
    let sites = random_binary_sites(&["A", "B", "C"], 15, 4);
    let mut ctx = Context::new();
    let slow = ctx
        .configure_model_with_prefix(Arc::new(BinaryModel::new(0.2, 0.3)), "slow")
        .unwrap();
    let fast = ctx
        .configure_model_with_prefix(Arc::new(BinaryModel::new(2.0, 3.0)), "fast")
        .unwrap();
    let homogeneous = TreeLikelihoodBuilder::new(&tree, &sites, &slow)
        .build(&mut ctx)
        .unwrap();
    let mixed = TreeLikelihoodBuilder::new(&tree, &sites, &slow)
        .with_branch_model(3, &fast)
        .build(&mut ctx)
        .unwrap();
    assert_ne!(
        homogeneous.negative_log_likelihood(),
        mixed.negative_log_likelihood()
    );
    // leaf data nodes are shared between the two graphs
    assert_eq!(
        homogeneous.conditional_likelihood(0, 1),
        mixed.conditional_likelihood(0, 1)
    );
    let a = ctx.scalar(homogeneous.negative_log_likelihood()).unwrap();
    let b = ctx.scalar(mixed.negative_log_likelihood()).unwrap();
    assert!(a.is_finite() && b.is_finite());
    assert_ne!(a, b);

    // derivative wrt a parameter of the fast model only flows through branch 3
    let fast_gain = fast.parameters()[0];
    let d = ctx.derive(homogeneous.negative_log_likelihood(), fast_gain).unwrap();
    assert!(matches!(ctx.op(d).unwrap(), Op::Zero(_)));
    let d = ctx.derive(mixed.negative_log_likelihood(), fast_gain).unwrap();
    let analytic = ctx.scalar(d).unwrap();
    let numeric = central_difference(&mut ctx, mixed.negative_log_likelihood(), fast_gain, STEP);
    assert_close(analytic, numeric, 1e-5, "d nll / d fast gain");
}

#[test]
fn test_rate_categories_derivative() {
    let (tree, _) = balanced_tree();
    let sites = random_dna_sites(&["A", "B", "C", "D"], 25, 9);
    let mut ctx = Context::new();
    let model = ctx
        .configure_model(Arc::new(MkModel::new(4).unwrap()))
        .unwrap();
    let lik = TreeLikelihoodBuilder::new(&tree, &sites, &model)
        .with_rate_distribution(DiscreteRates::new(&[0.3, 1.0, 2.2], &[0.3, 0.4, 0.3]).unwrap())
        .build(&mut ctx)
        .unwrap();
    let nll = lik.negative_log_likelihood();
    let brlen = lik.branch_length(1).unwrap();
    let d = ctx.derive(nll, brlen).unwrap();
    let analytic = ctx.scalar(d).unwrap();
    let numeric = central_difference(&mut ctx, nll, brlen, STEP);
    assert!((analytic - numeric).abs() < 1e-6);
}
