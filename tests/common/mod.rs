//! Common test utilities
#![allow(dead_code)]

use phyloflow::prelude::*;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Assert two f64 slices are close within tolerance
///
/// Uses the formula: |a - b| <= atol + rtol * |b|
pub fn assert_allclose_f64(a: &[f64], b: &[f64], rtol: f64, atol: f64, msg: &str) {
    assert_eq!(a.len(), b.len(), "{}: length mismatch", msg);
    for (i, (x, y)) in a.iter().zip(b.iter()).enumerate() {
        let diff = (x - y).abs();
        let tol = atol + rtol * y.abs();
        assert!(
            diff <= tol,
            "{}: element {} differs: {} vs {} (diff={}, tol={})",
            msg,
            i,
            x,
            y,
            diff,
            tol
        );
    }
}

/// Root with three leaves `A`, `B`, `C`: one internal node
pub fn star_tree() -> PhyloTree {
    let mut tree = PhyloTree::rooted();
    let root = tree.add_root().unwrap();
    tree.add_leaf(root, "A", 0.1).unwrap();
    tree.add_leaf(root, "B", 0.25).unwrap();
    tree.add_leaf(root, "C", 0.4).unwrap();
    tree
}

/// Node indices of [`balanced_tree`]
pub struct Balanced {
    pub root: usize,
    pub x: usize,
    pub a: usize,
    pub b: usize,
    pub y: usize,
    pub c: usize,
    pub d: usize,
}

/// `((A, B) X, (C, D) Y) root`
pub fn balanced_tree() -> (PhyloTree, Balanced) {
    let mut tree = PhyloTree::rooted();
    let root = tree.add_root().unwrap();
    let x = tree.add_node(root, 0.05).unwrap();
    let a = tree.add_leaf(x, "A", 0.1).unwrap();
    let b = tree.add_leaf(x, "B", 0.2).unwrap();
    let y = tree.add_node(root, 0.15).unwrap();
    let c = tree.add_leaf(y, "C", 0.3).unwrap();
    let d = tree.add_leaf(y, "D", 0.12).unwrap();
    (
        tree,
        Balanced {
            root,
            x,
            a,
            b,
            y,
            c,
            d,
        },
    )
}

/// Random binary alignment, reproducible from `seed`
pub fn random_binary_sites(names: &[&str], sites: usize, seed: u64) -> SiteContainer {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut container = SiteContainer::new(2);
    for name in names {
        let sequence: String = (0..sites)
            .map(|_| if rng.random_bool(0.4) { '1' } else { '0' })
            .collect();
        container
            .add_sequence(Alphabet::Binary, name, &sequence)
            .unwrap();
    }
    container
}

/// Random DNA alignment with occasional ambiguity codes
pub fn random_dna_sites(names: &[&str], sites: usize, seed: u64) -> SiteContainer {
    const SYMBOLS: [char; 6] = ['A', 'C', 'G', 'T', 'R', 'N'];
    let mut rng = StdRng::seed_from_u64(seed);
    let mut container = SiteContainer::new(4);
    for name in names {
        let sequence: String = (0..sites)
            .map(|_| SYMBOLS[rng.random_range(0..SYMBOLS.len())])
            .collect();
        container.add_sequence(Alphabet::Dna, name, &sequence).unwrap();
    }
    container
}

/// Central difference of the scalar node `f` along parameter `p`
///
/// Restores the parameter to its original value.
pub fn central_difference(ctx: &mut Context, f: NodeId, p: NodeId, h: f64) -> f64 {
    let x = ctx.parameter_value(p).unwrap();
    ctx.set_parameter(p, x + h).unwrap();
    let upper = ctx.scalar(f).unwrap();
    ctx.set_parameter(p, x - h).unwrap();
    let lower = ctx.scalar(f).unwrap();
    ctx.set_parameter(p, x).unwrap();
    (upper - lower) / (2.0 * h)
}

/// Assert `|a - b| <= tol * max(1, |b|)`
pub fn assert_close(a: f64, b: f64, tol: f64, msg: &str) {
    let scale = b.abs().max(1.0);
    assert!(
        (a - b).abs() <= tol * scale,
        "{}: {} vs {} (diff={})",
        msg,
        a,
        b,
        (a - b).abs()
    );
}
