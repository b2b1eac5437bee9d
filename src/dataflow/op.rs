//! Node kinds and their construction contracts
//!
//! `Op` is the closed set of computations a node can perform. Each kind
//! declares a dependency signature (count, value kinds, extents) that is
//! checked when the node is created; `output_dimension` is that check.

use super::NodeId;
use super::context::Collaborators;
use crate::error::{Error, Result};
use crate::model::{FrequencySetId, ModelId};
use crate::tensor::{Dimension, Value, ValueKind};
use smallvec::SmallVec;

/// Parameter indices differentiated by finite differences
pub type ParamOrders = SmallVec<[usize; 2]>;

/// Highest analytic derivative order in branch length
pub const MAX_TIME_ORDER: u8 = 2;

/// Highest finite-difference derivative order in collaborator parameters
pub const MAX_PARAM_ORDER: usize = 2;

/// Kind of computation performed by a node, with its extra arguments
///
/// Together with the dependency list, an `Op` is the identity of a node:
/// the context never holds two nodes with equal `(op, dependencies)`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Op {
    /// Numeric constant
    Constant(Value),
    /// All-zero value of the given shape
    Zero(Dimension),
    /// Named scalar leaf whose value is set from outside
    Parameter {
        /// Parameter name (the cache key)
        name: String,
    },

    /// Sum of any number of same-shape operands
    Add,
    /// Element-wise negation
    Negate,
    /// `[s, x]`: scalar `s` times `x`
    Scale,
    /// `[a, b]`: element-wise product
    CwiseProduct,
    /// `[a, b]`: element-wise quotient `a / b`
    CwiseQuotient,
    /// Sum of all entries, as a scalar
    Sum,
    /// `[v1, .., vk]`: vectors of equal length stacked as matrix rows
    StackRows,

    /// `[t, p1, .., pk]`: `P(t)` of a model, or its derivatives
    TransitionMatrix {
        /// Model in the context registry
        model: ModelId,
        /// Derivative order in `t`, computed by the model
        dt_order: u8,
        /// Model parameters differentiated by finite differences
        dparams: ParamOrders,
    },
    /// `[p1, .., pk]`: stationary distribution of a model
    EquilibriumFrequencies {
        /// Model in the context registry
        model: ModelId,
        /// Model parameters differentiated by finite differences
        dparams: ParamOrders,
    },
    /// `[p1, .., pk]`: frequencies of a frequency set
    Frequencies {
        /// Frequency set in the context registry
        set: FrequencySetId,
        /// Parameters differentiated by finite differences
        dparams: ParamOrders,
    },

    /// `[P, C]`: conditional likelihoods propagated up a branch, `P . C`
    ForwardLikelihood,
    /// `[F1, .., Fk]`: element-wise product of the children's forward likelihoods
    ConditionalLikelihood,
    /// `[pi, C]`: per-site likelihood `pi^T . C` at the root
    SiteLikelihoods,
    /// `[L]`: sum of the logarithms of the site likelihoods
    TotalLogLikelihood,

    /// `[start, trans, emis]`: forward recursion, log scale per site
    HmmForward {
        /// Number of hidden states
        states: usize,
        /// Number of sites
        sites: usize,
    },
    /// `[start, trans, emis, F, dstart, dtrans, demis]`: first derivative
    HmmForwardD1 {
        /// Number of hidden states
        states: usize,
        /// Number of sites
        sites: usize,
        /// Parameter the derivative inputs are taken against
        wrt: NodeId,
    },
    /// `[start, trans, emis, F, dstart, dtrans, demis, dF, d2start, d2trans, d2emis]`
    HmmForwardD2 {
        /// Number of hidden states
        states: usize,
        /// Number of sites
        sites: usize,
        /// Parameter the derivative inputs are taken against
        wrt: NodeId,
    },
    /// `[F]`: conditional hidden-state matrix retained by a forward node
    HmmConditional,
    /// `[scales, trans, emis]`: scaled backward recursion
    HmmBackward {
        /// Number of hidden states
        states: usize,
        /// Number of sites
        sites: usize,
    },
}

impl Op {
    /// Name of the node kind
    pub fn name(&self) -> &'static str {
        match self {
            Op::Constant(_) => "Constant",
            Op::Zero(_) => "Zero",
            Op::Parameter { .. } => "Parameter",
            Op::Add => "Add",
            Op::Negate => "Negate",
            Op::Scale => "Scale",
            Op::CwiseProduct => "CwiseProduct",
            Op::CwiseQuotient => "CwiseQuotient",
            Op::Sum => "Sum",
            Op::StackRows => "StackRows",
            Op::TransitionMatrix { .. } => "TransitionMatrix",
            Op::EquilibriumFrequencies { .. } => "EquilibriumFrequencies",
            Op::Frequencies { .. } => "Frequencies",
            Op::ForwardLikelihood => "ForwardLikelihood",
            Op::ConditionalLikelihood => "ConditionalLikelihood",
            Op::SiteLikelihoods => "SiteLikelihoods",
            Op::TotalLogLikelihood => "TotalLogLikelihood",
            Op::HmmForward { .. } => "HmmForward",
            Op::HmmForwardD1 { .. } => "HmmForwardD1",
            Op::HmmForwardD2 { .. } => "HmmForwardD2",
            Op::HmmConditional => "HmmConditional",
            Op::HmmBackward { .. } => "HmmBackward",
        }
    }
}

/// What construction needs to know about a dependency
#[derive(Clone, Copy, Debug)]
pub(crate) struct DepInfo<'a> {
    pub id: NodeId,
    pub op: &'a Op,
    pub dim: Dimension,
    /// The dependency's own dependencies
    pub inputs: &'a [NodeId],
}

/// Check a dependency signature and return the node's output shape
pub(crate) fn output_dimension(
    op: &Op,
    deps: &[DepInfo<'_>],
    collaborators: &Collaborators,
) -> Result<Dimension> {
    let node = op.name();
    match op {
        Op::Constant(value) => {
            expect_count(node, deps, 0)?;
            Ok(value.dimension())
        }
        Op::Zero(dim) => {
            expect_count(node, deps, 0)?;
            Ok(*dim)
        }
        Op::Parameter { .. } => {
            expect_count(node, deps, 0)?;
            Ok(Dimension::Scalar)
        }
        Op::Add => {
            expect_at_least(node, deps, 1)?;
            let dim = deps[0].dim;
            for (i, dep) in deps.iter().enumerate().skip(1) {
                expect_dim(format!("{} operand {}", node, i), dim, dep.dim)?;
            }
            Ok(dim)
        }
        Op::Negate => {
            expect_count(node, deps, 1)?;
            Ok(deps[0].dim)
        }
        Op::Sum => {
            expect_count(node, deps, 1)?;
            Ok(Dimension::Scalar)
        }
        Op::Scale => {
            expect_count(node, deps, 2)?;
            expect_kind(node, deps, 0, ValueKind::Scalar)?;
            Ok(deps[1].dim)
        }
        Op::CwiseProduct | Op::CwiseQuotient => {
            expect_count(node, deps, 2)?;
            expect_dim(format!("{} right operand", node), deps[0].dim, deps[1].dim)?;
            Ok(deps[0].dim)
        }
        Op::StackRows => {
            expect_at_least(node, deps, 1)?;
            for i in 0..deps.len() {
                expect_kind(node, deps, i, ValueKind::Vector)?;
            }
            let cols = deps[0].dim.rows();
            for (i, dep) in deps.iter().enumerate().skip(1) {
                expect_dim(format!("{} row {}", node, i), deps[0].dim, dep.dim)?;
            }
            Ok(Dimension::matrix(deps.len(), cols))
        }
        Op::TransitionMatrix {
            model,
            dt_order,
            dparams,
        } => {
            let model = collaborators.model(*model)?;
            let n_params = model.parameters().len();
            expect_count(node, deps, 1 + n_params)?;
            for i in 0..deps.len() {
                expect_kind(node, deps, i, ValueKind::Scalar)?;
            }
            if *dt_order > MAX_TIME_ORDER {
                return Err(Error::invalid_argument(
                    "dt_order",
                    format!("at most {} supported, got {}", MAX_TIME_ORDER, dt_order),
                ));
            }
            check_param_orders(dparams, n_params)?;
            Ok(Dimension::transition_matrix(model.number_of_states()))
        }
        Op::EquilibriumFrequencies { model, dparams } => {
            let model = collaborators.model(*model)?;
            let n_params = model.parameters().len();
            expect_count(node, deps, n_params)?;
            for i in 0..deps.len() {
                expect_kind(node, deps, i, ValueKind::Scalar)?;
            }
            check_param_orders(dparams, n_params)?;
            Ok(Dimension::Vector(model.number_of_states()))
        }
        Op::Frequencies { set, dparams } => {
            let set = collaborators.frequency_set(*set)?;
            let n_params = set.parameters().len();
            expect_count(node, deps, n_params)?;
            for i in 0..deps.len() {
                expect_kind(node, deps, i, ValueKind::Scalar)?;
            }
            check_param_orders(dparams, n_params)?;
            Ok(Dimension::Vector(set.number_of_states()))
        }
        Op::ForwardLikelihood => {
            expect_count(node, deps, 2)?;
            expect_kind(node, deps, 0, ValueKind::Matrix)?;
            expect_kind(node, deps, 1, ValueKind::Matrix)?;
            let states = deps[1].dim.rows();
            expect_dim(
                format!("{} transition matrix", node),
                Dimension::transition_matrix(states),
                deps[0].dim,
            )?;
            Ok(deps[1].dim)
        }
        Op::ConditionalLikelihood => {
            expect_at_least(node, deps, 1)?;
            for i in 0..deps.len() {
                expect_kind(node, deps, i, ValueKind::Matrix)?;
            }
            for (i, dep) in deps.iter().enumerate().skip(1) {
                expect_dim(format!("{} child {}", node, i), deps[0].dim, dep.dim)?;
            }
            Ok(deps[0].dim)
        }
        Op::SiteLikelihoods => {
            expect_count(node, deps, 2)?;
            expect_kind(node, deps, 0, ValueKind::Vector)?;
            expect_kind(node, deps, 1, ValueKind::Matrix)?;
            let cond = deps[1].dim;
            expect_dim(
                format!("{} root frequencies", node),
                Dimension::Vector(cond.rows()),
                deps[0].dim,
            )?;
            Ok(Dimension::Vector(cond.cols()))
        }
        Op::TotalLogLikelihood => {
            expect_count(node, deps, 1)?;
            expect_kind(node, deps, 0, ValueKind::Vector)?;
            Ok(Dimension::Scalar)
        }
        Op::HmmForward { states, sites } => {
            expect_count(node, deps, 3)?;
            check_hmm_inputs(node, &deps[0..3], *states, *sites, 0)?;
            Ok(Dimension::Vector(*sites))
        }
        Op::HmmForwardD1 { states, sites, .. } => {
            expect_count(node, deps, 7)?;
            check_hmm_inputs(node, &deps[0..3], *states, *sites, 0)?;
            expect_recursion_over(node, deps, 3, "HmmForward", *states, *sites, |op| {
                matches!(op, Op::HmmForward { .. })
            })?;
            check_hmm_inputs(node, &deps[4..7], *states, *sites, 4)?;
            Ok(Dimension::Vector(*sites))
        }
        Op::HmmForwardD2 { states, sites, wrt } => {
            expect_count(node, deps, 11)?;
            check_hmm_inputs(node, &deps[0..3], *states, *sites, 0)?;
            expect_recursion_over(node, deps, 3, "HmmForward", *states, *sites, |op| {
                matches!(op, Op::HmmForward { .. })
            })?;
            check_hmm_inputs(node, &deps[4..7], *states, *sites, 4)?;
            expect_recursion_over(node, deps, 7, "HmmForwardD1", *states, *sites, |op| {
                matches!(op, Op::HmmForwardD1 { wrt: first, .. } if first == wrt)
            })?;
            check_hmm_inputs(node, &deps[8..11], *states, *sites, 8)?;
            Ok(Dimension::Vector(*sites))
        }
        Op::HmmConditional => {
            expect_count(node, deps, 1)?;
            match deps[0].op {
                Op::HmmForward { states, sites }
                | Op::HmmForwardD1 { states, sites, .. }
                | Op::HmmForwardD2 { states, sites, .. } => {
                    Ok(Dimension::conditional_likelihood(*states, *sites))
                }
                other => Err(Error::dependency_type(
                    node,
                    0,
                    "a forward recursion node",
                    other.name(),
                )),
            }
        }
        Op::HmmBackward { states, sites } => {
            expect_count(node, deps, 3)?;
            expect_op(node, deps, 0, "HmmForward", |op| {
                matches!(op, Op::HmmForward { .. })
            })?;
            expect_kind(node, deps, 1, ValueKind::Matrix)?;
            expect_kind(node, deps, 2, ValueKind::Matrix)?;
            expect_recursion_extents(node, &deps[0], "HmmForward", *states, *sites)?;
            if deps[0].inputs.get(1..3) != Some(&[deps[1].id, deps[2].id][..]) {
                return Err(Error::dependency_type(
                    node,
                    0,
                    "HmmForward over the same transition and emission matrices",
                    "HmmForward over other inputs",
                ));
            }
            expect_dim(
                format!("{} transition matrix", node),
                Dimension::transition_matrix(*states),
                deps[1].dim,
            )?;
            expect_dim(
                format!("{} emission matrix", node),
                Dimension::conditional_likelihood(*states, *sites),
                deps[2].dim,
            )?;
            Ok(Dimension::conditional_likelihood(*states, *sites))
        }
    }
}

/// Starting vector, transition matrix and emission matrix of an HMM
fn check_hmm_inputs(
    node: &'static str,
    deps: &[DepInfo<'_>],
    states: usize,
    sites: usize,
    offset: usize,
) -> Result<()> {
    let kinds = [ValueKind::Vector, ValueKind::Matrix, ValueKind::Matrix];
    for (i, (dep, kind)) in deps.iter().zip(kinds).enumerate() {
        if dep.dim.kind() != kind {
            return Err(Error::dependency_type(node, offset + i, kind, dep.dim.kind()));
        }
    }
    expect_dim(
        format!("{} starting vector", node),
        Dimension::Vector(states),
        deps[0].dim,
    )?;
    expect_dim(
        format!("{} transition matrix", node),
        Dimension::transition_matrix(states),
        deps[1].dim,
    )?;
    expect_dim(
        format!("{} emission matrix", node),
        Dimension::conditional_likelihood(states, sites),
        deps[2].dim,
    )
}

fn check_param_orders(dparams: &ParamOrders, n_params: usize) -> Result<()> {
    if dparams.len() > MAX_PARAM_ORDER {
        return Err(Error::invalid_argument(
            "dparams",
            format!(
                "at most {} parameter derivative orders supported, got {}",
                MAX_PARAM_ORDER,
                dparams.len()
            ),
        ));
    }
    if let Some(&bad) = dparams.iter().find(|&&k| k >= n_params) {
        return Err(Error::invalid_argument(
            "dparams",
            format!("parameter index {} out of range for {} parameters", bad, n_params),
        ));
    }
    Ok(())
}

fn expect_count(node: &'static str, deps: &[DepInfo<'_>], expected: usize) -> Result<()> {
    if deps.len() != expected {
        return Err(Error::DependencyCount {
            node,
            expected,
            got: deps.len(),
        });
    }
    Ok(())
}

fn expect_at_least(node: &'static str, deps: &[DepInfo<'_>], expected: usize) -> Result<()> {
    if deps.len() < expected {
        return Err(Error::DependencyCount {
            node,
            expected,
            got: deps.len(),
        });
    }
    Ok(())
}

fn expect_kind(
    node: &'static str,
    deps: &[DepInfo<'_>],
    position: usize,
    kind: ValueKind,
) -> Result<()> {
    let got = deps[position].dim.kind();
    if got != kind {
        return Err(Error::dependency_type(node, position, kind, got));
    }
    Ok(())
}

fn expect_op(
    node: &'static str,
    deps: &[DepInfo<'_>],
    position: usize,
    expected: &'static str,
    accept: impl Fn(&Op) -> bool,
) -> Result<()> {
    let op = deps[position].op;
    if !accept(op) {
        return Err(Error::dependency_type(node, position, expected, op.name()));
    }
    Ok(())
}

/// States and sites of a forward recursion node of any order
fn recursion_extents(op: &Op) -> Option<(usize, usize)> {
    match op {
        Op::HmmForward { states, sites }
        | Op::HmmForwardD1 { states, sites, .. }
        | Op::HmmForwardD2 { states, sites, .. } => Some((*states, *sites)),
        _ => None,
    }
}

fn expect_recursion_extents(
    node: &'static str,
    dep: &DepInfo<'_>,
    expected: &'static str,
    states: usize,
    sites: usize,
) -> Result<()> {
    let Some((got_states, got_sites)) = recursion_extents(dep.op) else {
        return Err(Error::Internal(format!(
            "{}: {} is not a forward recursion",
            node,
            dep.op.name()
        )));
    };
    expect_dim(
        format!("{} {} extents", node, expected),
        Dimension::conditional_likelihood(states, sites),
        Dimension::conditional_likelihood(got_states, got_sites),
    )
}

/// Dependency `position` must be an `expected` recursion node of the same
/// extents, built over exactly the dependencies that precede it
fn expect_recursion_over(
    node: &'static str,
    deps: &[DepInfo<'_>],
    position: usize,
    expected: &'static str,
    states: usize,
    sites: usize,
    accept: impl Fn(&Op) -> bool,
) -> Result<()> {
    expect_op(node, deps, position, expected, accept)?;
    expect_recursion_extents(node, &deps[position], expected, states, sites)?;
    let preceding = deps[..position].iter().map(|d| d.id);
    if !deps[position].inputs.iter().copied().eq(preceding) {
        return Err(Error::dependency_type(
            node,
            position,
            format!("{} over dependencies 0..{}", expected, position),
            format!("{} over other inputs", expected),
        ));
    }
    Ok(())
}

fn expect_dim(what: String, expected: Dimension, got: Dimension) -> Result<()> {
    if expected != got {
        return Err(Error::dimension_mismatch(what, expected, got));
    }
    Ok(())
}
