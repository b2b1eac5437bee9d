//! Demand-driven evaluation
//!
//! Requesting a value forces the dirty part of the node's dependency cone
//! in post-order, computes each node exactly once and caches the result.
//! The traversal uses an explicit stack so deep trees and long chains do
//! not grow the call stack.

use super::context::{Collaborators, Context, ContextOptions};
use super::node::Node;
use super::{NodeId, Op};
use crate::error::{Error, Result};
use crate::ops::{arithmetic, finite_difference, hmm, likelihood};
use crate::tensor::{Dimension, Value};
use log::trace;
use ndarray::{Array1, Array2};
use smallvec::SmallVec;

/// What a node computation produces
struct Output {
    value: Value,
    retained: Option<Array2<f64>>,
}

impl From<Value> for Output {
    fn from(value: Value) -> Self {
        Self {
            value,
            retained: None,
        }
    }
}

impl Context {
    /// Value of a node, computing it and its dirty dependencies if needed
    pub fn value(&mut self, id: NodeId) -> Result<&Value> {
        self.node(id)?;
        self.evaluate(id)?;
        self.nodes[id.index()]
            .cached()
            .ok_or_else(|| Error::Internal(format!("{} has no value after evaluation", id)))
    }

    /// Value of a scalar node
    pub fn scalar(&mut self, id: NodeId) -> Result<f64> {
        self.value(id)?.as_scalar()
    }

    /// Value of a vector node
    pub fn vector(&mut self, id: NodeId) -> Result<&Array1<f64>> {
        self.value(id)?.as_vector()
    }

    /// Value of a matrix node
    pub fn matrix(&mut self, id: NodeId) -> Result<&Array2<f64>> {
        self.value(id)?.as_matrix()
    }

    fn evaluate(&mut self, root: NodeId) -> Result<()> {
        let mut stack: Vec<(NodeId, bool)> = vec![(root, false)];
        while let Some((id, expanded)) = stack.pop() {
            let node = &self.nodes[id.index()];
            if node.is_valid() {
                continue;
            }
            if expanded {
                self.compute_node(id)?;
                continue;
            }
            stack.push((id, true));
            for &dep in node.dependencies().iter().rev() {
                if !self.nodes[dep.index()].is_valid() {
                    stack.push((dep, false));
                }
            }
        }
        Ok(())
    }

    fn compute_node(&mut self, id: NodeId) -> Result<()> {
        let output = {
            let node = &self.nodes[id.index()];
            let deps: SmallVec<[&Node; 4]> = node
                .dependencies()
                .iter()
                .map(|d| &self.nodes[d.index()])
                .collect();
            let output = compute(node, &deps, &self.collaborators, self.options())?;

            let declared = node.dimension();
            let got = output.value.dimension();
            if got != declared {
                return Err(Error::dimension_mismatch(
                    format!("value of {} {}", node.op().name(), id),
                    declared,
                    got,
                ));
            }
            trace!("computed {} {}", id, node.op().name());
            output
        };
        self.nodes[id.index()].store(output.value, output.retained);
        self.computations += 1;
        Ok(())
    }
}

fn value_of(node: &Node) -> Result<&Value> {
    node.cached().ok_or_else(|| {
        Error::Internal(format!(
            "{} dependency read before evaluation",
            node.op().name()
        ))
    })
}

fn scalar_of(node: &Node) -> Result<f64> {
    value_of(node)?.as_scalar()
}

fn vector_of(node: &Node) -> Result<&Array1<f64>> {
    value_of(node)?.as_vector()
}

fn matrix_of(node: &Node) -> Result<&Array2<f64>> {
    value_of(node)?.as_matrix()
}

fn retained_of(node: &Node) -> Result<&Array2<f64>> {
    node.retained().ok_or_else(|| {
        Error::Internal(format!(
            "{} has no retained conditional matrix",
            node.op().name()
        ))
    })
}

/// Reconstruct the full output of an evaluated forward recursion node
fn forward_pass_of(node: &Node) -> Result<hmm::ForwardPass> {
    Ok(hmm::ForwardPass {
        scales: vector_of(node)?.clone(),
        conditional: retained_of(node)?.clone(),
    })
}

fn compute(
    node: &Node,
    deps: &[&Node],
    collaborators: &Collaborators,
    options: &ContextOptions,
) -> Result<Output> {
    let step = options.finite_difference_step;
    let output = match node.op() {
        Op::Constant(value) => value.clone().into(),
        Op::Zero(dim) => Value::zeros(*dim).into(),
        Op::Parameter { name } => {
            return Err(Error::invalid_argument(
                "parameter",
                format!("parameter '{}' has no value", name),
            ));
        }

        Op::Add => {
            let terms = deps.iter().map(|d| value_of(d)).collect::<Result<Vec<_>>>()?;
            arithmetic::add(&terms)?.into()
        }
        Op::Negate => arithmetic::negate(value_of(deps[0])?).into(),
        Op::Scale => arithmetic::scale(scalar_of(deps[0])?, value_of(deps[1])?).into(),
        Op::CwiseProduct => arithmetic::binary(
            arithmetic::BinaryOp::Mul,
            value_of(deps[0])?,
            value_of(deps[1])?,
        )?
        .into(),
        Op::CwiseQuotient => arithmetic::binary(
            arithmetic::BinaryOp::Div,
            value_of(deps[0])?,
            value_of(deps[1])?,
        )?
        .into(),
        Op::Sum => Value::Scalar(arithmetic::sum(value_of(deps[0])?)).into(),
        Op::StackRows => {
            let rows = deps.iter().map(|d| vector_of(d)).collect::<Result<Vec<_>>>()?;
            Value::Matrix(arithmetic::stack_rows(&rows)?).into()
        }

        Op::TransitionMatrix {
            model,
            dt_order,
            dparams,
        } => {
            let model = collaborators.model(*model)?;
            let t = scalar_of(deps[0])?;
            let params = scalars(&deps[1..])?;
            let n = model.number_of_states();
            let evaluate = |p: &[f64]| -> Result<Array2<f64>> {
                let m = match *dt_order {
                    0 => model.transition_probabilities(p, t),
                    1 => model.d_transition_probabilities(p, t),
                    _ => model.d2_transition_probabilities(p, t),
                };
                check_shape(
                    model.name(),
                    "transition probabilities",
                    Dimension::transition_matrix(n),
                    Dimension::matrix(m.nrows(), m.ncols()),
                )?;
                Ok(m)
            };
            Value::Matrix(finite_difference::central_difference(
                &params, dparams, step, &evaluate,
            )?)
            .into()
        }
        Op::EquilibriumFrequencies { model, dparams } => {
            let model = collaborators.model(*model)?;
            let params = scalars(deps)?;
            let n = model.number_of_states();
            let evaluate = |p: &[f64]| -> Result<Array1<f64>> {
                let f = model.equilibrium_frequencies(p);
                check_shape(
                    model.name(),
                    "equilibrium frequencies",
                    Dimension::Vector(n),
                    Dimension::Vector(f.len()),
                )?;
                Ok(f)
            };
            Value::Vector(finite_difference::central_difference(
                &params, dparams, step, &evaluate,
            )?)
            .into()
        }
        Op::Frequencies { set, dparams } => {
            let set = collaborators.frequency_set(*set)?;
            let params = scalars(deps)?;
            let n = set.number_of_states();
            let evaluate = |p: &[f64]| -> Result<Array1<f64>> {
                let f = set.frequencies(p);
                check_shape(
                    set.name(),
                    "frequencies",
                    Dimension::Vector(n),
                    Dimension::Vector(f.len()),
                )?;
                Ok(f)
            };
            Value::Vector(finite_difference::central_difference(
                &params, dparams, step, &evaluate,
            )?)
            .into()
        }

        Op::ForwardLikelihood => {
            Value::Matrix(likelihood::forward_likelihood(matrix_of(deps[0])?, matrix_of(deps[1])?))
                .into()
        }
        Op::ConditionalLikelihood => {
            let children = deps.iter().map(|d| matrix_of(d)).collect::<Result<Vec<_>>>()?;
            Value::Matrix(likelihood::conditional_likelihood(&children)).into()
        }
        Op::SiteLikelihoods => {
            Value::Vector(likelihood::site_likelihoods(vector_of(deps[0])?, matrix_of(deps[1])?))
                .into()
        }
        Op::TotalLogLikelihood => {
            Value::Scalar(likelihood::total_log_likelihood(vector_of(deps[0])?)).into()
        }

        Op::HmmForward { .. } => {
            let pass = hmm::forward(vector_of(deps[0])?, matrix_of(deps[1])?, matrix_of(deps[2])?);
            forward_output(pass)
        }
        Op::HmmForwardD1 { .. } => {
            let primal = forward_pass_of(deps[3])?;
            let pass = hmm::forward_d1(
                vector_of(deps[0])?,
                matrix_of(deps[1])?,
                matrix_of(deps[2])?,
                &primal,
                vector_of(deps[4])?,
                matrix_of(deps[5])?,
                matrix_of(deps[6])?,
            );
            forward_output(pass)
        }
        Op::HmmForwardD2 { .. } => {
            let primal = forward_pass_of(deps[3])?;
            let first = forward_pass_of(deps[7])?;
            let pass = hmm::forward_d2(
                vector_of(deps[0])?,
                matrix_of(deps[1])?,
                matrix_of(deps[2])?,
                &primal,
                vector_of(deps[4])?,
                matrix_of(deps[5])?,
                matrix_of(deps[6])?,
                &first,
                vector_of(deps[8])?,
                matrix_of(deps[9])?,
                matrix_of(deps[10])?,
            );
            forward_output(pass)
        }
        Op::HmmConditional => Value::Matrix(retained_of(deps[0])?.clone()).into(),
        Op::HmmBackward { .. } => Value::Matrix(hmm::backward(
            vector_of(deps[0])?,
            matrix_of(deps[1])?,
            matrix_of(deps[2])?,
        ))
        .into(),
    };
    Ok(output)
}

fn forward_output(pass: hmm::ForwardPass) -> Output {
    Output {
        value: Value::Vector(pass.scales),
        retained: Some(pass.conditional),
    }
}

fn scalars(deps: &[&Node]) -> Result<Vec<f64>> {
    deps.iter().map(|d| scalar_of(d)).collect()
}

fn check_shape(
    collaborator: &str,
    what: &str,
    expected: Dimension,
    got: Dimension,
) -> Result<()> {
    if expected != got {
        return Err(Error::dimension_mismatch(
            format!("{} {}", collaborator, what),
            expected,
            got,
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_lazy_and_memoized() {
        let mut ctx = Context::new();
        let x = ctx.parameter("x", 2.0).unwrap();
        let y = ctx.constant(array![1.0, 2.0, 3.0]).unwrap();
        let s = ctx.scale(x, y).unwrap();
        let total = ctx.sum(s).unwrap();
        assert_eq!(ctx.total_computations(), 0);

        assert_eq!(ctx.scalar(total).unwrap(), 12.0);
        let after_first = ctx.total_computations();
        assert_eq!(ctx.scalar(total).unwrap(), 12.0);
        assert_eq!(ctx.total_computations(), after_first);

        ctx.set_parameter(x, 1.0).unwrap();
        assert!(ctx.is_dirty(s).unwrap());
        assert!(!ctx.is_dirty(y).unwrap());
        assert_eq!(ctx.scalar(total).unwrap(), 6.0);
        // constant y is not recomputed
        assert_eq!(ctx.computations(y).unwrap(), 1);
        assert_eq!(ctx.computations(s).unwrap(), 2);
    }

    #[test]
    fn test_parameter_without_value() {
        let mut ctx = Context::new();
        let p = ctx
            .create(
                Op::Parameter {
                    name: "unset".to_string(),
                },
                &[],
            )
            .unwrap();
        assert!(ctx.scalar(p).is_err());
    }

    #[test]
    fn test_stack_rows_and_quotient() {
        let mut ctx = Context::new();
        let a = ctx.constant(array![1.0, 4.0]).unwrap();
        let b = ctx.constant(array![2.0, 8.0]).unwrap();
        let q = ctx.cwise_quotient(a, b).unwrap();
        assert_eq!(ctx.vector(q).unwrap(), &array![0.5, 0.5]);
        let m = ctx.stack_rows(&[a, b]).unwrap();
        assert_eq!(ctx.matrix(m).unwrap(), &array![[1.0, 4.0], [2.0, 8.0]]);
    }
}
