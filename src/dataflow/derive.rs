//! Symbolic forward-mode differentiation of the graph
//!
//! `derive(node, wrt)` builds, through the same structural cache, a node
//! computing `d node / d wrt` for a scalar node `wrt`. Each node kind
//! contributes one chain-rule step; subgraphs that do not depend on `wrt`
//! collapse to `Zero` nodes, which the arithmetic builders then drop, so a
//! derivative graph only contains the path from `node` down to `wrt`.
//!
//! Second derivatives are obtained by deriving a derivative node again.
//! Derivative paths that are not available fail with
//! [`Error::NotImplemented`] rather than returning an approximation.
//!
//! # Example
//!
//! ```
//! use phyloflow::prelude::*;
//!
//! let mut ctx = Context::new();
//! let x = ctx.parameter("x", 3.0)?;
//! let sq = ctx.cwise_product(x, x)?;
//! let dsq = ctx.derive(sq, x)?;
//! let d2sq = ctx.derive(dsq, x)?;
//! assert_eq!(ctx.scalar(dsq)?, 6.0);
//! assert_eq!(ctx.scalar(d2sq)?, 2.0);
//! # Ok::<(), phyloflow::error::Error>(())
//! ```

use super::op::{MAX_PARAM_ORDER, MAX_TIME_ORDER, ParamOrders};
use super::{Context, NodeId, Op};
use crate::error::{Error, Result};
use crate::tensor::{Dimension, ValueKind};
use log::debug;
use smallvec::SmallVec;

impl Context {
    /// Node computing the derivative of `node` with respect to the scalar node `wrt`
    ///
    /// If `wrt` does not influence `node`, the result is a `Zero` node of
    /// the same shape as `node`. Results are memoized per `(node, wrt)`.
    /// A failed derivation removes the nodes it had already built.
    pub fn derive(&mut self, node: NodeId, wrt: NodeId) -> Result<NodeId> {
        self.node(node)?;
        self.expect_kind(wrt, ValueKind::Scalar, "wrt")?;
        let before = self.len();
        match self.derive_inner(node, wrt) {
            Ok(derivative) => Ok(derivative),
            Err(err) => {
                debug!(
                    "derive {} wrt {} failed, dropping {} nodes: {}",
                    node,
                    wrt,
                    self.len() - before,
                    err
                );
                self.truncate(before);
                Err(err)
            }
        }
    }

    fn derive_inner(&mut self, node: NodeId, wrt: NodeId) -> Result<NodeId> {
        if node == wrt {
            return self.one();
        }
        if let Some(&known) = self.derivatives.get(&(node, wrt)) {
            return Ok(known);
        }
        let before = self.len();
        let derivative = self.derive_uncached(node, wrt)?;
        if self.len() > before {
            debug!(
                "derived {} wrt {}: {} new nodes",
                node,
                wrt,
                self.len() - before
            );
        }
        self.derivatives.insert((node, wrt), derivative);
        Ok(derivative)
    }

    /// Derivatives of every dependency of `node`
    fn derive_dependencies(&mut self, node: NodeId, wrt: NodeId) -> Result<SmallVec<[NodeId; 4]>> {
        let deps: SmallVec<[NodeId; 4]> = self.dependencies(node)?.iter().copied().collect();
        deps.iter().map(|&d| self.derive_inner(d, wrt)).collect()
    }

    fn all_zero(&self, ids: &[NodeId]) -> Result<bool> {
        for &id in ids {
            if !self.is_zero(id)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn derive_uncached(&mut self, node: NodeId, wrt: NodeId) -> Result<NodeId> {
        let op = self.op(node)?.clone();
        let dim = self.dimension(node)?;
        let deps: SmallVec<[NodeId; 4]> = self.dependencies(node)?.iter().copied().collect();

        match op {
            Op::Constant(_) | Op::Zero(_) | Op::Parameter { .. } => self.zero(dim),

            Op::Add => {
                let terms = self.derive_dependencies(node, wrt)?;
                self.add(&terms)
            }
            Op::Negate => {
                let dx = self.derive_inner(deps[0], wrt)?;
                self.negate(dx)
            }
            Op::Sum => {
                let dx = self.derive_inner(deps[0], wrt)?;
                self.sum(dx)
            }
            Op::StackRows => {
                let rows = self.derive_dependencies(node, wrt)?;
                self.stack_rows(&rows)
            }
            Op::Scale => {
                // (s x)' = s' x + s x'
                let (s, x) = (deps[0], deps[1]);
                let ds = self.derive_inner(s, wrt)?;
                let dx = self.derive_inner(x, wrt)?;
                let a = self.scale(ds, x)?;
                let b = self.scale(s, dx)?;
                self.add(&[a, b])
            }
            Op::CwiseProduct => {
                let (a, b) = (deps[0], deps[1]);
                let da = self.derive_inner(a, wrt)?;
                let db = self.derive_inner(b, wrt)?;
                let left = self.cwise_product(da, b)?;
                let right = self.cwise_product(a, db)?;
                self.add(&[left, right])
            }
            Op::CwiseQuotient => {
                // (a / b)' = (a' - (a / b) b') / b
                let (a, b) = (deps[0], deps[1]);
                let da = self.derive_inner(a, wrt)?;
                let db = self.derive_inner(b, wrt)?;
                let q_db = self.cwise_product(node, db)?;
                let neg = self.negate(q_db)?;
                let numerator = self.add(&[da, neg])?;
                self.cwise_quotient(numerator, b)
            }

            Op::TransitionMatrix {
                model,
                dt_order,
                dparams,
            } => {
                let mut terms: SmallVec<[NodeId; 4]> = SmallVec::new();
                for (i, &dep) in deps.iter().enumerate() {
                    let d = self.derive_inner(dep, wrt)?;
                    if self.is_zero(d)? {
                        continue;
                    }
                    let partial = if i == 0 {
                        if dt_order >= MAX_TIME_ORDER {
                            return Err(Error::NotImplemented {
                                feature: "transition matrix derivative above second order in branch length",
                            });
                        }
                        Op::TransitionMatrix {
                            model,
                            dt_order: dt_order + 1,
                            dparams: dparams.clone(),
                        }
                    } else {
                        Op::TransitionMatrix {
                            model,
                            dt_order,
                            dparams: push_param(&dparams, i - 1)?,
                        }
                    };
                    let partial = self.create(partial, &deps)?;
                    terms.push(self.scale(d, partial)?);
                }
                self.sum_or_zero(&terms, dim)
            }
            Op::EquilibriumFrequencies { model, dparams } => {
                self.derive_collaborator(&deps, wrt, dim, |k| {
                    Ok(Op::EquilibriumFrequencies {
                        model,
                        dparams: push_param(&dparams, k)?,
                    })
                })
            }
            Op::Frequencies { set, dparams } => self.derive_collaborator(&deps, wrt, dim, |k| {
                Ok(Op::Frequencies {
                    set,
                    dparams: push_param(&dparams, k)?,
                })
            }),

            Op::ForwardLikelihood | Op::SiteLikelihoods => {
                // bilinear in its two inputs
                let (a, b) = (deps[0], deps[1]);
                let da = self.derive_inner(a, wrt)?;
                let db = self.derive_inner(b, wrt)?;
                let mut terms: SmallVec<[NodeId; 4]> = SmallVec::new();
                if !self.is_zero(da)? {
                    terms.push(self.create(op.clone(), &[da, b])?);
                }
                if !self.is_zero(db)? {
                    terms.push(self.create(op, &[a, db])?);
                }
                self.sum_or_zero(&terms, dim)
            }
            Op::ConditionalLikelihood => {
                // product rule over the children
                let mut terms: SmallVec<[NodeId; 4]> = SmallVec::new();
                for i in 0..deps.len() {
                    let d = self.derive_inner(deps[i], wrt)?;
                    if self.is_zero(d)? {
                        continue;
                    }
                    let mut factors = deps.clone();
                    factors[i] = d;
                    terms.push(self.create(Op::ConditionalLikelihood, &factors)?);
                }
                self.sum_or_zero(&terms, dim)
            }
            Op::TotalLogLikelihood => {
                let sites = deps[0];
                let dsites = self.derive_inner(sites, wrt)?;
                let ratio = self.cwise_quotient(dsites, sites)?;
                self.sum(ratio)
            }

            Op::HmmForward { states, sites } => {
                let dinputs = self.derive_dependencies(node, wrt)?;
                if self.all_zero(&dinputs)? {
                    return self.zero(dim);
                }
                let mut d1 = deps.clone();
                d1.push(node);
                d1.extend_from_slice(&dinputs);
                self.create(Op::HmmForwardD1 { states, sites, wrt }, &d1)
            }
            Op::HmmForwardD1 {
                states,
                sites,
                wrt: first,
            } => {
                if first != wrt {
                    // mixed second derivatives are only supported when trivially zero
                    let mut inputs: SmallVec<[NodeId; 8]> = SmallVec::new();
                    for &d in deps[0..3].iter().chain(&deps[4..7]) {
                        inputs.push(self.derive_inner(d, wrt)?);
                    }
                    if self.all_zero(&inputs)? {
                        return self.zero(dim);
                    }
                    return Err(Error::NotImplemented {
                        feature: "mixed second derivative of the forward recursion",
                    });
                }
                let mut d2inputs: SmallVec<[NodeId; 4]> = SmallVec::new();
                for &d in &deps[4..7] {
                    d2inputs.push(self.derive_inner(d, wrt)?);
                }
                let mut d2 = deps.clone();
                d2.push(node);
                d2.extend_from_slice(&d2inputs);
                self.create(Op::HmmForwardD2 { states, sites, wrt }, &d2)
            }
            Op::HmmForwardD2 { .. } => Err(Error::NotImplemented {
                feature: "derivative of the second-order forward recursion",
            }),
            Op::HmmConditional => {
                let dforward = self.derive_inner(deps[0], wrt)?;
                if self.is_zero(dforward)? {
                    return self.zero(dim);
                }
                self.create(Op::HmmConditional, &[dforward])
            }
            Op::HmmBackward { .. } => Err(Error::NotImplemented {
                feature: "derivative of the backward recursion",
            }),
        }
    }

    /// Chain rule over the scalar parameters of a model or frequency set
    fn derive_collaborator(
        &mut self,
        deps: &[NodeId],
        wrt: NodeId,
        dim: Dimension,
        partial_op: impl Fn(usize) -> Result<Op>,
    ) -> Result<NodeId> {
        let mut terms: SmallVec<[NodeId; 4]> = SmallVec::new();
        for (k, &dep) in deps.iter().enumerate() {
            let d = self.derive_inner(dep, wrt)?;
            if self.is_zero(d)? {
                continue;
            }
            let partial = self.create(partial_op(k)?, deps)?;
            terms.push(self.scale(d, partial)?);
        }
        self.sum_or_zero(&terms, dim)
    }

    fn sum_or_zero(&mut self, terms: &[NodeId], dim: Dimension) -> Result<NodeId> {
        if terms.is_empty() {
            self.zero(dim)
        } else {
            self.add(terms)
        }
    }
}

fn push_param(dparams: &ParamOrders, k: usize) -> Result<ParamOrders> {
    if dparams.len() >= MAX_PARAM_ORDER {
        return Err(Error::NotImplemented {
            feature: "model parameter derivative above second order",
        });
    }
    let mut next = dparams.clone();
    next.push(k);
    // mixed partials commute; keep one canonical order for cache sharing
    next.sort_unstable();
    Ok(next)
}
