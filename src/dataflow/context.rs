//! Context: node arena, structural cache and parameter management

use super::node::{Dependencies, Node};
use super::op::{DepInfo, Op, output_dimension};
use super::{ContextId, NodeId};
use crate::error::{Error, Result};
use crate::model::{
    ConfiguredFrequencySet, ConfiguredModel, FrequencySet, FrequencySetId, ModelId,
    SubstitutionModel,
};
use crate::tensor::{Dimension, Value, ValueKind};
use log::{debug, trace};
use smallvec::SmallVec;
use std::collections::HashMap;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// Tunables of a context
#[derive(Clone, Debug, PartialEq)]
pub struct ContextOptions {
    /// Step of the central differences used for derivatives with respect
    /// to model and frequency-set parameters
    pub finite_difference_step: f64,
}

impl Default for ContextOptions {
    fn default() -> Self {
        Self {
            finite_difference_step: 1e-4,
        }
    }
}

impl ContextOptions {
    fn validate(&self) -> Result<()> {
        let h = self.finite_difference_step;
        if !(h.is_finite() && h > 0.0) {
            return Err(Error::invalid_argument(
                "finite_difference_step",
                format!("must be finite and positive, got {}", h),
            ));
        }
        Ok(())
    }
}

/// Registry of external collaborators referenced by node kinds
#[derive(Default)]
pub(crate) struct Collaborators {
    models: Vec<Arc<dyn SubstitutionModel>>,
    frequency_sets: Vec<Arc<dyn FrequencySet>>,
}

impl Collaborators {
    pub(crate) fn model(&self, id: ModelId) -> Result<&dyn SubstitutionModel> {
        self.models
            .get(id.0)
            .map(|m| m.as_ref())
            .ok_or_else(|| Error::invalid_argument("model", format!("unknown model {:?}", id)))
    }

    pub(crate) fn frequency_set(&self, id: FrequencySetId) -> Result<&dyn FrequencySet> {
        self.frequency_sets
            .get(id.0)
            .map(|s| s.as_ref())
            .ok_or_else(|| {
                Error::invalid_argument("set", format!("unknown frequency set {:?}", id))
            })
    }
}

/// Graph construction and evaluation session
///
/// The context owns every node in an arena; `NodeId`s are non-owning
/// handles. Node creation goes through a structural cache keyed by
/// `(kind, dependencies, extra arguments)`, so requesting the same
/// computation twice yields the same node. Values are computed on demand
/// and kept until a parameter upstream of them changes.
///
/// A context is meant to be driven by a single thread.
///
/// # Example
///
/// ```
/// use phyloflow::prelude::*;
///
/// let mut ctx = Context::new();
/// let x = ctx.parameter("x", 2.0)?;
/// let y = ctx.parameter("y", 3.0)?;
/// let sum = ctx.add(&[x, y])?;
/// assert_eq!(ctx.scalar(sum)?, 5.0);
///
/// // Structural sharing: same computation, same node
/// assert_eq!(ctx.add(&[x, y])?, sum);
///
/// ctx.set_parameter(x, 10.0)?;
/// assert_eq!(ctx.scalar(sum)?, 13.0);
/// # Ok::<(), phyloflow::error::Error>(())
/// ```
pub struct Context {
    id: ContextId,
    options: ContextOptions,
    pub(crate) nodes: Vec<Node>,
    dependents: Vec<SmallVec<[NodeId; 4]>>,
    cache: HashMap<u64, SmallVec<[NodeId; 1]>>,
    pub(crate) derivatives: HashMap<(NodeId, NodeId), NodeId>,
    pub(crate) collaborators: Collaborators,
    pub(crate) computations: u64,
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

impl Context {
    /// Create an empty context with default options
    pub fn new() -> Self {
        Self {
            id: ContextId::new(),
            options: ContextOptions::default(),
            nodes: Vec::new(),
            dependents: Vec::new(),
            cache: HashMap::new(),
            derivatives: HashMap::new(),
            collaborators: Collaborators::default(),
            computations: 0,
        }
    }

    /// Create an empty context with explicit options
    pub fn with_options(options: ContextOptions) -> Result<Self> {
        options.validate()?;
        Ok(Self {
            options,
            ..Self::new()
        })
    }

    /// Tag of this context
    #[inline]
    pub fn id(&self) -> ContextId {
        self.id
    }

    /// Options this context was created with
    #[inline]
    pub fn options(&self) -> &ContextOptions {
        &self.options
    }

    /// Number of nodes built so far
    #[inline]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether no node was built yet
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    // ========================================================================
    // Node access
    // ========================================================================

    /// Whether `id` names a node of this context
    #[inline]
    pub fn contains(&self, id: NodeId) -> bool {
        id.context() == self.id && id.index() < self.nodes.len()
    }

    /// Look up a node
    pub fn node(&self, id: NodeId) -> Result<&Node> {
        if !self.contains(id) {
            return Err(Error::invalid_argument(
                "node",
                format!("{} is not a node of this context", id),
            ));
        }
        Ok(&self.nodes[id.index()])
    }

    /// Kind of a node
    pub fn op(&self, id: NodeId) -> Result<&Op> {
        Ok(self.node(id)?.op())
    }

    /// Declared shape of a node
    pub fn dimension(&self, id: NodeId) -> Result<Dimension> {
        Ok(self.node(id)?.dimension())
    }

    /// Dependencies of a node
    pub fn dependencies(&self, id: NodeId) -> Result<&[NodeId]> {
        Ok(self.node(id)?.dependencies())
    }

    /// Nodes that list `id` among their dependencies
    pub fn dependents(&self, id: NodeId) -> Result<&[NodeId]> {
        self.node(id)?;
        Ok(&self.dependents[id.index()])
    }

    /// Whether a current value is cached for the node
    pub fn is_valid(&self, id: NodeId) -> Result<bool> {
        Ok(self.node(id)?.is_valid())
    }

    /// Whether the node must be recomputed before its value can be used
    pub fn is_dirty(&self, id: NodeId) -> Result<bool> {
        Ok(self.node(id)?.is_dirty())
    }

    /// Invalidation counter of the node
    pub fn generation(&self, id: NodeId) -> Result<u64> {
        Ok(self.node(id)?.generation())
    }

    /// Number of times the node was computed
    pub fn computations(&self, id: NodeId) -> Result<u64> {
        Ok(self.node(id)?.computations())
    }

    /// Number of node computations performed by this context
    #[inline]
    pub fn total_computations(&self) -> u64 {
        self.computations
    }

    /// One-line description of a node, for debugging
    pub fn describe(&self, id: NodeId) -> Result<String> {
        let node = self.node(id)?;
        let deps: Vec<String> = node.dependencies().iter().map(|d| d.to_string()).collect();
        let extra = match node.op() {
            Op::Parameter { name } => format!(" name={}", name),
            Op::TransitionMatrix {
                model,
                dt_order,
                dparams,
            } => format!(" model={:?} dt={} dparams={:?}", model, dt_order, dparams),
            Op::EquilibriumFrequencies { model, dparams } => {
                format!(" model={:?} dparams={:?}", model, dparams)
            }
            Op::Frequencies { set, dparams } => format!(" set={:?} dparams={:?}", set, dparams),
            Op::HmmForwardD1 { wrt, .. } | Op::HmmForwardD2 { wrt, .. } => {
                format!(" wrt={}", wrt)
            }
            _ => String::new(),
        };
        let state = if node.is_valid() {
            "valid"
        } else if node.cached().is_some() {
            "stale"
        } else {
            "empty"
        };
        Ok(format!(
            "{} {}({}) dim={}{} [{}]",
            id,
            node.op().name(),
            deps.join(", "),
            node.dimension(),
            extra,
            state
        ))
    }

    // ========================================================================
    // Construction
    // ========================================================================

    /// Check `deps` against the signature of `op` and return the output shape
    ///
    /// Every handle must belong to this context, and the dependencies'
    /// count, kinds and shapes must match. Nothing is registered.
    pub fn validate(&self, op: &Op, deps: &[NodeId]) -> Result<Dimension> {
        for (position, &dep) in deps.iter().enumerate() {
            if !self.contains(dep) {
                return Err(Error::NullDependency {
                    node: op.name(),
                    position,
                    id: dep,
                });
            }
        }
        let infos: SmallVec<[DepInfo<'_>; 4]> = deps
            .iter()
            .map(|d| {
                let node = &self.nodes[d.index()];
                DepInfo {
                    id: *d,
                    op: node.op(),
                    dim: node.dimension(),
                    inputs: node.dependencies(),
                }
            })
            .collect();
        output_dimension(op, &infos, &self.collaborators)
    }

    /// Create (or fetch from the cache) the node computing `op` over `deps`
    ///
    /// Dependencies are validated before anything is registered, so a
    /// failed creation leaves the context unchanged. No value is computed.
    pub fn create(&mut self, op: Op, deps: &[NodeId]) -> Result<NodeId> {
        let dim = self.validate(&op, deps)?;

        if let Some(existing) = self.find(&op, deps) {
            trace!("cache hit {} for {}", existing, op.name());
            return Ok(existing);
        }
        let key = structural_hash(&op, deps);

        let id = NodeId::new(self.id, self.nodes.len())?;
        let deps: Dependencies = deps.iter().copied().collect();
        for (i, &dep) in deps.iter().enumerate() {
            if !deps[..i].contains(&dep) {
                self.dependents[dep.index()].push(id);
            }
        }
        debug!("created {} {} dim={}", id, op.name(), dim);
        self.nodes.push(Node::new(op, deps, dim));
        self.dependents.push(SmallVec::new());
        self.cache.entry(key).or_default().push(id);
        Ok(id)
    }

    /// Node already computing `op` over `deps`, if any
    pub fn find(&self, op: &Op, deps: &[NodeId]) -> Option<NodeId> {
        let bucket = self.cache.get(&structural_hash(op, deps))?;
        bucket.iter().copied().find(|existing| {
            let node = &self.nodes[existing.index()];
            node.op() == op && node.dependencies() == deps
        })
    }

    /// Parameter node registered under `name`, if any
    pub fn find_parameter(&self, name: &str) -> Option<NodeId> {
        self.find(
            &Op::Parameter {
                name: name.to_string(),
            },
            &[],
        )
    }

    /// Drop every node created after the context held `len` nodes
    ///
    /// Older nodes never depend on newer ones, so only the cache, the
    /// dependents lists and the derivative memo need pruning.
    pub(crate) fn truncate(&mut self, len: usize) {
        if len >= self.nodes.len() {
            return;
        }
        let kept = |id: &NodeId| id.index() < len;
        self.nodes.truncate(len);
        self.dependents.truncate(len);
        for dependents in &mut self.dependents {
            dependents.retain(|d| kept(d));
        }
        self.cache.retain(|_, bucket| {
            bucket.retain(|id| kept(id));
            !bucket.is_empty()
        });
        self.derivatives
            .retain(|(node, wrt), derivative| kept(node) && kept(wrt) && kept(derivative));
    }

    /// Build a node of the same kind as `id` over new dependencies
    ///
    /// Used to rewrite part of a graph (for instance to swap the model of
    /// one branch) without rebuilding the rest.
    pub fn recreate(&mut self, id: NodeId, deps: &[NodeId]) -> Result<NodeId> {
        let op = self.op(id)?.clone();
        self.create(op, deps)
    }

    /// Numeric constant
    pub fn constant(&mut self, value: impl Into<Value>) -> Result<NodeId> {
        self.create(Op::Constant(value.into()), &[])
    }

    /// All-zero node of the given shape
    pub fn zero(&mut self, dim: Dimension) -> Result<NodeId> {
        self.create(Op::Zero(dim), &[])
    }

    /// Scalar constant one
    pub fn one(&mut self) -> Result<NodeId> {
        self.constant(1.0)
    }

    /// Named scalar parameter
    ///
    /// Parameters are keyed by name: asking again for an existing name
    /// returns the existing node and leaves its current value untouched.
    pub fn parameter(&mut self, name: impl Into<String>, value: f64) -> Result<NodeId> {
        let name = name.into();
        let before = self.nodes.len();
        let id = self.create(Op::Parameter { name }, &[])?;
        if self.nodes.len() > before {
            self.nodes[id.index()].assign(Value::Scalar(value));
        }
        Ok(id)
    }

    /// Change the value of a parameter
    ///
    /// Marks dirty exactly the nodes downstream of the parameter; nothing
    /// is recomputed until a value is requested again.
    pub fn set_parameter(&mut self, id: NodeId, value: f64) -> Result<()> {
        let node = self.node(id)?;
        let name = match node.op() {
            Op::Parameter { name } => name.clone(),
            other => {
                return Err(Error::invalid_argument(
                    "id",
                    format!("{} is a {} node, not a parameter", id, other.name()),
                ));
            }
        };
        if let Some(Value::Scalar(current)) = node.cached() {
            if current.to_bits() == value.to_bits() {
                return Ok(());
            }
        }
        self.nodes[id.index()].assign(Value::Scalar(value));
        let cone = self.invalidate_dependents(id);
        debug!("parameter {} = {}: invalidated {} nodes", name, value, cone);
        Ok(())
    }

    /// Current value of a parameter
    pub fn parameter_value(&self, id: NodeId) -> Result<f64> {
        let node = self.node(id)?;
        match (node.op(), node.cached()) {
            (Op::Parameter { .. }, Some(value)) => value.as_scalar(),
            (op, _) => Err(Error::invalid_argument(
                "id",
                format!("{} is a {} node, not a parameter", id, op.name()),
            )),
        }
    }

    /// Mark the downstream cone of `id` dirty; returns the number of nodes touched
    fn invalidate_dependents(&mut self, id: NodeId) -> usize {
        let mut touched = 0;
        let mut stack: Vec<NodeId> = self.dependents[id.index()].to_vec();
        while let Some(next) = stack.pop() {
            if self.nodes[next.index()].invalidate() {
                touched += 1;
                stack.extend_from_slice(&self.dependents[next.index()]);
            }
        }
        touched
    }

    // ========================================================================
    // Collaborators
    // ========================================================================

    /// Register a substitution model and create its parameter nodes
    ///
    /// Parameters are named `"{model name}.{parameter}"`; use
    /// [`Context::configure_model_with_prefix`] to keep two instances of the
    /// same model independent.
    pub fn configure_model(&mut self, model: Arc<dyn SubstitutionModel>) -> Result<ConfiguredModel> {
        let prefix = model.name().to_string();
        self.configure_model_with_prefix(model, &prefix)
    }

    /// Register a substitution model, naming its parameters `"{prefix}.{parameter}"`
    pub fn configure_model_with_prefix(
        &mut self,
        model: Arc<dyn SubstitutionModel>,
        prefix: &str,
    ) -> Result<ConfiguredModel> {
        let mut parameters = Vec::new();
        for p in model.parameters() {
            parameters.push(self.parameter(format!("{}.{}", prefix, p.name), p.value)?);
        }
        let states = model.number_of_states();
        let id = ModelId(self.collaborators.models.len());
        debug!(
            "registered model {} ({} states, {} parameters) as {:?}",
            model.name(),
            states,
            parameters.len(),
            id
        );
        self.collaborators.models.push(model);
        Ok(ConfiguredModel {
            id,
            states,
            parameters,
        })
    }

    /// Register a frequency set and create its parameter nodes
    pub fn configure_frequency_set(
        &mut self,
        set: Arc<dyn FrequencySet>,
        prefix: &str,
    ) -> Result<ConfiguredFrequencySet> {
        let mut parameters = Vec::new();
        for p in set.parameters() {
            parameters.push(self.parameter(format!("{}.{}", prefix, p.name), p.value)?);
        }
        let states = set.number_of_states();
        let id = FrequencySetId(self.collaborators.frequency_sets.len());
        self.collaborators.frequency_sets.push(set);
        Ok(ConfiguredFrequencySet {
            id,
            states,
            parameters,
        })
    }

    /// `P(t)` of a configured model for the branch length node `t`
    pub fn transition_matrix(&mut self, model: &ConfiguredModel, t: NodeId) -> Result<NodeId> {
        let mut deps = Vec::with_capacity(1 + model.parameters.len());
        deps.push(t);
        deps.extend_from_slice(&model.parameters);
        self.create(
            Op::TransitionMatrix {
                model: model.id,
                dt_order: 0,
                dparams: SmallVec::new(),
            },
            &deps,
        )
    }

    /// Stationary distribution of a configured model
    pub fn equilibrium_frequencies(&mut self, model: &ConfiguredModel) -> Result<NodeId> {
        self.create(
            Op::EquilibriumFrequencies {
                model: model.id,
                dparams: SmallVec::new(),
            },
            &model.parameters,
        )
    }

    /// Frequencies of a configured frequency set
    pub fn frequencies(&mut self, set: &ConfiguredFrequencySet) -> Result<NodeId> {
        self.create(
            Op::Frequencies {
                set: set.id,
                dparams: SmallVec::new(),
            },
            &set.parameters,
        )
    }

    // ========================================================================
    // Arithmetic builders
    //
    // These apply identity rewrites only: zero operands are dropped and
    // scaling by the constant one is elided.
    // ========================================================================

    /// Sum of same-shape nodes
    pub fn add(&mut self, terms: &[NodeId]) -> Result<NodeId> {
        let dim = self.validate(&Op::Add, terms)?;
        let mut kept: SmallVec<[NodeId; 4]> = SmallVec::new();
        for &t in terms {
            if !self.is_zero(t)? {
                kept.push(t);
            }
        }
        match kept.len() {
            0 => self.zero(dim),
            1 => Ok(kept[0]),
            _ => self.create(Op::Add, &kept),
        }
    }

    /// Element-wise negation
    pub fn negate(&mut self, x: NodeId) -> Result<NodeId> {
        self.validate(&Op::Negate, &[x])?;
        if self.is_zero(x)? {
            return Ok(x);
        }
        self.create(Op::Negate, &[x])
    }

    /// Scalar node `s` times `x`
    pub fn scale(&mut self, s: NodeId, x: NodeId) -> Result<NodeId> {
        let dim = self.validate(&Op::Scale, &[s, x])?;
        if self.is_zero(s)? || self.is_zero(x)? {
            return self.zero(dim);
        }
        if self.is_one(s)? {
            return Ok(x);
        }
        self.create(Op::Scale, &[s, x])
    }

    /// Element-wise product
    pub fn cwise_product(&mut self, a: NodeId, b: NodeId) -> Result<NodeId> {
        let dim = self.validate(&Op::CwiseProduct, &[a, b])?;
        if self.is_zero(a)? || self.is_zero(b)? {
            return self.zero(dim);
        }
        self.create(Op::CwiseProduct, &[a, b])
    }

    /// Element-wise quotient `a / b`
    pub fn cwise_quotient(&mut self, a: NodeId, b: NodeId) -> Result<NodeId> {
        self.validate(&Op::CwiseQuotient, &[a, b])?;
        if self.is_zero(a)? {
            return Ok(a);
        }
        self.create(Op::CwiseQuotient, &[a, b])
    }

    /// Sum of all entries of `x`
    pub fn sum(&mut self, x: NodeId) -> Result<NodeId> {
        self.validate(&Op::Sum, &[x])?;
        if self.is_zero(x)? {
            return self.zero(Dimension::Scalar);
        }
        self.create(Op::Sum, &[x])
    }

    /// Stack vectors as the rows of a matrix
    pub fn stack_rows(&mut self, rows: &[NodeId]) -> Result<NodeId> {
        let dim = self.validate(&Op::StackRows, rows)?;
        let mut all_zero = true;
        for &r in rows {
            all_zero &= self.is_zero(r)?;
        }
        if all_zero {
            return self.zero(dim);
        }
        self.create(Op::StackRows, rows)
    }

    /// Whether the node is a structural zero
    pub(crate) fn is_zero(&self, id: NodeId) -> Result<bool> {
        Ok(matches!(self.op(id)?, Op::Zero(_)))
    }

    /// Whether the node is the scalar constant one
    pub(crate) fn is_one(&self, id: NodeId) -> Result<bool> {
        Ok(matches!(self.op(id)?, Op::Constant(Value::Scalar(x)) if *x == 1.0))
    }

    /// Check a node's value category
    pub(crate) fn expect_kind(&self, id: NodeId, kind: ValueKind, what: &'static str) -> Result<()> {
        let got = self.dimension(id)?.kind();
        if got != kind {
            return Err(Error::invalid_argument(
                what,
                format!("expected a {} node, got a {}", kind, got),
            ));
        }
        Ok(())
    }
}

fn structural_hash(op: &Op, deps: &[NodeId]) -> u64 {
    let mut hasher = DefaultHasher::new();
    op.hash(&mut hasher);
    deps.hash(&mut hasher);
    hasher.finish()
}
