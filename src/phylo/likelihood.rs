//! Tree likelihood graph builder
//!
//! Builds, in one post-order pass, the dataflow graph of Felsenstein's
//! pruning algorithm:
//!
//! ```text
//! leaf      C_l = observed partial likelihoods           (Constant)
//! branch    F_b = P(r * t_b) . C_child                   (ForwardLikelihood)
//! internal  C_n = F_b1 * F_b2 * ...                      (ConditionalLikelihood)
//! root      L   = pi^T . C_root                          (SiteLikelihoods)
//! mixture   L   = sum_c p_c L_c   over rate categories
//! total     -sum_s ln L_s                                (Negate . TotalLogLikelihood)
//! ```
//!
//! Every structural precondition is checked before the first node is
//! created, so a failed build leaves the context untouched.

use super::{PhyloTree, SiteContainer};
use crate::dataflow::{Context, NodeId, Op};
use crate::error::{Error, Result};
use crate::model::{ConfiguredModel, ConstantRate, RateCategory, RateDistribution};
use crate::tensor::{Dimension, Value, ValueKind};
use log::debug;
use std::collections::{BTreeMap, HashMap};

/// Configuration of a tree likelihood graph
pub struct TreeLikelihoodBuilder<'a> {
    tree: &'a PhyloTree,
    sites: &'a SiteContainer,
    model: ConfiguredModel,
    branch_models: HashMap<usize, ConfiguredModel>,
    branch_lengths: HashMap<usize, NodeId>,
    root_frequencies: Option<NodeId>,
    rates: Box<dyn RateDistribution>,
    parameter_prefix: String,
}

impl<'a> TreeLikelihoodBuilder<'a> {
    /// Likelihood of `sites` on `tree` with `model` on every branch
    pub fn new(tree: &'a PhyloTree, sites: &'a SiteContainer, model: &ConfiguredModel) -> Self {
        Self {
            tree,
            sites,
            model: model.clone(),
            branch_models: HashMap::new(),
            branch_lengths: HashMap::new(),
            root_frequencies: None,
            rates: Box::new(ConstantRate),
            parameter_prefix: String::new(),
        }
    }

    /// Use an explicit vector node for the root distribution
    ///
    /// Defaults to the equilibrium frequencies of the default model.
    pub fn with_root_frequencies(mut self, frequencies: NodeId) -> Self {
        self.root_frequencies = Some(frequencies);
        self
    }

    /// Mix site likelihoods over rate categories
    pub fn with_rate_distribution(mut self, rates: impl RateDistribution + 'static) -> Self {
        self.rates = Box::new(rates);
        self
    }

    /// Use `model` on the branch above tree node `branch`
    pub fn with_branch_model(mut self, branch: usize, model: &ConfiguredModel) -> Self {
        self.branch_models.insert(branch, model.clone());
        self
    }

    /// Prefix the names of the branch length parameters this builder creates
    ///
    /// Trees sharing a context share `BrLen{branch}` parameters unless
    /// they use distinct prefixes.
    pub fn with_parameter_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.parameter_prefix = prefix.into();
        self
    }

    /// Use the scalar node `length` as the length of branch `branch`
    ///
    /// Without it, the branch gets a parameter `{prefix}BrLen{branch}`
    /// initialised from the tree. An existing parameter of that name is
    /// reused only if it holds the tree's length.
    pub fn with_branch_length(mut self, branch: usize, length: NodeId) -> Self {
        self.branch_lengths.insert(branch, length);
        self
    }

    fn branch_length_name(&self, branch: usize) -> String {
        format!("{}BrLen{}", self.parameter_prefix, branch)
    }

    fn model_for(&self, branch: usize) -> &ConfiguredModel {
        self.branch_models.get(&branch).unwrap_or(&self.model)
    }

    /// Check everything that can fail before any node is built
    fn validate(&self, ctx: &Context) -> Result<Plan> {
        if !self.tree.is_rooted() {
            return Err(Error::UnrootedTree);
        }
        let root = self.tree.root()?;
        let order = self.tree.post_order()?;
        let states = self.sites.number_of_states();

        for (what, model) in std::iter::once(("model", &self.model)).chain(
            self.branch_models
                .values()
                .map(|m| ("branch model", m)),
        ) {
            if model.number_of_states() != states {
                return Err(Error::dimension_mismatch(
                    format!("{} states", what),
                    Dimension::Vector(states),
                    Dimension::Vector(model.number_of_states()),
                ));
            }
        }
        for &branch in self.branch_models.keys().chain(self.branch_lengths.keys()) {
            if branch >= self.tree.len() || branch == root {
                return Err(Error::invalid_argument(
                    "branch",
                    format!("{} is not a branch of the tree", branch),
                ));
            }
        }
        for &length in self.branch_lengths.values() {
            ctx.expect_kind(length, ValueKind::Scalar, "branch_length")?;
        }
        if let Some(freqs) = self.root_frequencies {
            let dim = ctx.dimension(freqs)?;
            if dim != Dimension::Vector(states) {
                return Err(Error::dimension_mismatch(
                    "root frequencies",
                    Dimension::Vector(states),
                    dim,
                ));
            }
        }

        let mut leaves = HashMap::new();
        for &node in &order {
            if self.tree.is_leaf(node)? {
                let name = self.tree.name(node)?.unwrap_or_default();
                leaves.insert(node, self.sites.sequence_position(name)?);
            }
            if node == root || self.branch_lengths.contains_key(&node) {
                continue;
            }
            let Some(length) = self.tree.branch_length(node)? else {
                return Err(Error::invalid_argument(
                    "tree",
                    format!("branch {} has no length", node),
                ));
            };
            let name = self.branch_length_name(node);
            if let Some(existing) = ctx.find_parameter(&name) {
                let current = ctx.parameter_value(existing)?;
                if current != length {
                    return Err(Error::invalid_argument(
                        "tree",
                        format!(
                            "branch {} has length {} but parameter {} holds {}; \
                             use a distinct parameter prefix",
                            node, length, name, current
                        ),
                    ));
                }
            }
        }

        let categories = self.rates.categories();
        if categories.is_empty() {
            return Err(Error::invalid_argument(
                "rates",
                "rate distribution has no category",
            ));
        }
        Ok(Plan {
            root,
            order,
            leaves,
            categories,
        })
    }

    /// Build the graph in `ctx`
    pub fn build(&self, ctx: &mut Context) -> Result<TreeLikelihood> {
        let plan = self.validate(ctx)?;
        let before = ctx.len();

        let mut branch_lengths = BTreeMap::new();
        for &node in &plan.order {
            if node == plan.root {
                continue;
            }
            let length = match self.branch_lengths.get(&node) {
                Some(&user) => user,
                None => {
                    let initial = self.tree.branch_length(node)?.unwrap_or_default();
                    ctx.parameter(self.branch_length_name(node), initial)?
                }
            };
            branch_lengths.insert(node, length);
        }

        let root_frequencies = match self.root_frequencies {
            Some(freqs) => freqs,
            None => ctx.equilibrium_frequencies(&self.model)?,
        };

        let mut leaf_likelihoods = HashMap::new();
        for (&node, &position) in &plan.leaves {
            let observed = self.sites.sequence_likelihoods(position)?.clone();
            leaf_likelihoods.insert(node, ctx.constant(Value::Matrix(observed))?);
        }

        let mut conditional = Vec::with_capacity(plan.categories.len());
        let mut category_sites = Vec::with_capacity(plan.categories.len());
        for category in &plan.categories {
            let rate = if category.rate == 1.0 {
                None
            } else {
                Some(ctx.constant(category.rate)?)
            };

            let mut cond: Vec<Option<NodeId>> = vec![None; self.tree.len()];
            for &node in &plan.order {
                let id = match leaf_likelihoods.get(&node) {
                    Some(&leaf) => leaf,
                    None => {
                        let mut forwards = Vec::new();
                        for &child in self.tree.children(node)? {
                            let below = cond[child].ok_or_else(|| {
                                Error::Internal(format!("tree node {} visited before child", node))
                            })?;
                            let mut t = branch_lengths[&child];
                            if let Some(r) = rate {
                                t = ctx.scale(r, t)?;
                            }
                            let p = ctx.transition_matrix(self.model_for(child), t)?;
                            forwards.push(ctx.create(Op::ForwardLikelihood, &[p, below])?);
                        }
                        ctx.create(Op::ConditionalLikelihood, &forwards)?
                    }
                };
                cond[node] = Some(id);
            }

            let at_root = cond[plan.root]
                .ok_or_else(|| Error::Internal("root has no conditional likelihood".to_string()))?;
            category_sites.push(ctx.create(Op::SiteLikelihoods, &[root_frequencies, at_root])?);
            conditional.push(cond);
        }

        let site_likelihoods = if plan.categories.len() == 1 {
            category_sites[0]
        } else {
            let mut weighted = Vec::with_capacity(category_sites.len());
            for (category, &sites) in plan.categories.iter().zip(&category_sites) {
                let p = ctx.constant(category.probability)?;
                weighted.push(ctx.scale(p, sites)?);
            }
            ctx.add(&weighted)?
        };
        let log_likelihood = ctx.create(Op::TotalLogLikelihood, &[site_likelihoods])?;
        let negative_log_likelihood = ctx.negate(log_likelihood)?;

        debug!(
            "tree likelihood: {} tree nodes, {} sites, {} rate categories, {} graph nodes added",
            self.tree.len(),
            self.sites.number_of_sites(),
            plan.categories.len(),
            ctx.len() - before
        );
        Ok(TreeLikelihood {
            negative_log_likelihood,
            log_likelihood,
            site_likelihoods,
            category_site_likelihoods: category_sites,
            categories: plan.categories,
            root_frequencies,
            branch_lengths,
            conditional,
        })
    }
}

/// Facts gathered by validation, used by construction
struct Plan {
    root: usize,
    order: Vec<usize>,
    leaves: HashMap<usize, usize>,
    categories: Vec<RateCategory>,
}

/// Handles to the nodes of a built tree likelihood graph
#[derive(Clone, Debug)]
pub struct TreeLikelihood {
    negative_log_likelihood: NodeId,
    log_likelihood: NodeId,
    site_likelihoods: NodeId,
    category_site_likelihoods: Vec<NodeId>,
    categories: Vec<RateCategory>,
    root_frequencies: NodeId,
    branch_lengths: BTreeMap<usize, NodeId>,
    conditional: Vec<Vec<Option<NodeId>>>,
}

impl TreeLikelihood {
    /// Scalar `-sum_s ln L_s`
    #[inline]
    pub fn negative_log_likelihood(&self) -> NodeId {
        self.negative_log_likelihood
    }

    /// Scalar `sum_s ln L_s`
    #[inline]
    pub fn log_likelihood(&self) -> NodeId {
        self.log_likelihood
    }

    /// Per-site likelihoods, mixed over rate categories
    #[inline]
    pub fn site_likelihoods(&self) -> NodeId {
        self.site_likelihoods
    }

    /// Per-site likelihoods of each rate category, unweighted
    pub fn category_site_likelihoods(&self) -> &[NodeId] {
        &self.category_site_likelihoods
    }

    /// Rate categories, in the order of `category_site_likelihoods`
    pub fn categories(&self) -> &[RateCategory] {
        &self.categories
    }

    /// Root distribution node
    #[inline]
    pub fn root_frequencies(&self) -> NodeId {
        self.root_frequencies
    }

    /// Branch length node of every branch, keyed by child tree node
    pub fn branch_lengths(&self) -> &BTreeMap<usize, NodeId> {
        &self.branch_lengths
    }

    /// Branch length node of one branch
    pub fn branch_length(&self, branch: usize) -> Option<NodeId> {
        self.branch_lengths.get(&branch).copied()
    }

    /// Conditional likelihood node of a tree node in one rate category
    pub fn conditional_likelihood(&self, category: usize, node: usize) -> Option<NodeId> {
        self.conditional
            .get(category)
            .and_then(|c| c.get(node))
            .copied()
            .flatten()
    }
}
