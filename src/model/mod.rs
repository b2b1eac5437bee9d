//! Substitution-model collaborators
//!
//! The likelihood graph treats models as black boxes producing
//! transition-probability matrices `P(t)`, their first and second
//! derivatives in `t`, and equilibrium frequencies. Model parameters are
//! passed in explicitly on every call so that a node's computation is a pure
//! function of its dependency values.
//!
//! Derivatives with respect to model parameters are not requested from the
//! model: the graph obtains them by central finite differences over the
//! parameter vector.

mod binary;
mod frequencies;
mod mk;
mod rates;

pub use binary::BinaryModel;
pub use frequencies::{FixedFrequencySet, FullFrequencySet};
pub use mk::MkModel;
pub use rates::{ConstantRate, DiscreteRates, RateCategory, RateDistribution};

use crate::dataflow::NodeId;
use ndarray::{Array1, Array2};
use std::fmt;

/// Named parameter of a collaborator, with its initial value
#[derive(Clone, Debug, PartialEq)]
pub struct ModelParameter {
    /// Parameter name, unique within its collaborator
    pub name: String,
    /// Initial value
    pub value: f64,
}

impl ModelParameter {
    /// Create a named parameter
    pub fn new(name: impl Into<String>, value: f64) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }
}

/// Continuous-time Markov substitution model
pub trait SubstitutionModel: fmt::Debug {
    /// Human-readable name, used as default parameter prefix
    fn name(&self) -> &str;

    /// Number of states of the Markov chain
    fn number_of_states(&self) -> usize;

    /// Free parameters with their initial values
    fn parameters(&self) -> Vec<ModelParameter>;

    /// `P(t)`: entry `(i, j)` is the probability of `i -> j` in time `t`
    fn transition_probabilities(&self, params: &[f64], t: f64) -> Array2<f64>;

    /// `dP(t)/dt`
    fn d_transition_probabilities(&self, params: &[f64], t: f64) -> Array2<f64>;

    /// `d2P(t)/dt2`
    fn d2_transition_probabilities(&self, params: &[f64], t: f64) -> Array2<f64>;

    /// Stationary distribution of the chain
    fn equilibrium_frequencies(&self, params: &[f64]) -> Array1<f64>;
}

/// Parameterised distribution over states, used for root frequencies
pub trait FrequencySet: fmt::Debug {
    /// Human-readable name, used as default parameter prefix
    fn name(&self) -> &str;

    /// Number of states
    fn number_of_states(&self) -> usize;

    /// Free parameters with their initial values
    fn parameters(&self) -> Vec<ModelParameter>;

    /// Frequencies for the given parameter values
    fn frequencies(&self, params: &[f64]) -> Array1<f64>;
}

/// Handle to a substitution model registered in a `Context`
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct ModelId(pub(crate) usize);

/// Handle to a frequency set registered in a `Context`
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct FrequencySetId(pub(crate) usize);

/// A registered substitution model together with its parameter nodes
#[derive(Clone, Debug)]
pub struct ConfiguredModel {
    pub(crate) id: ModelId,
    pub(crate) states: usize,
    pub(crate) parameters: Vec<NodeId>,
}

impl ConfiguredModel {
    /// Registry handle of the model
    #[inline]
    pub fn id(&self) -> ModelId {
        self.id
    }

    /// Number of states of the model
    #[inline]
    pub fn number_of_states(&self) -> usize {
        self.states
    }

    /// Parameter nodes, in the order of `SubstitutionModel::parameters`
    #[inline]
    pub fn parameters(&self) -> &[NodeId] {
        &self.parameters
    }
}

/// A registered frequency set together with its parameter nodes
#[derive(Clone, Debug)]
pub struct ConfiguredFrequencySet {
    pub(crate) id: FrequencySetId,
    pub(crate) states: usize,
    pub(crate) parameters: Vec<NodeId>,
}

impl ConfiguredFrequencySet {
    /// Registry handle of the frequency set
    #[inline]
    pub fn id(&self) -> FrequencySetId {
        self.id
    }

    /// Number of states
    #[inline]
    pub fn number_of_states(&self) -> usize {
        self.states
    }

    /// Parameter nodes, in the order of `FrequencySet::parameters`
    #[inline]
    pub fn parameters(&self) -> &[NodeId] {
        &self.parameters
    }
}
