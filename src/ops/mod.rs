//! Numeric kernels behind the node kinds
//!
//! Kernels are plain functions over `ndarray` values. They know nothing
//! about the graph: the evaluator resolves dependency values, calls the
//! kernel for the node kind and stores the result.
//!
//! ```text
//! evaluate(node)
//!   └── compute(op, dependency values)
//!         ├── arithmetic         Add, Negate, Scale, Cwise*, Sum, StackRows
//!         ├── likelihood         P.C, child products, pi^T.C, sum ln L
//!         ├── hmm                scaled forward (+ d1, d2), backward
//!         └── finite_difference  model and frequency-set parameter derivatives
//! ```

pub mod arithmetic;
pub mod finite_difference;
pub mod hmm;
pub mod likelihood;
