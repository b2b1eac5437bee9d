//! Incremental dataflow graph
//!
//! A [`Context`] owns an arena of [`Node`]s. Each node is an [`Op`] applied
//! to an ordered list of dependency handles ([`NodeId`]); construction is
//! hash-consed, evaluation is lazy and memoized, and parameter changes
//! invalidate only the downstream cone of the parameter.
//!
//! ```text
//! Context
//!   ├── create / recreate     validated, structurally cached construction
//!   ├── value / scalar / ...  demand-driven evaluation (evaluate.rs)
//!   ├── set_parameter         mark-dirty propagation along dependents
//!   └── derive                symbolic derivative graphs (derive.rs)
//! ```

mod context;
mod derive;
mod evaluate;
mod id;
mod node;
mod op;

pub use context::{Context, ContextOptions};
pub use id::{ContextId, NodeId};
pub use node::{Dependencies, Node};
pub use op::{MAX_PARAM_ORDER, MAX_TIME_ORDER, Op, ParamOrders};
