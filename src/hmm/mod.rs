//! Hidden Markov chains over sites
//!
//! The forward recursion is a single node (`HmmForward`) whose value is the
//! vector of per-site log normalisation constants; it also retains the
//! normalised hidden-state matrix, exposed through `HmmConditional`.
//! Deriving it yields `HmmForwardD1`, and deriving that again along the
//! same parameter yields `HmmForwardD2`. The backward recursion is only
//! available at order zero.

mod likelihood;
mod recursion;

pub use likelihood::{HmmLikelihood, PhyloHmm, auto_correlation_matrix};
pub use recursion::{backward, forward, forward_conditional, posterior};
