//! Phylogenetic collaborators and the tree likelihood builder

mod likelihood;
mod sites;
mod tree;

pub use likelihood::{TreeLikelihood, TreeLikelihoodBuilder};
pub use sites::{Alphabet, SiteContainer};
pub use tree::PhyloTree;
