//! Tree topology
//!
//! Nodes are numbered in insertion order. Every node except the root
//! carries the branch to its parent, so a branch is named by the index of
//! its child node.

use crate::error::{Error, Result};

#[derive(Clone, Debug)]
struct TreeNode {
    name: Option<String>,
    parent: Option<usize>,
    children: Vec<usize>,
    branch_length: Option<f64>,
}

/// Phylogenetic tree with named leaves and branch lengths
///
/// # Example
///
/// ```
/// use phyloflow::phylo::PhyloTree;
///
/// let mut tree = PhyloTree::rooted();
/// let root = tree.add_root()?;
/// let a = tree.add_leaf(root, "A", 0.1)?;
/// let b = tree.add_leaf(root, "B", 0.2)?;
/// assert_eq!(tree.post_order()?, vec![a, b, root]);
/// # Ok::<(), phyloflow::error::Error>(())
/// ```
#[derive(Clone, Debug)]
pub struct PhyloTree {
    nodes: Vec<TreeNode>,
    root: Option<usize>,
    rooted: bool,
}

impl PhyloTree {
    /// Empty rooted tree
    pub fn rooted() -> Self {
        Self {
            nodes: Vec::new(),
            root: None,
            rooted: true,
        }
    }

    /// Empty unrooted tree
    ///
    /// The topology is still stored from a base node, but likelihood
    /// graphs refuse to be built on it.
    pub fn unrooted() -> Self {
        Self {
            rooted: false,
            ..Self::rooted()
        }
    }

    /// Whether the root position is meaningful
    #[inline]
    pub fn is_rooted(&self) -> bool {
        self.rooted
    }

    /// Number of nodes
    #[inline]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the tree has no node
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Create the root (or base node of an unrooted tree)
    pub fn add_root(&mut self) -> Result<usize> {
        if self.root.is_some() {
            return Err(Error::invalid_argument("root", "tree already has a root"));
        }
        self.nodes.push(TreeNode {
            name: None,
            parent: None,
            children: Vec::new(),
            branch_length: None,
        });
        let id = self.nodes.len() - 1;
        self.root = Some(id);
        Ok(id)
    }

    /// Add an unnamed internal node below `parent`
    pub fn add_node(&mut self, parent: usize, branch_length: f64) -> Result<usize> {
        self.push_child(parent, None, branch_length)
    }

    /// Add a named leaf below `parent`
    pub fn add_leaf(
        &mut self,
        parent: usize,
        name: impl Into<String>,
        branch_length: f64,
    ) -> Result<usize> {
        self.push_child(parent, Some(name.into()), branch_length)
    }

    fn push_child(&mut self, parent: usize, name: Option<String>, length: f64) -> Result<usize> {
        self.check(parent)?;
        if !(length.is_finite() && length >= 0.0) {
            return Err(Error::invalid_argument(
                "branch_length",
                format!("must be finite and non-negative, got {}", length),
            ));
        }
        let id = self.nodes.len();
        self.nodes.push(TreeNode {
            name,
            parent: Some(parent),
            children: Vec::new(),
            branch_length: Some(length),
        });
        self.nodes[parent].children.push(id);
        Ok(id)
    }

    fn check(&self, id: usize) -> Result<&TreeNode> {
        self.nodes.get(id).ok_or_else(|| {
            Error::invalid_argument("node", format!("no tree node {} in a tree of {}", id, self.len()))
        })
    }

    /// Index of the root
    pub fn root(&self) -> Result<usize> {
        self.root
            .ok_or_else(|| Error::invalid_argument("tree", "tree has no root"))
    }

    /// Children of a node, in insertion order
    pub fn children(&self, id: usize) -> Result<&[usize]> {
        Ok(&self.check(id)?.children)
    }

    /// Parent of a node (`None` for the root)
    pub fn parent(&self, id: usize) -> Result<Option<usize>> {
        Ok(self.check(id)?.parent)
    }

    /// Name of a node, if any
    pub fn name(&self, id: usize) -> Result<Option<&str>> {
        Ok(self.check(id)?.name.as_deref())
    }

    /// Length of the branch above a node (`None` for the root)
    pub fn branch_length(&self, id: usize) -> Result<Option<f64>> {
        Ok(self.check(id)?.branch_length)
    }

    /// Whether a node has no children
    pub fn is_leaf(&self, id: usize) -> Result<bool> {
        Ok(self.check(id)?.children.is_empty())
    }

    /// Branches of the tree, named by their child node
    pub fn branches(&self) -> impl Iterator<Item = usize> + '_ {
        (0..self.nodes.len()).filter(|&i| self.nodes[i].parent.is_some())
    }

    /// Leaves, in insertion order
    pub fn leaves(&self) -> impl Iterator<Item = usize> + '_ {
        (0..self.nodes.len()).filter(|&i| self.nodes[i].children.is_empty())
    }

    /// Nodes in post-order (children before parents, left to right)
    pub fn post_order(&self) -> Result<Vec<usize>> {
        let root = self.root()?;
        let mut order = Vec::with_capacity(self.nodes.len());
        let mut stack = vec![(root, false)];
        while let Some((id, expanded)) = stack.pop() {
            if expanded {
                order.push(id);
                continue;
            }
            stack.push((id, true));
            for &child in self.nodes[id].children.iter().rev() {
                stack.push((child, false));
            }
        }
        Ok(order)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_post_order() {
        let mut tree = PhyloTree::rooted();
        let root = tree.add_root().unwrap();
        let inner = tree.add_node(root, 0.1).unwrap();
        let a = tree.add_leaf(inner, "A", 0.2).unwrap();
        let b = tree.add_leaf(inner, "B", 0.3).unwrap();
        let c = tree.add_leaf(root, "C", 0.4).unwrap();
        assert_eq!(tree.post_order().unwrap(), vec![a, b, inner, c, root]);
        assert_eq!(tree.leaves().collect::<Vec<_>>(), vec![a, b, c]);
        assert_eq!(tree.branches().count(), 4);
        assert_eq!(tree.parent(a).unwrap(), Some(inner));
        assert_eq!(tree.branch_length(root).unwrap(), None);
    }

    #[test]
    fn test_rejects_bad_input() {
        let mut tree = PhyloTree::unrooted();
        assert!(!tree.is_rooted());
        assert!(tree.post_order().is_err());
        let root = tree.add_root().unwrap();
        assert!(tree.add_root().is_err());
        assert!(tree.add_leaf(root, "A", -1.0).is_err());
        assert!(tree.add_leaf(7, "A", 1.0).is_err());
    }
}
