//! Node handles and context tags

use crate::error::{Error, Result};
use std::sync::atomic::{AtomicU32, Ordering};

/// Global counter for context tags
static NEXT_CONTEXT: AtomicU32 = AtomicU32::new(1);

/// Tag identifying one `Context`
///
/// Tags are unique within a process lifetime, so a handle minted by one
/// context is never mistaken for a node of another.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct ContextId(u32);

impl ContextId {
    /// Allocate a fresh context tag
    #[inline]
    pub(crate) fn new() -> Self {
        Self(NEXT_CONTEXT.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw tag value
    #[inline]
    pub fn raw(self) -> u32 {
        self.0
    }
}

/// Non-owning handle to a node stored in a `Context` arena
///
/// Handles are `Copy`; the arena owns every node and handles only name
/// them. Identity of a handle is identity of the node.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId {
    context: u32,
    index: u32,
}

impl NodeId {
    /// Handle of arena slot `index`; fails once the arena outgrows `u32`
    #[inline]
    pub(crate) fn new(context: ContextId, index: usize) -> Result<Self> {
        let index = u32::try_from(index)
            .map_err(|_| Error::Internal(format!("node index {} exceeds u32", index)))?;
        Ok(Self {
            context: context.0,
            index,
        })
    }

    /// Position of the node in its context's arena
    #[inline]
    pub fn index(self) -> usize {
        self.index as usize
    }

    /// Tag of the context owning this node
    #[inline]
    pub fn context(self) -> ContextId {
        ContextId(self.context)
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Node({}:{})", self.context, self.index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unique_context_tags() {
        let a = ContextId::new();
        let b = ContextId::new();
        assert_ne!(a, b);
        assert!(b.raw() > a.raw());
    }

    #[test]
    fn test_handles_from_different_contexts_differ() {
        let a = NodeId::new(ContextId::new(), 0).unwrap();
        let b = NodeId::new(ContextId::new(), 0).unwrap();
        assert_ne!(a, b);
        assert_eq!(a.index(), b.index());
    }

    #[test]
    #[cfg(target_pointer_width = "64")]
    fn test_index_past_u32_is_an_error() {
        let tag = ContextId::new();
        let last = NodeId::new(tag, u32::MAX as usize).unwrap();
        assert_eq!(last.index(), u32::MAX as usize);
        let err = NodeId::new(tag, u32::MAX as usize + 1).unwrap_err();
        assert!(matches!(err, Error::Internal(_)));
    }
}
