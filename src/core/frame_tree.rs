//! Frame tree relation: child → parent links between coordinate frames.
//!
//! Pure book-keeping; the `Environment` façade decides when edges change
//! and emits the matching events. `children` is an O(n) scan of the
//! relation — fine at this engine's scale, an index would be the first
//! thing a bigger deployment adds.

use indexmap::IndexMap;
use std::collections::HashSet;

use crate::entities::item::ItemId;
use crate::errors::{EnvError, Result};

#[derive(Debug, Default)]
pub struct FrameTree {
    parent_of: IndexMap<ItemId, ItemId>,
}

impl FrameTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Link `child` under `parent`. The caller must have removed any
    /// previous edge first; a frame has at most one parent.
    pub fn insert(&mut self, parent: &ItemId, child: &ItemId) {
        self.parent_of.insert(child.clone(), parent.clone());
    }

    /// Remove the edge if it currently matches `(parent, child)` exactly.
    pub fn remove(&mut self, parent: &ItemId, child: &ItemId) -> bool {
        if self.parent_of.get(child) == Some(parent) {
            self.parent_of.shift_remove(child);
            true
        } else {
            false
        }
    }

    pub fn parent(&self, child: &ItemId) -> Option<&ItemId> {
        self.parent_of.get(child)
    }

    pub fn children(&self, parent: &ItemId) -> Vec<ItemId> {
        self.parent_of
            .iter()
            .filter(|(_, p)| *p == parent)
            .map(|(c, _)| c.clone())
            .collect()
    }

    /// All `(parent, child)` edges touching `id`, in relation order. Used
    /// by the detach cascade.
    pub fn edges_touching(&self, id: &ItemId) -> Vec<(ItemId, ItemId)> {
        self.parent_of
            .iter()
            .filter(|(c, p)| *c == id || *p == id)
            .map(|(c, p)| (p.clone(), c.clone()))
            .collect()
    }

    /// All `(parent, child)` edges in relation order.
    pub fn edges(&self) -> impl Iterator<Item = (&ItemId, &ItemId)> {
        self.parent_of.iter().map(|(c, p)| (p, c))
    }

    /// Chain of frame ids from `from` up to (and including) the topmost
    /// ancestor. Fails fast on a cycle instead of looping.
    pub fn chain_to_top(&self, from: &ItemId) -> Result<Vec<ItemId>> {
        let mut chain = vec![from.clone()];
        let mut visited: HashSet<&ItemId> = HashSet::new();
        let mut current = from;
        while let Some(parent) = self.parent_of.get(current) {
            if !visited.insert(current) {
                return Err(EnvError::CorruptTree(current.clone()));
            }
            chain.push(parent.clone());
            current = parent;
        }
        Ok(chain)
    }

    pub fn is_empty(&self) -> bool {
        self.parent_of.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(s: &str) -> ItemId {
        ItemId::new(s)
    }

    #[test]
    fn test_single_parent() {
        let mut tree = FrameTree::new();
        tree.insert(&id("root"), &id("a"));
        assert_eq!(tree.parent(&id("a")), Some(&id("root")));
        assert_eq!(tree.children(&id("root")), vec![id("a")]);
        assert!(tree.children(&id("a")).is_empty());
    }

    #[test]
    fn test_remove_is_exact_match() {
        let mut tree = FrameTree::new();
        tree.insert(&id("root"), &id("a"));
        assert!(!tree.remove(&id("b"), &id("a")));
        assert!(tree.remove(&id("root"), &id("a")));
        assert!(tree.is_empty());
    }

    #[test]
    fn test_chain_to_top() {
        let mut tree = FrameTree::new();
        tree.insert(&id("root"), &id("a"));
        tree.insert(&id("a"), &id("b"));
        let chain = tree.chain_to_top(&id("b")).unwrap();
        assert_eq!(chain, vec![id("b"), id("a"), id("root")]);
    }

    #[test]
    fn test_cycle_detected() {
        let mut tree = FrameTree::new();
        tree.insert(&id("a"), &id("b"));
        tree.insert(&id("b"), &id("a"));
        assert!(matches!(
            tree.chain_to_top(&id("a")),
            Err(EnvError::CorruptTree(_))
        ));
    }
}
