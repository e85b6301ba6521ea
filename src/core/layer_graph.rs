//! Layer tree relation: hierarchical parent/child links between layers.
//!
//! Unlike the frame tree this is a multimap — a layer can have several
//! parents (e.g. a merged pointcloud under every survey that contributed
//! to it). Edges are `(child, parent)` pairs in insertion order.

use crate::entities::item::ItemId;

#[derive(Debug, Default)]
pub struct LayerGraph {
    /// `(child, parent)` pairs.
    edges: Vec<(ItemId, ItemId)>,
}

impl LayerGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, parent: &ItemId, child: &ItemId) {
        if !self.contains(parent, child) {
            self.edges.push((child.clone(), parent.clone()));
        }
    }

    pub fn contains(&self, parent: &ItemId, child: &ItemId) -> bool {
        self.edges.iter().any(|(c, p)| c == child && p == parent)
    }

    /// Remove the edge if present; false when it never existed.
    pub fn remove(&mut self, parent: &ItemId, child: &ItemId) -> bool {
        let before = self.edges.len();
        self.edges.retain(|(c, p)| !(c == child && p == parent));
        self.edges.len() != before
    }

    pub fn parents(&self, child: &ItemId) -> Vec<ItemId> {
        self.edges
            .iter()
            .filter(|(c, _)| c == child)
            .map(|(_, p)| p.clone())
            .collect()
    }

    pub fn children(&self, parent: &ItemId) -> Vec<ItemId> {
        self.edges
            .iter()
            .filter(|(_, p)| p == parent)
            .map(|(c, _)| c.clone())
            .collect()
    }

    /// All `(parent, child)` edges in insertion order.
    pub fn edges(&self) -> impl Iterator<Item = (&ItemId, &ItemId)> {
        self.edges.iter().map(|(c, p)| (p, c))
    }

    /// All `(parent, child)` edges touching `id`, for the detach cascade.
    pub fn edges_touching(&self, id: &ItemId) -> Vec<(ItemId, ItemId)> {
        self.edges
            .iter()
            .filter(|(c, p)| c == id || p == id)
            .map(|(c, p)| (p.clone(), c.clone()))
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(s: &str) -> ItemId {
        ItemId::new(s)
    }

    #[test]
    fn test_multiple_parents() {
        let mut graph = LayerGraph::new();
        graph.insert(&id("survey1"), &id("merged"));
        graph.insert(&id("survey2"), &id("merged"));
        assert_eq!(
            graph.parents(&id("merged")),
            vec![id("survey1"), id("survey2")]
        );
        assert_eq!(graph.children(&id("survey1")), vec![id("merged")]);
    }

    #[test]
    fn test_insert_is_idempotent() {
        let mut graph = LayerGraph::new();
        graph.insert(&id("p"), &id("c"));
        graph.insert(&id("p"), &id("c"));
        assert_eq!(graph.parents(&id("c")).len(), 1);
    }

    #[test]
    fn test_edges_touching_either_end() {
        let mut graph = LayerGraph::new();
        graph.insert(&id("p"), &id("x"));
        graph.insert(&id("x"), &id("c"));
        let touching = graph.edges_touching(&id("x"));
        assert_eq!(touching, vec![(id("p"), id("x")), (id("x"), id("c"))]);
    }
}
