//! Operator DAG relation: input and output edges between operators and
//! layers.
//!
//! Bipartite and many-to-many, except that a layer may be the output of at
//! most one operator (single-generator invariant — a documented caller
//! precondition, not mechanically enforced, matching the engine's
//! "administrative edges" contract).

use crate::entities::item::ItemId;

#[derive(Debug, Default)]
pub struct OperatorGraph {
    /// `(operator, layer)` input edges.
    inputs: Vec<(ItemId, ItemId)>,
    /// `(operator, layer)` output edges.
    outputs: Vec<(ItemId, ItemId)>,
}

impl OperatorGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_input(&mut self, op: &ItemId, layer: &ItemId) {
        if !edge_exists(&self.inputs, op, layer) {
            self.inputs.push((op.clone(), layer.clone()));
        }
    }

    pub fn add_output(&mut self, op: &ItemId, layer: &ItemId) {
        if !edge_exists(&self.outputs, op, layer) {
            self.outputs.push((op.clone(), layer.clone()));
        }
    }

    pub fn remove_input(&mut self, op: &ItemId, layer: &ItemId) -> bool {
        remove_edge(&mut self.inputs, op, layer)
    }

    pub fn remove_output(&mut self, op: &ItemId, layer: &ItemId) -> bool {
        remove_edge(&mut self.outputs, op, layer)
    }

    /// Drop every input edge of `op`; returns how many were removed.
    pub fn remove_inputs(&mut self, op: &ItemId) -> usize {
        remove_all(&mut self.inputs, op)
    }

    pub fn remove_outputs(&mut self, op: &ItemId) -> usize {
        remove_all(&mut self.outputs, op)
    }

    pub fn inputs_of(&self, op: &ItemId) -> Vec<ItemId> {
        collect_second(&self.inputs, op)
    }

    pub fn outputs_of(&self, op: &ItemId) -> Vec<ItemId> {
        collect_second(&self.outputs, op)
    }

    /// The operator generating `layer`, if any. A layer is output of at
    /// most one operator; the first matching edge wins.
    pub fn generator_of(&self, layer: &ItemId) -> Option<&ItemId> {
        self.outputs
            .iter()
            .find(|(_, l)| l == layer)
            .map(|(op, _)| op)
    }

    /// Operators that consume `layer` as input.
    pub fn consumers_of(&self, layer: &ItemId) -> Vec<ItemId> {
        self.inputs
            .iter()
            .filter(|(_, l)| l == layer)
            .map(|(op, _)| op.clone())
            .collect()
    }

    /// Input edges touching `id` on either side, for the detach cascade.
    pub fn input_edges_touching(&self, id: &ItemId) -> Vec<(ItemId, ItemId)> {
        edges_touching(&self.inputs, id)
    }

    pub fn output_edges_touching(&self, id: &ItemId) -> Vec<(ItemId, ItemId)> {
        edges_touching(&self.outputs, id)
    }

    /// All `(operator, layer)` input edges in insertion order.
    pub fn input_edges(&self) -> impl Iterator<Item = (&ItemId, &ItemId)> {
        self.inputs.iter().map(|(o, l)| (o, l))
    }

    pub fn output_edges(&self) -> impl Iterator<Item = (&ItemId, &ItemId)> {
        self.outputs.iter().map(|(o, l)| (o, l))
    }

    pub fn is_empty(&self) -> bool {
        self.inputs.is_empty() && self.outputs.is_empty()
    }
}

fn edge_exists(edges: &[(ItemId, ItemId)], op: &ItemId, layer: &ItemId) -> bool {
    edges.iter().any(|(o, l)| o == op && l == layer)
}

fn remove_edge(edges: &mut Vec<(ItemId, ItemId)>, op: &ItemId, layer: &ItemId) -> bool {
    let before = edges.len();
    edges.retain(|(o, l)| !(o == op && l == layer));
    edges.len() != before
}

fn remove_all(edges: &mut Vec<(ItemId, ItemId)>, op: &ItemId) -> usize {
    let before = edges.len();
    edges.retain(|(o, _)| o != op);
    before - edges.len()
}

fn collect_second(edges: &[(ItemId, ItemId)], op: &ItemId) -> Vec<ItemId> {
    edges
        .iter()
        .filter(|(o, _)| o == op)
        .map(|(_, l)| l.clone())
        .collect()
}

fn edges_touching(edges: &[(ItemId, ItemId)], id: &ItemId) -> Vec<(ItemId, ItemId)> {
    edges
        .iter()
        .filter(|(o, l)| o == id || l == id)
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(s: &str) -> ItemId {
        ItemId::new(s)
    }

    #[test]
    fn test_inputs_outputs() {
        let mut graph = OperatorGraph::new();
        graph.add_input(&id("op"), &id("scan1"));
        graph.add_input(&id("op"), &id("scan2"));
        graph.add_output(&id("op"), &id("mesh"));

        assert_eq!(graph.inputs_of(&id("op")), vec![id("scan1"), id("scan2")]);
        assert_eq!(graph.outputs_of(&id("op")), vec![id("mesh")]);
        assert_eq!(graph.generator_of(&id("mesh")), Some(&id("op")));
        assert_eq!(graph.generator_of(&id("scan1")), None);
    }

    #[test]
    fn test_consumers() {
        let mut graph = OperatorGraph::new();
        graph.add_input(&id("mesher"), &id("scan"));
        graph.add_input(&id("filter"), &id("scan"));
        assert_eq!(
            graph.consumers_of(&id("scan")),
            vec![id("mesher"), id("filter")]
        );
    }

    #[test]
    fn test_remove_all_inputs() {
        let mut graph = OperatorGraph::new();
        graph.add_input(&id("op"), &id("a"));
        graph.add_input(&id("op"), &id("b"));
        assert_eq!(graph.remove_inputs(&id("op")), 2);
        assert!(graph.inputs_of(&id("op")).is_empty());
        assert!(!graph.remove_input(&id("op"), &id("a")));
    }
}
