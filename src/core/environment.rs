//! Environment - the graph façade.
//!
//! Owns the item arena and the five relations (frame tree, layer tree,
//! operator inputs/outputs, map bindings) and is the only place any of
//! them is mutated. Every mutation emits structural events synchronously
//! and records a serializable change record for the sync protocol.
//!
//! Single-writer, non-reentrant: handlers observe events but must not
//! call back into the environment from inside a callback.

use log::{debug, warn};
use std::collections::HashSet;

use super::event_bus::{EventBus, HandlerId};
use super::events::{Event, EventAction, EventHandler, EventKind};
use super::frame_tree::FrameTree;
use super::layer_graph::LayerGraph;
use super::map_bindings::MapBindings;
use super::operator_graph::OperatorGraph;
use super::registry::Registry;
use super::sync::{EventRecord, SyncQueue};
use crate::entities::frame_node::FrameNode;
use crate::entities::item::{Item, ItemId};
use crate::entities::item_kind::{ItemKind, TypedItem};
use crate::entities::layer::Layer;
use crate::entities::operator::{OperatorModel, OperatorNode};
use crate::entities::transform::{RigidTransform, TransformWithUncertainty};
use crate::entities::CartesianMap;
use crate::errors::{EnvError, Result};

pub struct Environment {
    registry: Registry,
    frame_tree: FrameTree,
    layer_tree: LayerGraph,
    operator_graph: OperatorGraph,
    map_bindings: MapBindings,
    bus: EventBus,
    sync_queue: SyncQueue,
    root_id: ItemId,
    /// False while applying replicated records, so they don't echo back
    /// into the sync queue.
    recording: bool,
}

impl Environment {
    /// Empty environment with an auto-created root frame.
    pub fn new() -> Self {
        let mut registry = Registry::new();
        let mut root = FrameNode::identity();
        root.core.label = Some("root".to_string());
        let (root_id, _) = registry.attach_or_replace(root.into());
        Self {
            registry,
            frame_tree: FrameTree::new(),
            layer_tree: LayerGraph::new(),
            operator_graph: OperatorGraph::new(),
            map_bindings: MapBindings::new(),
            bus: EventBus::new(),
            sync_queue: SyncQueue::new(),
            root_id,
            recording: true,
        }
    }

    pub fn root_id(&self) -> &ItemId {
        &self.root_id
    }

    pub fn root_frame(&self) -> Result<&FrameNode> {
        self.registry.typed(&self.root_id)
    }

    /// Namespace used when minting item ids (default `/`).
    pub fn environment_prefix(&self) -> &str {
        self.registry.prefix()
    }

    pub fn set_environment_prefix(&mut self, prefix: &str) {
        self.registry.set_prefix(prefix);
    }

    // --- item lifecycle ---------------------------------------------------

    /// Attach an item, minting an id when it never had one. A cartesian map
    /// attached without a current binding is bound to the root frame.
    pub fn attach_item(&mut self, item: impl Into<ItemKind>) -> Result<ItemId> {
        let kind = item.into();
        let is_map = kind.is_map();
        let id = self.registry.attach(kind)?;
        self.emit(Event::item_added(id.clone()));
        if is_map && self.map_bindings.frame_of(&id).is_none() {
            let root = self.root_id.clone();
            self.map_bindings.bind(&id, &root);
            self.emit(Event::binding_added(id.clone(), root));
        }
        Ok(id)
    }

    /// Build, attach and return the id in one call.
    pub fn create_frame(&mut self, transform: RigidTransform) -> Result<ItemId> {
        self.attach_item(FrameNode::new(transform))
    }

    pub fn create_layer(&mut self, label: impl Into<String>) -> Result<ItemId> {
        self.attach_item(Layer::new(label))
    }

    pub fn create_map(&mut self, label: impl Into<String>) -> Result<ItemId> {
        self.attach_item(CartesianMap::new(label))
    }

    pub fn create_operator(&mut self, model: Box<dyn OperatorModel>) -> Result<ItemId> {
        self.attach_item(OperatorNode::new(model))
    }

    /// Shallow detach: purge every edge touching the item (emitting the
    /// matching remove events first), then remove it from the arena and
    /// return it by value. The item keeps its id.
    pub fn detach_item(&mut self, id: &ItemId) -> Result<ItemKind> {
        if !self.registry.contains(id) {
            return Err(EnvError::NotAttached(id.clone()));
        }
        for (parent, child) in self.frame_tree.edges_touching(id) {
            self.frame_tree.remove(&parent, &child);
            self.emit(Event::frame_edge_removed(parent, child));
        }
        for (parent, child) in self.layer_tree.edges_touching(id) {
            self.layer_tree.remove(&parent, &child);
            self.emit(Event::layer_edge_removed(parent, child));
        }
        // operator edges are administrative, no broadcast
        for (op, layer) in self.operator_graph.input_edges_touching(id) {
            self.operator_graph.remove_input(&op, &layer);
        }
        for (op, layer) in self.operator_graph.output_edges_touching(id) {
            self.operator_graph.remove_output(&op, &layer);
        }
        for (map, frame) in self.map_bindings.bindings_touching(id) {
            self.map_bindings.unbind(&map, &frame);
            self.emit(Event::binding_removed(map, frame));
        }
        self.emit(Event::item_removed(id.clone()));
        self.registry.detach(id)
    }

    /// Deep detach: recursively detaches the frame subtree below `id` and
    /// the maps bound inside it (layer subtrees likewise) before detaching
    /// the item itself.
    pub fn detach_item_deep(&mut self, id: &ItemId) -> Result<()> {
        if !self.registry.contains(id) {
            return Err(EnvError::NotAttached(id.clone()));
        }
        let mut visited = HashSet::new();
        self.detach_deep_inner(id, &mut visited)
    }

    fn detach_deep_inner(&mut self, id: &ItemId, visited: &mut HashSet<ItemId>) -> Result<()> {
        if !visited.insert(id.clone()) || !self.registry.contains(id) {
            return Ok(());
        }
        let (is_frame, is_layerish) = match self.registry.get(id) {
            Some(kind) => (kind.is_frame(), kind.is_layerish()),
            None => return Ok(()),
        };
        if is_frame {
            for child in self.frame_tree.children(id) {
                self.detach_deep_inner(&child, visited)?;
            }
            for map in self.map_bindings.maps_of(id) {
                if self.registry.contains(&map) {
                    self.detach_item(&map)?;
                }
            }
        } else if is_layerish {
            for child in self.layer_tree.children(id) {
                self.detach_deep_inner(&child, visited)?;
            }
        }
        self.detach_item(id)?;
        Ok(())
    }

    /// Broadcast that an item's payload changed in place.
    pub fn item_modified(&mut self, id: &ItemId) -> Result<()> {
        if !self.registry.contains(id) {
            return Err(EnvError::NotAttached(id.clone()));
        }
        self.emit(Event::item_updated(id.clone()));
        Ok(())
    }

    // --- queries ----------------------------------------------------------

    pub fn contains(&self, id: &ItemId) -> bool {
        self.registry.contains(id)
    }

    pub fn get_item(&self, id: &ItemId) -> Option<&ItemKind> {
        self.registry.get(id)
    }

    pub fn get<T: TypedItem>(&self, id: &ItemId) -> Result<&T> {
        self.registry.typed(id)
    }

    pub fn get_mut<T: TypedItem>(&mut self, id: &ItemId) -> Result<&mut T> {
        self.registry.typed_mut(id)
    }

    /// All items of one concrete type, in attach order.
    pub fn get_items<'a, T: TypedItem + 'a>(&'a self) -> impl Iterator<Item = (&'a ItemId, &'a T)> {
        self.registry.items_of()
    }

    /// The single item of type `T`; `NotFound` on zero, `AmbiguousType` on
    /// more than one.
    pub fn get_unique<T: TypedItem>(&self) -> Result<(&ItemId, &T)> {
        self.registry.unique()
    }

    pub fn item_count(&self) -> usize {
        self.registry.len()
    }

    // --- frame tree -------------------------------------------------------

    /// Link `child` under `parent`. Reparenting is atomic from the event
    /// stream's point of view: the old edge's remove event precedes the new
    /// edge's add event, and a frame never has two parents.
    pub fn add_child_frame(&mut self, parent: &ItemId, child: &ItemId) -> Result<()> {
        self.registry.typed::<FrameNode>(parent)?;
        self.registry.typed::<FrameNode>(child)?;
        if let Some(old) = self.frame_tree.parent(child).cloned() {
            if old == *parent {
                return Ok(());
            }
            self.frame_tree.remove(&old, child);
            self.emit(Event::frame_edge_removed(old, child.clone()));
        }
        self.frame_tree.insert(parent, child);
        self.emit(Event::frame_edge_added(parent.clone(), child.clone()));
        Ok(())
    }

    /// Silent no-op when the edge doesn't currently match.
    pub fn remove_child_frame(&mut self, parent: &ItemId, child: &ItemId) -> bool {
        if self.frame_tree.remove(parent, child) {
            self.emit(Event::frame_edge_removed(parent.clone(), child.clone()));
            true
        } else {
            false
        }
    }

    pub fn frame_parent(&self, child: &ItemId) -> Option<&ItemId> {
        self.frame_tree.parent(child)
    }

    pub fn frame_children(&self, parent: &ItemId) -> Vec<ItemId> {
        self.frame_tree.children(parent)
    }

    // --- transforms -------------------------------------------------------

    /// Replace a frame's transform to its parent and broadcast the update.
    pub fn set_transform(
        &mut self,
        frame: &ItemId,
        transform: TransformWithUncertainty,
    ) -> Result<()> {
        self.registry.typed_mut::<FrameNode>(frame)?.transform = transform;
        self.item_modified(frame)
    }

    /// Transform mapping points of `from` into `to`, composed through the
    /// root. Both frames must be connected to the root; going through the
    /// root instead of the lowest common ancestor costs a few extra
    /// identity-adjacent compositions but keeps the walk trivial.
    pub fn relative_transform(&self, from: &ItemId, to: &ItemId) -> Result<RigidTransform> {
        Ok(self.relative_transform_with_uncertainty(from, to)?.transform)
    }

    /// Same path as `relative_transform`, with first-order covariance
    /// transport through every composition and the final inverse.
    pub fn relative_transform_with_uncertainty(
        &self,
        from: &ItemId,
        to: &ItemId,
    ) -> Result<TransformWithUncertainty> {
        self.registry.typed::<FrameNode>(from)?;
        self.registry.typed::<FrameNode>(to)?;
        let from_to_root = self.chain_transform(from)?;
        let to_to_root = self.chain_transform(to)?;
        Ok(to_to_root.inverse().compose(&from_to_root))
    }

    /// Relative transform between the frames two maps are bound to.
    pub fn map_relative_transform(&self, from: &ItemId, to: &ItemId) -> Result<RigidTransform> {
        self.registry.typed::<CartesianMap>(from)?;
        self.registry.typed::<CartesianMap>(to)?;
        let from_frame = self
            .map_bindings
            .frame_of(from)
            .cloned()
            .ok_or_else(|| EnvError::DetachedFrame(from.clone()))?;
        let to_frame = self
            .map_bindings
            .frame_of(to)
            .cloned()
            .ok_or_else(|| EnvError::DetachedFrame(to.clone()))?;
        self.relative_transform(&from_frame, &to_frame)
    }

    /// Composition of `frame`'s chain up to the root. The root's own
    /// transform takes no part (it has no parent to map into).
    fn chain_transform(&self, frame: &ItemId) -> Result<TransformWithUncertainty> {
        let chain = self.frame_tree.chain_to_top(frame)?;
        match chain.last() {
            Some(top) if *top == self.root_id => {}
            _ => return Err(EnvError::DetachedFrame(frame.clone())),
        }
        let mut acc = TransformWithUncertainty::IDENTITY;
        for id in &chain[..chain.len() - 1] {
            let node = self.registry.typed::<FrameNode>(id)?;
            acc = node.transform.compose(&acc);
        }
        Ok(acc)
    }

    // --- layer tree -------------------------------------------------------

    /// Link a layer (or map) under a parent layer. A layer can have several
    /// parents; inserting an existing edge is a no-op.
    pub fn add_child_layer(&mut self, parent: &ItemId, child: &ItemId) -> Result<()> {
        self.layer_ref(parent)?;
        self.layer_ref(child)?;
        if !self.layer_tree.contains(parent, child) {
            self.layer_tree.insert(parent, child);
            self.emit(Event::layer_edge_added(parent.clone(), child.clone()));
        }
        Ok(())
    }

    pub fn remove_child_layer(&mut self, parent: &ItemId, child: &ItemId) -> bool {
        if self.layer_tree.remove(parent, child) {
            self.emit(Event::layer_edge_removed(parent.clone(), child.clone()));
            true
        } else {
            false
        }
    }

    pub fn layer_parents(&self, child: &ItemId) -> Vec<ItemId> {
        self.layer_tree.parents(child)
    }

    pub fn layer_children(&self, parent: &ItemId) -> Vec<ItemId> {
        self.layer_tree.children(parent)
    }

    // --- map bindings -----------------------------------------------------

    /// Bind a map to a frame, replacing any previous binding with a
    /// remove/add event pair.
    pub fn set_frame_node(&mut self, map: &ItemId, frame: &ItemId) -> Result<()> {
        self.registry.typed::<CartesianMap>(map)?;
        self.registry.typed::<FrameNode>(frame)?;
        if let Some(old) = self.map_bindings.frame_of(map).cloned() {
            if old == *frame {
                return Ok(());
            }
            self.map_bindings.unbind(map, &old);
            self.emit(Event::binding_removed(map.clone(), old));
        }
        self.map_bindings.bind(map, frame);
        self.emit(Event::binding_added(map.clone(), frame.clone()));
        Ok(())
    }

    /// Remove the binding only if it currently is `(map, frame)`; a stale
    /// request is a silent no-op.
    pub fn detach_frame_node(&mut self, map: &ItemId, frame: &ItemId) -> bool {
        if self.map_bindings.unbind(map, frame) {
            self.emit(Event::binding_removed(map.clone(), frame.clone()));
            true
        } else {
            false
        }
    }

    pub fn get_frame_node(&self, map: &ItemId) -> Option<&ItemId> {
        self.map_bindings.frame_of(map)
    }

    pub fn maps_of(&self, frame: &ItemId) -> Vec<ItemId> {
        self.map_bindings.maps_of(frame)
    }

    // --- operator graph ---------------------------------------------------

    pub fn add_input(&mut self, op: &ItemId, layer: &ItemId) -> Result<()> {
        self.registry.typed::<OperatorNode>(op)?;
        self.layer_ref(layer)?;
        self.operator_graph.add_input(op, layer);
        Ok(())
    }

    /// Add an output edge. A layer must be the output of at most one
    /// operator; the caller keeps that invariant.
    pub fn add_output(&mut self, op: &ItemId, layer: &ItemId) -> Result<()> {
        self.registry.typed::<OperatorNode>(op)?;
        self.layer_ref(layer)?;
        self.operator_graph.add_output(op, layer);
        Ok(())
    }

    pub fn remove_input(&mut self, op: &ItemId, layer: &ItemId) -> bool {
        self.operator_graph.remove_input(op, layer)
    }

    pub fn remove_output(&mut self, op: &ItemId, layer: &ItemId) -> bool {
        self.operator_graph.remove_output(op, layer)
    }

    pub fn remove_inputs(&mut self, op: &ItemId) -> usize {
        self.operator_graph.remove_inputs(op)
    }

    pub fn remove_outputs(&mut self, op: &ItemId) -> usize {
        self.operator_graph.remove_outputs(op)
    }

    pub fn operator_inputs(&self, op: &ItemId) -> Vec<ItemId> {
        self.operator_graph.inputs_of(op)
    }

    pub fn operator_outputs(&self, op: &ItemId) -> Vec<ItemId> {
        self.operator_graph.outputs_of(op)
    }

    pub fn generator_of(&self, layer: &ItemId) -> Option<&ItemId> {
        self.operator_graph.generator_of(layer)
    }

    /// Layers downstream of `input`: the outputs of every operator that
    /// consumes it.
    pub fn layers_generated_from(&self, input: &ItemId) -> Vec<ItemId> {
        let mut downstream = Vec::new();
        for op in self.operator_graph.consumers_of(input) {
            for layer in self.operator_graph.outputs_of(&op) {
                if !downstream.contains(&layer) {
                    downstream.push(layer);
                }
            }
        }
        downstream
    }

    /// Drop the output edge from the generating operator, leaving the layer
    /// attached but no longer regenerated.
    pub fn detach_from_operator(&mut self, layer: &ItemId) -> bool {
        match self.operator_graph.generator_of(layer).cloned() {
            Some(op) => self.operator_graph.remove_output(&op, layer),
            None => false,
        }
    }

    // --- layer flags & recompute ------------------------------------------

    pub fn set_immutable(&mut self, layer: &ItemId) -> Result<()> {
        self.layer_mut(layer)?.set_immutable();
        Ok(())
    }

    pub fn is_immutable(&self, layer: &ItemId) -> Result<bool> {
        Ok(self.layer_ref(layer)?.is_immutable())
    }

    /// Mark a layer dirty and propagate downstream: everything generated
    /// (transitively) from it becomes dirty too. Recursion stops at layers
    /// that are already dirty, which also breaks accidental cycles.
    pub fn set_dirty(&mut self, layer: &ItemId) -> Result<()> {
        self.layer_mut(layer)?.set_dirty();
        for downstream in self.layers_generated_from(layer) {
            if !self.layer_ref(&downstream)?.is_dirty() {
                self.set_dirty(&downstream)?;
            }
        }
        Ok(())
    }

    pub fn reset_dirty(&mut self, layer: &ItemId) -> Result<()> {
        self.layer_mut(layer)?.reset_dirty();
        Ok(())
    }

    pub fn is_dirty(&self, layer: &ItemId) -> Result<bool> {
        Ok(self.layer_ref(layer)?.is_dirty())
    }

    /// Recompute `layer` through its generating operator, but only if it is
    /// dirty. Returns whether a recompute ran. `NotFound` when a dirty
    /// layer has no generator.
    pub fn update_from_operator(&mut self, layer: &ItemId) -> Result<bool> {
        if !self.layer_ref(layer)?.is_dirty() {
            return Ok(false);
        }
        let op = self
            .operator_graph
            .generator_of(layer)
            .cloned()
            .ok_or(EnvError::NotFound("Operator"))?;
        self.run_operator(&op)?;
        Ok(true)
    }

    /// Unconditional sweep over every operator in attach order: a single
    /// non-topological pass, so a chain of operators may need several
    /// sweeps to settle. Failures are logged and the sweep continues.
    pub fn update_operators(&mut self) {
        let ops: Vec<ItemId> = self
            .registry
            .items_of::<OperatorNode>()
            .map(|(id, _)| id.clone())
            .collect();
        debug!("operator sweep over {} operators", ops.len());
        for op in ops {
            if let Err(err) = self.run_operator(&op) {
                warn!("operator sweep: {err}");
            }
        }
    }

    /// Run one operator's model, then clear dirty on its outputs and emit
    /// `Item/Update` for each. The model is taken out of the node for the
    /// duration of the call so it can mutate the environment freely.
    fn run_operator(&mut self, op: &ItemId) -> Result<()> {
        let node = self.registry.typed_mut::<OperatorNode>(op)?;
        let Some(mut model) = node.take_model() else {
            warn!("operator {op} has no model, skipping");
            return Ok(());
        };
        let outcome = model.update_all(self, op);
        if let Ok(node) = self.registry.typed_mut::<OperatorNode>(op) {
            node.put_model(model);
        }
        outcome.map_err(|source| EnvError::Operator {
            id: op.clone(),
            source,
        })?;
        for out in self.operator_outputs(op) {
            if self.registry.contains(&out) {
                if let Ok(layer) = self.layer_mut(&out) {
                    layer.reset_dirty();
                }
                self.item_modified(&out)?;
            }
        }
        Ok(())
    }

    fn layer_ref(&self, id: &ItemId) -> Result<&Layer> {
        let kind = self
            .registry
            .get(id)
            .ok_or_else(|| EnvError::NotAttached(id.clone()))?;
        kind.as_layer().ok_or_else(|| EnvError::WrongKind {
            id: id.clone(),
            expected: "Layer",
        })
    }

    fn layer_mut(&mut self, id: &ItemId) -> Result<&mut Layer> {
        let kind = self
            .registry
            .get_mut(id)
            .ok_or_else(|| EnvError::NotAttached(id.clone()))?;
        kind.as_layer_mut().ok_or_else(|| EnvError::WrongKind {
            id: id.clone(),
            expected: "Layer",
        })
    }

    // --- events & sync ----------------------------------------------------

    /// Register a handler. Before it joins the live stream, the current
    /// state is replayed to it (and only it) as a deterministic event
    /// sequence: items in attach order, root, frame tree depth-first, layer
    /// edges, map bindings.
    pub fn subscribe(&mut self, mut handler: Box<dyn EventHandler>) -> HandlerId {
        for event in self.structure_events() {
            handler.handle(&event);
        }
        self.bus.add(handler)
    }

    /// Remove a handler, replaying the subscribe sequence to it in reverse
    /// with every add flipped to a remove, so a mirroring observer ends up
    /// empty. Returns the handler to the caller.
    pub fn unsubscribe(&mut self, id: HandlerId) -> Option<Box<dyn EventHandler>> {
        let mut handler = self.bus.remove(id)?;
        let mut events = self.structure_events();
        events.reverse();
        for mut event in events {
            event.action = EventAction::Remove;
            handler.handle(&event);
        }
        Some(handler)
    }

    /// Change records since the last pull; with `all`, the full-state
    /// snapshot sequence instead (and the queue is reset either way).
    pub fn pull_events(&mut self, all: bool) -> Result<Vec<EventRecord>> {
        if all {
            let records = self.snapshot_records()?;
            self.sync_queue.clear();
            Ok(records)
        } else {
            Ok(self.sync_queue.drain())
        }
    }

    /// Replay records pulled from another environment instance. Items are
    /// reconstructed from their snapshots (operators arrive model-less; a
    /// locally installed model survives a replicated update). Applied
    /// changes reach local handlers but are not re-recorded for sync.
    pub fn apply_events(&mut self, records: &[EventRecord]) -> Result<()> {
        self.recording = false;
        let outcome = self.apply_records(records);
        self.recording = true;
        outcome
    }

    fn apply_records(&mut self, records: &[EventRecord]) -> Result<()> {
        for record in records {
            let event = &record.event;
            match event.kind {
                EventKind::Item => match event.action {
                    EventAction::Add | EventAction::Update => {
                        let Some(snapshot) = &record.item else {
                            warn!("item record without payload: {event}");
                            continue;
                        };
                        let mut kind = ItemKind::from_snapshot(snapshot)?;
                        if let (Some(ItemKind::Operator(old)), ItemKind::Operator(new_op)) =
                            (self.registry.get_mut(&event.a), &mut kind)
                        {
                            if let Some(model) = old.take_model() {
                                new_op.put_model(model);
                            }
                        }
                        let (id, replaced) = self.registry.attach_or_replace(kind);
                        if replaced {
                            self.emit(Event::item_updated(id));
                        } else {
                            self.emit(Event::item_added(id));
                        }
                    }
                    EventAction::Remove => {
                        if self.registry.contains(&event.a) {
                            self.detach_item(&event.a)?;
                        }
                    }
                },
                EventKind::Root => match event.action {
                    EventAction::Add => self.adopt_root(event.a.clone()),
                    _ => debug!("ignoring root record {event}"),
                },
                EventKind::FrameTree => {
                    let Some(b) = event.b.clone() else {
                        warn!("edge record without second id: {event}");
                        continue;
                    };
                    match event.action {
                        EventAction::Add => self.add_child_frame(&event.a, &b)?,
                        _ => {
                            self.remove_child_frame(&event.a, &b);
                        }
                    }
                }
                EventKind::LayerTree => {
                    let Some(b) = event.b.clone() else {
                        warn!("edge record without second id: {event}");
                        continue;
                    };
                    match event.action {
                        EventAction::Add => self.add_child_layer(&event.a, &b)?,
                        _ => {
                            self.remove_child_layer(&event.a, &b);
                        }
                    }
                }
                EventKind::MapBinding => {
                    let Some(b) = event.b.clone() else {
                        warn!("binding record without frame id: {event}");
                        continue;
                    };
                    match event.action {
                        EventAction::Add => self.set_frame_node(&event.a, &b)?,
                        _ => {
                            self.detach_frame_node(&event.a, &b);
                        }
                    }
                }
                EventKind::OperatorInput => {
                    let Some(b) = event.b.clone() else {
                        warn!("edge record without second id: {event}");
                        continue;
                    };
                    match event.action {
                        EventAction::Add => self.add_input(&event.a, &b)?,
                        _ => {
                            self.remove_input(&event.a, &b);
                        }
                    }
                }
                EventKind::OperatorOutput => {
                    let Some(b) = event.b.clone() else {
                        warn!("edge record without second id: {event}");
                        continue;
                    };
                    match event.action {
                        EventAction::Add => self.add_output(&event.a, &b)?,
                        _ => {
                            self.remove_output(&event.a, &b);
                        }
                    }
                }
            }
        }
        Ok(())
    }

    /// Adopt a replicated root designation, dropping our auto-created root
    /// frame when the incoming one supersedes it and ours is an unused
    /// orphan.
    fn adopt_root(&mut self, incoming: ItemId) {
        if incoming == self.root_id {
            return;
        }
        let old = std::mem::replace(&mut self.root_id, incoming);
        let orphan = self
            .registry
            .get(&old)
            .map(|kind| kind.is_frame())
            .unwrap_or(false)
            && self.frame_tree.edges_touching(&old).is_empty()
            && self.map_bindings.maps_of(&old).is_empty();
        if orphan {
            debug!("dropping superseded root frame {old}");
            let _ = self.registry.detach(&old);
        }
    }

    /// Full-state change records: the subscribe replay sequence with item
    /// snapshots attached, plus the administrative operator edges. This is
    /// the whole surface a serializer needs.
    pub fn snapshot_records(&self) -> Result<Vec<EventRecord>> {
        let mut records = Vec::new();
        for event in self.structure_events() {
            if event.kind == EventKind::Item {
                let item = self
                    .registry
                    .get(&event.a)
                    .ok_or_else(|| EnvError::NotAttached(event.a.clone()))?;
                records.push(EventRecord::with_item(event, item.snapshot()?));
            } else {
                records.push(EventRecord::structural(event));
            }
        }
        for (op, layer) in self.operator_graph.input_edges() {
            records.push(EventRecord::structural(Event::input_edge_added(
                op.clone(),
                layer.clone(),
            )));
        }
        for (op, layer) in self.operator_graph.output_edges() {
            records.push(EventRecord::structural(Event::output_edge_added(
                op.clone(),
                layer.clone(),
            )));
        }
        Ok(records)
    }

    /// Deterministic full-state event sequence: items in attach order, root
    /// designation, frame tree edges depth-first from the root (plus any
    /// disconnected islands, in relation order), layer edges, bindings.
    fn structure_events(&self) -> Vec<Event> {
        let mut events: Vec<Event> = self
            .registry
            .ids()
            .map(|id| Event::item_added(id.clone()))
            .collect();
        events.push(Event::root_added(self.root_id.clone()));
        let mut seen = HashSet::new();
        self.push_frame_edges(&self.root_id, &mut events, &mut seen);
        for (parent, child) in self.frame_tree.edges() {
            if !seen.contains(child) {
                events.push(Event::frame_edge_added(parent.clone(), child.clone()));
            }
        }
        for (parent, child) in self.layer_tree.edges() {
            events.push(Event::layer_edge_added(parent.clone(), child.clone()));
        }
        for (map, frame) in self.map_bindings.iter() {
            events.push(Event::binding_added(map.clone(), frame.clone()));
        }
        events
    }

    fn push_frame_edges(
        &self,
        parent: &ItemId,
        events: &mut Vec<Event>,
        seen: &mut HashSet<ItemId>,
    ) {
        for child in self.frame_tree.children(parent) {
            if !seen.insert(child.clone()) {
                continue;
            }
            events.push(Event::frame_edge_added(parent.clone(), child.clone()));
            self.push_frame_edges(&child, events, seen);
        }
    }

    /// Record the change for sync (unless we are applying replicated
    /// records) and fan out to handlers. Item add/update records carry the
    /// item's snapshot as payload.
    fn emit(&mut self, event: Event) {
        if self.recording {
            let item = if event.kind == EventKind::Item && event.action != EventAction::Remove {
                match self.registry.get(&event.a).map(|item| item.snapshot()) {
                    Some(Ok(snapshot)) => Some(snapshot),
                    Some(Err(err)) => {
                        warn!("snapshot of {} failed: {err}", event.a);
                        None
                    }
                    None => None,
                }
            } else {
                None
            };
            self.sync_queue.push(EventRecord {
                event: event.clone(),
                item,
            });
        }
        self.bus.emit(&event);
    }
}

impl Default for Environment {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::attrs::AttrValue;
    use crate::entities::transform::Covariance;
    use glam::DVec3;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn init_logs() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    #[derive(Default)]
    struct Recorder {
        seen: Rc<RefCell<Vec<Event>>>,
    }

    impl EventHandler for Recorder {
        fn handle(&mut self, event: &Event) {
            self.seen.borrow_mut().push(event.clone());
        }
    }

    /// Sums the `value` attr over all inputs, doubles it, writes it to all
    /// mutable outputs.
    struct Doubler;

    impl OperatorModel for Doubler {
        fn class_tag(&self) -> &'static str {
            "test::Doubler"
        }

        fn update_all(&mut self, env: &mut Environment, op: &ItemId) -> anyhow::Result<()> {
            let mut total = 0.0;
            for input in env.operator_inputs(op) {
                total += env.get::<Layer>(&input)?.attrs.get_f64("value").unwrap_or(0.0);
            }
            for out in env.operator_outputs(op) {
                if env.is_immutable(&out)? {
                    continue;
                }
                env.get_mut::<Layer>(&out)?
                    .attrs
                    .set("value", AttrValue::Float(total * 2.0));
            }
            Ok(())
        }
    }

    struct Exploder;

    impl OperatorModel for Exploder {
        fn class_tag(&self) -> &'static str {
            "test::Exploder"
        }

        fn update_all(&mut self, _env: &mut Environment, _op: &ItemId) -> anyhow::Result<()> {
            anyhow::bail!("sensor offline")
        }
    }

    #[test]
    fn test_attach_map_binds_to_root() {
        let mut env = Environment::new();
        let map = env.create_map("grid").unwrap();
        assert_eq!(env.get_frame_node(&map), Some(env.root_id()));
        assert_eq!(env.maps_of(env.root_id()), vec![map]);
    }

    #[test]
    fn test_relative_transform_through_root() {
        let mut env = Environment::new();
        let root = env.root_id().clone();
        let a = env
            .create_frame(RigidTransform::from_translation(DVec3::new(1.0, 0.0, 0.0)))
            .unwrap();
        let b = env
            .create_frame(RigidTransform::from_translation(DVec3::new(0.0, 2.0, 0.0)))
            .unwrap();
        env.add_child_frame(&root, &a).unwrap();
        env.add_child_frame(&a, &b).unwrap();

        // b sits at (1, 2, 0) in root coordinates
        let b_to_root = env.relative_transform(&b, &root).unwrap();
        assert!((b_to_root.translation - DVec3::new(1.0, 2.0, 0.0)).length() < 1e-12);

        // and the reverse direction inverts it
        let root_to_b = env.relative_transform(&root, &b).unwrap();
        assert!((root_to_b.translation - DVec3::new(-1.0, -2.0, 0.0)).length() < 1e-12);

        // a frame relative to itself is the identity
        let same = env.relative_transform(&b, &b).unwrap();
        assert!(same.approx_eq(&RigidTransform::IDENTITY, 1e-12));

        // child to direct parent is the child's stored edge transform
        let b_to_a = env.relative_transform(&b, &a).unwrap();
        assert!((b_to_a.translation - DVec3::new(0.0, 2.0, 0.0)).length() < 1e-12);

        // sibling-to-sibling also goes through the root
        let c = env
            .create_frame(RigidTransform::from_translation(DVec3::new(5.0, 0.0, 0.0)))
            .unwrap();
        env.add_child_frame(&root, &c).unwrap();
        let b_to_c = env.relative_transform(&b, &c).unwrap();
        assert!((b_to_c.translation - DVec3::new(-4.0, 2.0, 0.0)).length() < 1e-12);
    }

    #[test]
    fn test_relative_transform_requires_root_connection() {
        let mut env = Environment::new();
        let orphan = env.create_frame(RigidTransform::IDENTITY).unwrap();
        let root = env.root_id().clone();
        assert!(matches!(
            env.relative_transform(&orphan, &root),
            Err(EnvError::DetachedFrame(id)) if id == orphan
        ));
    }

    #[test]
    fn test_relative_transform_carries_uncertainty() {
        let mut env = Environment::new();
        let root = env.root_id().clone();
        let noisy = env
            .attach_item(FrameNode::with_uncertainty(TransformWithUncertainty::uncertain(
                RigidTransform::from_translation(DVec3::X),
                Covariance::from_diagonal([0.0; 3], [0.01, 0.01, 0.01]),
            )))
            .unwrap();
        env.add_child_frame(&root, &noisy).unwrap();

        let result = env
            .relative_transform_with_uncertainty(&noisy, &root)
            .unwrap();
        let cov = result.covariance.expect("uncertainty must propagate");
        assert!(cov.trace() > 0.0);

        // two exact frames compose to an exact result
        let exact = env.create_frame(RigidTransform::from_translation(DVec3::Y)).unwrap();
        env.add_child_frame(&root, &exact).unwrap();
        let result = env
            .relative_transform_with_uncertainty(&exact, &root)
            .unwrap();
        assert!(result.covariance.is_none());
    }

    #[test]
    fn test_map_relative_transform() {
        let mut env = Environment::new();
        let root = env.root_id().clone();
        let f = env
            .create_frame(RigidTransform::from_translation(DVec3::new(3.0, 0.0, 0.0)))
            .unwrap();
        env.add_child_frame(&root, &f).unwrap();

        let near = env.create_map("near").unwrap(); // bound to root
        let far = env.create_map("far").unwrap();
        env.set_frame_node(&far, &f).unwrap();

        let t = env.map_relative_transform(&far, &near).unwrap();
        assert!((t.translation - DVec3::new(3.0, 0.0, 0.0)).length() < 1e-12);
    }

    #[test]
    fn test_reparent_emits_remove_then_add() {
        let mut env = Environment::new();
        let root = env.root_id().clone();
        let a = env.create_frame(RigidTransform::IDENTITY).unwrap();
        let b = env.create_frame(RigidTransform::IDENTITY).unwrap();
        env.add_child_frame(&root, &a).unwrap();

        let seen = Rc::new(RefCell::new(Vec::new()));
        env.subscribe(Box::new(Recorder { seen: seen.clone() }));
        seen.borrow_mut().clear();

        env.add_child_frame(&b, &a).unwrap();
        let seen = seen.borrow();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0], Event::frame_edge_removed(root, a.clone()));
        assert_eq!(seen[1], Event::frame_edge_added(b.clone(), a.clone()));
        drop(seen);
        assert_eq!(env.frame_parent(&a), Some(&b));
    }

    #[test]
    fn test_detach_purges_all_relations() {
        init_logs();
        let mut env = Environment::new();
        let root = env.root_id().clone();
        let map = env.create_map("grid").unwrap();
        let parent_layer = env.create_layer("surveys").unwrap();
        let op = env.create_operator(Box::new(Doubler)).unwrap();
        env.add_child_layer(&parent_layer, &map).unwrap();
        env.add_input(&op, &map).unwrap();

        let detached = env.detach_item(&map).unwrap();
        assert!(detached.is_map());
        assert!(!env.contains(&map));
        assert!(env.maps_of(&root).is_empty());
        assert!(env.layer_children(&parent_layer).is_empty());
        assert!(env.operator_inputs(&op).is_empty());

        // the id survives detach, so re-attach is stable
        let again = env.attach_item(detached).unwrap();
        assert_eq!(again, map);
    }

    #[test]
    fn test_detach_item_deep_takes_subtree_and_maps() {
        let mut env = Environment::new();
        let root = env.root_id().clone();
        let a = env.create_frame(RigidTransform::IDENTITY).unwrap();
        let b = env.create_frame(RigidTransform::IDENTITY).unwrap();
        env.add_child_frame(&root, &a).unwrap();
        env.add_child_frame(&a, &b).unwrap();
        let map_a = env.create_map("on-a").unwrap();
        let map_b = env.create_map("on-b").unwrap();
        env.set_frame_node(&map_a, &a).unwrap();
        env.set_frame_node(&map_b, &b).unwrap();

        env.detach_item_deep(&a).unwrap();
        for id in [&a, &b, &map_a, &map_b] {
            assert!(!env.contains(id), "{id} should be gone");
        }
        assert!(env.contains(&root));
        assert!(env.frame_children(&root).is_empty());
    }

    #[test]
    fn test_unique_queries() {
        let mut env = Environment::new();
        assert!(matches!(
            env.get_unique::<CartesianMap>(),
            Err(EnvError::NotFound("CartesianMap"))
        ));
        env.create_map("grid").unwrap();
        assert!(env.get_unique::<CartesianMap>().is_ok());
        env.create_map("other").unwrap();
        assert!(matches!(
            env.get_unique::<CartesianMap>(),
            Err(EnvError::AmbiguousType("CartesianMap"))
        ));
    }

    #[test]
    fn test_prefix_applies_to_new_ids() {
        let mut env = Environment::new();
        env.set_environment_prefix("rover");
        assert_eq!(env.environment_prefix(), "/rover/");
        let id = env.create_layer("scan").unwrap();
        assert!(id.as_str().starts_with("/rover/item/"));
    }

    #[test]
    fn test_dirty_propagates_downstream() {
        let mut env = Environment::new();
        let scan = env.create_layer("scan").unwrap();
        let mesh = env.create_layer("mesh").unwrap();
        let grid = env.create_layer("grid").unwrap();
        let mesher = env.create_operator(Box::new(Doubler)).unwrap();
        let gridder = env.create_operator(Box::new(Doubler)).unwrap();
        env.add_input(&mesher, &scan).unwrap();
        env.add_output(&mesher, &mesh).unwrap();
        env.add_input(&gridder, &mesh).unwrap();
        env.add_output(&gridder, &grid).unwrap();

        env.set_dirty(&scan).unwrap();
        assert!(env.is_dirty(&mesh).unwrap());
        assert!(env.is_dirty(&grid).unwrap());
    }

    #[test]
    fn test_update_from_operator_runs_once() {
        let mut env = Environment::new();
        let scan = env.create_layer("scan").unwrap();
        let mesh = env.create_layer("mesh").unwrap();
        let op = env.create_operator(Box::new(Doubler)).unwrap();
        env.add_input(&op, &scan).unwrap();
        env.add_output(&op, &mesh).unwrap();

        env.get_mut::<Layer>(&scan)
            .unwrap()
            .attrs
            .set("value", AttrValue::Float(21.0));
        env.set_dirty(&scan).unwrap();
        assert!(env.is_dirty(&mesh).unwrap());

        assert!(env.update_from_operator(&mesh).unwrap());
        assert_eq!(env.get::<Layer>(&mesh).unwrap().attrs.get_f64("value"), Some(42.0));
        assert!(!env.is_dirty(&mesh).unwrap());

        // clean layer, nothing to do
        assert!(!env.update_from_operator(&mesh).unwrap());
    }

    #[test]
    fn test_update_from_operator_without_generator() {
        let mut env = Environment::new();
        let lone = env.create_layer("lone").unwrap();
        env.set_dirty(&lone).unwrap();
        assert!(matches!(
            env.update_from_operator(&lone),
            Err(EnvError::NotFound("Operator"))
        ));
    }

    #[test]
    fn test_sweep_skips_model_less_and_failing_operators() {
        init_logs();
        let mut env = Environment::new();
        let scan = env.create_layer("scan").unwrap();
        let mesh = env.create_layer("mesh").unwrap();
        let good = env.create_operator(Box::new(Doubler)).unwrap();
        env.add_input(&good, &scan).unwrap();
        env.add_output(&good, &mesh).unwrap();

        let opaque = env.attach_item(OperatorNode::opaque("ext::Mesher")).unwrap();
        let broken = env.create_operator(Box::new(Exploder)).unwrap();
        let victim = env.create_layer("victim").unwrap();
        env.add_output(&broken, &victim).unwrap();

        env.get_mut::<Layer>(&scan)
            .unwrap()
            .attrs
            .set("value", AttrValue::Float(1.0));
        env.update_operators();

        assert_eq!(env.get::<Layer>(&mesh).unwrap().attrs.get_f64("value"), Some(2.0));
        assert!(env.contains(&opaque));
        assert!(env.get::<OperatorNode>(&broken).unwrap().has_model());
    }

    #[test]
    fn test_immutable_output_not_regenerated() {
        let mut env = Environment::new();
        let scan = env.create_layer("scan").unwrap();
        let mesh = env.create_layer("mesh").unwrap();
        let op = env.create_operator(Box::new(Doubler)).unwrap();
        env.add_input(&op, &scan).unwrap();
        env.add_output(&op, &mesh).unwrap();
        env.set_immutable(&mesh).unwrap();

        env.get_mut::<Layer>(&scan)
            .unwrap()
            .attrs
            .set("value", AttrValue::Float(7.0));
        env.update_operators();
        assert_eq!(env.get::<Layer>(&mesh).unwrap().attrs.get_f64("value"), None);
    }

    #[test]
    fn test_layers_generated_from_and_detach() {
        let mut env = Environment::new();
        let scan = env.create_layer("scan").unwrap();
        let mesh = env.create_layer("mesh").unwrap();
        let op = env.create_operator(Box::new(Doubler)).unwrap();
        env.add_input(&op, &scan).unwrap();
        env.add_output(&op, &mesh).unwrap();

        assert_eq!(env.layers_generated_from(&scan), vec![mesh.clone()]);
        assert_eq!(env.generator_of(&mesh), Some(&op));

        assert!(env.detach_from_operator(&mesh));
        assert_eq!(env.generator_of(&mesh), None);
        assert!(!env.detach_from_operator(&mesh));
    }

    #[test]
    fn test_subscribe_replays_current_state() {
        let mut env = Environment::new();
        let root = env.root_id().clone();
        let a = env.create_frame(RigidTransform::IDENTITY).unwrap();
        env.add_child_frame(&root, &a).unwrap();
        let map = env.create_map("grid").unwrap();
        env.set_frame_node(&map, &a).unwrap();

        let seen = Rc::new(RefCell::new(Vec::new()));
        env.subscribe(Box::new(Recorder { seen: seen.clone() }));

        let seen = seen.borrow();
        // 3 item adds, root, one frame edge, one binding
        assert_eq!(seen.len(), 6);
        assert_eq!(seen[0], Event::item_added(root.clone()));
        assert_eq!(seen[3], Event::root_added(root.clone()));
        assert_eq!(seen[4], Event::frame_edge_added(root, a.clone()));
        assert_eq!(seen[5], Event::binding_added(map, a));
    }

    #[test]
    fn test_unsubscribe_mirrors_replay() {
        let mut env = Environment::new();
        let root = env.root_id().clone();
        let a = env.create_frame(RigidTransform::IDENTITY).unwrap();
        env.add_child_frame(&root, &a).unwrap();
        env.create_map("grid").unwrap();

        let seen = Rc::new(RefCell::new(Vec::new()));
        let handle = env.subscribe(Box::new(Recorder { seen: seen.clone() }));
        let replay_len = seen.borrow().len();

        assert!(env.unsubscribe(handle).is_some());
        let seen = seen.borrow();
        assert_eq!(seen.len(), replay_len * 2);
        for i in 0..replay_len {
            let add = &seen[i];
            let remove = &seen[seen.len() - 1 - i];
            assert_eq!(add.kind, remove.kind);
            assert_eq!(add.a, remove.a);
            assert_eq!(add.b, remove.b);
            assert_eq!(remove.action, EventAction::Remove);
        }
        drop(seen);
        assert!(env.unsubscribe(handle).is_none());
    }

    #[test]
    fn test_set_transform_emits_update() {
        let mut env = Environment::new();
        let root = env.root_id().clone();
        let a = env.create_frame(RigidTransform::IDENTITY).unwrap();
        env.add_child_frame(&root, &a).unwrap();

        let seen = Rc::new(RefCell::new(Vec::new()));
        env.subscribe(Box::new(Recorder { seen: seen.clone() }));
        seen.borrow_mut().clear();

        env.set_transform(
            &a,
            TransformWithUncertainty::certain(RigidTransform::from_translation(DVec3::Z)),
        )
        .unwrap();
        assert_eq!(seen.borrow().as_slice(), &[Event::item_updated(a.clone())]);

        let t = env.relative_transform(&a, &root).unwrap();
        assert!((t.translation - DVec3::Z).length() < 1e-12);
    }
}
