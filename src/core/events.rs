//! Structural change events.
//!
//! Every mutating environment operation is observable as one or more
//! events, emitted in the exact order the state transitions occur. A
//! subscriber that applies them in order reconstructs the graph
//! transition-by-transition; the same records drive cross-process
//! synchronization (see `core::sync`).

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::entities::item::ItemId;

/// Which relation the event concerns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventKind {
    /// Item lifecycle (attach/detach/payload update).
    Item,
    /// Designation of the environment's root frame.
    Root,
    /// Frame tree parent/child edge.
    FrameTree,
    /// Layer tree parent/child edge.
    LayerTree,
    /// Cartesian map → frame binding.
    MapBinding,
    /// Operator input edge. Administrative: carried by snapshot and sync
    /// records only, never broadcast to live handlers.
    OperatorInput,
    /// Operator output edge. Administrative, like `OperatorInput`.
    OperatorOutput,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventAction {
    Add,
    Remove,
    Update,
}

/// One structural change. Edge events carry two ids: `a` is the parent
/// (frame/layer tree) or the map (bindings), `b` the child or frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub kind: EventKind,
    pub action: EventAction,
    pub a: ItemId,
    pub b: Option<ItemId>,
}

impl Event {
    pub fn item_added(id: ItemId) -> Self {
        Self::one(EventKind::Item, EventAction::Add, id)
    }

    pub fn item_removed(id: ItemId) -> Self {
        Self::one(EventKind::Item, EventAction::Remove, id)
    }

    pub fn item_updated(id: ItemId) -> Self {
        Self::one(EventKind::Item, EventAction::Update, id)
    }

    pub fn root_added(id: ItemId) -> Self {
        Self::one(EventKind::Root, EventAction::Add, id)
    }

    pub fn root_removed(id: ItemId) -> Self {
        Self::one(EventKind::Root, EventAction::Remove, id)
    }

    pub fn frame_edge_added(parent: ItemId, child: ItemId) -> Self {
        Self::two(EventKind::FrameTree, EventAction::Add, parent, child)
    }

    pub fn frame_edge_removed(parent: ItemId, child: ItemId) -> Self {
        Self::two(EventKind::FrameTree, EventAction::Remove, parent, child)
    }

    pub fn layer_edge_added(parent: ItemId, child: ItemId) -> Self {
        Self::two(EventKind::LayerTree, EventAction::Add, parent, child)
    }

    pub fn layer_edge_removed(parent: ItemId, child: ItemId) -> Self {
        Self::two(EventKind::LayerTree, EventAction::Remove, parent, child)
    }

    pub fn binding_added(map: ItemId, frame: ItemId) -> Self {
        Self::two(EventKind::MapBinding, EventAction::Add, map, frame)
    }

    pub fn binding_removed(map: ItemId, frame: ItemId) -> Self {
        Self::two(EventKind::MapBinding, EventAction::Remove, map, frame)
    }

    pub fn input_edge_added(op: ItemId, layer: ItemId) -> Self {
        Self::two(EventKind::OperatorInput, EventAction::Add, op, layer)
    }

    pub fn input_edge_removed(op: ItemId, layer: ItemId) -> Self {
        Self::two(EventKind::OperatorInput, EventAction::Remove, op, layer)
    }

    pub fn output_edge_added(op: ItemId, layer: ItemId) -> Self {
        Self::two(EventKind::OperatorOutput, EventAction::Add, op, layer)
    }

    pub fn output_edge_removed(op: ItemId, layer: ItemId) -> Self {
        Self::two(EventKind::OperatorOutput, EventAction::Remove, op, layer)
    }

    fn one(kind: EventKind, action: EventAction, a: ItemId) -> Self {
        Self {
            kind,
            action,
            a,
            b: None,
        }
    }

    fn two(kind: EventKind, action: EventAction, a: ItemId, b: ItemId) -> Self {
        Self {
            kind,
            action,
            a,
            b: Some(b),
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.b {
            Some(b) => write!(f, "{:?}/{:?} {} {}", self.kind, self.action, self.a, b),
            None => write!(f, "{:?}/{:?} {}", self.kind, self.action, self.a),
        }
    }
}

/// Receives structural events, one at a time, synchronously with the
/// mutation that produced them.
///
/// Handlers observe; they must not mutate the environment from within the
/// callback (single-writer, non-reentrant model).
pub trait EventHandler {
    fn handle(&mut self, event: &Event);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_display() {
        let e = Event::frame_edge_added(ItemId::new("/item/0"), ItemId::new("/item/1"));
        assert_eq!(e.to_string(), "FrameTree/Add /item/0 /item/1");
    }
}
