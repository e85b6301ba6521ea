//! ItemKind - enum wrapper for all graph entity types.
//!
//! The registry stores every item as an `ItemKind`, giving a closed set of
//! entity kinds at the arena level. The `Item` trait is implemented by
//! delegating to the inner type. Typed queries go through `TypedItem`,
//! which turns a kind back into a concrete reference.

use serde::{Deserialize, Serialize};

use super::attrs::Attrs;
use super::cartesian_map::CartesianMap;
use super::frame_node::FrameNode;
use super::item::{Item, ItemClass, ItemCore, ItemId, ItemSnapshot};
use super::layer::Layer;
use super::operator::OperatorNode;
use crate::errors::Result;

/// Enum containing all possible graph entity types.
#[derive(Debug)]
pub enum ItemKind {
    Frame(FrameNode),
    Layer(Layer),
    Map(CartesianMap),
    Operator(OperatorNode),
}

impl ItemKind {
    pub fn is_frame(&self) -> bool {
        matches!(self, ItemKind::Frame(_))
    }

    pub fn is_map(&self) -> bool {
        matches!(self, ItemKind::Map(_))
    }

    pub fn is_operator(&self) -> bool {
        matches!(self, ItemKind::Operator(_))
    }

    /// True for anything that participates in the layer tree and operator
    /// DAG: plain layers and cartesian maps.
    pub fn is_layerish(&self) -> bool {
        matches!(self, ItemKind::Layer(_) | ItemKind::Map(_))
    }

    /// Layer view of this item (maps are layers too).
    pub fn as_layer(&self) -> Option<&Layer> {
        match self {
            ItemKind::Layer(l) => Some(l),
            ItemKind::Map(m) => Some(&m.layer),
            _ => None,
        }
    }

    pub fn as_layer_mut(&mut self) -> Option<&mut Layer> {
        match self {
            ItemKind::Layer(l) => Some(l),
            ItemKind::Map(m) => Some(&mut m.layer),
            _ => None,
        }
    }

    /// Reconstruct an item from its serialized snapshot. Operators come
    /// back without a recompute model.
    pub fn from_snapshot(snapshot: &ItemSnapshot) -> Result<ItemKind> {
        let fields = snapshot.fields.clone();
        Ok(match snapshot.kind {
            ItemClass::Frame => ItemKind::Frame(FrameNode::from_fields(fields)?),
            ItemClass::Layer => ItemKind::Layer(Layer::from_fields(fields)?),
            ItemClass::Map => ItemKind::Map(CartesianMap::from_fields(fields)?),
            ItemClass::Operator => ItemKind::Operator(OperatorNode::from_fields(fields)?),
        })
    }
}

impl Item for ItemKind {
    fn id(&self) -> Option<&ItemId> {
        match self {
            ItemKind::Frame(n) => n.id(),
            ItemKind::Layer(n) => n.id(),
            ItemKind::Map(n) => n.id(),
            ItemKind::Operator(n) => n.id(),
        }
    }

    fn core(&self) -> &ItemCore {
        match self {
            ItemKind::Frame(n) => n.core(),
            ItemKind::Layer(n) => n.core(),
            ItemKind::Map(n) => n.core(),
            ItemKind::Operator(n) => n.core(),
        }
    }

    fn core_mut(&mut self) -> &mut ItemCore {
        match self {
            ItemKind::Frame(n) => n.core_mut(),
            ItemKind::Layer(n) => n.core_mut(),
            ItemKind::Map(n) => n.core_mut(),
            ItemKind::Operator(n) => n.core_mut(),
        }
    }

    fn class_tag(&self) -> &str {
        match self {
            ItemKind::Frame(n) => n.class_tag(),
            ItemKind::Layer(n) => n.class_tag(),
            ItemKind::Map(n) => n.class_tag(),
            ItemKind::Operator(n) => n.class_tag(),
        }
    }

    fn class(&self) -> ItemClass {
        match self {
            ItemKind::Frame(n) => n.class(),
            ItemKind::Layer(n) => n.class(),
            ItemKind::Map(n) => n.class(),
            ItemKind::Operator(n) => n.class(),
        }
    }

    fn snapshot(&self) -> Result<ItemSnapshot> {
        match self {
            ItemKind::Frame(n) => n.snapshot(),
            ItemKind::Layer(n) => n.snapshot(),
            ItemKind::Map(n) => n.snapshot(),
            ItemKind::Operator(n) => n.snapshot(),
        }
    }

    fn attrs(&self) -> Option<&Attrs> {
        match self {
            ItemKind::Frame(n) => n.attrs(),
            ItemKind::Layer(n) => n.attrs(),
            ItemKind::Map(n) => n.attrs(),
            ItemKind::Operator(n) => n.attrs(),
        }
    }
}

// Convenience From implementations
impl From<FrameNode> for ItemKind {
    fn from(node: FrameNode) -> Self {
        ItemKind::Frame(node)
    }
}

impl From<Layer> for ItemKind {
    fn from(layer: Layer) -> Self {
        ItemKind::Layer(layer)
    }
}

impl From<CartesianMap> for ItemKind {
    fn from(map: CartesianMap) -> Self {
        ItemKind::Map(map)
    }
}

impl From<OperatorNode> for ItemKind {
    fn from(op: OperatorNode) -> Self {
        ItemKind::Operator(op)
    }
}

/// Concrete entity types that typed registry queries can select.
pub trait TypedItem: Item + Sized {
    const CLASS_NAME: &'static str;

    fn from_kind(kind: &ItemKind) -> Option<&Self>;
    fn from_kind_mut(kind: &mut ItemKind) -> Option<&mut Self>;
}

impl TypedItem for FrameNode {
    const CLASS_NAME: &'static str = "FrameNode";

    fn from_kind(kind: &ItemKind) -> Option<&Self> {
        match kind {
            ItemKind::Frame(n) => Some(n),
            _ => None,
        }
    }

    fn from_kind_mut(kind: &mut ItemKind) -> Option<&mut Self> {
        match kind {
            ItemKind::Frame(n) => Some(n),
            _ => None,
        }
    }
}

impl TypedItem for Layer {
    const CLASS_NAME: &'static str = "Layer";

    fn from_kind(kind: &ItemKind) -> Option<&Self> {
        match kind {
            ItemKind::Layer(n) => Some(n),
            _ => None,
        }
    }

    fn from_kind_mut(kind: &mut ItemKind) -> Option<&mut Self> {
        match kind {
            ItemKind::Layer(n) => Some(n),
            _ => None,
        }
    }
}

impl TypedItem for CartesianMap {
    const CLASS_NAME: &'static str = "CartesianMap";

    fn from_kind(kind: &ItemKind) -> Option<&Self> {
        match kind {
            ItemKind::Map(n) => Some(n),
            _ => None,
        }
    }

    fn from_kind_mut(kind: &mut ItemKind) -> Option<&mut Self> {
        match kind {
            ItemKind::Map(n) => Some(n),
            _ => None,
        }
    }
}

impl TypedItem for OperatorNode {
    const CLASS_NAME: &'static str = "Operator";

    fn from_kind(kind: &ItemKind) -> Option<&Self> {
        match kind {
            ItemKind::Operator(n) => Some(n),
            _ => None,
        }
    }

    fn from_kind_mut(kind: &mut ItemKind) -> Option<&mut Self> {
        match kind {
            ItemKind::Operator(n) => Some(n),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::transform::RigidTransform;
    use glam::DVec3;

    #[test]
    fn test_layer_view_covers_maps() {
        let kind: ItemKind = CartesianMap::new("grid").into();
        assert!(kind.is_layerish());
        assert!(kind.as_layer().is_some());

        let kind: ItemKind = FrameNode::identity().into();
        assert!(!kind.is_layerish());
        assert!(kind.as_layer().is_none());
    }

    #[test]
    fn test_snapshot_roundtrip_through_kind() {
        let kind: ItemKind =
            FrameNode::new(RigidTransform::from_translation(DVec3::new(1.0, 2.0, 3.0))).into();
        let snap = kind.snapshot().unwrap();
        let restored = ItemKind::from_snapshot(&snap).unwrap();
        assert!(restored.is_frame());
        assert_eq!(restored.snapshot().unwrap(), snap);
    }

    #[test]
    fn test_typed_selection() {
        let kind: ItemKind = Layer::new("scan").into();
        assert!(Layer::from_kind(&kind).is_some());
        assert!(FrameNode::from_kind(&kind).is_none());
    }
}
