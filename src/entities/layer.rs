//! Map layer: a named unit of map data.
//!
//! The engine treats the payload as opaque metadata (`Attrs`); concrete
//! map types live outside the core. A layer carries two scheduling flags:
//! `immutable` (set-once latch, operators must not regenerate it) and
//! `dirty` (the generating operator's inputs changed since the last
//! recompute).

use serde::{Deserialize, Serialize};

use super::attrs::Attrs;
use super::item::{Item, ItemClass, ItemCore, ItemId, ItemSnapshot};
use crate::errors::Result;

pub const LAYER_CLASS: &str = "envgraph::Layer";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Layer {
    pub core: ItemCore,
    immutable: bool,
    dirty: bool,
    pub attrs: Attrs,
}

impl Layer {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            core: ItemCore::labeled(label),
            ..Self::default()
        }
    }

    /// One-way latch: an immutable layer is never regenerated.
    pub fn set_immutable(&mut self) {
        self.immutable = true;
    }

    pub fn is_immutable(&self) -> bool {
        self.immutable
    }

    pub fn set_dirty(&mut self) {
        self.dirty = true;
    }

    pub fn reset_dirty(&mut self) {
        self.dirty = false;
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub(crate) fn from_fields(fields: serde_json::Value) -> Result<Self> {
        Ok(serde_json::from_value(fields)?)
    }
}

impl Item for Layer {
    fn id(&self) -> Option<&ItemId> {
        self.core.id.as_ref()
    }

    fn core(&self) -> &ItemCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut ItemCore {
        &mut self.core
    }

    fn class_tag(&self) -> &str {
        LAYER_CLASS
    }

    fn class(&self) -> ItemClass {
        ItemClass::Layer
    }

    fn snapshot(&self) -> Result<ItemSnapshot> {
        Ok(ItemSnapshot {
            class: LAYER_CLASS.to_string(),
            kind: ItemClass::Layer,
            fields: serde_json::to_value(self)?,
        })
    }

    fn attrs(&self) -> Option<&Attrs> {
        Some(&self.attrs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::attrs::AttrValue;

    #[test]
    fn test_immutable_is_a_latch() {
        let mut layer = Layer::new("scan");
        assert!(!layer.is_immutable());
        layer.set_immutable();
        assert!(layer.is_immutable());
    }

    #[test]
    fn test_dirty_flag() {
        let mut layer = Layer::new("mesh");
        layer.set_dirty();
        assert!(layer.is_dirty());
        layer.reset_dirty();
        assert!(!layer.is_dirty());
    }

    #[test]
    fn test_snapshot_preserves_flags_and_attrs() {
        let mut layer = Layer::new("grid");
        layer.set_immutable();
        layer.set_dirty();
        layer.attrs.set("cell_size", AttrValue::Float(0.05));

        let snap = layer.snapshot().unwrap();
        let restored = Layer::from_fields(snap.fields).unwrap();
        assert_eq!(restored, layer);
        assert!(restored.is_dirty());
        assert_eq!(restored.attrs.get_f64("cell_size"), Some(0.05));
    }
}
