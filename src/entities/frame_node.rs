//! Coordinate frame node of the spatial hierarchy.
//!
//! A frame stores the rigid transform to its parent (identity for the
//! root). The parent relation itself lives in the environment's frame
//! tree, not on the node, so a detached frame can never point at stale
//! tree structure.

use serde::{Deserialize, Serialize};

use super::item::{Item, ItemClass, ItemCore, ItemId, ItemSnapshot};
use super::transform::{RigidTransform, TransformWithUncertainty};
use crate::errors::Result;

pub const FRAME_NODE_CLASS: &str = "envgraph::FrameNode";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FrameNode {
    pub core: ItemCore,
    /// Transform mapping this frame's points into the parent frame.
    pub transform: TransformWithUncertainty,
}

impl FrameNode {
    /// Frame with an identity transform to its parent.
    pub fn identity() -> Self {
        Self::default()
    }

    pub fn new(transform: RigidTransform) -> Self {
        Self {
            core: ItemCore::default(),
            transform: TransformWithUncertainty::certain(transform),
        }
    }

    pub fn with_uncertainty(transform: TransformWithUncertainty) -> Self {
        Self {
            core: ItemCore::default(),
            transform,
        }
    }

    pub fn labeled(label: impl Into<String>, transform: RigidTransform) -> Self {
        Self {
            core: ItemCore::labeled(label),
            transform: TransformWithUncertainty::certain(transform),
        }
    }

    pub(crate) fn from_fields(fields: serde_json::Value) -> Result<Self> {
        Ok(serde_json::from_value(fields)?)
    }
}

impl Item for FrameNode {
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
        FRAME_NODE_CLASS
    }

    fn class(&self) -> ItemClass {
        ItemClass::Frame
    }

    fn snapshot(&self) -> Result<ItemSnapshot> {
        Ok(ItemSnapshot {
            class: FRAME_NODE_CLASS.to_string(),
            kind: ItemClass::Frame,
            fields: serde_json::to_value(self)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::DVec3;

    #[test]
    fn test_snapshot_roundtrip() {
        let node = FrameNode::labeled("body", RigidTransform::from_translation(DVec3::X));
        let snap = node.snapshot().unwrap();
        assert_eq!(snap.class, FRAME_NODE_CLASS);
        let restored = FrameNode::from_fields(snap.fields).unwrap();
        assert_eq!(restored, node);
    }
}
