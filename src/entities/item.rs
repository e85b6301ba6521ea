//! Item identity and the base contract shared by all graph entities.
//!
//! Ids are minted by the registry from the environment's namespace prefix
//! plus a monotonically increasing serial (`/prefix/item/7`). A detached
//! item keeps the id it was issued, so detach/re-attach cycles are stable;
//! an item that was never attached has no id at all.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::attrs::Attrs;

/// Stable identity of an attached item, unique within one environment.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ItemId(String);

impl ItemId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Coarse item kind, used as the discriminator in snapshots and for typed
/// queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ItemClass {
    Frame,
    Layer,
    Map,
    Operator,
}

impl ItemClass {
    pub fn name(&self) -> &'static str {
        match self {
            ItemClass::Frame => "FrameNode",
            ItemClass::Layer => "Layer",
            ItemClass::Map => "CartesianMap",
            ItemClass::Operator => "Operator",
        }
    }
}

/// Fields shared by every graph entity.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ItemCore {
    /// `None` while the item has never been attached.
    pub id: Option<ItemId>,
    /// Optional human-readable label, carried in snapshots.
    pub label: Option<String>,
}

impl ItemCore {
    pub fn labeled(label: impl Into<String>) -> Self {
        Self {
            id: None,
            label: Some(label.into()),
        }
    }
}

/// Serialized form of one item: class tag plus key→value fields.
///
/// This is the only surface external serializers and the sync protocol see;
/// it is enough to reconstruct the item on another environment instance
/// (operators are reconstructed without their recompute model).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemSnapshot {
    pub class: String,
    pub kind: ItemClass,
    pub fields: serde_json::Value,
}

/// Base contract of all graph entities.
pub trait Item {
    /// Id issued by the registry, `None` if never attached.
    fn id(&self) -> Option<&ItemId>;

    fn core(&self) -> &ItemCore;

    fn core_mut(&mut self) -> &mut ItemCore;

    /// Stable class tag (`envgraph::FrameNode`, or the concrete operator
    /// model's own tag).
    fn class_tag(&self) -> &str;

    fn class(&self) -> ItemClass;

    /// Key→value snapshot for serialization and replication.
    fn snapshot(&self) -> crate::errors::Result<ItemSnapshot>;

    /// Metadata attached to this item, if the kind carries any.
    fn attrs(&self) -> Option<&Attrs> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_item_id_display() {
        let id = ItemId::new("/ns/item/3");
        assert_eq!(id.to_string(), "/ns/item/3");
        assert_eq!(id.as_str(), "/ns/item/3");
    }

    #[test]
    fn test_class_names() {
        assert_eq!(ItemClass::Frame.name(), "FrameNode");
        assert_eq!(ItemClass::Map.name(), "CartesianMap");
    }
}
