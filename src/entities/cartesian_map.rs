//! Cartesian map: a layer that occupies a position in space.
//!
//! The binding to a coordinate frame lives in the environment's map
//! bindings relation. A map attached without an explicit binding is bound
//! to the root frame.

use serde::{Deserialize, Serialize};

use super::attrs::Attrs;
use super::item::{Item, ItemClass, ItemCore, ItemId, ItemSnapshot};
use super::layer::Layer;
use crate::errors::Result;

pub const CARTESIAN_MAP_CLASS: &str = "envgraph::CartesianMap";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CartesianMap {
    pub layer: Layer,
}

impl CartesianMap {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            layer: Layer::new(label),
        }
    }

    pub(crate) fn from_fields(fields: serde_json::Value) -> Result<Self> {
        Ok(serde_json::from_value(fields)?)
    }
}

impl Item for CartesianMap {
    fn id(&self) -> Option<&ItemId> {
        self.layer.core.id.as_ref()
    }

    fn core(&self) -> &ItemCore {
        &self.layer.core
    }

    fn core_mut(&mut self) -> &mut ItemCore {
        &mut self.layer.core
    }

    fn class_tag(&self) -> &str {
        CARTESIAN_MAP_CLASS
    }

    fn class(&self) -> ItemClass {
        ItemClass::Map
    }

    fn snapshot(&self) -> Result<ItemSnapshot> {
        Ok(ItemSnapshot {
            class: CARTESIAN_MAP_CLASS.to_string(),
            kind: ItemClass::Map,
            fields: serde_json::to_value(self)?,
        })
    }

    fn attrs(&self) -> Option<&Attrs> {
        Some(&self.layer.attrs)
    }
}
