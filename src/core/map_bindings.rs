//! Cartesian map bindings: the functional map → frame relation.
//!
//! Every spatial map is bound to exactly zero or one frame. Overwrite and
//! exact-match removal semantics live in the `Environment` façade; this is
//! the raw table.

use indexmap::IndexMap;

use crate::entities::item::ItemId;

#[derive(Debug, Default)]
pub struct MapBindings {
    frame_of: IndexMap<ItemId, ItemId>,
}

impl MapBindings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `map` to `frame`, returning the previously bound frame if any.
    pub fn bind(&mut self, map: &ItemId, frame: &ItemId) -> Option<ItemId> {
        self.frame_of.insert(map.clone(), frame.clone())
    }

    /// Remove the binding only if it currently is `(map, frame)`.
    pub fn unbind(&mut self, map: &ItemId, frame: &ItemId) -> bool {
        if self.frame_of.get(map) == Some(frame) {
            self.frame_of.shift_remove(map);
            true
        } else {
            false
        }
    }

    pub fn frame_of(&self, map: &ItemId) -> Option<&ItemId> {
        self.frame_of.get(map)
    }

    /// All maps currently bound to `frame`, in binding order.
    pub fn maps_of(&self, frame: &ItemId) -> Vec<ItemId> {
        self.frame_of
            .iter()
            .filter(|(_, f)| *f == frame)
            .map(|(m, _)| m.clone())
            .collect()
    }

    /// All `(map, frame)` bindings touching `id`, for the detach cascade.
    pub fn bindings_touching(&self, id: &ItemId) -> Vec<(ItemId, ItemId)> {
        self.frame_of
            .iter()
            .filter(|(m, f)| *m == id || *f == id)
            .map(|(m, f)| (m.clone(), f.clone()))
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ItemId, &ItemId)> {
        self.frame_of.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.frame_of.is_empty()
    }
}
