//! Item registry: the arena that owns every attached entity.
//!
//! Items are keyed by `ItemId`; all relations store ids only, and this is
//! the single place an id is turned back into a live item. Iteration is
//! attach-ordered (`IndexMap`), which fixes the replay order seen by late
//! subscribers and the sync protocol.

use indexmap::IndexMap;
use log::debug;

use crate::entities::item::{Item, ItemId};
use crate::entities::item_kind::{ItemKind, TypedItem};
use crate::errors::{EnvError, Result};

pub struct Registry {
    items: IndexMap<ItemId, ItemKind>,
    /// Serial of the next id to mint.
    last_id: u64,
    /// Namespace prefix, normalized to start and end with '/'.
    prefix: String,
}

impl Registry {
    pub fn new() -> Self {
        Self {
            items: IndexMap::new(),
            last_id: 0,
            prefix: "/".to_string(),
        }
    }

    /// Namespace used when minting ids (default `/`).
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Set the id namespace. Normalized so ids from different environments
    /// can be told apart: `smurf` becomes `/smurf/`.
    pub fn set_prefix(&mut self, prefix: &str) {
        let trimmed = prefix.trim_matches('/');
        self.prefix = if trimmed.is_empty() {
            "/".to_string()
        } else {
            format!("/{trimmed}/")
        };
    }

    fn mint_id(&mut self) -> ItemId {
        let id = ItemId::new(format!("{}item/{}", self.prefix, self.last_id));
        self.last_id += 1;
        id
    }

    /// Advance the mint counter past an externally supplied id, so ids
    /// arriving through sync or re-attach never collide with future mints.
    fn note_foreign_id(&mut self, id: &ItemId) {
        if let Some(serial) = id
            .as_str()
            .strip_prefix(&self.prefix)
            .and_then(|rest| rest.strip_prefix("item/"))
        {
            if let Ok(n) = serial.parse::<u64>() {
                self.last_id = self.last_id.max(n + 1);
            }
        }
    }

    /// Insert an item, minting an id if it never had one. Fails with
    /// `DuplicateId` when the id already names a live item.
    pub fn attach(&mut self, mut item: ItemKind) -> Result<ItemId> {
        let id = match item.id() {
            Some(id) => id.clone(),
            None => self.mint_id(),
        };
        if self.items.contains_key(&id) {
            return Err(EnvError::DuplicateId(id));
        }
        self.note_foreign_id(&id);
        item.core_mut().id = Some(id.clone());
        debug!("attach {} ({})", id, item.class_tag());
        self.items.insert(id.clone(), item);
        Ok(id)
    }

    /// Insert or replace by id, keeping the item's position in attach order
    /// when it already exists. Returns whether an item was replaced. Used
    /// when applying replicated change records.
    pub(crate) fn attach_or_replace(&mut self, mut item: ItemKind) -> (ItemId, bool) {
        let id = match item.id() {
            Some(id) => id.clone(),
            None => self.mint_id(),
        };
        self.note_foreign_id(&id);
        item.core_mut().id = Some(id.clone());
        let replaced = self.items.insert(id.clone(), item).is_some();
        (id, replaced)
    }

    /// Remove an item and return it by value. The item keeps its id, so a
    /// later re-attach is stable.
    pub fn detach(&mut self, id: &ItemId) -> Result<ItemKind> {
        let item = self
            .items
            .shift_remove(id)
            .ok_or_else(|| EnvError::NotAttached(id.clone()))?;
        debug!("detach {}", id);
        Ok(item)
    }

    pub fn contains(&self, id: &ItemId) -> bool {
        self.items.contains_key(id)
    }

    pub fn get(&self, id: &ItemId) -> Option<&ItemKind> {
        self.items.get(id)
    }

    pub fn get_mut(&mut self, id: &ItemId) -> Option<&mut ItemKind> {
        self.items.get_mut(id)
    }

    /// Typed access to a known id.
    pub fn typed<T: TypedItem>(&self, id: &ItemId) -> Result<&T> {
        let kind = self
            .get(id)
            .ok_or_else(|| EnvError::NotAttached(id.clone()))?;
        T::from_kind(kind).ok_or_else(|| EnvError::WrongKind {
            id: id.clone(),
            expected: T::CLASS_NAME,
        })
    }

    pub fn typed_mut<T: TypedItem>(&mut self, id: &ItemId) -> Result<&mut T> {
        let kind = self
            .items
            .get_mut(id)
            .ok_or_else(|| EnvError::NotAttached(id.clone()))?;
        T::from_kind_mut(kind).ok_or_else(|| EnvError::WrongKind {
            id: id.clone(),
            expected: T::CLASS_NAME,
        })
    }

    /// All items of one concrete type, in attach order.
    pub fn items_of<'a, T: TypedItem + 'a>(&'a self) -> impl Iterator<Item = (&'a ItemId, &'a T)> {
        self.items
            .iter()
            .filter_map(|(id, kind)| T::from_kind(kind).map(|t| (id, t)))
    }

    /// The single item of type `T`; fails with `NotFound` on zero matches
    /// and `AmbiguousType` on more than one.
    pub fn unique<T: TypedItem>(&self) -> Result<(&ItemId, &T)> {
        let mut it = self.items_of::<T>();
        let first = it.next().ok_or(EnvError::NotFound(T::CLASS_NAME))?;
        if it.next().is_some() {
            return Err(EnvError::AmbiguousType(T::CLASS_NAME));
        }
        Ok(first)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ItemId, &ItemKind)> {
        self.items.iter()
    }

    pub fn ids(&self) -> impl Iterator<Item = &ItemId> {
        self.items.keys()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}
