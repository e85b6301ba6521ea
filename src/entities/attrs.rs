//! Generic metadata storage shared by layers and maps.
//!
//! Keys are strings, values are explicitly tagged (`AttrValue`), so typed
//! retrieval is a checked variant match instead of a downcast. Iteration
//! order is insertion order (`IndexMap`) to keep snapshots and change
//! records deterministic.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::errors::{EnvError, Result};

/// Tagged metadata value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AttrValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Vec3([f64; 3]),
    Mat4([[f64; 4]; 4]),
    /// Opaque payload blob (point data, grid cells, ...). The engine never
    /// interprets it.
    Bytes(Vec<u8>),
}

impl AttrValue {
    /// Tag name, used in `TypeMismatch` errors.
    pub fn tag(&self) -> &'static str {
        match self {
            AttrValue::Bool(_) => "Bool",
            AttrValue::Int(_) => "Int",
            AttrValue::Float(_) => "Float",
            AttrValue::Str(_) => "Str",
            AttrValue::Vec3(_) => "Vec3",
            AttrValue::Mat4(_) => "Mat4",
            AttrValue::Bytes(_) => "Bytes",
        }
    }
}

/// Metadata container: string key → tagged value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Attrs {
    #[serde(default)]
    map: IndexMap<String, AttrValue>,
}

impl Attrs {
    pub fn new() -> Self {
        Self {
            map: IndexMap::new(),
        }
    }

    pub fn set(&mut self, key: impl Into<String>, value: AttrValue) {
        self.map.insert(key.into(), value);
    }

    pub fn get(&self, key: &str) -> Option<&AttrValue> {
        self.map.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.map.contains_key(key)
    }

    /// Remove a single entry, returning it if present.
    pub fn remove(&mut self, key: &str) -> Option<AttrValue> {
        self.map.shift_remove(key)
    }

    /// Drop all entries.
    pub fn clear(&mut self) {
        self.map.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &AttrValue)> {
        self.map.iter()
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    // Optional getters (None on missing key or tag mismatch)

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        match self.map.get(key) {
            Some(AttrValue::Bool(v)) => Some(*v),
            _ => None,
        }
    }

    pub fn get_i64(&self, key: &str) -> Option<i64> {
        match self.map.get(key) {
            Some(AttrValue::Int(v)) => Some(*v),
            _ => None,
        }
    }

    pub fn get_f64(&self, key: &str) -> Option<f64> {
        match self.map.get(key) {
            Some(AttrValue::Float(v)) => Some(*v),
            _ => None,
        }
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        match self.map.get(key) {
            Some(AttrValue::Str(s)) => Some(s),
            _ => None,
        }
    }

    pub fn get_vec3(&self, key: &str) -> Option<[f64; 3]> {
        match self.map.get(key) {
            Some(AttrValue::Vec3(v)) => Some(*v),
            _ => None,
        }
    }

    pub fn get_bytes(&self, key: &str) -> Option<&[u8]> {
        match self.map.get(key) {
            Some(AttrValue::Bytes(b)) => Some(b),
            _ => None,
        }
    }

    // Checked getters: NoMetadata on missing key, TypeMismatch on wrong tag

    fn checked(&self, key: &str, expected: &'static str) -> Result<&AttrValue> {
        let value = self
            .map
            .get(key)
            .ok_or_else(|| EnvError::NoMetadata(key.to_string()))?;
        if value.tag() == expected {
            Ok(value)
        } else {
            Err(EnvError::TypeMismatch {
                key: key.to_string(),
                expected,
                actual: value.tag(),
            })
        }
    }

    pub fn expect_bool(&self, key: &str) -> Result<bool> {
        match self.checked(key, "Bool")? {
            AttrValue::Bool(v) => Ok(*v),
            _ => unreachable!(),
        }
    }

    pub fn expect_i64(&self, key: &str) -> Result<i64> {
        match self.checked(key, "Int")? {
            AttrValue::Int(v) => Ok(*v),
            _ => unreachable!(),
        }
    }

    pub fn expect_f64(&self, key: &str) -> Result<f64> {
        match self.checked(key, "Float")? {
            AttrValue::Float(v) => Ok(*v),
            _ => unreachable!(),
        }
    }

    pub fn expect_str(&self, key: &str) -> Result<&str> {
        match self.checked(key, "Str")? {
            AttrValue::Str(s) => Ok(s),
            _ => unreachable!(),
        }
    }

    pub fn expect_vec3(&self, key: &str) -> Result<[f64; 3]> {
        match self.checked(key, "Vec3")? {
            AttrValue::Vec3(v) => Ok(*v),
            _ => unreachable!(),
        }
    }

    pub fn expect_bytes(&self, key: &str) -> Result<&[u8]> {
        match self.checked(key, "Bytes")? {
            AttrValue::Bytes(b) => Ok(b),
            _ => unreachable!(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_get_roundtrip() {
        let mut attrs = Attrs::new();
        attrs.set("cell_size", AttrValue::Float(0.05));
        attrs.set("frame", AttrValue::Str("body".into()));

        assert_eq!(attrs.get_f64("cell_size"), Some(0.05));
        assert_eq!(attrs.get_str("frame"), Some("body"));
        assert_eq!(attrs.len(), 2);
    }

    #[test]
    fn test_expect_missing_is_no_metadata() {
        let attrs = Attrs::new();
        match attrs.expect_f64("resolution") {
            Err(EnvError::NoMetadata(key)) => assert_eq!(key, "resolution"),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_expect_wrong_tag_is_type_mismatch() {
        let mut attrs = Attrs::new();
        attrs.set("resolution", AttrValue::Str("high".into()));
        match attrs.expect_f64("resolution") {
            Err(EnvError::TypeMismatch {
                expected, actual, ..
            }) => {
                assert_eq!(expected, "Float");
                assert_eq!(actual, "Str");
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_iteration_is_insertion_ordered() {
        let mut attrs = Attrs::new();
        attrs.set("b", AttrValue::Int(2));
        attrs.set("a", AttrValue::Int(1));
        let keys: Vec<_> = attrs.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, ["b", "a"]);
    }
}
