//! Operator node: a pure function from input layers to output layers.
//!
//! The core never knows concrete algorithms. A host application plugs one
//! in through the `OperatorModel` capability trait; the graph only stores
//! the node, its class tag, and its input/output edges. A replicated
//! environment receives operators without a model (snapshots cannot carry
//! behavior) — the update sweep skips those with a warning.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::item::{Item, ItemClass, ItemCore, ItemId, ItemSnapshot};
use crate::core::environment::Environment;
use crate::errors::Result;

pub const OPERATOR_CLASS: &str = "envgraph::Operator";

/// Recompute contract of a concrete operator algorithm.
///
/// `update_all` must consult all current inputs of `op` and regenerate all
/// its current outputs, honoring output immutability. On failure, output
/// dirty flags are left for the model to decide; leaving them set allows a
/// retry on the next sweep.
pub trait OperatorModel {
    /// Stable class tag identifying the concrete algorithm.
    fn class_tag(&self) -> &'static str;

    fn update_all(&mut self, env: &mut Environment, op: &ItemId) -> anyhow::Result<()>;
}

#[derive(Default, Serialize, Deserialize)]
pub struct OperatorNode {
    pub core: ItemCore,
    class: String,
    #[serde(skip)]
    model: Option<Box<dyn OperatorModel>>,
}

impl OperatorNode {
    pub fn new(model: Box<dyn OperatorModel>) -> Self {
        Self {
            core: ItemCore::default(),
            class: model.class_tag().to_string(),
            model: Some(model),
        }
    }

    /// Operator shell with a class tag but no behavior, as produced by
    /// replication.
    pub fn opaque(class: impl Into<String>) -> Self {
        Self {
            core: ItemCore::default(),
            class: class.into(),
            model: None,
        }
    }

    pub fn has_model(&self) -> bool {
        self.model.is_some()
    }

    /// Install (or replace) the recompute model, e.g. after replication.
    pub fn set_model(&mut self, model: Box<dyn OperatorModel>) {
        self.class = model.class_tag().to_string();
        self.model = Some(model);
    }

    pub(crate) fn take_model(&mut self) -> Option<Box<dyn OperatorModel>> {
        self.model.take()
    }

    pub(crate) fn put_model(&mut self, model: Box<dyn OperatorModel>) {
        self.model = Some(model);
    }

    pub(crate) fn from_fields(fields: serde_json::Value) -> Result<Self> {
        Ok(serde_json::from_value(fields)?)
    }
}

impl fmt::Debug for OperatorNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OperatorNode")
            .field("core", &self.core)
            .field("class", &self.class)
            .field("has_model", &self.model.is_some())
            .finish()
    }
}

impl Item for OperatorNode {
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
        if self.class.is_empty() {
            OPERATOR_CLASS
        } else {
            &self.class
        }
    }

    fn class(&self) -> ItemClass {
        ItemClass::Operator
    }

    fn snapshot(&self) -> Result<ItemSnapshot> {
        Ok(ItemSnapshot {
            class: self.class_tag().to_string(),
            kind: ItemClass::Operator,
            fields: serde_json::to_value(self)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NoopModel;

    impl OperatorModel for NoopModel {
        fn class_tag(&self) -> &'static str {
            "test::Noop"
        }

        fn update_all(&mut self, _env: &mut Environment, _op: &ItemId) -> anyhow::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_class_tag_from_model() {
        let op = OperatorNode::new(Box::new(NoopModel));
        assert_eq!(op.class_tag(), "test::Noop");
        assert!(op.has_model());
    }

    #[test]
    fn test_snapshot_drops_model() {
        let op = OperatorNode::new(Box::new(NoopModel));
        let snap = op.snapshot().unwrap();
        assert_eq!(snap.class, "test::Noop");
        let restored = OperatorNode::from_fields(snap.fields).unwrap();
        assert!(!restored.has_model());
        assert_eq!(restored.class_tag(), "test::Noop");
    }
}
