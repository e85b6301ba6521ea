//! Graph entity types: frames, layers, maps, operators.
//!
//! Entities hold their own state only; every relation between them (frame
//! tree, layer tree, operator DAG, map bindings) lives in `crate::core`
//! keyed by item identity.

pub mod attrs;
pub mod cartesian_map;
pub mod frame_node;
pub mod item;
pub mod item_kind;
pub mod layer;
pub mod operator;
pub mod transform;

pub use attrs::{AttrValue, Attrs};
pub use cartesian_map::CartesianMap;
pub use frame_node::FrameNode;
pub use item::{Item, ItemClass, ItemCore, ItemId, ItemSnapshot};
pub use item_kind::{ItemKind, TypedItem};
pub use layer::Layer;
pub use operator::{OperatorModel, OperatorNode};
pub use transform::{Covariance, RigidTransform, TransformWithUncertainty};
