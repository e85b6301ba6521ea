//! envgraph - process-resident spatial environment graph for robotics.
//!
//! An `Environment` holds the items a robot's mapping stack works with
//! (coordinate frames, map layers, cartesian maps, operators) and the
//! relations between them: a frame tree with uncertain rigid transforms, a
//! layer hierarchy, an operator DAG with dirty-flag scheduling, and
//! map-to-frame bindings. Every mutation is observable as a synchronous
//! event stream, and the same records synchronize environment copies
//! across process boundaries.
//!
//! ```
//! use envgraph::{Environment, RigidTransform};
//! use glam::DVec3;
//!
//! let mut env = Environment::new();
//! let root = env.root_id().clone();
//! let body = env.create_frame(RigidTransform::from_translation(DVec3::X)).unwrap();
//! env.add_child_frame(&root, &body).unwrap();
//! let grid = env.create_map("grid").unwrap();
//! env.set_frame_node(&grid, &body).unwrap();
//!
//! let t = env.relative_transform(&body, &root).unwrap();
//! assert_eq!(t.translation, DVec3::X);
//! ```

pub mod core;
pub mod entities;
pub mod errors;

pub use crate::core::{
    Environment, EnvironmentSerializer, Event, EventAction, EventHandler, EventKind, EventRecord,
    HandlerId, JsonFileSerializer,
};
pub use crate::entities::{
    AttrValue, Attrs, CartesianMap, Covariance, FrameNode, Item, ItemClass, ItemId, ItemKind,
    Layer, OperatorModel, OperatorNode, RigidTransform, TransformWithUncertainty,
};
pub use crate::errors::{EnvError, Result};
