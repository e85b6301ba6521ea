//! Engine core: the arena, the relations between items, events and sync.
//!
//! Architecture: `Registry` owns every item; the relation modules
//! (`frame_tree`, `layer_graph`, `operator_graph`, `map_bindings`) store
//! ids only and never broadcast; `Environment` is the single mutation
//! façade that keeps all of them consistent and feeds the `EventBus` and
//! the `SyncQueue`.

pub mod environment;
pub mod event_bus;
pub mod events;
pub mod frame_tree;
pub mod layer_graph;
pub mod map_bindings;
pub mod operator_graph;
pub mod registry;
pub mod serialize;
pub mod sync;

pub use environment::Environment;
pub use event_bus::{EventBus, HandlerId};
pub use events::{Event, EventAction, EventHandler, EventKind};
pub use registry::Registry;
pub use serialize::{EnvironmentSerializer, JsonFileSerializer};
pub use sync::EventRecord;
