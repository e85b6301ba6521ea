//! Error types shared across the engine.
//!
//! Every fallible operation returns `Result<T, EnvError>`. Variants map to
//! the caller mistakes the graph can detect: identity clashes, lookups of
//! detached items, structural corruption, metadata type confusion, and
//! failures bubbled up from operator recomputes or serialization.

use thiserror::Error;

use crate::entities::item::ItemId;

pub type Result<T> = std::result::Result<T, EnvError>;

#[derive(Debug, Error)]
pub enum EnvError {
    #[error("item id {0} is already attached")]
    DuplicateId(ItemId),

    #[error("item {0} is not attached to this environment")]
    NotAttached(ItemId),

    #[error("frame {0} is not connected to the root frame")]
    DetachedFrame(ItemId),

    #[error("frame tree is corrupt: cycle through {0}")]
    CorruptTree(ItemId),

    #[error("no item of type {0} in this environment")]
    NotFound(&'static str),

    #[error("more than one item of type {0} in this environment")]
    AmbiguousType(&'static str),

    #[error("item {id} is not a {expected}")]
    WrongKind { id: ItemId, expected: &'static str },

    #[error("no metadata entry named {0}")]
    NoMetadata(String),

    #[error("metadata entry {key} is a {actual}, expected {expected}")]
    TypeMismatch {
        key: String,
        expected: &'static str,
        actual: &'static str,
    },

    #[error("serialization failed")]
    Serialization(#[from] serde_json::Error),

    #[error("i/o failed")]
    Io(#[from] std::io::Error),

    #[error("operator {id} failed to update")]
    Operator {
        id: ItemId,
        #[source]
        source: anyhow::Error,
    },
}
