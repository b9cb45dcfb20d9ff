//! Realm Errors
//!
//! Every fallible realm operation returns [`RealmError`]. Wiring mistakes
//! (unknown keys, wrong payload types, colliding export names) are reported
//! immediately instead of being dropped, since a silent no-op would hide the
//! bug until much later.

use thiserror::Error;

use crate::graph::NodeKey;

/// Errors raised by realm construction, wiring and publishing.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RealmError {
    /// The node key is not registered in this realm.
    #[error("node {key} is not registered in this realm")]
    InvalidReference { key: NodeKey },

    /// A payload or handle does not carry the type the node was created with.
    #[error("type mismatch for {label}: node expects {expected}")]
    TypeMismatch {
        expected: &'static str,
        label: String,
    },

    /// An export label was not produced by any composed system.
    #[error("no system exports a node labelled `{label}`")]
    UnknownLabel { label: String },

    /// Two composed systems export the same label.
    #[error("export `{name}` is declared by more than one system")]
    DuplicateExport { name: String },

    /// The connections reachable from a publish form a cycle.
    #[error("connection cycle detected through node {node}")]
    Cycle { node: NodeKey },

    /// The realm has been torn down.
    #[error("realm has been disposed")]
    Disposed,

    /// A timer operator fired without a tokio runtime to schedule on.
    #[error("no tokio runtime available to schedule timers")]
    NoTimerRuntime,
}

/// Convenience alias used throughout the crate.
pub type Result<T, E = RealmError> = std::result::Result<T, E>;
