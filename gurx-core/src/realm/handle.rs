//! Typed node handles.
//!
//! A [`NodeRef<T>`] is a node key tagged with the payload type. It is `Copy`,
//! holds no reference to the realm, and is the only way callers address
//! nodes. [`ErasedNode`] keeps the payload type as a runtime `TypeId` so
//! heterogeneous nodes can live in one export map and be turned back into
//! typed handles with a checked cast.

use std::any::{Any, TypeId};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;
use std::sync::Arc;

use crate::error::{RealmError, Result};
use crate::graph::{NodeKey, Value};

/// Anything that can flow through a realm.
pub trait Payload: Any + Send + Sync {}

impl<T: Any + Send + Sync> Payload for T {}

/// Wrap a typed value as an untyped payload.
pub fn payload<T: Payload>(value: T) -> Value {
    Arc::new(value)
}

/// A typed reference to a node.
pub struct NodeRef<T> {
    key: NodeKey,
    _marker: PhantomData<fn() -> T>,
}

impl<T> NodeRef<T> {
    pub(crate) fn from_key(key: NodeKey) -> Self {
        Self {
            key,
            _marker: PhantomData,
        }
    }

    /// The node's key.
    pub fn key(&self) -> NodeKey {
        self.key
    }
}

impl<T: Payload> NodeRef<T> {
    /// Forget the payload type, keeping it as a runtime tag.
    pub fn erase(self) -> ErasedNode {
        ErasedNode {
            key: self.key,
            type_id: TypeId::of::<T>(),
            type_name: std::any::type_name::<T>(),
        }
    }
}

impl<T> Clone for NodeRef<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for NodeRef<T> {}

impl<T> PartialEq for NodeRef<T> {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl<T> Eq for NodeRef<T> {}

impl<T> Hash for NodeRef<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key.hash(state);
    }
}

impl<T> fmt::Debug for NodeRef<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("NodeRef")
            .field(&self.key)
            .field(&std::any::type_name::<T>())
            .finish()
    }
}

/// A node handle whose payload type is only known at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ErasedNode {
    key: NodeKey,
    type_id: TypeId,
    type_name: &'static str,
}

impl ErasedNode {
    /// The node's key.
    pub fn key(&self) -> NodeKey {
        self.key
    }

    /// Runtime payload type.
    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    /// Payload type name.
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Recover the typed handle. `label` only feeds the error message.
    pub fn downcast<T: Payload>(&self, label: &str) -> Result<NodeRef<T>> {
        if self.type_id == TypeId::of::<T>() {
            Ok(NodeRef::from_key(self.key))
        } else {
            Err(RealmError::TypeMismatch {
                expected: self.type_name,
                label: label.to_string(),
            })
        }
    }

    /// Check that an untyped payload matches this node.
    pub fn accepts(&self, value: &Value) -> bool {
        Any::type_id(&**value) == self.type_id
    }
}

impl<T: Payload> From<NodeRef<T>> for ErasedNode {
    fn from(node: NodeRef<T>) -> Self {
        node.erase()
    }
}
