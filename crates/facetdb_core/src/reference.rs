//! Typed, nullable references between entities.

use crate::entity::{Entity, EntityId};
use crate::error::{CoreError, CoreResult};
use crate::schema::{FromValue, ToValue};
use facetdb_codec::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;

/// A nullable pointer to a `T` by id.
///
/// A reference never owns its target and is never resolved implicitly:
/// [`crate::Session::resolve`] performs a point lookup in `T::COLLECTION`
/// and yields `None` for null or dangling ids. Stored as
/// `{"collection": .., "id": ..}` or null.
pub struct Reference<T> {
    id: Option<EntityId>,
    _target: PhantomData<fn() -> T>,
}

impl<T: Entity> Reference<T> {
    /// The null reference.
    #[must_use]
    pub fn null() -> Self {
        Self::from_id(None)
    }

    /// A reference to the entity stored under `id`.
    pub fn to(id: impl Into<EntityId>) -> Self {
        Self::from_id(Some(id.into()))
    }

    /// A reference from an optional id.
    #[must_use]
    pub fn from_id(id: Option<EntityId>) -> Self {
        Self {
            id,
            _target: PhantomData,
        }
    }

    /// The target id, `None` for a null reference.
    #[must_use]
    pub fn id(&self) -> Option<&EntityId> {
        self.id.as_ref()
    }

    /// Returns whether this reference is null.
    #[must_use]
    pub fn is_null(&self) -> bool {
        self.id.is_none()
    }

    /// The collection this reference points into.
    #[must_use]
    pub fn collection(&self) -> &'static str {
        T::COLLECTION
    }
}

impl<T: Entity> Default for Reference<T> {
    fn default() -> Self {
        Self::null()
    }
}

impl<T> Clone for Reference<T> {
    fn clone(&self) -> Self {
        Self {
            id: self.id.clone(),
            _target: PhantomData,
        }
    }
}

impl<T> PartialEq for Reference<T> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl<T> Eq for Reference<T> {}

impl<T> Hash for Reference<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl<T: Entity> fmt::Debug for Reference<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.id {
            Some(id) => write!(f, "Reference({}/{})", T::COLLECTION, id),
            None => write!(f, "Reference({}/null)", T::COLLECTION),
        }
    }
}

impl<T: Entity> From<&T> for Reference<T> {
    fn from(entity: &T) -> Self {
        entity.to_reference()
    }
}

impl<T: Entity> ToValue for Reference<T> {
    fn to_value(&self) -> Value {
        match &self.id {
            None => Value::Null,
            Some(id) => {
                let mut map = BTreeMap::new();
                map.insert("collection".to_string(), Value::from(T::COLLECTION));
                map.insert("id".to_string(), Value::from(id.as_str()));
                Value::Map(map)
            }
        }
    }
}

impl<T: Entity> FromValue for Reference<T> {
    fn from_value(value: &Value) -> CoreResult<Self> {
        match value {
            Value::Null => Ok(Self::null()),
            Value::Map(map) => {
                let collection = map.get("collection").and_then(Value::as_text);
                let id = map.get("id").and_then(Value::as_text);
                match (collection, id) {
                    (Some(collection), Some(id)) if collection == T::COLLECTION => {
                        Ok(Self::to(id))
                    }
                    (Some(collection), Some(_)) => Err(CoreError::schema_violation(
                        "collection",
                        format!(
                            "reference into `{collection}`, expected `{}`",
                            T::COLLECTION
                        ),
                    )),
                    _ => Err(CoreError::TypeMismatch {
                        expected: "reference",
                        found: "map",
                    }),
                }
            }
            other => Err(CoreError::TypeMismatch {
                expected: "reference",
                found: other.type_name(),
            }),
        }
    }
}
