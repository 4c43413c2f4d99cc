//! Entity to document mapping.

use super::convert::{format_timestamp, parse_timestamp, FromValue, ToValue};
use super::{CREATED_AT_FIELD, ID_FIELD, UPDATED_AT_FIELD};
use crate::entity::{Entity, EntityId, EntityMeta};
use crate::error::{CoreError, CoreResult};
use chrono::{DateTime, Utc};
use facetdb_codec::{Document, Value};
use std::collections::BTreeMap;

/// Named attribute values of one entity or value object.
///
/// Entities produce an `Attributes` on save and receive one, already checked
/// against their schema, on load. Nested value objects use the same type
/// through its [`ToValue`] and [`FromValue`] impls.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Attributes(BTreeMap<String, Value>);

impl Attributes {
    /// Creates an empty attribute set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an attribute, builder style.
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: impl ToValue) -> Self {
        self.set(name, value);
        self
    }

    /// Sets an attribute.
    pub fn set(&mut self, name: impl Into<String>, value: impl ToValue) {
        self.0.insert(name.into(), value.to_value());
    }

    /// Reads an attribute. A missing attribute reads as null.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::TypeMismatch`] if the value does not convert.
    pub fn get<T: FromValue>(&self, name: &str) -> CoreResult<T> {
        T::from_value(self.0.get(name).unwrap_or(&Value::Null))
    }

    /// Returns the raw value of an attribute.
    #[must_use]
    pub fn value(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    /// Sets the value at a dotted path, creating intermediate objects.
    pub(crate) fn set_path(&mut self, path: &str, value: Value) {
        set_in(&mut self.0, path, value);
    }

    /// Consumes the set, returning the value map.
    #[must_use]
    pub fn into_map(self) -> BTreeMap<String, Value> {
        self.0
    }

    pub(crate) fn as_map(&self) -> &BTreeMap<String, Value> {
        &self.0
    }
}

fn set_in(map: &mut BTreeMap<String, Value>, path: &str, value: Value) {
    match path.split_once('.') {
        None => {
            map.insert(path.to_string(), value);
        }
        Some((head, rest)) => {
            let slot = map
                .entry(head.to_string())
                .or_insert_with(|| Value::Map(BTreeMap::new()));
            if !matches!(slot, Value::Map(_)) {
                *slot = Value::Map(BTreeMap::new());
            }
            if let Value::Map(inner) = slot {
                set_in(inner, rest, value);
            }
        }
    }
}

impl From<BTreeMap<String, Value>> for Attributes {
    fn from(map: BTreeMap<String, Value>) -> Self {
        Self(map)
    }
}

impl ToValue for Attributes {
    fn to_value(&self) -> Value {
        Value::Map(self.0.clone())
    }
}

impl FromValue for Attributes {
    fn from_value(value: &Value) -> CoreResult<Self> {
        match value {
            Value::Map(map) => Ok(Self(map.clone())),
            other => Err(CoreError::TypeMismatch {
                expected: "object",
                found: other.type_name(),
            }),
        }
    }
}

/// Serializes an entity into its stored document shape.
///
/// Only declared attributes are written. Metadata keys are included when
/// the instance has them.
///
/// # Errors
///
/// Returns [`CoreError::SchemaViolation`] if an attribute does not fit.
pub fn to_document<T: Entity>(entity: &T) -> CoreResult<Document> {
    let attributes = T::schema().normalize(entity.to_attributes().as_map(), "")?;
    let mut doc = Document::from(attributes);
    let meta = entity.meta();
    if let Some(id) = meta.id() {
        doc.insert(ID_FIELD, id.to_value());
    }
    if let Some(created_at) = meta.created_at() {
        doc.insert(CREATED_AT_FIELD, format_timestamp(created_at));
    }
    if let Some(updated_at) = meta.updated_at() {
        doc.insert(UPDATED_AT_FIELD, format_timestamp(updated_at));
    }
    Ok(doc)
}

/// Rebuilds an entity from a stored document.
///
/// Unknown fields are ignored and missing ones filled in. A document with
/// id and both timestamps yields a persisted instance; anything less yields
/// a transient one.
///
/// # Errors
///
/// Returns [`CoreError::SchemaViolation`] or a conversion error if the
/// document does not fit the schema.
pub fn from_document<T: Entity>(doc: &Document) -> CoreResult<T> {
    let attributes = T::schema().normalize(&attribute_view(doc), "")?;
    let mut entity = T::default();
    entity.apply_attributes(&Attributes(attributes))?;
    *entity.meta_mut() = document_meta(doc)?;
    Ok(entity)
}

fn attribute_view(doc: &Document) -> BTreeMap<String, Value> {
    doc.iter()
        .filter(|(key, _)| !super::RESERVED_FIELDS.contains(&key.as_str()))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}

/// Reads the metadata keys of a document.
pub(crate) fn document_meta(doc: &Document) -> CoreResult<EntityMeta> {
    let id = match doc.get(ID_FIELD) {
        None | Some(Value::Null) => None,
        Some(value) => Some(EntityId::from_value(value)?),
    };
    let created_at = read_timestamp(doc, CREATED_AT_FIELD)?;
    let updated_at = read_timestamp(doc, UPDATED_AT_FIELD)?;

    Ok(match (id, created_at, updated_at) {
        (Some(id), Some(created), Some(updated)) => EntityMeta::persisted(id, created, updated),
        (Some(id), _, _) => EntityMeta::with_id(id),
        _ => EntityMeta::new(),
    })
}

fn read_timestamp(doc: &Document, key: &str) -> CoreResult<Option<DateTime<Utc>>> {
    match doc.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => value
            .as_text()
            .and_then(parse_timestamp)
            .map(Some)
            .ok_or_else(|| CoreError::schema_violation(key, "not an RFC 3339 timestamp")),
    }
}

/// Writes the metadata keys into an attribute document.
pub(crate) fn stamp_document(
    doc: &mut Document,
    id: &EntityId,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
) {
    doc.insert(ID_FIELD, id.to_value());
    doc.insert(CREATED_AT_FIELD, format_timestamp(created_at));
    doc.insert(UPDATED_AT_FIELD, format_timestamp(updated_at));
}
