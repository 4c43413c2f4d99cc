//! Schema descriptors and the schema mapper.
//!
//! A [`Schema`] is declared once per entity type and registered on first use.
//! It drives both directions of the mapping:
//!
//! - on save, only declared attributes are written, each checked against its
//!   [`FieldKind`]
//! - on load, unknown document fields are ignored and missing ones take the
//!   declared default, null, or the kind's zero value
//!
//! The same normalization runs both ways, so a document that was accepted on
//! save always loads back to the same attributes.

mod convert;
mod mapper;

pub use convert::{format_timestamp, parse_timestamp, FromValue, ToValue};
pub use mapper::{from_document, to_document, Attributes};

pub(crate) use mapper::{document_meta, stamp_document};

use crate::error::{CoreError, CoreResult};
use facetdb_codec::Value;
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

/// Document keys owned by the persistence layer.
pub const RESERVED_FIELDS: [&str; 3] = [ID_FIELD, CREATED_AT_FIELD, UPDATED_AT_FIELD];

/// Document key holding the entity id.
pub const ID_FIELD: &str = "id";
/// Document key holding the creation timestamp.
pub const CREATED_AT_FIELD: &str = "createdAt";
/// Document key holding the last update timestamp.
pub const UPDATED_AT_FIELD: &str = "updatedAt";

/// Semantic type of one attribute.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldKind {
    /// `true` or `false`.
    Bool,
    /// Signed 64-bit integer.
    Integer,
    /// Finite float. Integers are accepted and widened.
    Float,
    /// UTF-8 text.
    Text,
    /// UTC instant, stored as RFC 3339 text with nanoseconds.
    Timestamp,
    /// Homogeneous list.
    List(Box<FieldKind>),
    /// Nested value object with its own schema.
    Object(Schema),
    /// Nullable reference into the named collection.
    Reference(String),
    /// Any value, stored as given.
    Any,
}

impl FieldKind {
    /// Shorthand for `FieldKind::List(Box::new(kind))`.
    #[must_use]
    pub fn list(kind: FieldKind) -> Self {
        Self::List(Box::new(kind))
    }

    /// Shorthand for a reference to `T`'s collection.
    #[must_use]
    pub fn reference_to<T: crate::Entity>() -> Self {
        Self::Reference(T::COLLECTION.to_string())
    }

    fn name(&self) -> &'static str {
        match self {
            Self::Bool => "bool",
            Self::Integer => "integer",
            Self::Float => "float",
            Self::Text => "text",
            Self::Timestamp => "timestamp",
            Self::List(_) => "list",
            Self::Object(_) => "object",
            Self::Reference(_) => "reference",
            Self::Any => "any",
        }
    }

    fn accepts_null(&self) -> bool {
        matches!(self, Self::Reference(_) | Self::Any)
    }

    fn zero_value(&self, path: &str) -> CoreResult<Value> {
        match self {
            Self::Bool => Ok(Value::Bool(false)),
            Self::Integer => Ok(Value::Integer(0)),
            Self::Float => Ok(Value::Float(0.0)),
            Self::Text => Ok(Value::Text(String::new())),
            Self::List(_) => Ok(Value::Array(Vec::new())),
            Self::Object(schema) => Ok(Value::Map(schema.normalize(&BTreeMap::new(), path)?)),
            Self::Reference(_) | Self::Any => Ok(Value::Null),
            Self::Timestamp => Err(CoreError::schema_violation(
                path,
                "missing timestamp has no default",
            )),
        }
    }

    fn normalize(&self, value: &Value, nullable: bool, path: &str) -> CoreResult<Value> {
        if value.is_null() {
            return if nullable || self.accepts_null() {
                Ok(Value::Null)
            } else {
                Err(CoreError::schema_violation(
                    path,
                    format!("null is not a valid {}", self.name()),
                ))
            };
        }

        let mismatch = || {
            CoreError::schema_violation(
                path,
                format!("expected {}, found {}", self.name(), value.type_name()),
            )
        };

        match (self, value) {
            (Self::Bool, Value::Bool(_))
            | (Self::Integer, Value::Integer(_))
            | (Self::Text, Value::Text(_))
            | (Self::Any, _) => Ok(value.clone()),
            (Self::Float, Value::Float(f)) if f.is_finite() => Ok(value.clone()),
            (Self::Float, Value::Float(_)) => Err(CoreError::schema_violation(
                path,
                "floats must be finite",
            )),
            (Self::Float, Value::Integer(_)) => value.as_float().map(Value::Float).ok_or_else(mismatch),
            (Self::Timestamp, Value::Text(text)) => parse_timestamp(text)
                .map(|ts| Value::Text(format_timestamp(ts)))
                .ok_or_else(|| CoreError::schema_violation(path, "not an RFC 3339 timestamp")),
            (Self::List(inner), Value::Array(items)) => items
                .iter()
                .enumerate()
                .map(|(i, item)| inner.normalize(item, false, &format!("{path}.{i}")))
                .collect::<CoreResult<Vec<_>>>()
                .map(Value::Array),
            (Self::Object(schema), Value::Map(map)) => schema.normalize(map, path).map(Value::Map),
            (Self::Reference(collection), Value::Map(map)) => {
                normalize_reference(collection, map, path)
            }
            _ => Err(mismatch()),
        }
    }
}

fn normalize_reference(
    collection: &str,
    map: &BTreeMap<String, Value>,
    path: &str,
) -> CoreResult<Value> {
    let target = map.get("collection").and_then(Value::as_text);
    let id = map.get("id").and_then(Value::as_text);
    match (target, id) {
        (Some(target), Some(id)) if target == collection && map.len() == 2 => {
            let mut normalized = BTreeMap::new();
            normalized.insert("collection".to_string(), Value::from(target));
            normalized.insert("id".to_string(), Value::from(id));
            Ok(Value::Map(normalized))
        }
        (Some(target), Some(_)) if target != collection => Err(CoreError::schema_violation(
            path,
            format!("reference into `{target}`, expected `{collection}`"),
        )),
        _ => Err(CoreError::schema_violation(
            path,
            "reference must be {collection, id}",
        )),
    }
}

/// One declared attribute.
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    /// Attribute name, also the document key.
    pub name: String,
    /// Semantic type.
    pub kind: FieldKind,
    /// Whether an explicit null is accepted.
    pub nullable: bool,
    /// Value used when a stored document lacks the field.
    pub default: Option<Value>,
}

impl Field {
    /// A required field with no default.
    pub fn new(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            kind,
            nullable: false,
            default: None,
        }
    }

    /// Allows null.
    #[must_use]
    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    /// Sets the value used for documents missing this field.
    #[must_use]
    pub fn default_value(mut self, value: impl ToValue) -> Self {
        self.default = Some(value.to_value());
        self
    }
}

/// An ordered list of declared attributes.
///
/// # Example
///
/// ```rust
/// use facetdb_core::{Field, FieldKind, Schema};
///
/// let stats = Schema::new().field("level", FieldKind::Integer);
/// let schema = Schema::new()
///     .field("name", FieldKind::Text)
///     .with(Field::new("coins", FieldKind::Integer).default_value(100))
///     .field("stats", FieldKind::Object(stats))
///     .with(Field::new("motto", FieldKind::Text).nullable());
///
/// assert_eq!(schema.fields().len(), 4);
/// ```
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Schema {
    fields: Vec<Field>,
}

impl Schema {
    /// Creates an empty schema.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a required field.
    #[must_use]
    pub fn field(self, name: impl Into<String>, kind: FieldKind) -> Self {
        self.with(Field::new(name, kind))
    }

    /// Adds a fully described field.
    #[must_use]
    pub fn with(mut self, field: Field) -> Self {
        self.fields.push(field);
        self
    }

    /// Declared fields in declaration order.
    #[must_use]
    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    /// Looks up a field by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Checks names: no duplicates, and no reserved keys at the top level.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::SchemaViolation`] naming the bad field.
    pub fn validate(&self) -> CoreResult<()> {
        if let Some(field) = self
            .fields
            .iter()
            .find(|f| RESERVED_FIELDS.contains(&f.name.as_str()))
        {
            return Err(CoreError::schema_violation(
                &field.name,
                "name is reserved for entity metadata",
            ));
        }
        self.validate_names("")
    }

    fn validate_names(&self, prefix: &str) -> CoreResult<()> {
        let mut seen = HashSet::new();
        for field in &self.fields {
            let path = join_path(prefix, &field.name);
            if field.name.is_empty() || field.name.contains('.') {
                return Err(CoreError::schema_violation(
                    path,
                    "field names must be non-empty and contain no dots",
                ));
            }
            if !seen.insert(field.name.as_str()) {
                return Err(CoreError::schema_violation(path, "declared twice"));
            }
            let mut kind = &field.kind;
            while let FieldKind::List(inner) = kind {
                kind = inner;
            }
            if let FieldKind::Object(nested) = kind {
                nested.validate_names(&path)?;
            }
        }
        Ok(())
    }

    /// Maps `input` onto the declared fields.
    ///
    /// Undeclared keys are dropped; missing fields are filled in; every
    /// present value is checked against its kind.
    pub(crate) fn normalize(
        &self,
        input: &BTreeMap<String, Value>,
        prefix: &str,
    ) -> CoreResult<BTreeMap<String, Value>> {
        let mut out = BTreeMap::new();
        for field in &self.fields {
            let path = join_path(prefix, &field.name);
            let value = match (input.get(&field.name), &field.default) {
                (Some(value), _) => field.kind.normalize(value, field.nullable, &path)?,
                (None, Some(default)) => field.kind.normalize(default, field.nullable, &path)?,
                (None, None) if field.nullable => Value::Null,
                (None, None) => field.kind.zero_value(&path)?,
            };
            out.insert(field.name.clone(), value);
        }
        Ok(out)
    }
}

fn join_path(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{prefix}.{name}")
    }
}

/// Collection name to schema, fixed at first registration.
#[derive(Debug, Default)]
pub struct SchemaRegistry {
    schemas: RwLock<HashMap<String, Arc<Schema>>>,
}

impl SchemaRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `schema` for `collection`, or confirms an identical one.
    ///
    /// # Errors
    ///
    /// - [`CoreError::SchemaConflict`] if a different schema is registered
    /// - [`CoreError::SchemaViolation`] if the schema itself is invalid
    pub fn register(&self, collection: &str, schema: Schema) -> CoreResult<Arc<Schema>> {
        if let Some(existing) = self.schemas.read().get(collection) {
            return Self::confirm(collection, existing, &schema);
        }

        schema.validate()?;
        let mut schemas = self.schemas.write();
        if let Some(existing) = schemas.get(collection) {
            return Self::confirm(collection, existing, &schema);
        }
        let schema = Arc::new(schema);
        schemas.insert(collection.to_string(), Arc::clone(&schema));
        tracing::debug!(collection, fields = schema.fields().len(), "schema registered");
        Ok(schema)
    }

    fn confirm(collection: &str, existing: &Arc<Schema>, schema: &Schema) -> CoreResult<Arc<Schema>> {
        if **existing == *schema {
            Ok(Arc::clone(existing))
        } else {
            Err(CoreError::SchemaConflict {
                collection: collection.to_string(),
            })
        }
    }

    /// Returns the schema registered for `collection`.
    #[must_use]
    pub fn get(&self, collection: &str) -> Option<Arc<Schema>> {
        self.schemas.read().get(collection).cloned()
    }

    /// Registered collection names, sorted.
    #[must_use]
    pub fn collections(&self) -> Vec<String> {
        let mut names: Vec<_> = self.schemas.read().keys().cloned().collect();
        names.sort();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stats_schema() -> Schema {
        Schema::new()
            .field("level", FieldKind::Integer)
            .field("speed", FieldKind::Float)
    }

    fn player_schema() -> Schema {
        Schema::new()
            .field("name", FieldKind::Text)
            .with(Field::new("coins", FieldKind::Integer).default_value(100))
            .field("stats", FieldKind::Object(stats_schema()))
            .field("tags", FieldKind::list(FieldKind::Text))
            .field("bike", FieldKind::Reference("motorbikes".into()))
            .with(Field::new("motto", FieldKind::Text).nullable())
    }

    fn map(entries: Vec<(&str, Value)>) -> BTreeMap<String, Value> {
        entries
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect()
    }

    #[test]
    fn normalize_fills_missing_fields() {
        let out = player_schema().normalize(&BTreeMap::new(), "").unwrap();
        assert_eq!(out["name"], Value::from(""));
        assert_eq!(out["coins"], Value::Integer(100));
        assert_eq!(
            out["stats"],
            Value::Map(map(vec![
                ("level", Value::Integer(0)),
                ("speed", Value::Float(0.0))
            ]))
        );
        assert_eq!(out["tags"], Value::Array(vec![]));
        assert_eq!(out["bike"], Value::Null);
        assert_eq!(out["motto"], Value::Null);
    }

    #[test]
    fn normalize_drops_undeclared_fields() {
        let input = map(vec![("name", Value::from("John")), ("legacy", Value::Integer(1))]);
        let out = player_schema().normalize(&input, "").unwrap();
        assert!(!out.contains_key("legacy"));
        assert_eq!(out["name"], Value::from("John"));
    }

    #[test]
    fn normalize_rejects_wrong_kind_with_path() {
        let input = map(vec![(
            "stats",
            Value::Map(map(vec![("level", Value::from("high"))])),
        )]);
        let err = player_schema().normalize(&input, "").unwrap_err();
        match err {
            CoreError::SchemaViolation { path, .. } => assert_eq!(path, "stats.level"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn normalize_widens_integers_to_floats() {
        let input = map(vec![("speed", Value::Integer(3))]);
        let out = stats_schema().normalize(&input, "").unwrap();
        assert_eq!(out["speed"], Value::Float(3.0));
    }

    #[test]
    fn null_only_where_allowed() {
        let schema = player_schema();
        assert!(schema
            .normalize(&map(vec![("motto", Value::Null)]), "")
            .is_ok());
        assert!(schema
            .normalize(&map(vec![("name", Value::Null)]), "")
            .is_err());
    }

    #[test]
    fn reference_must_target_declared_collection() {
        let schema = player_schema();
        let good = Value::Map(map(vec![
            ("collection", Value::from("motorbikes")),
            ("id", Value::from("b1")),
        ]));
        let bad = Value::Map(map(vec![
            ("collection", Value::from("players")),
            ("id", Value::from("b1")),
        ]));
        assert!(schema.normalize(&map(vec![("bike", good)]), "").is_ok());
        assert!(matches!(
            schema.normalize(&map(vec![("bike", bad)]), ""),
            Err(CoreError::SchemaViolation { .. })
        ));
    }

    #[test]
    fn timestamps_are_canonicalized() {
        let schema = Schema::new().field("seen", FieldKind::Timestamp);
        let input = map(vec![("seen", Value::from("2024-03-01T10:00:00+01:00"))]);
        let out = schema.normalize(&input, "").unwrap();
        assert_eq!(out["seen"], Value::from("2024-03-01T09:00:00.000000000Z"));

        assert!(schema.normalize(&BTreeMap::new(), "").is_err());
    }

    #[test]
    fn reserved_and_duplicate_names_are_invalid() {
        assert!(Schema::new().field("id", FieldKind::Text).validate().is_err());
        assert!(Schema::new()
            .field("a", FieldKind::Text)
            .field("a", FieldKind::Integer)
            .validate()
            .is_err());
        assert!(player_schema().validate().is_ok());
    }

    #[test]
    fn registry_is_immutable_after_first_use() {
        let registry = SchemaRegistry::new();
        registry.register("players", player_schema()).unwrap();
        registry.register("players", player_schema()).unwrap();

        let err = registry.register("players", stats_schema()).unwrap_err();
        assert!(matches!(err, CoreError::SchemaConflict { collection } if collection == "players"));
        assert_eq!(registry.collections(), vec!["players".to_string()]);
        assert_eq!(*registry.get("players").unwrap(), player_schema());
    }
}
