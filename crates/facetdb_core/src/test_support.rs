//! Entities shared by the unit tests.

use crate::entity::{Entity, EntityMeta};
use crate::error::CoreResult;
use crate::reference::Reference;
use crate::schema::{Attributes, Field, FieldKind, FromValue, Schema, ToValue};
use facetdb_codec::Value;

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Badge {
    pub title: String,
    pub rank: i64,
}

impl Badge {
    fn schema() -> Schema {
        Schema::new()
            .field("title", FieldKind::Text)
            .field("rank", FieldKind::Integer)
    }
}

impl ToValue for Badge {
    fn to_value(&self) -> Value {
        Attributes::new()
            .with("title", &self.title)
            .with("rank", self.rank)
            .to_value()
    }
}

impl FromValue for Badge {
    fn from_value(value: &Value) -> CoreResult<Self> {
        let attrs = Attributes::from_value(value)?;
        Ok(Self {
            title: attrs.get("title")?,
            rank: attrs.get("rank")?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Mount {
    pub meta: EntityMeta,
    pub model: String,
}

impl Entity for Mount {
    const COLLECTION: &'static str = "mounts";

    fn schema() -> Schema {
        Schema::new().field("model", FieldKind::Text)
    }

    fn meta(&self) -> &EntityMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut EntityMeta {
        &mut self.meta
    }

    fn to_attributes(&self) -> Attributes {
        Attributes::new().with("model", &self.model)
    }

    fn apply_attributes(&mut self, attrs: &Attributes) -> CoreResult<()> {
        self.model = attrs.get("model")?;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Hero {
    pub meta: EntityMeta,
    pub name: String,
    pub coins: i64,
    pub badges: Vec<Badge>,
    pub mount: Reference<Mount>,
    pub motto: Option<String>,
}

impl Hero {
    pub fn named(name: &str, coins: i64) -> Self {
        Self {
            name: name.to_string(),
            coins,
            ..Self::default()
        }
    }
}

impl Entity for Hero {
    const COLLECTION: &'static str = "heroes";

    fn schema() -> Schema {
        Schema::new()
            .field("name", FieldKind::Text)
            .field("coins", FieldKind::Integer)
            .field("badges", FieldKind::list(FieldKind::Object(Badge::schema())))
            .field("mount", FieldKind::reference_to::<Mount>())
            .with(Field::new("motto", FieldKind::Text).nullable())
    }

    fn meta(&self) -> &EntityMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut EntityMeta {
        &mut self.meta
    }

    fn to_attributes(&self) -> Attributes {
        Attributes::new()
            .with("name", &self.name)
            .with("coins", self.coins)
            .with("badges", &self.badges)
            .with("mount", &self.mount)
            .with("motto", &self.motto)
    }

    fn apply_attributes(&mut self, attrs: &Attributes) -> CoreResult<()> {
        self.name = attrs.get("name")?;
        self.coins = attrs.get("coins")?;
        self.badges = attrs.get("badges")?;
        self.mount = attrs.get("mount")?;
        self.motto = attrs.get("motto")?;
        Ok(())
    }
}
