//! Sample game entities.
//!
//! A small game domain used across the integration suites: players own
//! nested stats and an inventory, and may ride a motorbike through a
//! reference.

use chrono::{DateTime, Utc};
use facetdb_core::{
    Attributes, CoreResult, Entity, EntityMeta, Field, FieldKind, FromValue, Reference, Schema,
    ToValue, Value,
};

/// Nested value object without identity.
#[derive(Debug, Clone, PartialEq)]
pub struct Stats {
    /// Raw strength.
    pub strength: i64,
    /// Raw agility.
    pub agility: i64,
    /// Hit ratio in `0.0..=1.0`.
    pub accuracy: f64,
}

impl Default for Stats {
    fn default() -> Self {
        Self {
            strength: 0,
            agility: 0,
            accuracy: 1.0,
        }
    }
}

impl Stats {
    /// Schema of the nested object.
    #[must_use]
    pub fn schema() -> Schema {
        Schema::new()
            .field("strength", FieldKind::Integer)
            .field("agility", FieldKind::Integer)
            .with(Field::new("accuracy", FieldKind::Float).default_value(1.0))
    }
}

impl ToValue for Stats {
    fn to_value(&self) -> Value {
        Attributes::new()
            .with("strength", self.strength)
            .with("agility", self.agility)
            .with("accuracy", self.accuracy)
            .to_value()
    }
}

impl FromValue for Stats {
    fn from_value(value: &Value) -> CoreResult<Self> {
        let attrs = Attributes::from_value(value)?;
        Ok(Self {
            strength: attrs.get("strength")?,
            agility: attrs.get("agility")?,
            accuracy: attrs.get("accuracy")?,
        })
    }
}

/// A player account.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Player {
    /// Persistence metadata.
    pub meta: EntityMeta,
    /// Display name.
    pub name: String,
    /// Currency balance.
    pub coins: i64,
    /// Experience level.
    pub level: i64,
    /// Character stats.
    pub stats: Stats,
    /// Item names.
    pub inventory: Vec<String>,
    /// Current ride, if any.
    pub mount: Reference<Motorbike>,
    /// Last login time.
    pub last_login: Option<DateTime<Utc>>,
}

impl Player {
    /// A transient player with a name and balance.
    #[must_use]
    pub fn new(name: &str, coins: i64) -> Self {
        Self {
            name: name.to_string(),
            coins,
            level: 1,
            ..Self::default()
        }
    }
}

impl Entity for Player {
    const COLLECTION: &'static str = "players";

    fn schema() -> Schema {
        Schema::new()
            .field("name", FieldKind::Text)
            .field("coins", FieldKind::Integer)
            .with(Field::new("level", FieldKind::Integer).default_value(1))
            .field("stats", FieldKind::Object(Stats::schema()))
            .field("inventory", FieldKind::list(FieldKind::Text))
            .field("mount", FieldKind::reference_to::<Motorbike>())
            .with(Field::new("lastLogin", FieldKind::Timestamp).nullable())
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
            .with("level", self.level)
            .with("stats", &self.stats)
            .with("inventory", &self.inventory)
            .with("mount", &self.mount)
            .with("lastLogin", self.last_login)
    }

    fn apply_attributes(&mut self, attrs: &Attributes) -> CoreResult<()> {
        self.name = attrs.get("name")?;
        self.coins = attrs.get("coins")?;
        self.level = attrs.get("level")?;
        self.stats = attrs.get("stats")?;
        self.inventory = attrs.get("inventory")?;
        self.mount = attrs.get("mount")?;
        self.last_login = attrs.get("lastLogin")?;
        Ok(())
    }
}

/// A rideable vehicle.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Motorbike {
    /// Persistence metadata.
    pub meta: EntityMeta,
    /// Model name.
    pub model: String,
    /// Top speed in km/h.
    pub top_speed: f64,
}

impl Motorbike {
    /// A transient motorbike.
    #[must_use]
    pub fn new(model: &str, top_speed: f64) -> Self {
        Self {
            model: model.to_string(),
            top_speed,
            ..Self::default()
        }
    }
}

impl Entity for Motorbike {
    const COLLECTION: &'static str = "motorbikes";

    fn schema() -> Schema {
        Schema::new()
            .field("model", FieldKind::Text)
            .field("topSpeed", FieldKind::Float)
    }

    fn meta(&self) -> &EntityMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut EntityMeta {
        &mut self.meta
    }

    fn to_attributes(&self) -> Attributes {
        Attributes::new()
            .with("model", &self.model)
            .with("topSpeed", self.top_speed)
    }

    fn apply_attributes(&mut self, attrs: &Attributes) -> CoreResult<()> {
        self.model = attrs.get("model")?;
        self.top_speed = attrs.get("topSpeed")?;
        Ok(())
    }
}
