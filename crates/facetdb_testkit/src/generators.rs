//! Property-based test generators using proptest.
//!
//! Provides strategies for generating random test data
//! that maintains required invariants.

use crate::entities::{Player, Stats};
use facetdb_core::query::CompareOp;
use facetdb_core::{field, Document, EntityId, Expr, Reference, Value};
use proptest::prelude::*;
use std::collections::BTreeMap;

/// Strategy for generating entity ids, UUID-shaped or caller-chosen.
pub fn entity_id_strategy() -> impl Strategy<Value = EntityId> {
    prop_oneof![
        "[0-9a-f]{8}-[0-9a-f]{4}-4[0-9a-f]{3}-[89ab][0-9a-f]{3}-[0-9a-f]{12}"
            .prop_map(EntityId::from),
        "[a-z][a-z0-9-]{0,15}".prop_map(EntityId::from),
    ]
}

/// Strategy for generating display names.
pub fn name_strategy() -> impl Strategy<Value = String> {
    "[A-Z][a-z]{0,9}"
}

/// Strategy for generating nested stats.
pub fn stats_strategy() -> impl Strategy<Value = Stats> {
    (0i64..100, 0i64..100, 0.0f64..=1.0).prop_map(|(strength, agility, accuracy)| Stats {
        strength,
        agility,
        accuracy,
    })
}

/// Strategy for generating transient players.
pub fn player_strategy() -> impl Strategy<Value = Player> {
    (
        name_strategy(),
        -1_000i64..1_000_000,
        1i64..100,
        stats_strategy(),
        prop::collection::vec("[a-z]{1,8}", 0..5),
        prop::option::of(entity_id_strategy()),
    )
        .prop_map(|(name, coins, level, stats, inventory, mount)| Player {
            name,
            coins,
            level,
            stats,
            inventory,
            mount: Reference::from_id(mount),
            ..Player::default()
        })
}

/// Strategy for generating leaf document values.
pub fn scalar_value_strategy() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(Value::Integer),
        (-1.0e9f64..1.0e9).prop_map(Value::Float),
        "[a-zA-Z0-9 ]{0,16}".prop_map(Value::Text),
    ]
}

/// Strategy for generating nested document values.
pub fn value_strategy() -> impl Strategy<Value = Value> {
    scalar_value_strategy().prop_recursive(3, 32, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
            prop::collection::btree_map("[a-z]{1,6}", inner, 0..4)
                .prop_map(|map: BTreeMap<String, Value>| Value::Map(map)),
        ]
    })
}

/// Strategy for generating documents.
pub fn document_strategy() -> impl Strategy<Value = Document> {
    prop::collection::btree_map("[a-z]{1,8}", value_strategy(), 0..6).prop_map(Document::from)
}

/// Strategy for generating single comparisons over player attributes.
pub fn player_filter_strategy() -> impl Strategy<Value = Expr> {
    let ops = prop_oneof![
        Just(CompareOp::Eq),
        Just(CompareOp::Ne),
        Just(CompareOp::Lt),
        Just(CompareOp::Le),
        Just(CompareOp::Gt),
        Just(CompareOp::Ge),
    ];
    let coins = (ops.clone(), -1_000i64..1_000_000).prop_map(|(op, n)| compare("coins", op, n));
    let level = (ops.clone(), 1i64..100).prop_map(|(op, n)| compare("level", op, n));
    let strength = (ops, 0i64..100).prop_map(|(op, n)| compare("stats.strength", op, n));
    let name = name_strategy().prop_map(|name| field("name").equals(name));
    prop_oneof![coins, level, strength, name]
}

fn compare(path: &str, op: CompareOp, n: i64) -> Expr {
    let lhs = field(path);
    match op {
        CompareOp::Eq => lhs.equals(n),
        CompareOp::Ne => lhs.not_equals(n),
        CompareOp::Lt => lhs.less_than(n),
        CompareOp::Le => lhs.at_most(n),
        CompareOp::Gt => lhs.greater_than(n),
        CompareOp::Ge | CompareOp::Contains => lhs.at_least(n),
    }
}
