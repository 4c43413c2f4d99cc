//! Benchmark utilities.

use facetdb_core::{Database, Entity, EntityId, Session};
use facetdb_testkit::Player;
use rand::Rng;

/// Generate a player with random attributes and `items` inventory entries.
pub fn random_player(items: usize) -> Player {
    let mut rng = rand::thread_rng();
    let mut player = Player::new(&format!("player-{}", rng.gen::<u32>()), rng.gen_range(0..10_000));
    player.level = rng.gen_range(1..100);
    player.stats.strength = rng.gen_range(0..100);
    player.stats.agility = rng.gen_range(0..100);
    player.inventory = (0..items).map(|n| format!("item-{n}")).collect();
    player
}

/// Save `count` random players and return their ids.
pub fn populate(db: &Database, count: usize) -> Vec<EntityId> {
    (0..count)
        .map(|_| {
            let mut player = random_player(4);
            db.save(&mut player).unwrap();
            player.id().cloned().unwrap()
        })
        .collect()
}
