//! Stress drivers for FacetDB.
//!
//! These drive heavy load and concurrent transactions against a database and
//! report throughput; the suites assert on the database state afterwards.

use crate::entities::Player;
use facetdb_core::{CoreError, CoreResult, Database, EntityId, Session};
use rand::Rng;
use std::thread;
use std::time::{Duration, Instant};

/// Result of a stress test run.
#[derive(Debug, Clone)]
pub struct StressTestResult {
    /// Total operations performed.
    pub total_ops: usize,
    /// Successful operations.
    pub successful_ops: usize,
    /// Failed operations.
    pub failed_ops: usize,
    /// Total duration.
    pub duration: Duration,
    /// Operations per second.
    pub ops_per_second: f64,
}

impl StressTestResult {
    /// Creates a new result.
    pub fn new(successful: usize, failed: usize, duration: Duration) -> Self {
        let total = successful + failed;
        let ops_per_second = if duration.as_secs_f64() > 0.0 {
            total as f64 / duration.as_secs_f64()
        } else {
            0.0
        };

        Self {
            total_ops: total,
            successful_ops: successful,
            failed_ops: failed,
            duration,
            ops_per_second,
        }
    }

    /// Prints a summary of the test.
    pub fn print_summary(&self, name: &str) {
        println!("\n=== {name} ===");
        println!("Total operations: {}", self.total_ops);
        println!("Successful: {}", self.successful_ops);
        println!("Failed: {}", self.failed_ops);
        println!("Duration: {:?}", self.duration);
        println!("Throughput: {:.2} ops/sec", self.ops_per_second);
    }
}

/// Configuration for stress tests.
#[derive(Debug, Clone)]
pub struct StressConfig {
    /// Operations per thread.
    pub operations: usize,
    /// Number of concurrent threads.
    pub threads: usize,
    /// Retry budget per transaction.
    pub max_retries: u32,
}

impl Default for StressConfig {
    fn default() -> Self {
        Self {
            operations: 100,
            threads: 4,
            max_retries: 50,
        }
    }
}

/// Saves `config.operations` new players from one thread.
pub fn stress_sequential_saves(db: &Database, config: &StressConfig) -> StressTestResult {
    let start = Instant::now();
    let mut successful = 0usize;
    let mut failed = 0usize;

    for n in 0..config.operations {
        let mut player = Player::new(&format!("bulk-{n}"), n as i64);
        match db.save(&mut player) {
            Ok(()) => successful += 1,
            Err(_) => failed += 1,
        }
    }

    StressTestResult::new(successful, failed, start.elapsed())
}

/// Moves one coin between two random players, locking both in random order.
///
/// Opposite lock orders make deadlocks likely; each transfer is retried up
/// to `config.max_retries` times.
pub fn stress_concurrent_transfers(
    db: &Database,
    players: &[EntityId],
    config: &StressConfig,
) -> StressTestResult {
    assert!(players.len() >= 2, "transfers need two players");
    let start = Instant::now();

    let (successful, failed) = thread::scope(|scope| {
        let workers: Vec<_> = (0..config.threads)
            .map(|_| {
                scope.spawn(|| {
                    let mut rng = rand::thread_rng();
                    let mut successful = 0usize;
                    let mut failed = 0usize;
                    for _ in 0..config.operations {
                        let from = rng.gen_range(0..players.len());
                        let mut to = rng.gen_range(0..players.len() - 1);
                        if to >= from {
                            to += 1;
                        }
                        match transfer(db, &players[from], &players[to], 1, config.max_retries) {
                            Ok(()) => successful += 1,
                            Err(_) => failed += 1,
                        }
                    }
                    (successful, failed)
                })
            })
            .collect();

        workers
            .into_iter()
            .map(|worker| worker.join().expect("stress worker panicked"))
            .fold((0, 0), |(s, f), (ws, wf)| (s + ws, f + wf))
    });

    StressTestResult::new(successful, failed, start.elapsed())
}

/// Moves `amount` coins from one player to another in a transaction.
///
/// # Errors
///
/// Fails if either player is missing or the transaction gives up.
pub fn transfer(
    db: &Database,
    from: &EntityId,
    to: &EntityId,
    amount: i64,
    max_retries: u32,
) -> CoreResult<()> {
    db.run_in_transaction(max_retries, |txn| {
        let mut payer = load(txn, from)?;
        let mut payee = load(txn, to)?;
        txn.lock_for_update(&mut payer)?;
        txn.lock_for_update(&mut payee)?;
        payer.coins -= amount;
        payee.coins += amount;
        txn.save(&mut payer)?;
        txn.save(&mut payee)
    })
}

fn load(session: &impl Session, id: &EntityId) -> CoreResult<Player> {
    session
        .find::<Player>(id.clone())?
        .ok_or_else(|| CoreError::not_found("players", id.as_str()))
}

/// Sum of all player balances.
pub fn total_coins(db: &Database) -> CoreResult<i64> {
    Ok(db.query::<Player>().get()?.iter().map(|p| p.coins).sum())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::scenarios;

    #[test]
    fn sequential_saves_all_succeed() {
        let db = Database::open_in_memory().unwrap();
        let config = StressConfig {
            operations: 25,
            ..StressConfig::default()
        };
        let result = stress_sequential_saves(&db, &config);
        assert_eq!(result.successful_ops, 25);
        assert_eq!(db.count("players"), 25);
    }

    #[test]
    fn transfer_moves_coins() {
        let (test_db, players) = scenarios::roster(2, 10);
        let ids: Vec<_> = players.iter().filter_map(|p| p.meta.id().cloned()).collect();
        transfer(&test_db, &ids[0], &ids[1], 3, 0).unwrap();
        assert_eq!(total_coins(&test_db).unwrap(), 20);
        let payer: Player = test_db.find(ids[0].clone()).unwrap().unwrap();
        assert_eq!(payer.coins, 7);
    }
}
