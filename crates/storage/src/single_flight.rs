//! A single-flight implementation to suppress duplicate work.

use std::{
    collections::hash_map::Entry,
    hash::{BuildHasher, Hash},
    sync::Arc,
};

use fxhash::{FxBuildHasher, FxHashMap};
use parking_lot::Mutex;
use tokio::sync::{Notify, futures::OwnedNotified};

use crate::sharded::Sharded;

struct Flight<T> {
    notify: Arc<Notify>,
    output: Mutex<Option<T>>,
}

/// A single-flight mechanism to ensure that only one concurrent operation
/// is performed for a given key.
///
/// Other concurrent requests for the same key wait for the first operation to
/// complete and receive a clone of its output.
pub struct SingleFlight<K, T> {
    map: Sharded<FxHashMap<K, Arc<Flight<T>>>>,
    build_hasher: FxBuildHasher,
}

impl<K, T> std::fmt::Debug for SingleFlight<K, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SingleFlight").finish_non_exhaustive()
    }
}

impl<K, T> SingleFlight<K, T> {
    /// Creates a new single-flight group with `shard_amount` lock stripes.
    ///
    /// # Panics
    ///
    /// Panics if `shard_amount` is not a power of two.
    #[must_use]
    pub fn new(shard_amount: usize) -> Self {
        Self {
            map: Sharded::new(shard_amount, |_| FxHashMap::default()),
            build_hasher: FxBuildHasher::default(),
        }
    }
}

enum Role<T> {
    Worker(Arc<Flight<T>>),
    Waiter(Arc<Flight<T>>, OwnedNotified),
}

/// Removes the flight from the map and wakes every waiter, whether the worker
/// finished or its future got dropped half way.
struct Land<'a, K: Eq + Hash, T> {
    single_flight: &'a SingleFlight<K, T>,
    key: &'a K,
    shard_index: usize,
    flight: Arc<Flight<T>>,
}

impl<K: Eq + Hash, T> Drop for Land<'_, K, T> {
    fn drop(&mut self) {
        self.single_flight.map.write_shard(self.shard_index).remove(self.key);
        self.flight.notify.notify_waiters();
    }
}

impl<K: Eq + Hash + Clone, T: Clone> SingleFlight<K, T> {
    /// Runs `work` if no operation for `key` is in flight, otherwise waits
    /// for the in-flight operation and returns a clone of its output.
    ///
    /// If the worker is cancelled before producing an output, the waiters
    /// race again and one of them runs its own `work`.
    pub async fn work_or_wait<F>(&self, key: &K, work: F) -> T
    where
        F: Future<Output = T>,
    {
        let shard_index = self.map.shard_index(self.build_hasher.hash_one(key));

        loop {
            let role = {
                let mut shard = self.map.write_shard(shard_index);

                match shard.entry(key.clone()) {
                    Entry::Occupied(occupied_entry) => {
                        let flight = occupied_entry.get().clone();
                        let notified = flight.notify.clone().notified_owned();

                        Role::Waiter(flight, notified)
                    }
                    Entry::Vacant(vacant_entry) => {
                        let flight = Arc::new(Flight {
                            notify: Arc::new(Notify::new()),
                            output: Mutex::new(None),
                        });
                        vacant_entry.insert(flight.clone());

                        Role::Worker(flight)
                    }
                }
            };

            match role {
                Role::Waiter(flight, notified) => {
                    notified.await;

                    if let Some(output) = flight.output.lock().clone() {
                        return output;
                    }

                    // the worker got cancelled, try again
                }

                Role::Worker(flight) => {
                    let land =
                        Land { single_flight: self, key, shard_index, flight };

                    let output = work.await;
                    *land.flight.output.lock() = Some(output.clone());

                    drop(land);

                    return output;
                }
            }
        }
    }

    /// Returns `true` if an operation for `key` is currently in flight.
    pub fn in_flight(&self, key: &K) -> bool {
        let shard_index = self.map.shard_index(self.build_hasher.hash_one(key));
        self.map.read_shard(shard_index).contains_key(key)
    }
}
