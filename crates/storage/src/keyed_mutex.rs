//! Asynchronous mutual exclusion per key.

use std::{
    hash::{BuildHasher, Hash},
    sync::Arc,
};

use fxhash::{FxBuildHasher, FxHashMap};
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::sharded::Sharded;

struct Slot {
    mutex: Arc<Mutex<()>>,
    users: usize,
}

/// A lock table handing out one async mutex per key.
///
/// Tasks locking the same key are admitted one at a time in the order they
/// asked; tasks locking different keys never contend beyond the shard map.
/// A key's mutex lives only while some task holds or awaits it.
pub struct KeyedMutex<K> {
    map: Sharded<FxHashMap<K, Slot>>,
    build_hasher: FxBuildHasher,
}

impl<K> std::fmt::Debug for KeyedMutex<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyedMutex").finish_non_exhaustive()
    }
}

impl<K> KeyedMutex<K> {
    /// Creates an empty lock table with `shard_amount` lock stripes.
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

/// Registration of one task on a key, held while waiting and while holding
/// the lock. The last ticket of a key removes its slot.
struct Ticket<'a, K: Eq + Hash> {
    keyed_mutex: &'a KeyedMutex<K>,
    key: K,
    shard_index: usize,
    mutex: Arc<Mutex<()>>,
}

impl<K: Eq + Hash> Drop for Ticket<'_, K> {
    fn drop(&mut self) {
        let mut shard = self.keyed_mutex.map.write_shard(self.shard_index);

        let vacant = shard.get_mut(&self.key).is_some_and(|slot| {
            slot.users -= 1;
            slot.users == 0
        });

        if vacant {
            shard.remove(&self.key);
        }
    }
}

/// Exclusive access to one key of a [`KeyedMutex`], released on drop.
pub struct KeyedGuard<'a, K: Eq + Hash> {
    _guard: OwnedMutexGuard<()>,
    _ticket: Ticket<'a, K>,
}

impl<K: Eq + Hash> std::fmt::Debug for KeyedGuard<'_, K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyedGuard").finish_non_exhaustive()
    }
}

impl<K: Eq + Hash + Clone> KeyedMutex<K> {
    /// Waits until no other task holds `key` and locks it.
    ///
    /// Dropping the returned future while it waits gives up the place in
    /// line without affecting other waiters.
    pub async fn lock(&self, key: &K) -> KeyedGuard<'_, K> {
        let ticket = self.enter(key);
        let guard = ticket.mutex.clone().lock_owned().await;

        KeyedGuard { _guard: guard, _ticket: ticket }
    }

    /// Returns `true` if some task holds or awaits `key`.
    pub fn in_use(&self, key: &K) -> bool {
        let shard_index = self.map.shard_index(self.build_hasher.hash_one(key));
        self.map.read_shard(shard_index).contains_key(key)
    }

    fn enter(&self, key: &K) -> Ticket<'_, K> {
        let shard_index = self.map.shard_index(self.build_hasher.hash_one(key));

        let mutex = {
            let mut shard = self.map.write_shard(shard_index);
            let slot = shard.entry(key.clone()).or_insert_with(|| Slot {
                mutex: Arc::new(Mutex::new(())),
                users: 0,
            });
            slot.users += 1;

            slot.mutex.clone()
        };

        Ticket { keyed_mutex: self, key: key.clone(), shard_index, mutex }
    }
}

#[cfg(test)]
mod test {
    use std::{sync::Arc, time::Duration};

    use parking_lot::Mutex;

    use super::KeyedMutex;

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn same_key_is_exclusive() {
        let keyed_mutex = Arc::new(KeyedMutex::<u8>::new(4));
        let log = Arc::new(Mutex::new(Vec::new()));

        let first = {
            let keyed_mutex = keyed_mutex.clone();
            let log = log.clone();
            tokio::spawn(async move {
                let _guard = keyed_mutex.lock(&1).await;
                log.lock().push("first start");
                tokio::time::sleep(Duration::from_millis(50)).await;
                log.lock().push("first end");
            })
        };

        while !keyed_mutex.in_use(&1) {
            tokio::task::yield_now().await;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;

        {
            let _guard = keyed_mutex.lock(&1).await;
            log.lock().push("second");
        }

        first.await.unwrap();

        assert_eq!(*log.lock(), ["first start", "first end", "second"]);
        assert!(!keyed_mutex.in_use(&1));
    }

    #[tokio::test]
    async fn different_keys_do_not_contend() {
        let keyed_mutex = KeyedMutex::<&str>::new(2);

        let _a = keyed_mutex.lock(&"a").await;
        let _b = keyed_mutex.lock(&"b").await;

        assert!(keyed_mutex.in_use(&"a"));
        assert!(keyed_mutex.in_use(&"b"));
    }

    #[tokio::test]
    async fn abandoned_waiter_leaves_no_slot() {
        let keyed_mutex = KeyedMutex::<u8>::new(2);

        let guard = keyed_mutex.lock(&1).await;
        let waited = tokio::time::timeout(
            Duration::from_millis(10),
            keyed_mutex.lock(&1),
        )
        .await;
        assert!(waited.is_err());

        drop(guard);

        assert!(!keyed_mutex.in_use(&1));
    }
}
