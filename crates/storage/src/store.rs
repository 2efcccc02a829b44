//! Memoized values paired with the closures that recompute them.

use std::{
    hash::{BuildHasher, Hash},
    sync::Arc,
};

use dashmap::DashMap;
use futures::{FutureExt, future::BoxFuture};
use fxhash::FxBuildHasher;

/// A type-erased closure that recomputes a stored value.
pub type Recompute<V> = Arc<dyn Fn() -> BoxFuture<'static, V> + Send + Sync>;

struct Entry<V> {
    value: V,
    recompute: Recompute<V>,
}

/// Maps a key to its last computed value and to the closure that produced it.
///
/// Keeping the closure next to the value is what allows a cache entry to be
/// refreshed in place via [`Store::reset`] without the caller supplying the
/// computation again.
///
/// No map lock is held while a computation runs, so computations are free to
/// suspend and to touch the store themselves.
pub struct Store<K, V, S = FxBuildHasher> {
    entries: DashMap<K, Entry<V>, S>,
}

impl<K, V, S> std::fmt::Debug for Store<K, V, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store").finish_non_exhaustive()
    }
}

impl<K, V, S> Store<K, V, S>
where
    K: Eq + Hash + Clone,
    V: Clone + Send + 'static,
    S: BuildHasher + Default + Clone,
{
    /// Creates an empty store striped over `shard_amount` shards.
    ///
    /// # Panics
    ///
    /// Panics if `shard_amount` is not a power of two.
    #[must_use]
    pub fn new(mut shard_amount: usize) -> Self {
        // dashmap requires at least two shards
        if shard_amount == 1 {
            shard_amount = 2;
        }

        Self {
            entries: DashMap::with_hasher_and_shard_amount(
                S::default(),
                shard_amount,
            ),
        }
    }

    /// Returns `true` if a value is stored under `key`.
    pub fn has(&self, key: &K) -> bool { self.entries.contains_key(key) }

    /// Returns a clone of the value stored under `key`, if any.
    pub fn read(&self, key: &K) -> Option<V> {
        self.entries.get(key).map(|entry| entry.value.clone())
    }

    /// Invokes `compute` and returns its output.
    ///
    /// The output and `compute` itself are stored under `key` only when
    /// `keep` accepts the output; a rejected output is never visible to
    /// readers.
    pub async fn set<F, Fut>(
        &self,
        key: K,
        compute: F,
        keep: impl FnOnce(&V) -> bool,
    ) -> V
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = V> + Send + 'static,
    {
        let recompute: Recompute<V> = Arc::new(move || compute().boxed());
        let value = recompute().await;

        if keep(&value) {
            self.entries
                .insert(key, Entry { value: value.clone(), recompute });
        }

        value
    }

    /// Re-invokes the closure stored under `key`.
    ///
    /// An output accepted by `keep` replaces the stored value; a rejected
    /// one removes the entry. Returns `None` if nothing is stored under
    /// `key`, or if the entry was removed while the closure ran, in which
    /// case the output is discarded.
    pub async fn reset(
        &self,
        key: &K,
        keep: impl FnOnce(&V) -> bool,
    ) -> Option<V> {
        let recompute = self.entries.get(key)?.recompute.clone();
        let value = recompute().await;

        if keep(&value) {
            let mut entry = self.entries.get_mut(key)?;
            entry.value = value.clone();
        } else {
            self.entries.remove(key)?;
        }

        Some(value)
    }

    /// Removes the value and the closure stored under `key`.
    ///
    /// Removing an absent key is a no-op.
    pub fn remove(&self, key: &K) { self.entries.remove(key); }

    /// Returns the number of stored entries.
    pub fn len(&self) -> usize { self.entries.len() }

    /// Returns `true` if the store holds no entries.
    pub fn is_empty(&self) -> bool { self.entries.is_empty() }

    /// Returns a snapshot of every stored key.
    pub fn keys(&self) -> Vec<K> {
        self.entries.iter().map(|entry| entry.key().clone()).collect()
    }
}

#[cfg(test)]
mod test;
