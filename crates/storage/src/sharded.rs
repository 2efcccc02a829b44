//! Lock striping over a fixed, power-of-two number of shards.

use std::sync::OnceLock;

use crossbeam_utils::CachePadded;
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};

/// A value split into independently locked shards.
///
/// Each shard is cache padded so that writers hammering neighbouring shards
/// do not false-share a cache line.
pub(crate) struct Sharded<T> {
    shards: Box<[CachePadded<RwLock<T>>]>,
    mask: usize,
}

impl<T> Sharded<T> {
    pub fn new(
        shard_amount: usize,
        mut make_shard: impl FnMut(usize) -> T,
    ) -> Self {
        assert!(
            shard_amount.is_power_of_two(),
            "shard_amount must be a power of two"
        );

        let shards = (0..shard_amount)
            .map(|i| CachePadded::new(RwLock::new(make_shard(i))))
            .collect::<Vec<_>>();

        Self { shards: shards.into_boxed_slice(), mask: shard_amount - 1 }
    }

    pub fn read_shard(&self, shard_index: usize) -> RwLockReadGuard<'_, T> {
        self.shards[shard_index].read()
    }

    pub fn write_shard(&self, shard_index: usize) -> RwLockWriteGuard<'_, T> {
        self.shards[shard_index].write()
    }

    #[allow(clippy::cast_possible_truncation)]
    pub const fn shard_index(&self, hash: u64) -> usize {
        (hash as usize) & self.mask
    }
}

/// The shard amount used when nothing else is configured: four shards per
/// available core, rounded up to a power of two.
#[must_use]
pub fn default_shard_amount() -> usize {
    static SHARD_AMOUNT: OnceLock<usize> = OnceLock::new();
    *SHARD_AMOUNT.get_or_init(|| {
        (std::thread::available_parallelism().map_or(1, usize::from) * 4)
            .next_power_of_two()
    })
}
