//! Configuration of the [`Manager`](crate::Manager).
//!
//! The [`Config`] trait selects the hasher used by the manager's internal
//! maps and how finely its concurrent structures are striped.
//! [`DefaultConfig`] is suitable for most applications:
//!
//! ```rust
//! use resq::{Config, Manager};
//!
//! #[derive(
//!     Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default,
//! )]
//! struct SmallConfig;
//!
//! impl Config for SmallConfig {
//!     type BuildHasher = fxhash::FxBuildHasher;
//!
//!     // a single-core deployment gains nothing from many shards
//!     fn shard_amount() -> usize { 2 }
//! }
//!
//! let manager = Manager::<SmallConfig>::with_config();
//! # drop(manager);
//! ```

use std::{
    fmt::Debug,
    hash::{BuildHasher, Hash},
};

use fxhash::FxBuildHasher;

/// Configuration trait for the manager.
///
/// All implementations must be `Send + Sync` since a manager is shared by
/// every request handler of the process.
pub trait Config:
    Default
    + Debug
    + Clone
    + Copy
    + PartialEq
    + Eq
    + PartialOrd
    + Ord
    + Hash
    + Send
    + Sync
    + 'static
{
    /// The standard hasher builder used for the store and both relations.
    type BuildHasher: BuildHasher + Default + Clone + Send + Sync + 'static;

    /// The number of lock stripes for the store and the single-flight group.
    ///
    /// Must be a power of two.
    ///
    /// # Default Value
    ///
    /// Four stripes per available core, rounded up to a power of two.
    #[must_use]
    fn shard_amount() -> usize { resq_storage::default_shard_amount() }
}

/// The default configuration, hashing with `FxHash`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default,
)]
pub struct DefaultConfig;

impl Config for DefaultConfig {
    type BuildHasher = FxBuildHasher;
}
