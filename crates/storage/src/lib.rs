//! In-memory building blocks for the resq query cache.
//!
//! This crate provides the leaf data structures the manager in `resq` is
//! assembled from:
//!
//! - **Relation** ([`relation`]): A bidirectional many-to-many index between
//!   two key domains. The manager uses one to map resource paths to the
//!   queries that depend on them, and another to map subscribers to the
//!   queries they watch.
//!
//! - **Store** ([`store`]): A concurrent map from a key to its last computed
//!   value *and* the closure that computed it, so an entry can be refreshed
//!   in place when it gets invalidated.
//!
//! - **Single Flight** ([`single_flight`]): Async de-duplication of
//!   concurrent work on the same key. The first caller computes, everyone
//!   else awaits the same output.
//!
//! - **Keyed Mutex** ([`keyed_mutex`]): An async lock per key, used to run
//!   the refreshes of one query strictly one after the other.
//!
//! # Concurrency
//!
//! [`store::Store`], [`single_flight::SingleFlight`] and
//! [`keyed_mutex::KeyedMutex`] are internally synchronised and never hold a
//! shard lock across an `.await`.
//! [`relation::Relation`] is a plain value mutated through `&mut self`; its
//! owner decides how to serialize access to it.

pub mod keyed_mutex;
pub mod relation;
pub mod single_flight;
pub mod store;

pub(crate) mod sharded;

pub use keyed_mutex::{KeyedGuard, KeyedMutex};
pub use relation::Relation;
pub use sharded::default_shard_amount;
pub use single_flight::SingleFlight;
pub use store::{Recompute, Store};
