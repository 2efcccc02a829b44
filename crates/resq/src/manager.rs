//! The cache, dependency graph and subscription orchestrator.
//!
//! # Architecture Overview
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                          Manager<C>                              │
//! │  ┌────────────────────┐  ┌──────────────────────────────────┐    │
//! │  │ Store              │  │ Relation<Path, QueryKey>         │    │
//! │  │  query → state     │  │  path → queries depending on it  │    │
//! │  │  query → recompute │  └──────────────────────────────────┘    │
//! │  └────────────────────┘  ┌──────────────────────────────────┐    │
//! │  ┌────────────────────┐  │ Relation<Client, QueryKey>       │    │
//! │  │ SingleFlight       │  │  client → queries it watches     │    │
//! │  │  query → in flight │  └──────────────────────────────────┘    │
//! │  └────────────────────┘                                          │
//! │  ┌────────────────────┐                                          │
//! │  │ KeyedMutex         │                                          │
//! │  │  query → lock      │                                          │
//! │  └────────────────────┘                                          │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Flow
//!
//! 1. **Execute** a cacheable operation: the first call computes the state,
//!    stores it with its recomputation closure and links every path it
//!    depends on to its query. Later calls are served from the store.
//! 2. **Execute** a mutating operation: the state is computed directly and,
//!    if it is not an error, every declared dependent path is invalidated.
//! 3. **Invalidate** a path: every query linked from it is recomputed in
//!    place, its edges are rebuilt and its subscribers receive the new
//!    state. A query that now fails is torn down.
//! 4. **Subscribe** to a computed query to receive every future state.

use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use resq_storage::{KeyedMutex, Relation, SingleFlight, Store};

use crate::{
    client::Client,
    config::{Config, DefaultConfig},
    key::{Args, Path, QueryKey},
    operation::Operation,
    state::State,
};

mod guard;

use guard::CompleteOnDrop;

/// An observer notified of every invalidated path before recomputation
/// starts.
///
/// Implemented for every `Fn(&Path) + Send + Sync` closure.
pub trait InvalidationListener: Send + Sync + 'static {
    /// Called with the path being invalidated.
    fn on_invalidate(&self, path: &Path);
}

impl<F: Fn(&Path) + Send + Sync + 'static> InvalidationListener for F {
    fn on_invalidate(&self, path: &Path) { self(path); }
}

struct Inner<C: Config> {
    store: Store<QueryKey, State, C::BuildHasher>,
    dependencies: Mutex<Relation<Path, QueryKey, C::BuildHasher>>,
    subscriptions: Mutex<Relation<Client, QueryKey, C::BuildHasher>>,
    listeners: RwLock<Vec<Arc<dyn InvalidationListener>>>,
    in_flight: SingleFlight<QueryKey, State>,
    locks: KeyedMutex<QueryKey>,
}

/// The query cache and invalidation engine.
///
/// A manager owns the cached states, the graph linking resource paths to the
/// queries that depend on them, and the registry of subscribers. It is meant
/// to be created once per process and handed to every request handler;
/// cloning it is cheap and every clone refers to the same state.
///
/// # Thread Safety
///
/// The store and each relation are serialized independently. No
/// synchronous lock is held while an operation's handler runs or while a
/// subscriber callback is invoked, so handlers and callbacks may call back
/// into the manager.
///
/// At most one computation per uncached query is in flight at a time;
/// concurrent executions of the same query await that computation and
/// receive its state. Computations and refreshes of one query are
/// serialized by a per-query async lock, which is the only lock held while
/// a handler runs. A handler must therefore not invalidate a path its own
/// query depends on.
///
/// # Cancellation
///
/// Dropping the future returned by [`Manager::execute`] or
/// [`Manager::invalidate`] does not abort the cache and graph updates it
/// started; they complete on the tokio runtime. The manager therefore has to
/// be used from within a tokio runtime.
pub struct Manager<C: Config = DefaultConfig> {
    inner: Arc<Inner<C>>,
}

static_assertions::assert_impl_all!(Manager<DefaultConfig>: Send, Sync);

impl<C: Config> Clone for Manager<C> {
    fn clone(&self) -> Self { Self { inner: self.inner.clone() } }
}

impl<C: Config> Default for Manager<C> {
    fn default() -> Self { Self::with_config() }
}

impl<C: Config> std::fmt::Debug for Manager<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Manager")
            .field("cached_queries", &self.inner.store.len())
            .finish_non_exhaustive()
    }
}

impl Manager {
    /// Creates an empty manager with the [`DefaultConfig`].
    #[must_use]
    pub fn new() -> Self { Self::with_config() }
}

impl<C: Config> Manager<C> {
    /// Creates an empty manager for the configuration `C`.
    #[must_use]
    pub fn with_config() -> Self {
        Self {
            inner: Arc::new(Inner {
                store: Store::new(C::shard_amount()),
                dependencies: Mutex::new(Relation::new()),
                subscriptions: Mutex::new(Relation::new()),
                listeners: RwLock::new(Vec::new()),
                in_flight: SingleFlight::new(C::shard_amount()),
                locks: KeyedMutex::new(C::shard_amount()),
            }),
        }
    }

    /// Registers a listener notified of every invalidated path.
    pub fn add_listener(&self, listener: impl InvalidationListener) {
        self.inner.listeners.write().push(Arc::new(listener));
    }
}

impl<C: Config> Manager<C> {
    /// Executes `operation` with `args`.
    ///
    /// For a cacheable operation the state is served from the cache when the
    /// query has already been computed; otherwise it is computed, cached,
    /// and its dependency paths are linked to the query. An error state is
    /// never cached: its query is torn down instead.
    ///
    /// For a mutating operation the state is always computed and, unless it
    /// is an error, every distinct dependent path is invalidated before this
    /// returns.
    ///
    /// Arguments that cannot fill the operation's path template yield a
    /// `400 Bad Request` state without invoking the handler.
    #[tracing::instrument(
        skip(self, operation, args),
        fields(path = %operation.path()),
        level = "debug"
    )]
    pub async fn execute(&self, operation: &Operation, args: Args) -> State {
        let query = match QueryKey::derive(operation.path(), &args) {
            Ok(query) => query,
            Err(error) => {
                tracing::debug!(%error, "rejected arguments");
                return State::bad_request(error.to_string());
            }
        };

        if operation.is_cacheable() {
            self.execute_cacheable(operation, args, query).await
        } else {
            self.execute_mutation(operation, args, query).await
        }
    }

    async fn execute_cacheable(
        &self,
        operation: &Operation,
        args: Args,
        query: QueryKey,
    ) -> State {
        // FAST PATH: cache hit, no side effects
        if let Some(state) = self.inner.store.read(&query) {
            tracing::debug!(%query, "cache hit");
            return state;
        }

        if self.inner.in_flight.in_flight(&query) {
            tracing::debug!(%query, "joining in-flight computation");
        }

        let manager = self.clone();
        let operation = operation.clone();

        async move {
            let work = manager.compute(operation, args, query.clone());
            manager.inner.in_flight.work_or_wait(&query, work).await
        }
        .complete_on_drop()
        .await
    }

    /// Computes and caches `query`. Runs at most once at a time per query.
    async fn compute(
        &self,
        operation: Operation,
        args: Args,
        query: QueryKey,
    ) -> State {
        let _guard = self.inner.locks.lock(&query).await;

        // a previous flight may have landed between the cache check and
        // joining this one
        if let Some(state) = self.inner.store.read(&query) {
            return state;
        }

        let recompute = {
            let query = query.clone();
            move || {
                let operation = operation.clone();
                let args = args.clone();
                let query = query.clone();

                async move { operation.call(args).await.with_query(query) }
            }
        };

        let state =
            self.inner.store.set(query.clone(), recompute, is_cacheable).await;

        if !state.is_error() {
            self.relink(&query, &state);
        }

        state
    }

    async fn execute_mutation(
        &self,
        operation: &Operation,
        args: Args,
        query: QueryKey,
    ) -> State {
        let state = operation.call(args.clone()).await.with_query(query);

        if state.is_error() {
            return state;
        }

        let manager = self.clone();
        let paths = operation.dependent_paths(&args);

        async move {
            for path in paths {
                manager.refresh(&path).await;
            }
        }
        .complete_on_drop()
        .await;

        state
    }

    /// Invalidates `path`.
    ///
    /// Listeners are notified first. Then every query currently depending on
    /// `path` is recomputed once with its stored closure: on success its
    /// dependency edges are rebuilt and the new state is pushed to its
    /// subscribers; on error the query is removed from the cache, its edges
    /// are stripped and each subscriber is notified with `None` and
    /// unsubscribed.
    ///
    /// Dependencies declared by the recomputed states only apply to later
    /// invalidations; this call does not follow them.
    pub async fn invalidate(&self, path: &Path) {
        let manager = self.clone();
        let path = path.clone();

        async move { manager.refresh(&path).await }.complete_on_drop().await;
    }

    #[tracing::instrument(skip(self), level = "debug")]
    async fn refresh(&self, path: &Path) {
        let listeners = self.inner.listeners.read().clone();
        for listener in listeners {
            listener.on_invalidate(path);
        }

        let queries = self.inner.dependencies.lock().from(path);

        for query in queries {
            let _guard = self.inner.locks.lock(&query).await;

            // removed since the snapshot was taken
            let Some(state) =
                self.inner.store.reset(&query, is_cacheable).await
            else {
                continue;
            };

            if state.is_error() {
                self.retire(&query);
            } else {
                self.relink(&query, &state);
                self.publish(&query, &state);
            }
        }
    }

    /// Subscribes `client` to `query`.
    ///
    /// Returns `false` if `query` is not cached; subscribing never triggers a
    /// computation. Otherwise the client is invoked once with the cached
    /// state before this returns.
    pub fn subscribe(&self, client: &Client, query: &QueryKey) -> bool {
        let state = {
            // teardown removes the entry before it collects subscribers, so
            // checking under the subscription lock cannot miss a teardown
            let mut subscriptions = self.inner.subscriptions.lock();
            let Some(state) = self.inner.store.read(query) else {
                return false;
            };

            subscriptions.link(client.clone(), query.clone());
            state
        };

        client.notify(Some(state));

        true
    }

    /// Unsubscribes `client` from `query`, or from every query when `query`
    /// is `None`.
    pub fn unsubscribe(&self, client: &Client, query: Option<&QueryKey>) {
        self.inner.subscriptions.lock().unlink(Some(client), query);
    }

    /// Evicts `query` from the cache with the same teardown as a failed
    /// recomputation.
    pub fn remove(&self, query: &QueryKey) { self.retire(query); }

    /// Returns `true` if `query` is cached.
    #[must_use]
    pub fn has(&self, query: &QueryKey) -> bool { self.inner.store.has(query) }

    /// Returns the cached state of `query`.
    #[must_use]
    pub fn read(&self, query: &QueryKey) -> Option<State> {
        self.inner.store.read(query)
    }

    /// Returns the paths `query` currently depends on.
    #[must_use]
    pub fn dependencies_of(&self, query: &QueryKey) -> Vec<Path> {
        self.inner.dependencies.lock().to(query)
    }

    /// Returns the queries currently depending on `path`.
    #[must_use]
    pub fn dependents_of(&self, path: &Path) -> Vec<QueryKey> {
        self.inner.dependencies.lock().from(path)
    }

    /// Returns the queries `client` currently watches.
    #[must_use]
    pub fn subscriptions_of(&self, client: &Client) -> Vec<QueryKey> {
        self.inner.subscriptions.lock().from(client)
    }

    /// Returns the clients currently watching `query`.
    #[must_use]
    pub fn subscribers_of(&self, query: &QueryKey) -> Vec<Client> {
        self.inner.subscriptions.lock().to(query)
    }

    /// Rebuilds the dependency edges of `query` from scratch.
    fn relink(&self, query: &QueryKey, state: &State) {
        let mut dependencies = self.inner.dependencies.lock();
        dependencies
            .relink_to(query.clone(), state.dependencies().iter().cloned());

        // evicted concurrently: its teardown may have stripped the edges
        // before they were rebuilt here
        if !self.inner.store.has(query) {
            dependencies.unlink(None, Some(query));
        }
    }

    fn publish(&self, query: &QueryKey, state: &State) {
        let subscribers = self.inner.subscriptions.lock().to(query);

        for client in subscribers {
            client.notify(Some(state.clone()));
        }
    }

    /// Removes every trace of `query` and tells its subscribers it is gone.
    fn retire(&self, query: &QueryKey) {
        self.inner.store.remove(query);
        self.inner.dependencies.lock().unlink(None, Some(query));

        let subscribers = {
            let mut subscriptions = self.inner.subscriptions.lock();
            let subscribers = subscriptions.to(query);
            subscriptions.unlink(None, Some(query));
            subscribers
        };

        if !subscribers.is_empty() {
            tracing::warn!(
                %query,
                subscribers = subscribers.len(),
                "query retired with live subscribers"
            );
        }

        for client in subscribers {
            client.notify(None);
        }
    }
}

fn is_cacheable(state: &State) -> bool { !state.is_error() }
