//! Subscriber identities.

use std::{
    hash::{Hash, Hasher},
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};

use tokio::sync::mpsc;

use crate::state::State;

/// A process-unique subscriber identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ClientId(u64);

type Callback = Arc<dyn Fn(Option<State>) + Send + Sync>;

/// A subscriber: an identity plus the callback that receives pushed states.
///
/// The callback receives `Some(state)` whenever a watched query is
/// (re)computed and `None` when a watched query ceases to exist, after which
/// the subscription is gone.
///
/// Two clients are equal only if one was cloned from the other.
#[derive(Clone)]
pub struct Client {
    id: ClientId,
    callback: Callback,
}

impl Client {
    /// Creates a client with a fresh identity.
    pub fn new(
        callback: impl Fn(Option<State>) + Send + Sync + 'static,
    ) -> Self {
        static NEXT_ID: AtomicU64 = AtomicU64::new(0);

        Self {
            id: ClientId(NEXT_ID.fetch_add(1, Ordering::Relaxed)),
            callback: Arc::new(callback),
        }
    }

    /// Creates a client that forwards every notification into a channel.
    ///
    /// Notifications sent after the receiver is dropped are discarded.
    #[must_use]
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Option<State>>) {
        let (sender, receiver) = mpsc::unbounded_channel();

        let client = Self::new(move |state| {
            // receiver gone means the connection is closing
            let _ = sender.send(state);
        });

        (client, receiver)
    }

    /// Returns the client's identity.
    #[must_use]
    pub const fn id(&self) -> ClientId { self.id }

    /// Delivers a notification to the client.
    pub fn notify(&self, state: Option<State>) { (self.callback)(state); }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client").field("id", &self.id).finish_non_exhaustive()
    }
}

impl PartialEq for Client {
    fn eq(&self, other: &Self) -> bool { self.id == other.id }
}

impl Eq for Client {}

impl Hash for Client {
    fn hash<H: Hasher>(&self, state: &mut H) { self.id.hash(state); }
}
