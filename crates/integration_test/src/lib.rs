//! Common test utilities and a shared in-memory comment service for resq
//! integration tests.

#![allow(missing_docs)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_panics_doc)]

use std::{
    convert::Infallible,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use parking_lot::Mutex;
use resq::{Client, Operation, Router, State, key::Args};
use serde_json::{Value, json};

// ============================================================================
// Comment Service
// ============================================================================

/// Per-operation invocation counters.
#[derive(Debug, Default)]
pub struct Calls {
    pub get_comment: AtomicUsize,
    pub last_comment: AtomicUsize,
    pub list_comments: AtomicUsize,
    pub post_comment: AtomicUsize,
    pub delete_comment: AtomicUsize,
}

impl Calls {
    pub fn get_comment(&self) -> usize {
        self.get_comment.load(Ordering::SeqCst)
    }

    pub fn last_comment(&self) -> usize {
        self.last_comment.load(Ordering::SeqCst)
    }

    pub fn list_comments(&self) -> usize {
        self.list_comments.load(Ordering::SeqCst)
    }

    pub fn post_comment(&self) -> usize {
        self.post_comment.load(Ordering::SeqCst)
    }

    pub fn delete_comment(&self) -> usize {
        self.delete_comment.load(Ordering::SeqCst)
    }
}

/// An in-memory comment table. Ids start at `1`; deleted comments leave a
/// hole so ids are never reused.
#[derive(Debug, Default)]
pub struct CommentService {
    comments: Mutex<Vec<Option<String>>>,
    latency: Mutex<Option<Duration>>,
    pub calls: Calls,
}

impl CommentService {
    pub fn new() -> Arc<Self> { Arc::new(Self::default()) }

    /// Makes every handler sleep for `latency` before answering.
    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock() = Some(latency);
    }

    /// Inserts a comment directly, bypassing the manager.
    pub fn insert(&self, text: &str) -> u64 {
        let mut comments = self.comments.lock();
        comments.push(Some(text.to_owned()));

        comments.len() as u64
    }

    fn find(&self, id: u64) -> Option<String> {
        let index = usize::try_from(id.checked_sub(1)?).ok()?;

        self.comments.lock().get(index).cloned().flatten()
    }

    fn last(&self) -> Option<(u64, String)> {
        let comments = self.comments.lock();

        comments.iter().enumerate().rev().find_map(|(index, comment)| {
            comment.clone().map(|text| (index as u64 + 1, text))
        })
    }

    async fn pause(&self) {
        let latency = *self.latency.lock();

        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
    }

    /// `GET /comment/:id`
    pub fn get_comment(self: &Arc<Self>) -> Operation {
        let service = self.clone();

        Operation::new("/comment/:id", move |args: Args| {
            let service = service.clone();

            async move {
                service.calls.get_comment.fetch_add(1, Ordering::SeqCst);
                service.pause().await;

                let Some(id) = args.get("id").and_then(parse_id) else {
                    return Ok::<_, Infallible>(State::bad_request(
                        "comment id must be a positive integer",
                    ));
                };

                Ok(service.find(id).map_or_else(State::not_found, |text| {
                    State::ok(json!({ "id": id, "text": text }))
                }))
            }
        })
    }

    /// `GET /comment/last`
    pub fn last_comment(self: &Arc<Self>) -> Operation {
        let service = self.clone();

        Operation::new("/comment/last", move |_: Args| {
            let service = service.clone();

            async move {
                service.calls.last_comment.fetch_add(1, Ordering::SeqCst);
                service.pause().await;

                let payload = match service.last() {
                    Some((id, text)) => json!({ "id": id, "text": text }),
                    None => Value::Null,
                };

                Ok::<_, Infallible>(State::ok(payload))
            }
        })
    }

    /// `GET /comment`
    pub fn list_comments(self: &Arc<Self>) -> Operation {
        let service = self.clone();

        Operation::new("/comment", move |_: Args| {
            let service = service.clone();

            async move {
                service.calls.list_comments.fetch_add(1, Ordering::SeqCst);

                let texts = service
                    .comments
                    .lock()
                    .iter()
                    .flatten()
                    .cloned()
                    .map(Value::String)
                    .collect();

                Ok::<_, Infallible>(State::ok(Value::Array(texts)))
            }
        })
    }

    /// `POST /comment`
    pub fn post_comment(self: &Arc<Self>) -> Operation {
        let service = self.clone();

        Operation::new("/comment", move |args: Args| {
            let service = service.clone();

            async move {
                service.calls.post_comment.fetch_add(1, Ordering::SeqCst);

                let text = match args.get("text").and_then(Value::as_str) {
                    Some(text) if !text.is_empty() => text,
                    _ => {
                        return Ok::<_, Infallible>(State::bad_request(
                            "comment text must not be empty",
                        ));
                    }
                };

                let id = service.insert(text);

                Ok(State::created(json!({ "id": id, "text": text })))
            }
        })
        .invalidates(["/comment/last", "/comment"])
    }

    /// `DELETE /comment/:id`
    pub fn delete_comment(self: &Arc<Self>) -> Operation {
        let service = self.clone();

        Operation::new("/comment/:id", move |args: Args| {
            let service = service.clone();

            async move {
                service.calls.delete_comment.fetch_add(1, Ordering::SeqCst);

                let Some(id) = args.get("id").and_then(parse_id) else {
                    return Ok::<_, Infallible>(State::not_found());
                };

                let removed = usize::try_from(id - 1).ok().and_then(|index| {
                    service.comments.lock().get_mut(index)?.take()
                });

                Ok(removed.map_or_else(State::not_found, |_| {
                    State::ok(json!({ "id": id }))
                }))
            }
        })
        .invalidates(["/comment/:id", "/comment/last", "/comment"])
    }

    /// Every comment endpoint, registered on one router.
    pub fn router(self: &Arc<Self>) -> Router {
        Router::new()
            .get(self.list_comments())
            .get(self.last_comment())
            .get(self.get_comment())
            .post(self.post_comment())
            .delete(self.delete_comment())
    }
}

/// Accepts ids both as JSON numbers and as captured path strings.
fn parse_id(value: &Value) -> Option<u64> {
    let id = match value {
        Value::Number(number) => number.as_u64()?,
        Value::String(text) => text.parse().ok()?,
        _ => return None,
    };

    (id > 0).then_some(id)
}

// ============================================================================
// Helpers
// ============================================================================

/// Builds an argument map from a JSON object literal.
pub fn args(value: Value) -> Args {
    match value {
        Value::Object(map) => map,
        Value::Null => Args::new(),
        other => panic!("arguments must be an object, got {other}"),
    }
}

/// Every notification a client received, in order.
pub type Received = Arc<Mutex<Vec<Option<State>>>>;

/// A client recording its notifications.
pub fn recording_client() -> (Client, Received) {
    let received = Received::default();
    let client = Client::new({
        let received = received.clone();
        move |state| received.lock().push(state)
    });

    (client, received)
}

/// The payloads of every notification, `None` for removals.
pub fn payloads(received: &Received) -> Vec<Option<Value>> {
    received
        .lock()
        .iter()
        .map(|state| state.as_ref().map(|state| state.payload().clone()))
        .collect()
}
