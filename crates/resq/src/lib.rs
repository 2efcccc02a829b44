//! # resq
//!
//! A reactive query cache for request handlers. Results of read operations
//! are cached under a query key derived from their path and arguments,
//! every cached query is linked to the resource paths it depends on, and
//! mutating operations invalidate paths. Invalidation recomputes each
//! affected query in place and pushes the fresh state to every client
//! subscribed to it.
//!
//! ## Example
//!
//! ```rust
//! use std::{convert::Infallible, sync::Arc};
//!
//! use parking_lot::Mutex;
//! use resq::{Client, Manager, Operation, Path, State, key::Args};
//! use serde_json::json;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let comments = Arc::new(Mutex::new(vec![String::from("first")]));
//!
//! let last_comment = Operation::new("/comment/last", {
//!     let comments = comments.clone();
//!     move |_: Args| {
//!         let last = comments.lock().last().cloned();
//!         async move { Ok::<_, Infallible>(State::ok(json!(last))) }
//!     }
//! });
//!
//! let manager = Manager::new();
//! let state = manager.execute(&last_comment, Args::new()).await;
//! assert_eq!(state.payload(), &json!("first"));
//!
//! let (client, mut updates) = Client::channel();
//! assert!(manager.subscribe(&client, state.query().unwrap()));
//! assert_eq!(updates.recv().await.flatten(), Some(state));
//!
//! comments.lock().push(String::from("second"));
//! manager.invalidate(&Path::from("/comment/last")).await;
//!
//! let pushed = updates.recv().await.flatten().unwrap();
//! assert_eq!(pushed.payload(), &json!("second"));
//! # }
//! ```

pub mod client;
pub mod config;
pub mod key;
pub mod manager;
pub mod operation;
pub mod router;
pub mod state;

pub use client::{Client, ClientId};
pub use config::{Config, DefaultConfig};
pub use key::{Args, KeyError, Path, PathTemplate, QueryKey};
pub use manager::{InvalidationListener, Manager};
pub use operation::{BoxError, Operation};
pub use router::{RouteError, Router};
pub use state::State;
