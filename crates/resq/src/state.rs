//! The value type flowing through the manager.

use std::collections::BTreeSet;

use http::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::key::{Path, QueryKey};

/// The outcome of executing an operation.
///
/// A state carries a status code, an opaque payload, the [`QueryKey`] it was
/// computed for (assigned by the manager), and the set of [`Path`]s whose
/// invalidation should trigger its recomputation.
///
/// Only non-error states are ever cached or pushed to subscribers. An error
/// state tears down the cache entry and the subscriptions of its query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct State {
    #[serde(with = "status_code")]
    status: StatusCode,
    payload: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    query: Option<QueryKey>,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    dependencies: BTreeSet<Path>,
}

impl State {
    /// Creates a state with the given status and payload.
    #[must_use]
    pub const fn new(status: StatusCode, payload: Value) -> Self {
        Self { status, payload, query: None, dependencies: BTreeSet::new() }
    }

    /// A `200 OK` state.
    #[must_use]
    pub const fn ok(payload: Value) -> Self {
        Self::new(StatusCode::OK, payload)
    }

    /// A `201 Created` state.
    #[must_use]
    pub const fn created(payload: Value) -> Self {
        Self::new(StatusCode::CREATED, payload)
    }

    /// An error state with a `{"error": message}` payload.
    #[must_use]
    pub fn error(status: StatusCode, message: impl Into<String>) -> Self {
        Self::new(status, json!({ "error": message.into() }))
    }

    /// A `400 Bad Request` state.
    #[must_use]
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::error(StatusCode::BAD_REQUEST, message)
    }

    /// A `404 Not Found` state.
    #[must_use]
    pub fn not_found() -> Self {
        Self::error(StatusCode::NOT_FOUND, "not found")
    }

    /// A `500 Internal Server Error` state.
    ///
    /// The payload is deliberately generic; the cause of an execution fault
    /// is logged, never returned.
    #[must_use]
    pub fn internal_error() -> Self {
        Self::error(StatusCode::INTERNAL_SERVER_ERROR, "internal server error")
    }

    /// Returns `true` if the status is in the 4xx or 5xx class.
    #[must_use]
    pub fn is_error(&self) -> bool {
        self.status.is_client_error() || self.status.is_server_error()
    }

    /// Returns the status code.
    #[must_use]
    pub const fn status(&self) -> StatusCode { self.status }

    /// Returns the payload.
    #[must_use]
    pub const fn payload(&self) -> &Value { &self.payload }

    /// Consumes the state and returns its payload.
    #[must_use]
    pub fn into_payload(self) -> Value { self.payload }

    /// Returns the query this state was computed for, once assigned.
    #[must_use]
    pub const fn query(&self) -> Option<&QueryKey> { self.query.as_ref() }

    /// Returns the paths this state depends on.
    #[must_use]
    pub const fn dependencies(&self) -> &BTreeSet<Path> { &self.dependencies }

    /// Adds `path` to the dependency set.
    #[must_use]
    pub fn with_dependency(mut self, path: impl Into<Path>) -> Self {
        self.dependencies.insert(path.into());
        self
    }

    /// Adds every path in `paths` to the dependency set.
    #[must_use]
    pub fn with_dependencies(
        mut self,
        paths: impl IntoIterator<Item = impl Into<Path>>,
    ) -> Self {
        self.depend_on(paths);
        self
    }

    /// Adds every path in `paths` to the dependency set in place.
    pub fn depend_on(
        &mut self,
        paths: impl IntoIterator<Item = impl Into<Path>>,
    ) {
        self.dependencies.extend(paths.into_iter().map(Into::into));
    }

    pub(crate) fn with_query(mut self, query: QueryKey) -> Self {
        self.query = Some(query);
        self
    }
}

mod status_code {
    use http::StatusCode;
    use serde::{Deserialize, Deserializer, Serializer, de::Error};

    #[allow(clippy::trivially_copy_pass_by_ref)]
    pub fn serialize<S: Serializer>(
        status: &StatusCode,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        serializer.serialize_u16(status.as_u16())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<StatusCode, D::Error> {
        let code = u16::deserialize(deserializer)?;
        StatusCode::from_u16(code).map_err(D::Error::custom)
    }
}
