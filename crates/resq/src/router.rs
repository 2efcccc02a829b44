//! Maps `(method, concrete path)` pairs to registered operations.
//!
//! ```rust
//! use http::Method;
//! use resq::{Operation, Router, State, key::Args};
//! use serde_json::json;
//!
//! type Never = std::convert::Infallible;
//!
//! let router = Router::new()
//!     .get(Operation::new("/user/:id", |args: Args| async move {
//!         Ok::<_, Never>(State::ok(json!(args.get("id"))))
//!     }))
//!     .get(Operation::new("/user/me", |_: Args| async {
//!         Ok::<_, Never>(State::ok(json!("me")))
//!     }));
//!
//! let (operation, args) = router.resolve(&Method::GET, "/user/me").unwrap();
//! assert_eq!(operation.path().as_str(), "/user/me");
//! assert!(args.is_empty());
//!
//! let (_, args) = router.resolve(&Method::GET, "/user/42").unwrap();
//! assert_eq!(args.get("id"), Some(&json!("42")));
//! ```

use http::{Method, StatusCode};

use crate::{
    config::Config,
    key::Args,
    manager::Manager,
    operation::Operation,
    state::State,
};

/// The reasons a request cannot be routed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RouteError {
    /// No registered template matches the path.
    #[error("no route matches `{path}`")]
    NotFound {
        /// The requested path.
        path: String,
    },

    /// Some template matches the path, but not for this method.
    #[error("method `{method}` is not allowed on `{path}`")]
    MethodNotAllowed {
        /// The requested method.
        method: Method,
        /// The requested path.
        path: String,
    },
}

impl RouteError {
    /// The HTTP status describing the error.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::NotFound { .. } => StatusCode::NOT_FOUND,
            Self::MethodNotAllowed { .. } => StatusCode::METHOD_NOT_ALLOWED,
        }
    }
}

#[derive(Debug, Clone)]
struct Route {
    method: Method,
    operation: Operation,
}

/// An explicit table of operations keyed by method and path template.
#[derive(Debug, Clone, Default)]
pub struct Router {
    routes: Vec<Route>,
}

impl Router {
    /// Creates an empty router.
    #[must_use]
    pub const fn new() -> Self { Self { routes: Vec::new() } }

    /// Registers `operation` for `method` at the operation's own path
    /// template.
    #[must_use]
    pub fn route(mut self, method: Method, operation: Operation) -> Self {
        self.routes.push(Route { method, operation });
        self
    }

    /// Registers `operation` for `GET`.
    #[must_use]
    pub fn get(self, operation: Operation) -> Self {
        self.route(Method::GET, operation)
    }

    /// Registers `operation` for `POST`.
    #[must_use]
    pub fn post(self, operation: Operation) -> Self {
        self.route(Method::POST, operation)
    }

    /// Registers `operation` for `PUT`.
    #[must_use]
    pub fn put(self, operation: Operation) -> Self {
        self.route(Method::PUT, operation)
    }

    /// Registers `operation` for `PATCH`.
    #[must_use]
    pub fn patch(self, operation: Operation) -> Self {
        self.route(Method::PATCH, operation)
    }

    /// Registers `operation` for `DELETE`.
    #[must_use]
    pub fn delete(self, operation: Operation) -> Self {
        self.route(Method::DELETE, operation)
    }

    /// Returns the number of registered routes.
    #[must_use]
    pub fn len(&self) -> usize { self.routes.len() }

    /// Returns `true` if no route is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool { self.routes.is_empty() }

    /// Finds the operation registered for `method` whose template matches
    /// `path`, together with the captured path parameters.
    ///
    /// When several templates match, the one with the most literal segments
    /// wins; ties go to the route registered first.
    ///
    /// # Errors
    ///
    /// Returns [`RouteError::MethodNotAllowed`] if `path` matches only routes
    /// of other methods and [`RouteError::NotFound`] if it matches none.
    pub fn resolve(
        &self,
        method: &Method,
        path: &str,
    ) -> Result<(&Operation, Args), RouteError> {
        let mut path_matched = false;
        let mut best: Option<(usize, &Operation, Args)> = None;

        for route in &self.routes {
            let template = route.operation.path();
            let Some(captured) = template.capture(path) else {
                continue;
            };

            path_matched = true;

            if route.method != *method {
                continue;
            }

            let rank = template.literal_count();
            if best.as_ref().is_none_or(|(best_rank, ..)| rank > *best_rank) {
                best = Some((rank, &route.operation, captured));
            }
        }

        match best {
            Some((_, operation, captured)) => Ok((operation, captured)),
            None if path_matched => Err(RouteError::MethodNotAllowed {
                method: method.clone(),
                path: path.to_owned(),
            }),
            None => Err(RouteError::NotFound { path: path.to_owned() }),
        }
    }

    /// Resolves the request and executes the matching operation on
    /// `manager`.
    ///
    /// Captured path parameters take precedence over same-named entries of
    /// `args`. Routing failures are reported as error states.
    #[tracing::instrument(skip(self, manager, args), level = "debug")]
    pub async fn dispatch<C: Config>(
        &self,
        manager: &Manager<C>,
        method: &Method,
        path: &str,
        mut args: Args,
    ) -> State {
        let (operation, captured) = match self.resolve(method, path) {
            Ok(resolved) => resolved,
            Err(error) => {
                tracing::debug!(%error, "unroutable request");
                return State::error(error.status(), error.to_string());
            }
        };

        args.extend(captured);

        manager.execute(operation, args).await
    }
}

#[cfg(test)]
mod test {
    use std::convert::Infallible;

    use http::{Method, StatusCode};
    use serde_json::json;

    use super::{RouteError, Router};
    use crate::{Manager, Operation, State, key::Args};

    fn echo(path: &str) -> Operation {
        let name = path.to_owned();

        Operation::new(path, move |args: Args| {
            let name = name.clone();
            async move {
                Ok::<_, Infallible>(State::ok(json!({
                    "route": name,
                    "args": args
                })))
            }
        })
    }

    fn router() -> Router {
        Router::new()
            .get(echo("/user/:id"))
            .get(echo("/user/me"))
            .post(echo("/user"))
            .delete(echo("/user/:id").invalidates(["/user"]))
    }

    #[test]
    fn most_literal_template_wins() {
        let router = router();

        let (operation, args) =
            router.resolve(&Method::GET, "/user/me").unwrap();
        assert_eq!(operation.path().as_str(), "/user/me");
        assert!(args.is_empty());

        let (operation, args) =
            router.resolve(&Method::GET, "/user/7").unwrap();
        assert_eq!(operation.path().as_str(), "/user/:id");
        assert_eq!(args.get("id"), Some(&json!("7")));
    }

    #[test]
    fn method_selects_route() {
        let router = router();

        let (operation, _) =
            router.resolve(&Method::DELETE, "/user/7").unwrap();
        assert!(!operation.is_cacheable());

        let (operation, _) = router.resolve(&Method::GET, "/user/7").unwrap();
        assert!(operation.is_cacheable());
    }

    #[test]
    fn unroutable_requests() {
        let router = router();

        assert_eq!(
            router.resolve(&Method::GET, "/team/1").unwrap_err(),
            RouteError::NotFound { path: "/team/1".to_owned() }
        );
        assert_eq!(
            router.resolve(&Method::PUT, "/user").unwrap_err().status(),
            StatusCode::METHOD_NOT_ALLOWED
        );
        // a trailing segment is not a parameter value
        assert!(router.resolve(&Method::GET, "/user/").is_err());
    }

    #[tokio::test]
    async fn dispatch_executes_through_the_manager() {
        let manager = Manager::new();
        let router = router();

        let mut args = Args::new();
        args.insert("id".to_owned(), json!("ignored"));
        args.insert("verbose".to_owned(), json!(true));

        let state =
            router.dispatch(&manager, &Method::GET, "/user/7", args).await;

        assert_eq!(state.status(), StatusCode::OK);
        assert_eq!(
            state.payload(),
            &json!({
                "route": "/user/:id",
                "args": { "id": "7", "verbose": true }
            })
        );
        assert!(manager.has(state.query().unwrap()));
    }

    #[tokio::test]
    async fn dispatch_reports_routing_errors() {
        let manager = Manager::new();

        let state = router()
            .dispatch(&manager, &Method::GET, "/nowhere", Args::new())
            .await;

        assert_eq!(state.status(), StatusCode::NOT_FOUND);
        assert!(state.query().is_none());
    }
}
