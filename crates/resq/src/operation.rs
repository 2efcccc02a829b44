//! Units of business logic and their cache metadata.
//!
//! An [`Operation`] wraps an async handler together with:
//!
//! - its path template (e.g. `/user/:id`),
//! - `dependencies`: extra paths a cacheable operation's result depends on
//!   beyond its own path,
//! - `dependents`: paths a mutating operation invalidates once it succeeds.
//!
//! Exactly one of the two lists is populated. Whether an operation is
//! cacheable is derived from it: an operation is cacheable exactly when it
//! declares no dependents.
//!
//! ```rust
//! use resq::{Operation, State, key::Args};
//! use serde_json::json;
//!
//! type Never = std::convert::Infallible;
//!
//! let get_user = Operation::new("/user/:id", |args: Args| async move {
//!     Ok::<_, Never>(State::ok(json!({ "id": args.get("id") })))
//! })
//! .depends_on(["/user"]);
//!
//! let rename_user = Operation::new("/user/:id", |_args: Args| async move {
//!     Ok::<_, Never>(State::ok(json!(null)))
//! })
//! .invalidates(["/user/:id", "/user"]);
//!
//! assert!(get_user.is_cacheable());
//! assert!(!rename_user.is_cacheable());
//! ```

use std::{any::Any, collections::BTreeSet, panic::AssertUnwindSafe, sync::Arc};

use futures::{FutureExt, future::BoxFuture};

use crate::{
    key::{Args, Path, PathTemplate},
    state::State,
};

/// The error type handlers may fail with.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

type Handler = Arc<
    dyn Fn(Args) -> BoxFuture<'static, Result<State, BoxError>> + Send + Sync,
>;

/// An executable unit of business logic with cacheability and path metadata.
#[derive(Clone)]
pub struct Operation {
    path: PathTemplate,
    handler: Handler,
    dependents: Vec<PathTemplate>,
    dependencies: Vec<PathTemplate>,
}

impl std::fmt::Debug for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Operation")
            .field("path", &self.path)
            .field("dependents", &self.dependents)
            .field("dependencies", &self.dependencies)
            .finish_non_exhaustive()
    }
}

impl Operation {
    /// Creates a cacheable operation with no extra dependencies.
    pub fn new<H, Fut, E>(path: &str, handler: H) -> Self
    where
        H: Fn(Args) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<State, E>> + Send + 'static,
        E: Into<BoxError>,
    {
        let handler: Handler = Arc::new(move |args: Args| {
            handler(args)
                .map(|result| result.map_err(Into::<BoxError>::into))
                .boxed()
        });

        Self {
            path: PathTemplate::parse(path),
            handler,
            dependents: Vec::new(),
            dependencies: Vec::new(),
        }
    }

    /// Creates an operation whose `paths` are its dependencies when
    /// `cacheable` is `true`, or its dependents otherwise.
    ///
    /// A non-cacheable operation declared with no paths has no dependents
    /// and is therefore cacheable.
    pub fn with_paths<H, Fut, E>(
        path: &str,
        cacheable: bool,
        paths: impl IntoIterator<Item = impl AsRef<str>>,
        handler: H,
    ) -> Self
    where
        H: Fn(Args) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<State, E>> + Send + 'static,
        E: Into<BoxError>,
    {
        let operation = Self::new(path, handler);

        if cacheable {
            operation.depends_on(paths)
        } else {
            operation.invalidates(paths)
        }
    }

    /// Adds path templates the operation's results depend on, on top of its
    /// own path.
    #[must_use]
    pub fn depends_on(
        mut self,
        paths: impl IntoIterator<Item = impl AsRef<str>>,
    ) -> Self {
        debug_assert!(
            self.dependents.is_empty(),
            "an operation with dependents cannot declare dependencies"
        );

        self.dependencies.extend(
            paths.into_iter().map(|path| PathTemplate::parse(path.as_ref())),
        );
        self
    }

    /// Adds path templates to invalidate after a successful execution. This
    /// makes the operation non-cacheable.
    #[must_use]
    pub fn invalidates(
        mut self,
        paths: impl IntoIterator<Item = impl AsRef<str>>,
    ) -> Self {
        debug_assert!(
            self.dependencies.is_empty(),
            "an operation with dependencies cannot declare dependents"
        );

        self.dependents.extend(
            paths.into_iter().map(|path| PathTemplate::parse(path.as_ref())),
        );
        self
    }

    /// Returns `true` exactly when the operation declares no dependents.
    #[must_use]
    pub fn is_cacheable(&self) -> bool { self.dependents.is_empty() }

    /// Returns the operation's path template.
    #[must_use]
    pub const fn path(&self) -> &PathTemplate { &self.path }

    /// Returns the declared dependent templates.
    #[must_use]
    pub fn dependents(&self) -> &[PathTemplate] { &self.dependents }

    /// Returns the declared dependency templates.
    #[must_use]
    pub fn dependencies(&self) -> &[PathTemplate] { &self.dependencies }

    /// Renders the dependent templates against `args`, deduplicated.
    ///
    /// Templates whose parameters cannot be resolved are skipped.
    #[must_use]
    pub fn dependent_paths(&self, args: &Args) -> Vec<Path> {
        render_all(&self.dependents, args).into_iter().collect()
    }

    /// The operation's own rendered path plus its rendered dependencies.
    fn dependency_paths(&self, args: &Args) -> BTreeSet<Path> {
        let templates = std::iter::once(&self.path).chain(&self.dependencies);

        render_all(templates, args)
    }

    /// Invokes the handler with `args`.
    ///
    /// Never fails: a handler error or a panic inside the handler becomes an
    /// opaque internal-error state and the cause is only logged. For a
    /// cacheable operation, the returned state additionally depends on the
    /// operation's own path and on its declared dependencies.
    pub async fn call(&self, args: Args) -> State {
        let handler = &self.handler;
        let invocation =
            AssertUnwindSafe(async { handler(args.clone()).await })
                .catch_unwind();

        let mut state = match invocation.await {
            Ok(Ok(state)) => state,

            Ok(Err(error)) => {
                tracing::error!(path = %self.path, %error, "operation failed");
                State::internal_error()
            }

            Err(panic) => {
                tracing::error!(
                    path = %self.path,
                    panic = panic_message(panic.as_ref()),
                    "operation panicked"
                );
                State::internal_error()
            }
        };

        if self.is_cacheable() {
            state.depend_on(self.dependency_paths(&args));
        }

        state
    }
}

fn render_all<'a>(
    templates: impl IntoIterator<Item = &'a PathTemplate>,
    args: &Args,
) -> BTreeSet<Path> {
    templates
        .into_iter()
        .filter_map(|template| match template.render(args) {
            Ok((path, _)) => Some(path),
            Err(error) => {
                tracing::warn!(%template, %error, "skipping unresolved path");
                None
            }
        })
        .collect()
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    panic
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| panic.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("<non-string panic payload>")
}
