//! Resource paths, path templates, and query keys.
//!
//! A [`Path`] names a resource or resource collection (`/user/42`,
//! `/comment`) and is the unit of invalidation. A [`QueryKey`] names one
//! specific invocation, a rendered path plus its remaining arguments, and is
//! the unit of caching and subscription.
//!
//! Query keys are derived from a [`PathTemplate`] and an argument map:
//!
//! ```rust
//! use resq::key::{Args, PathTemplate, QueryKey};
//! use serde_json::json;
//!
//! let template = PathTemplate::parse("/user/:id/posts");
//! let args: Args = serde_json::from_value(json!({
//!     "id": 42,
//!     "page": 2,
//!     "sort": "new"
//! }))
//! .unwrap();
//!
//! let query = QueryKey::derive(&template, &args).unwrap();
//! assert_eq!(query.as_str(), "/user/42/posts?page=2&sort=%22new%22");
//! ```
//!
//! Remaining arguments are always encoded in key order and as JSON, so two
//! argument maps with the same content produce the same key regardless of
//! how they were built, while `"1"` and `1` stay distinct. Path parameters
//! name a resource rather than an input: `{"id": 1}` and `{"id": "1"}` render
//! the same path.

use std::{fmt::Display, sync::Arc};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use url::form_urlencoded;

/// The argument map passed to an operation.
///
/// Arguments are assumed to be validated by the caller.
pub type Args = serde_json::Map<String, Value>;

/// Errors raised while rendering a [`PathTemplate`] against arguments.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum KeyError {
    /// The template names a parameter the arguments do not provide.
    #[error("missing path parameter `{name}`")]
    MissingParameter {
        /// The name of the parameter.
        name: String,
    },

    /// The argument for a path parameter is not a scalar.
    #[error("path parameter `{name}` must be a string, number or boolean")]
    UnsupportedParameter {
        /// The name of the parameter.
        name: String,
    },
}

/// A resource path, independent of query arguments.
#[derive(
    Debug,
    Clone,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
)]
#[serde(transparent)]
pub struct Path(Arc<str>);

impl Path {
    /// Creates a path from its textual form.
    pub fn new(path: impl Into<Arc<str>>) -> Self { Self(path.into()) }

    /// Returns the textual form of the path.
    #[must_use]
    pub fn as_str(&self) -> &str { &self.0 }
}

impl Display for Path {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Path {
    fn from(value: &str) -> Self { Self(value.into()) }
}

impl From<String> for Path {
    fn from(value: String) -> Self { Self(value.into()) }
}

/// The identity of one specific invocation: a rendered path plus its
/// canonically encoded remaining arguments.
#[derive(
    Debug,
    Clone,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
)]
#[serde(transparent)]
pub struct QueryKey(Arc<str>);

impl QueryKey {
    /// Derives the query key for invoking `template` with `args`.
    ///
    /// # Errors
    ///
    /// Returns a [`KeyError`] if a template parameter is missing from `args`
    /// or is not a scalar value.
    pub fn derive(
        template: &PathTemplate,
        args: &Args,
    ) -> Result<Self, KeyError> {
        let (path, rest) = template.render(args)?;

        Ok(Self::from_parts(&path, &rest))
    }

    /// Builds the key for an already rendered path and its remaining
    /// arguments.
    #[must_use]
    pub fn from_parts(path: &Path, rest: &Args) -> Self {
        let mut target = format!("{path}?");
        let start = target.len();

        let mut pairs = rest.iter().collect::<Vec<_>>();
        pairs.sort_unstable_by(|(a, _), (b, _)| a.cmp(b));

        let mut serializer =
            form_urlencoded::Serializer::for_suffix(&mut target, start);
        for (name, value) in pairs {
            serializer.append_pair(name, &value.to_string());
        }
        serializer.finish();

        Self(target.into())
    }

    /// Returns the textual form of the key.
    #[must_use]
    pub fn as_str(&self) -> &str { &self.0 }

    /// Returns the rendered path part of the key.
    #[must_use]
    pub fn path(&self) -> Path {
        let end = self.0.find('?').unwrap_or(self.0.len());
        Path::new(&self.0[..end])
    }
}

impl Display for QueryKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for QueryKey {
    fn from(value: &str) -> Self { Self(value.into()) }
}

impl From<String> for QueryKey {
    fn from(value: String) -> Self { Self(value.into()) }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum Segment {
    Literal(String),
    Parameter(String),
}

/// A parsed path template such as `/user/:id`.
///
/// Segments starting with `:` are parameters, every other segment is matched
/// and rendered literally.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PathTemplate {
    source: Arc<str>,
    segments: Arc<[Segment]>,
}

impl PathTemplate {
    /// Parses a template.
    #[must_use]
    pub fn parse(source: &str) -> Self {
        let segments = source
            .split('/')
            .map(|segment| match segment.strip_prefix(':') {
                Some(name) if !name.is_empty() => {
                    Segment::Parameter(name.to_owned())
                }
                _ => Segment::Literal(segment.to_owned()),
            })
            .collect();

        Self { source: source.into(), segments }
    }

    /// Returns the template as written.
    #[must_use]
    pub fn as_str(&self) -> &str { &self.source }

    /// Returns the names of the template's parameters, in order.
    pub fn parameters(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().filter_map(|segment| match segment {
            Segment::Parameter(name) => Some(name.as_str()),
            Segment::Literal(_) => None,
        })
    }

    /// Returns the number of literal segments, used to rank overlapping
    /// templates.
    pub(crate) fn literal_count(&self) -> usize {
        self.segments
            .iter()
            .filter(|segment| matches!(segment, Segment::Literal(_)))
            .count()
    }

    /// Substitutes the template's parameters from `args`.
    ///
    /// Returns the rendered path together with the arguments that were not
    /// consumed by the template.
    ///
    /// # Errors
    ///
    /// Returns a [`KeyError`] if a parameter is missing from `args` or is not
    /// a scalar value.
    pub fn render(&self, args: &Args) -> Result<(Path, Args), KeyError> {
        let mut rest = args.clone();
        let mut rendered = Vec::with_capacity(self.segments.len());

        for segment in self.segments.iter() {
            match segment {
                Segment::Literal(literal) => rendered.push(literal.clone()),
                Segment::Parameter(name) => {
                    let value = rest.remove(name).ok_or_else(|| {
                        KeyError::MissingParameter { name: name.clone() }
                    })?;

                    if !is_scalar(&value) {
                        return Err(KeyError::UnsupportedParameter {
                            name: name.clone(),
                        });
                    }

                    rendered.push(
                        form_urlencoded::byte_serialize(
                            scalar_text(&value).as_bytes(),
                        )
                        .collect(),
                    );
                }
            }
        }

        Ok((Path::new(rendered.join("/")), rest))
    }

    /// Matches a concrete path against the template, capturing parameters as
    /// decoded string arguments.
    #[must_use]
    pub fn capture(&self, path: &str) -> Option<Args> {
        let mut captured = Args::new();
        let mut segments = path.split('/');

        for expected in self.segments.iter() {
            let actual = segments.next()?;

            match expected {
                Segment::Literal(literal) if literal == actual => {}
                Segment::Literal(_) => return None,
                Segment::Parameter(_) if actual.is_empty() => return None,
                Segment::Parameter(name) => {
                    captured.insert(
                        name.clone(),
                        Value::String(decode_segment(actual)),
                    );
                }
            }
        }

        segments.next().is_none().then_some(captured)
    }
}

impl Display for PathTemplate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.source)
    }
}

impl From<&str> for PathTemplate {
    fn from(value: &str) -> Self { Self::parse(value) }
}

const fn is_scalar(value: &Value) -> bool {
    matches!(value, Value::String(_) | Value::Number(_) | Value::Bool(_))
}

/// Strings are used verbatim, everything else as compact JSON.
fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

/// Reverses the encoding applied to rendered path segments.
fn decode_segment(segment: &str) -> String {
    // rendering never emits a raw `&` or `=`, which the form parser would
    // treat as separators
    if segment.contains(['&', '=']) {
        return segment.to_owned();
    }

    form_urlencoded::parse(segment.as_bytes())
        .next()
        .map(|(decoded, _)| decoded.into_owned())
        .unwrap_or_default()
}
