//! Error types for routing.

use thiserror::Error;

/// Router-specific errors.
///
/// Registration errors (`UnbalancedBraces` through `OddPairs`) are raised
/// while routes are being built and abort the registration call. The
/// remaining variants come from introspection helpers.
#[derive(Debug, Clone, Error)]
pub enum MuxError {
    /// A template has a `{` without its `}` or vice versa.
    #[error("unbalanced braces in {template:?}")]
    UnbalancedBraces { template: String },

    /// A `{...}` placeholder has an empty name or an empty constraint.
    #[error("missing name or pattern in {variable:?} of {template:?}")]
    MissingNameOrPattern { template: String, variable: String },

    /// The same variable name is captured twice by one route.
    #[error("duplicated route variable {name:?} in {template:?}")]
    DuplicateVariable { template: String, name: String },

    /// Path and prefix templates must be rooted.
    #[error("path must start with a slash, got {template:?}")]
    PathMustStartWithSlash { template: String },

    /// A variable constraint introduced its own capturing group.
    #[error("route {template:?} contains capture groups in its constraints, use (?:pattern) instead")]
    CaptureGroupInConstraint { template: String },

    /// The compiled expression was rejected by the regex engine.
    #[error("invalid pattern in {template:?}: {source}")]
    InvalidRegex {
        template: String,
        #[source]
        source: regex::Error,
    },

    /// Header and query matchers take key/value pairs.
    #[error("number of parameters must be multiple of 2, got {count}")]
    OddPairs { count: usize },

    /// The method token is not one this router understands.
    #[error("invalid HTTP method: {0}")]
    InvalidMethod(String),

    /// The route has no metadata under the requested key.
    #[error("key not found in metadata: {0}")]
    MetadataKeyNotFound(String),

    /// The route accepts any method.
    #[error("route doesn't have methods")]
    MethodsNotDefined,

    /// No route of the router matched the request path.
    #[error("no route matched the request")]
    NoMatchingRoute,
}

/// Result type alias for router operations.
pub type Result<T> = std::result::Result<T, MuxError>;

/// Failure returned by handlers and middleware.
///
/// The router hands these back to the caller of
/// [`Router::serve`](crate::Router::serve) untouched.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;
