//! Handler contract and the built-in fallback handlers.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use crate::context::Context;
use crate::error::BoxError;
use crate::request::Request;
use crate::response::Response;

/// Result returned by handlers and middleware.
pub type HandlerResult = Result<(), BoxError>;

/// A shared request handler.
///
/// Handlers receive the request-scoped [`Context`], the response sink, the
/// request and the caller's [`Binder`].
pub type Handler = Arc<
    dyn for<'r> Fn(&Context<'r>, &mut Response, &Request, &Binder) -> HandlerResult + Send + Sync,
>;

/// Turns a closure into a [`Handler`].
///
/// # Example
///
/// ```
/// use oxide_mux::handler_fn;
///
/// let hello = handler_fn(|_ctx, res, _req, _binder| {
///     res.write("Hello, World!");
///     Ok(())
/// });
/// ```
pub fn handler_fn<F>(f: F) -> Handler
where
    F: for<'r> Fn(&Context<'r>, &mut Response, &Request, &Binder) -> HandlerResult
        + Send
        + Sync
        + 'static,
{
    Arc::new(f)
}

/// Opaque value forwarded from the caller of
/// [`Router::serve`](crate::Router::serve) to every middleware and handler.
///
/// The router never looks inside it.
#[derive(Clone, Default)]
pub struct Binder(Option<Arc<dyn Any + Send + Sync>>);

impl Binder {
    /// A binder carrying nothing.
    pub const fn none() -> Self {
        Self(None)
    }

    /// Wraps a value.
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self(Some(Arc::new(value)))
    }

    /// Returns the wrapped value if it has type `T`.
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.0.as_deref().and_then(|v| v.downcast_ref())
    }

    /// Returns true if no value is carried.
    pub const fn is_none(&self) -> bool {
        self.0.is_none()
    }
}

impl fmt::Debug for Binder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Binder")
            .field(&self.0.as_ref().map(|_| ".."))
            .finish()
    }
}

/// Replies with `404 page not found`.
pub fn not_found(_: &Context<'_>, res: &mut Response, _: &Request, _: &Binder) -> HandlerResult {
    res.error("404 page not found", 404);
    Ok(())
}

/// Replies with an empty `405`.
pub fn method_not_allowed(
    _: &Context<'_>,
    res: &mut Response,
    _: &Request,
    _: &Binder,
) -> HandlerResult {
    res.set_status(405);
    Ok(())
}

/// A handler replying with [`not_found`].
pub fn not_found_handler() -> Handler {
    handler_fn(not_found)
}
