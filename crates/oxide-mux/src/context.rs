//! Request-scoped context.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::request::{Method, Vars};
use crate::route::Route;
use crate::router::{Router, ScopeId};

/// A cancellation flag shared between the caller and its handlers.
///
/// The router forwards it untouched; only handlers look at it.
#[derive(Debug, Clone, Default)]
pub struct Cancellation(Arc<AtomicBool>);

impl Cancellation {
    /// Creates a flag that is not cancelled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks the request as cancelled.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    /// Returns true once [`cancel`](Self::cancel) was called.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// State scoped to a single request.
///
/// Callers start from [`Context::background`]; the router derives a child
/// context for the handler it picks, carrying the matched route, its
/// variables and, for a method mismatch, the methods that would have been
/// accepted.
///
/// ```
/// use oxide_mux::{Binder, Context, Request, Response, Router};
///
/// let mut router = Router::new();
/// router
///     .handle_fn("/users/{id}", |ctx, res, _req, _binder| {
///         let route = ctx.current_route().expect("dispatched through a route");
///         res.write(format!("{}:{}", route.get_path_template().unwrap(), ctx.vars().get("id").unwrap()));
///         Ok(())
///     })
///     .unwrap();
///
/// let mut res = Response::new();
/// router
///     .serve(&Context::background(), &mut res, &Request::get("/users/7"), &Binder::none())
///     .unwrap();
/// assert_eq!(res.body_string().unwrap(), "/users/{id}:7");
/// ```
#[derive(Debug, Clone, Default)]
pub struct Context<'r> {
    cancellation: Option<Cancellation>,
    route: Option<&'r Route>,
    vars: Vars,
    /// Routers the request was dispatched through, innermost first.
    scopes: Vec<&'r Router>,
    allowed_methods: Vec<Method>,
}

impl Context<'static> {
    /// An empty context.
    pub fn background() -> Self {
        Self::default()
    }

    /// An empty context carrying a cancellation flag.
    pub fn with_cancellation(cancellation: Cancellation) -> Self {
        Self {
            cancellation: Some(cancellation),
            ..Self::default()
        }
    }
}

impl<'r> Context<'r> {
    /// Derives the context handed to the matched route's handler chain.
    pub(crate) fn matched<'a>(
        &self,
        route: &'a Route,
        vars: Vars,
        scopes: Vec<&'a Router>,
    ) -> Context<'a> {
        Context {
            cancellation: self.cancellation.clone(),
            route: Some(route),
            vars,
            scopes,
            allowed_methods: Vec::new(),
        }
    }

    /// Derives the context handed to a fallback handler.
    pub(crate) fn fallback<'a>(&self, allowed_methods: Vec<Method>) -> Context<'a> {
        Context {
            cancellation: self.cancellation.clone(),
            route: None,
            vars: Vars::new(),
            scopes: Vec::new(),
            allowed_methods,
        }
    }

    /// The route that matched this request, if any.
    pub const fn current_route(&self) -> Option<&'r Route> {
        self.route
    }

    /// Variables captured by the matched route.
    pub const fn vars(&self) -> &Vars {
        &self.vars
    }

    /// Methods accepted at this path when the request method was not.
    ///
    /// Empty unless the method-not-allowed handler is running.
    pub fn allowed_methods(&self) -> &[Method] {
        &self.allowed_methods
    }

    /// The caller's cancellation flag, if one was attached.
    pub const fn cancellation(&self) -> Option<&Cancellation> {
        self.cancellation.as_ref()
    }

    /// Returns true if the caller cancelled the request.
    pub fn is_cancelled(&self) -> bool {
        self.cancellation
            .as_ref()
            .is_some_and(Cancellation::is_cancelled)
    }

    /// Finds the router identified by `id` among those the request was
    /// dispatched through.
    pub(crate) fn scope(&self, id: &ScopeId) -> Option<&'r Router> {
        self.scopes.iter().copied().find(|router| router.scope_id() == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_background_is_empty() {
        let ctx = Context::background();
        assert!(ctx.current_route().is_none());
        assert!(ctx.vars().is_empty());
        assert!(ctx.allowed_methods().is_empty());
        assert!(!ctx.is_cancelled());
    }

    #[test]
    fn test_cancellation_is_forwarded() {
        let cancellation = Cancellation::new();
        let ctx = Context::with_cancellation(cancellation.clone());
        let child = ctx.fallback(vec![Method::Get]);
        assert!(!child.is_cancelled());

        cancellation.cancel();
        assert!(child.is_cancelled());
        assert_eq!(child.allowed_methods(), [Method::Get]);
    }
}
