//! Middleware support for request/response processing.

use std::sync::Arc;

use tracing::{debug, trace};

use crate::handler::{handler_fn, Handler};
use crate::request::Method;
use crate::router::{Router, ScopeId};

/// Header set by [`CorsMethodMiddleware`].
pub const ACCESS_CONTROL_ALLOW_METHODS: &str = "Access-Control-Allow-Methods";

/// Wraps a handler with behaviour that runs around it.
///
/// Middleware can:
/// - Modify the response before or after the handler runs
/// - Short-circuit by not calling the wrapped handler
/// - Inspect the matched route through the context
///
/// Any `Fn(Handler) -> Handler` closure is middleware.
///
/// # Example
///
/// ```
/// use oxide_mux::{handler_fn, Handler, Router};
///
/// let mut router = Router::new();
/// router.use_middleware(|next: Handler| {
///     handler_fn(move |ctx, res, req, binder| {
///         if req.get_header("X-Session-Token").is_none() {
///             res.error("Forbidden", 403);
///             return Ok(());
///         }
///         next(ctx, res, req, binder)
///     })
/// });
/// ```
pub trait Middleware: Send + Sync {
    /// Returns a handler that runs this middleware around `next`.
    fn wrap(&self, next: Handler) -> Handler;
}

impl<F> Middleware for F
where
    F: Fn(Handler) -> Handler + Send + Sync,
{
    fn wrap(&self, next: Handler) -> Handler {
        self(next)
    }
}

/// Sets `Access-Control-Allow-Methods` from the routes of one router.
///
/// For every request it handles, the middleware collects the methods of
/// the router's routes matching the request (ignoring the method) and, if
/// `OPTIONS` is among them, writes them comma separated in registration
/// order. It always calls the wrapped handler, so preflight requests still
/// need an `OPTIONS` route.
///
/// ```
/// use oxide_mux::{Binder, Context, CorsMethodMiddleware, Method, Request, Response, Router};
///
/// let mut router = Router::new();
/// router
///     .handle_fn("/foo", |_ctx, _res, _req, _binder| Ok(()))
///     .unwrap()
///     .methods([Method::Get, Method::Put, Method::Patch, Method::Options]);
/// let cors = CorsMethodMiddleware::new(&router);
/// router.use_middleware(cors);
///
/// let mut res = Response::new();
/// router
///     .serve(&Context::background(), &mut res, &Request::options("/foo"), &Binder::none())
///     .unwrap();
/// assert_eq!(res.get_header("Access-Control-Allow-Methods"), Some("GET,PUT,PATCH,OPTIONS"));
/// ```
#[derive(Debug, Clone)]
pub struct CorsMethodMiddleware {
    scope: ScopeId,
}

impl CorsMethodMiddleware {
    /// Creates the middleware for `router`.
    ///
    /// It only has an effect once registered on `router` itself or on one
    /// of its subrouters.
    pub fn new(router: &Router) -> Self {
        Self {
            scope: router.scope_id().clone(),
        }
    }
}

impl Middleware for CorsMethodMiddleware {
    fn wrap(&self, next: Handler) -> Handler {
        let scope = self.scope.clone();
        handler_fn(move |ctx, res, req, binder| {
            match ctx.scope(&scope).map(|router| router.allowed_methods(req)) {
                Some(Ok(methods)) if methods.contains(&Method::Options) => {
                    let value = methods
                        .iter()
                        .map(Method::as_str)
                        .collect::<Vec<_>>()
                        .join(",");
                    res.set_header(ACCESS_CONTROL_ALLOW_METHODS, value);
                }
                Some(Ok(_)) => {}
                Some(Err(err)) => trace!(error = %err, "allowed methods unavailable"),
                None => trace!("router not in dispatch scope"),
            }
            next(ctx, res, req, binder)
        })
    }
}

/// Middleware that logs requests.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingMiddleware;

impl Middleware for LoggingMiddleware {
    fn wrap(&self, next: Handler) -> Handler {
        handler_fn(move |ctx, res, req, binder| {
            debug!(method = %req.method, path = %req.path, "--> request");
            let result = next(ctx, res, req, binder);
            debug!(status = res.status, failed = result.is_err(), "<-- response");
            result
        })
    }
}

/// Chains middleware so the first one listed is outermost.
pub fn chain(middlewares: &[Arc<dyn Middleware>], handler: Handler) -> Handler {
    middlewares
        .iter()
        .rev()
        .fold(handler, |next, mw| mw.wrap(next))
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::{Binder, Context, Request, Response};

    fn recording(log: &Arc<Mutex<Vec<String>>>, name: &'static str) -> Arc<dyn Middleware> {
        let log = Arc::clone(log);
        Arc::new(move |next: Handler| {
            let log = Arc::clone(&log);
            handler_fn(move |ctx, res, req, binder| {
                log.lock().unwrap().push(name.to_string());
                next(ctx, res, req, binder)
            })
        })
    }

    #[test]
    fn test_chain_runs_first_outermost() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let inner = {
            let log = Arc::clone(&log);
            handler_fn(move |_, _, _, _| {
                log.lock().unwrap().push("handler".to_string());
                Ok(())
            })
        };
        let handler = chain(&[recording(&log, "a"), recording(&log, "b")], inner);

        handler(
            &Context::background(),
            &mut Response::new(),
            &Request::get("/"),
            &Binder::none(),
        )
        .unwrap();
        assert_eq!(*log.lock().unwrap(), ["a", "b", "handler"]);
    }

    #[test]
    fn test_logging_middleware_passes_through() {
        let handler = LoggingMiddleware.wrap(handler_fn(|_, res, _, _| {
            res.write("ok");
            Ok(())
        }));
        let mut res = Response::new();
        handler(
            &Context::background(),
            &mut res,
            &Request::get("/"),
            &Binder::none(),
        )
        .unwrap();
        assert_eq!(res.body_string(), Some("ok".to_string()));
    }

    #[test]
    fn test_cors_outside_scope_is_noop() {
        let router = Router::new();
        let handler = CorsMethodMiddleware::new(&router).wrap(handler_fn(|_, _, _, _| Ok(())));
        let mut res = Response::new();
        handler(
            &Context::background(),
            &mut res,
            &Request::options("/"),
            &Binder::none(),
        )
        .unwrap();
        assert!(res.get_header(ACCESS_CONTROL_ALLOW_METHODS).is_none());
    }
}
