//! Router and dispatcher.

use std::fmt;
use std::sync::Arc;

use tracing::{debug, trace};

use crate::context::Context;
use crate::error::{MuxError, Result};
use crate::handler::{self, handler_fn, Binder, Handler, HandlerResult};
use crate::middleware::{self, Middleware};
use crate::pattern::RegexCompiler;
use crate::request::{Method, Request, Vars};
use crate::response::Response;
use crate::route::{Route, RouteConf};

/// Identity of a router, used to find it again among the routers a
/// request was dispatched through.
#[derive(Debug, Clone, Default)]
pub(crate) struct ScopeId(Arc<()>);

impl PartialEq for ScopeId {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

/// A successful match.
pub struct RouteMatch<'r> {
    /// The matched route.
    pub route: &'r Route,
    /// Variables captured along the way, including those of parent routes.
    pub vars: Vars,
    handler: &'r Handler,
    /// Routers the match went through, innermost first.
    scopes: Vec<&'r Router>,
}

impl<'r> RouteMatch<'r> {
    pub(crate) const fn new(route: &'r Route, handler: &'r Handler, vars: Vars) -> Self {
        Self {
            route,
            vars,
            handler,
            scopes: Vec::new(),
        }
    }

    /// Wraps `handler` with route middleware, then with the middleware of
    /// every router from the innermost to the root.
    fn chain(&self, handler: Handler) -> Handler {
        let handler = middleware::chain(self.route.middlewares(), handler);
        self.scopes.iter().fold(handler, |handler, router| {
            middleware::chain(&router.middlewares, handler)
        })
    }
}

impl fmt::Debug for RouteMatch<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouteMatch")
            .field("route", &self.route.get_name())
            .field("template", &self.route.get_path_template())
            .field("vars", &self.vars)
            .finish_non_exhaustive()
    }
}

/// What dispatch decided for a request.
#[derive(Debug)]
pub enum Outcome<'r> {
    /// A route matched.
    Matched(RouteMatch<'r>),
    /// Some route matched everything but the method.
    MethodMismatch(Vec<Method>),
    /// The request should be sent elsewhere with a `301`.
    Redirect {
        /// Target for the `Location` header.
        location: String,
        /// The route whose template disagreed with the request on the
        /// trailing slash. `None` when the request path was not clean.
        route: Option<RouteMatch<'r>>,
    },
    /// Nothing matched.
    NotFound,
}

/// A request router.
///
/// Routes are tried in registration order and the first one whose
/// matchers all accept the request wins.
///
/// # Example
///
/// ```
/// use oxide_mux::{Binder, Context, Method, Request, Response, Router};
///
/// let mut router = Router::new();
/// router
///     .handle_fn("/products/{key}", |ctx, res, _req, _binder| {
///         res.write(format!("product {}", ctx.vars().get("key").unwrap_or_default()));
///         Ok(())
///     })
///     .unwrap()
///     .methods([Method::Get]);
///
/// let api = router.path_prefix("/api").unwrap().subrouter();
/// api.handle_fn("/health", |_ctx, res, _req, _binder| {
///     res.write("ok");
///     Ok(())
/// })
/// .unwrap();
///
/// let mut res = Response::new();
/// router
///     .serve(&Context::background(), &mut res, &Request::get("/api/health"), &Binder::none())
///     .unwrap();
/// assert_eq!(res.body_string().unwrap(), "ok");
/// ```
pub struct Router {
    routes: Vec<Route>,
    middlewares: Vec<Arc<dyn Middleware>>,
    not_found: Option<Handler>,
    method_not_allowed: Option<Handler>,
    /// Configuration copied into every new route.
    conf: RouteConf,
    scope: ScopeId,
}

impl Default for Router {
    fn default() -> Self {
        Self::new()
    }
}

impl Router {
    /// Creates a new empty router.
    pub fn new() -> Self {
        Self::with_conf(RouteConf::default())
    }

    pub(crate) fn with_conf(conf: RouteConf) -> Self {
        Self {
            routes: Vec::new(),
            middlewares: Vec::new(),
            not_found: None,
            method_not_allowed: None,
            conf,
            scope: ScopeId::default(),
        }
    }

    /// Sets the regex compiler used for every template registered after
    /// this call.
    #[must_use]
    pub fn with_compiler(mut self, compiler: RegexCompiler) -> Self {
        self.conf.compiler = compiler;
        self
    }

    /// When enabled, a route registered as `/path/` redirects `/path` to
    /// `/path/` and the other way around. Applies to routes registered
    /// after the call.
    pub fn strict_slash(&mut self, value: bool) -> &mut Self {
        self.conf.strict_slash = value;
        self
    }

    /// Disables path cleaning, so `//a/../b` is matched as is.
    pub fn skip_clean(&mut self, value: bool) -> &mut Self {
        self.conf.skip_clean = value;
        self
    }

    /// Sets the handler used when no route matches.
    pub fn not_found_handler(&mut self, handler: Handler) -> &mut Self {
        self.not_found = Some(handler);
        self
    }

    /// Sets the handler used when a route matched everything but the
    /// method.
    pub fn method_not_allowed_handler(&mut self, handler: Handler) -> &mut Self {
        self.method_not_allowed = Some(handler);
        self
    }

    /// Appends router middleware. It runs only for requests matched by
    /// this router or one of its subrouters.
    pub fn use_middleware(&mut self, mw: impl Middleware + 'static) -> &mut Self {
        self.middlewares.push(Arc::new(mw));
        self
    }

    /// Registers an empty route.
    pub fn new_route(&mut self) -> &mut Route {
        self.push(Route::new(self.conf.clone()))
    }

    /// Registers a route for a path template.
    pub fn handle(&mut self, template: &str, handler: Handler) -> Result<&mut Route> {
        self.try_route(|route| Ok(route.path(template)?.handler(handler)))
    }

    /// Registers a closure for a path template.
    pub fn handle_fn<F>(&mut self, template: &str, f: F) -> Result<&mut Route>
    where
        F: for<'r> Fn(&Context<'r>, &mut Response, &Request, &Binder) -> HandlerResult
            + Send
            + Sync
            + 'static,
    {
        self.handle(template, handler_fn(f))
    }

    /// Registers a route with a path template.
    pub fn path(&mut self, template: &str) -> Result<&mut Route> {
        self.try_route(|route| route.path(template))
    }

    /// Registers a route with a path prefix template.
    pub fn path_prefix(&mut self, template: &str) -> Result<&mut Route> {
        self.try_route(|route| route.path_prefix(template))
    }

    /// Registers a route with a host template.
    pub fn host(&mut self, template: &str) -> Result<&mut Route> {
        self.try_route(|route| route.host(template))
    }

    /// Registers a route with query templates.
    pub fn queries(&mut self, kv: &[&str]) -> Result<&mut Route> {
        self.try_route(|route| route.queries(kv))
    }

    /// Registers a route with header requirements.
    pub fn headers(&mut self, kv: &[&str]) -> Result<&mut Route> {
        self.try_route(|route| route.headers(kv))
    }

    /// Registers a route with header expression requirements.
    pub fn headers_regexp(&mut self, kv: &[&str]) -> Result<&mut Route> {
        self.try_route(|route| route.headers_regexp(kv))
    }

    /// Registers a route restricted to methods.
    pub fn methods(&mut self, methods: impl IntoIterator<Item = Method>) -> &mut Route {
        self.new_route().methods(methods)
    }

    /// Registers a route restricted to schemes.
    pub fn schemes<S: AsRef<str>>(&mut self, schemes: impl IntoIterator<Item = S>) -> &mut Route {
        self.new_route().schemes(schemes)
    }

    /// Registers a route with a custom predicate.
    pub fn matcher_fn<F>(&mut self, f: F) -> &mut Route
    where
        F: Fn(&Request) -> bool + Send + Sync + 'static,
    {
        self.new_route().matcher_fn(f)
    }

    /// Registers a named route.
    pub fn name(&mut self, name: impl Into<String>) -> &mut Route {
        self.new_route().name(name)
    }

    /// Returns the registered routes in priority order.
    ///
    /// Routes left inert by a failed configuration call are not listed.
    pub fn routes(&self) -> Vec<&Route> {
        self.live_routes().collect()
    }

    /// Finds a route by name, searching subrouters depth first.
    pub fn get(&self, name: &str) -> Option<&Route> {
        self.live_routes().find_map(|route| {
            if route.get_name() == Some(name) {
                return Some(route);
            }
            route.get_subrouter().and_then(|router| router.get(name))
        })
    }

    /// Decides what dispatch would do with a request, without running
    /// any handler.
    pub fn resolve(&self, req: &Request) -> Outcome<'_> {
        if !self.conf.skip_clean {
            let cleaned = clean_path(&req.path);
            if cleaned != req.path {
                return Outcome::Redirect {
                    location: with_query(cleaned, &req.query),
                    route: None,
                };
            }
        }
        self.scan(req)
    }

    /// Dispatches a request.
    ///
    /// A match runs the route handler inside its middleware chain. A
    /// method mismatch, a miss or a redirect is answered by this router
    /// without any middleware. Handler errors are returned unchanged.
    pub fn serve(
        &self,
        ctx: &Context<'_>,
        res: &mut Response,
        req: &Request,
        binder: &Binder,
    ) -> HandlerResult {
        match self.resolve(req) {
            Outcome::Matched(found) => {
                debug!(
                    method = %req.method,
                    path = %req.path,
                    route = ?found.route.get_name(),
                    template = ?found.route.get_path_template(),
                    "route matched"
                );
                let handler = found.chain(Arc::clone(found.handler));
                let ctx = ctx.matched(found.route, found.vars, found.scopes);
                handler(&ctx, res, req, binder)
            }
            Outcome::MethodMismatch(allowed) => {
                debug!(method = %req.method, path = %req.path, ?allowed, "method not allowed");
                let ctx = ctx.fallback(allowed);
                match &self.method_not_allowed {
                    Some(handler) => handler(&ctx, res, req, binder),
                    None => handler::method_not_allowed(&ctx, res, req, binder),
                }
            }
            Outcome::Redirect { location, route } => {
                debug!(path = %req.path, %location, "redirecting");
                let redirect = handler_fn(move |_ctx, res, _req, _binder| {
                    res.redirect_permanent(location.as_str());
                    Ok(())
                });
                match route {
                    Some(found) => {
                        let handler = found.chain(redirect);
                        let ctx = ctx.matched(found.route, found.vars, found.scopes);
                        handler(&ctx, res, req, binder)
                    }
                    None => redirect(ctx, res, req, binder),
                }
            }
            Outcome::NotFound => {
                debug!(method = %req.method, path = %req.path, "no route matched");
                let ctx = ctx.fallback(Vec::new());
                match &self.not_found {
                    Some(handler) => handler(&ctx, res, req, binder),
                    None => handler::not_found(&ctx, res, req, binder),
                }
            }
        }
    }

    /// Union of the methods accepted by this router's own routes whose
    /// other matchers accept the request.
    ///
    /// Routes delegating to a subrouter are skipped. Fails if a matching
    /// route accepts any method, or if no route matches.
    pub fn allowed_methods(&self, req: &Request) -> Result<Vec<Method>> {
        let mut methods: Vec<Method> = Vec::new();
        for route in &self.routes {
            if route.get_subrouter().is_some() {
                continue;
            }
            if matches!(route.evaluate(req), Outcome::NotFound) {
                continue;
            }
            for method in route.get_methods()? {
                if !methods.contains(&method) {
                    methods.push(method);
                }
            }
        }
        if methods.is_empty() {
            return Err(MuxError::NoMatchingRoute);
        }
        Ok(methods)
    }

    pub(crate) const fn scope_id(&self) -> &ScopeId {
        &self.scope
    }

    /// Scans routes in order.
    pub(crate) fn scan(&self, req: &Request) -> Outcome<'_> {
        let mut allowed: Vec<Method> = Vec::new();
        for route in &self.routes {
            match route.evaluate(req) {
                Outcome::Matched(mut found) => {
                    found.scopes.push(self);
                    return Outcome::Matched(found);
                }
                Outcome::Redirect {
                    location,
                    mut route,
                } => {
                    if let Some(found) = &mut route {
                        found.scopes.push(self);
                    }
                    return Outcome::Redirect { location, route };
                }
                Outcome::MethodMismatch(methods) => {
                    trace!(path = %req.path, ?methods, "method mismatch");
                    for method in methods {
                        if !allowed.contains(&method) {
                            allowed.push(method);
                        }
                    }
                }
                Outcome::NotFound => {}
            }
        }
        if allowed.is_empty() {
            Outcome::NotFound
        } else {
            Outcome::MethodMismatch(allowed)
        }
    }

    fn live_routes(&self) -> impl Iterator<Item = &Route> {
        self.routes.iter().filter(|route| !route.is_inert())
    }

    fn push(&mut self, route: Route) -> &mut Route {
        let index = self.routes.len();
        self.routes.push(route);
        &mut self.routes[index]
    }

    /// Configures a detached route and registers it only on success.
    fn try_route<F>(&mut self, configure: F) -> Result<&mut Route>
    where
        F: FnOnce(&mut Route) -> Result<&mut Route>,
    {
        let mut route = Route::new(self.conf.clone());
        configure(&mut route)?;
        trace!(template = ?route.get_path_template(), "route registered");
        Ok(self.push(route))
    }
}

impl fmt::Debug for Router {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Router")
            .field("routes", &self.routes)
            .field("middlewares", &self.middlewares.len())
            .field("strict_slash", &self.conf.strict_slash)
            .field("skip_clean", &self.conf.skip_clean)
            .finish_non_exhaustive()
    }
}

fn with_query(mut path: String, query: &str) -> String {
    if !query.is_empty() {
        path.push('?');
        path.push_str(query);
    }
    path
}

/// Returns the canonical form of a URL path.
///
/// Repeated slashes collapse, `.` segments are dropped and `..` removes
/// the segment before it. A trailing slash is kept.
pub fn clean_path(path: &str) -> String {
    if path.is_empty() {
        return "/".to_string();
    }

    let mut segments: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            segment => segments.push(segment),
        }
    }

    let mut cleaned = String::with_capacity(path.len());
    for segment in &segments {
        cleaned.push('/');
        cleaned.push_str(segment);
    }
    if cleaned.is_empty() {
        cleaned.push('/');
    } else if path.ends_with('/') {
        cleaned.push('/');
    }
    cleaned
}
