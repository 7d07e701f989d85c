//! # oxide-mux
//!
//! A request router with composable matchers, nested subrouters and
//! middleware.
//!
//! This crate provides:
//! - Path, prefix, host and query templates with `{name}` and
//!   `{name:regex}` variables
//! - Method, scheme, header and custom matchers
//! - Subrouters that share a prefix and inherit their parent's matchers
//! - Middleware at router and route level
//! - Route names and metadata, reachable from handlers through the context
//! - 404/405 fallbacks, path cleaning and strict-slash redirects
//!
//! ## Quick Start
//!
//! ```
//! use oxide_mux::{Binder, Context, Method, Request, Response, Router};
//!
//! let mut router = Router::new();
//! router
//!     .handle_fn("/", |_ctx, res, _req, _binder| {
//!         res.write("Hello, World!");
//!         Ok(())
//!     })
//!     .unwrap();
//! router
//!     .handle_fn("/users/{id:[0-9]+}", |ctx, res, _req, _binder| {
//!         let id = ctx.vars().get("id").unwrap_or("unknown");
//!         res.json(&serde_json::json!({ "id": id }))?;
//!         Ok(())
//!     })
//!     .unwrap()
//!     .methods([Method::Get]);
//!
//! let mut res = Response::new();
//! router
//!     .serve(&Context::background(), &mut res, &Request::get("/users/123"), &Binder::none())
//!     .unwrap();
//! assert_eq!(res.body_string().unwrap(), r#"{"id":"123"}"#);
//! ```
//!
//! ## Subrouters
//!
//! ```
//! use oxide_mux::{Request, Router};
//!
//! let mut router = Router::new();
//! let api = router.host("{tenant}.example.com").unwrap().subrouter();
//! let users = api.path_prefix("/users").unwrap().subrouter();
//! users
//!     .handle_fn("/{id}", |_ctx, _res, _req, _binder| Ok(()))
//!     .unwrap()
//!     .name("user");
//!
//! let route = router.get("user").unwrap();
//! assert_eq!(route.get_path_template(), Some("/users/{id}"));
//! assert_eq!(route.get_host_template(), Some("{tenant}.example.com"));
//! ```
//!
//! ## Middleware
//!
//! ```
//! use oxide_mux::{handler_fn, Handler, LoggingMiddleware, Router};
//!
//! let mut router = Router::new();
//! router.use_middleware(LoggingMiddleware);
//! router.use_middleware(|next: Handler| {
//!     handler_fn(move |ctx, res, req, binder| {
//!         res.set_header("X-Frame-Options", "DENY");
//!         next(ctx, res, req, binder)
//!     })
//! });
//! ```
//!
//! ## Metadata
//!
//! ```
//! use oxide_mux::{Binder, Context, Request, Response, Router};
//!
//! let mut router = Router::new();
//! router
//!     .handle_fn("/admin", |ctx, res, _req, _binder| {
//!         let route = ctx.current_route().expect("matched");
//!         let role = route.get_metadata_value_or("role", "guest");
//!         res.write(role.as_str().unwrap_or_default());
//!         Ok(())
//!     })
//!     .unwrap()
//!     .metadata("role", "admin");
//!
//! let mut res = Response::new();
//! router
//!     .serve(&Context::background(), &mut res, &Request::get("/admin"), &Binder::none())
//!     .unwrap();
//! assert_eq!(res.body_string().unwrap(), "admin");
//! ```

mod context;
mod error;
mod handler;
mod matcher;
mod middleware;
mod pattern;
mod request;
mod response;
mod route;
mod router;

pub use context::{Cancellation, Context};
pub use error::{BoxError, MuxError, Result};
pub use handler::{
    handler_fn, method_not_allowed, not_found, not_found_handler, Binder, Handler, HandlerResult,
};
pub use matcher::{MatchOutcome, Matcher, MatcherFn};
pub use middleware::{
    chain, CorsMethodMiddleware, LoggingMiddleware, Middleware, ACCESS_CONTROL_ALLOW_METHODS,
};
pub use pattern::{Pattern, PatternKind, PatternOptions, RegexCompiler};
pub use request::{parse_query_string, Method, Request, Vars};
pub use response::Response;
pub use route::Route;
pub use router::{clean_path, Outcome, RouteMatch, Router};
