//! Answers a CORS preflight request with the methods registered for a path.
//!
//! Run with `cargo run -p oxide-mux --example cors_preflight`.

use oxide_mux::{
    Binder, BoxError, Context, CorsMethodMiddleware, Method, Request, Response, Router,
    ACCESS_CONTROL_ALLOW_METHODS,
};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

fn main() -> Result<(), BoxError> {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::DEBUG)
        .with_target(false)
        .without_time()
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let mut router = Router::new();
    router
        .handle_fn("/foo", |_ctx, res, _req, _binder| {
            res.write("foo");
            Ok(())
        })?
        .methods([Method::Get, Method::Put, Method::Patch]);
    router
        .handle_fn("/foo", |_ctx, res, _req, _binder| {
            res.set_header("Access-Control-Allow-Origin", "http://example.com");
            res.set_header("Access-Control-Max-Age", "86400");
            Ok(())
        })?
        .methods([Method::Options]);

    let cors = CorsMethodMiddleware::new(&router);
    router.use_middleware(cors);

    let req = Request::options("/foo")
        .header("Access-Control-Request-Method", "POST")
        .header("Access-Control-Request-Headers", "Authorization")
        .header("Origin", "http://example.com");
    let mut res = Response::new();
    router.serve(&Context::background(), &mut res, &req, &Binder::none())?;

    info!(
        allow_methods = ?res.get_header(ACCESS_CONTROL_ALLOW_METHODS),
        allow_origin = ?res.get_header("Access-Control-Allow-Origin"),
        "preflight answered"
    );
    Ok(())
}
