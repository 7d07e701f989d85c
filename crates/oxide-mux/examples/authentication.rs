//! Token based authentication as router middleware.
//!
//! Run with `cargo run -p oxide-mux --example authentication`.

use std::collections::HashMap;
use std::sync::Arc;

use oxide_mux::{
    handler_fn, Binder, BoxError, Context, Handler, LoggingMiddleware, Middleware, Request,
    Response, Router,
};
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

/// Maps session tokens to user names.
struct AuthenticationMiddleware {
    token_users: Arc<HashMap<String, String>>,
}

impl AuthenticationMiddleware {
    fn populate() -> Self {
        let token_users = [
            ("00000000", "user0"),
            ("aaaaaaaa", "userA"),
            ("05f717e5", "randomUser"),
            ("deadbeef", "user0"),
        ]
        .into_iter()
        .map(|(token, user)| (token.to_string(), user.to_string()))
        .collect();
        Self {
            token_users: Arc::new(token_users),
        }
    }
}

impl Middleware for AuthenticationMiddleware {
    fn wrap(&self, next: Handler) -> Handler {
        let token_users = Arc::clone(&self.token_users);
        handler_fn(move |ctx, res, req, binder| {
            let token = req.get_header("X-Session-Token").unwrap_or_default();
            match token_users.get(token) {
                Some(user) => {
                    info!(%user, "authenticated");
                    next(ctx, res, req, binder)
                }
                None => {
                    warn!(path = %req.path, "rejected request without a valid session");
                    res.error("Forbidden", 403);
                    Ok(())
                }
            }
        })
    }
}

fn main() -> Result<(), BoxError> {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::DEBUG)
        .with_target(false)
        .without_time()
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let mut router = Router::new();
    router.handle_fn("/", |_ctx, res, _req, _binder| {
        res.write("welcome");
        Ok(())
    })?;
    router.use_middleware(LoggingMiddleware);
    router.use_middleware(AuthenticationMiddleware::populate());

    for token in [None, Some("deadbeef")] {
        let mut req = Request::get("/");
        if let Some(token) = token {
            req = req.header("X-Session-Token", token);
        }
        let mut res = Response::new();
        router.serve(&Context::background(), &mut res, &req, &Binder::none())?;
        info!(status = res.status, body = ?res.body_string(), "served");
    }
    Ok(())
}
