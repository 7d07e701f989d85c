#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use oxide_mux::{
    handler_fn, Binder, Context, Handler, HandlerResult, Middleware, Request, Response, Router,
};

/// A handler writing a fixed body.
pub fn string_handler(body: &'static str) -> Handler {
    handler_fn(move |_ctx, res, _req, _binder| {
        res.write(body);
        Ok(())
    })
}

/// A handler doing nothing.
pub fn dummy_handler() -> Handler {
    handler_fn(|_ctx, _res, _req, _binder| Ok(()))
}

pub fn try_serve(router: &Router, req: &Request) -> (Response, HandlerResult) {
    let mut res = Response::new();
    let result = router.serve(&Context::background(), &mut res, req, &Binder::none());
    (res, result)
}

pub fn serve(router: &Router, req: &Request) -> Response {
    let (res, result) = try_serve(router, req);
    result.unwrap_or_else(|e| panic!("serve failed for {} {}: {e}", req.method, req.path));
    res
}

pub fn body(res: &Response) -> String {
    res.body_string().expect("utf-8 body")
}

/// Middleware writing `text` before calling the next handler.
pub fn writing_middleware(text: &'static str) -> impl Middleware {
    move |next: Handler| {
        handler_fn(move |ctx, res, req, binder| {
            res.write(text);
            next(ctx, res, req, binder)
        })
    }
}

/// Middleware counting how often it ran. Clones share the counter.
#[derive(Clone, Default)]
pub struct CountingMiddleware {
    calls: Arc<AtomicUsize>,
}

impl CountingMiddleware {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Middleware for CountingMiddleware {
    fn wrap(&self, next: Handler) -> Handler {
        let calls = Arc::clone(&self.calls);
        handler_fn(move |ctx, res, req, binder| {
            calls.fetch_add(1, Ordering::SeqCst);
            next(ctx, res, req, binder)
        })
    }
}
