//! Tests for middleware composition and fallback isolation.

mod common;
use common::*;

use oxide_mux::{handler_fn, Handler, Method, Request, Router};

#[test]
fn middleware_call_counts() {
    let mut router = Router::new();
    router
        .handle("/", dummy_handler())
        .unwrap()
        .methods([Method::Get]);

    let mw = CountingMiddleware::default();
    router.use_middleware(mw.clone());

    serve(&router, &Request::get("/"));
    assert_eq!(mw.calls(), 1);

    // not called for 404
    serve(&router, &Request::get("/not/found"));
    assert_eq!(mw.calls(), 1);

    // not called for method mismatch
    serve(&router, &Request::post("/"));
    assert_eq!(mw.calls(), 1);

    router.use_middleware(mw.clone());
    serve(&router, &Request::get("/"));
    assert_eq!(mw.calls(), 3);

    router
        .handle("/route", dummy_handler())
        .unwrap()
        .use_middleware(mw.clone());
    serve(&router, &Request::get("/route"));
    assert_eq!(mw.calls(), 6);

    // the second /route is shadowed by the first one
    router
        .handle("/route", dummy_handler())
        .unwrap()
        .use_middleware(mw.clone());
    serve(&router, &Request::get("/route"));
    assert_eq!(mw.calls(), 9);
}

#[test]
fn subrouter_middleware_is_scoped() {
    let mut router = Router::new();
    router
        .handle("/", dummy_handler())
        .unwrap()
        .methods([Method::Get]);

    let mw = CountingMiddleware::default();
    let sub = router.path_prefix("/sub").unwrap().subrouter();
    sub.handle("/x", dummy_handler())
        .unwrap()
        .methods([Method::Get]);
    sub.use_middleware(mw.clone());

    serve(&router, &Request::get("/"));
    assert_eq!(mw.calls(), 0, "route outside subrouter");

    serve(&router, &Request::get("/sub/"));
    assert_eq!(mw.calls(), 0, "subrouter root 404");

    serve(&router, &Request::get("/sub/x"));
    assert_eq!(mw.calls(), 1, "route inside subrouter");

    serve(&router, &Request::get("/sub/not/found"));
    assert_eq!(mw.calls(), 1, "404 inside subrouter");

    router.use_middleware(mw.clone());

    serve(&router, &Request::get("/"));
    assert_eq!(mw.calls(), 2);

    serve(&router, &Request::get("/sub/x"));
    assert_eq!(mw.calls(), 4);
}

#[test]
fn middleware_execution_order() {
    let mut router = Router::new();
    router.handle("/", string_handler("Logic\n")).unwrap();

    let res = serve(&router, &Request::get("/"));
    assert_eq!(body(&res), "Logic\n");

    router.use_middleware(writing_middleware("Middleware\n"));
    let res = serve(&router, &Request::get("/"));
    assert_eq!(body(&res), "Middleware\nLogic\n");

    router
        .handle("/route", string_handler("Logic\n"))
        .unwrap()
        .use_middleware(writing_middleware("Route Middleware\n"));
    let res = serve(&router, &Request::get("/route"));
    assert_eq!(body(&res), "Middleware\nRoute Middleware\nLogic\n");
}

#[test]
fn nested_levels_run_outermost_first() {
    let mut router = Router::new();
    router.use_middleware(writing_middleware("root1 "));
    router.use_middleware(writing_middleware("root2 "));

    let api = router.path_prefix("/api").unwrap().subrouter();
    api.use_middleware(writing_middleware("api "));
    let v1 = api.path_prefix("/v1").unwrap().subrouter();
    v1.use_middleware(writing_middleware("v1 "));
    v1.handle("/items", string_handler("handler"))
        .unwrap()
        .use_middleware(writing_middleware("route1 "))
        .use_middleware(writing_middleware("route2 "));

    let res = serve(&router, &Request::get("/api/v1/items"));
    assert_eq!(body(&res), "root1 root2 api v1 route1 route2 handler");
}

#[test]
fn middleware_can_short_circuit() {
    let mut router = Router::new();
    router.handle("/", string_handler("secret")).unwrap();
    router.use_middleware(|next: Handler| {
        handler_fn(move |ctx, res, req, binder| {
            if req.get_header("X-Session-Token") != Some("deadbeef") {
                res.error("Forbidden", 403);
                return Ok(());
            }
            next(ctx, res, req, binder)
        })
    });

    let res = serve(&router, &Request::get("/"));
    assert_eq!(res.status, 403);
    assert_eq!(body(&res), "Forbidden\n");

    let res = serve(
        &router,
        &Request::get("/").header("X-Session-Token", "deadbeef"),
    );
    assert_eq!(res.status, 200);
    assert_eq!(body(&res), "secret");
}

#[test]
fn middleware_not_called_for_not_found() {
    let mut router = Router::new();
    router.handle("/", string_handler("Logic\n")).unwrap();
    router.use_middleware(writing_middleware("Middleware\n"));

    let res = serve(&router, &Request::get("/notfound"));
    assert_eq!(res.status, 404);
    assert!(!body(&res).contains("Middleware"));

    router.not_found_handler(string_handler("Custom 404 handler"));
    let res = serve(&router, &Request::get("/notfound"));
    assert_eq!(body(&res), "Custom 404 handler");
}

#[test]
fn middleware_not_called_for_method_mismatch() {
    let mut router = Router::new();
    router
        .handle("/", string_handler("Logic\n"))
        .unwrap()
        .methods([Method::Get]);
    router.use_middleware(writing_middleware("Middleware\n"));

    let res = serve(&router, &Request::post("/"));
    assert_eq!(res.status, 405);
    assert!(!body(&res).contains("Middleware"));

    router.method_not_allowed_handler(string_handler("Method not allowed"));
    let res = serve(&router, &Request::post("/"));
    assert_eq!(body(&res), "Method not allowed");
}

#[test]
fn middleware_not_called_for_not_found_in_subrouter() {
    let mut router = Router::new();
    router.handle("/", string_handler("Logic\n")).unwrap();
    let sub = router.path_prefix("/sub/").unwrap().subrouter();
    sub.handle("/", string_handler("Logic\n")).unwrap();
    sub.not_found_handler(string_handler("subrouter 404"));
    router.use_middleware(writing_middleware("Middleware\n"));

    let res = serve(&router, &Request::get("/sub/notfound"));
    assert_eq!(res.status, 404);
    assert_eq!(body(&res), "404 page not found\n");

    router.not_found_handler(string_handler("Custom 404 handler"));
    let res = serve(&router, &Request::get("/sub/notfound"));
    assert_eq!(body(&res), "Custom 404 handler");
}

#[test]
fn middleware_not_called_for_method_mismatch_in_subrouter() {
    let mut router = Router::new();
    router.handle("/", string_handler("Logic\n")).unwrap();
    router
        .path_prefix("/sub/")
        .unwrap()
        .subrouter()
        .handle("/", string_handler("Logic\n"))
        .unwrap()
        .methods([Method::Get]);
    router.use_middleware(writing_middleware("Middleware\n"));

    let res = serve(&router, &Request::post("/sub/"));
    assert_eq!(res.status, 405);
    assert!(!body(&res).contains("Middleware"));

    router.method_not_allowed_handler(handler_fn(|ctx, res, _req, _binder| {
        let allowed: Vec<&str> = ctx.allowed_methods().iter().map(|m| m.as_str()).collect();
        res.write(format!("Method not allowed, use {}", allowed.join(",")));
        Ok(())
    }));
    let res = serve(&router, &Request::post("/sub/"));
    assert_eq!(body(&res), "Method not allowed, use GET");
}

#[test]
fn strict_slash_redirect_runs_matched_middleware() {
    let mut router = Router::new();
    router.strict_slash(true);
    let root_mw = CountingMiddleware::default();
    router.use_middleware(root_mw.clone());

    let sub_mw = CountingMiddleware::default();
    let route_mw = CountingMiddleware::default();
    let sub = router.path_prefix("/docs").unwrap().subrouter();
    sub.handle("/guide/", string_handler("guide"))
        .unwrap()
        .use_middleware(route_mw.clone());
    sub.use_middleware(sub_mw.clone());

    let res = serve(&router, &Request::get("/docs/guide"));
    assert_eq!(res.status, 301);
    assert_eq!(res.get_header("Location"), Some("/docs/guide/"));
    assert_eq!(
        (root_mw.calls(), sub_mw.calls(), route_mw.calls()),
        (1, 1, 1)
    );

    // path cleaning happens before any route is consulted
    let res = serve(&router, &Request::get("/docs//guide/"));
    assert_eq!(res.status, 301);
    assert_eq!(root_mw.calls(), 1);
}

#[test]
fn middleware_on_sibling_subrouters() {
    let mut router = Router::new();
    router.not_found_handler(string_handler("404 not found"));

    let first = router.path_prefix("/").unwrap().subrouter();
    first.handle("/first", dummy_handler()).unwrap();
    first.use_middleware(writing_middleware("first"));

    let second = router.path_prefix("/").unwrap().subrouter();
    second.handle("/second", dummy_handler()).unwrap();
    second.use_middleware(writing_middleware("second"));

    assert_eq!(body(&serve(&router, &Request::get("/first"))), "first");
    assert_eq!(body(&serve(&router, &Request::get("/second"))), "second");
    assert_eq!(
        body(&serve(&router, &Request::get("/second/not-exist"))),
        "404 not found"
    );
}

#[test]
fn middleware_error_propagates() {
    let mut router = Router::new();
    router.handle("/", string_handler("never")).unwrap();
    router.use_middleware(|_next: Handler| {
        handler_fn(|_ctx, _res, _req, _binder| Err("middleware refused".into()))
    });

    let (res, result) = try_serve(&router, &Request::get("/"));
    assert_eq!(result.unwrap_err().to_string(), "middleware refused");
    assert!(res.body.is_empty());
}
