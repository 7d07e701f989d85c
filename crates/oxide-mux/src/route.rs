//! Route definitions.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use regex::Regex;
use serde_json::Value;
use tracing::{debug, warn};

use crate::context::Context;
use crate::error::{MuxError, Result};
use crate::handler::{handler_fn, Binder, Handler, HandlerResult};
use crate::matcher::{MatchOutcome, Matcher};
use crate::middleware::Middleware;
use crate::pattern::{Pattern, PatternKind, PatternOptions, RegexCompiler};
use crate::request::{Method, Request, Vars};
use crate::response::Response;
use crate::router::{Outcome, RouteMatch, Router};

/// Settings a route inherits from the router that created it.
///
/// A subrouter is created with a copy of its parent route's configuration,
/// so the routes it registers start with the parent's matchers and extend
/// the parent's path template.
#[derive(Clone, Default)]
pub(crate) struct RouteConf {
    pub(crate) strict_slash: bool,
    pub(crate) skip_clean: bool,
    pub(crate) compiler: RegexCompiler,
    /// Matchers, kept sorted by evaluation rank.
    matchers: Vec<Matcher>,
    path: Option<Pattern>,
    host: Option<Pattern>,
    queries: Vec<Pattern>,
}

impl RouteConf {
    fn add_matcher(&mut self, matcher: Matcher) {
        let rank = matcher.rank();
        let at = self.matchers.partition_point(|m| m.rank() <= rank);
        self.matchers.insert(at, matcher);
    }

    fn add_pattern(&mut self, template: &str, kind: PatternKind) -> Result<()> {
        let mut template = template.to_string();
        if matches!(kind, PatternKind::Path | PatternKind::Prefix) {
            if !template.is_empty() && !template.starts_with('/') {
                return Err(MuxError::PathMustStartWithSlash { template });
            }
            if let Some(parent) = &self.path {
                template = format!("{}{template}", parent.template().trim_end_matches('/'));
            }
        }

        let options = PatternOptions {
            strict_slash: self.strict_slash,
        };
        let pattern = Pattern::compile(&template, kind, options, &self.compiler)?;

        for query in &self.queries {
            unique_vars(&pattern, query)?;
        }
        match kind {
            PatternKind::Host => {
                if let Some(path) = &self.path {
                    unique_vars(&pattern, path)?;
                }
                self.host = Some(pattern.clone());
                self.add_matcher(Matcher::Host(pattern));
            }
            PatternKind::Query => {
                for other in self.host.iter().chain(&self.path) {
                    unique_vars(&pattern, other)?;
                }
                self.queries.push(pattern.clone());
                self.add_matcher(Matcher::Query(pattern));
            }
            PatternKind::Path | PatternKind::Prefix => {
                if let Some(host) = &self.host {
                    unique_vars(&pattern, host)?;
                }
                self.path = Some(pattern.clone());
                if kind == PatternKind::Path {
                    self.add_matcher(Matcher::Path(pattern));
                } else {
                    self.add_matcher(Matcher::PathPrefix(pattern));
                }
            }
        }
        Ok(())
    }
}

fn unique_vars(a: &Pattern, b: &Pattern) -> Result<()> {
    match a.var_names().iter().find(|name| b.var_names().contains(name)) {
        Some(name) => Err(MuxError::DuplicateVariable {
            template: a.template().to_string(),
            name: name.clone(),
        }),
        None => Ok(()),
    }
}

fn pairs<'a>(pairs: &[&'a str]) -> Result<Vec<(&'a str, &'a str)>> {
    if pairs.len() % 2 != 0 {
        return Err(MuxError::OddPairs { count: pairs.len() });
    }
    Ok(pairs.chunks_exact(2).map(|kv| (kv[0], kv[1])).collect())
}

/// A single registered route.
///
/// Routes are created by a [`Router`] and configured through chained
/// calls. Every matcher added narrows the route; a request must satisfy
/// all of them.
pub struct Route {
    /// Optional route name.
    name: Option<String>,
    conf: RouteConf,
    handler: Option<Handler>,
    subrouter: Option<Box<Router>>,
    middlewares: Vec<Arc<dyn Middleware>>,
    metadata: HashMap<String, Value>,
    build_only: bool,
    /// Set when a configuration call failed; the route never matches.
    inert: bool,
}

impl Route {
    pub(crate) fn new(conf: RouteConf) -> Self {
        Self {
            name: None,
            conf,
            handler: None,
            subrouter: None,
            middlewares: Vec::new(),
            metadata: HashMap::new(),
            build_only: false,
            inert: false,
        }
    }

    /// Sets the handler.
    pub fn handler(&mut self, handler: Handler) -> &mut Self {
        self.handler = Some(handler);
        self
    }

    /// Sets the handler from a closure.
    pub fn handler_fn<F>(&mut self, f: F) -> &mut Self
    where
        F: for<'r> Fn(&Context<'r>, &mut Response, &Request, &Binder) -> HandlerResult
            + Send
            + Sync
            + 'static,
    {
        self.handler(handler_fn(f))
    }

    /// Sets the route name.
    pub fn name(&mut self, name: impl Into<String>) -> &mut Self {
        self.name = Some(name.into());
        self
    }

    /// Marks the route as only usable for building URLs; it never matches.
    pub fn build_only(&mut self) -> &mut Self {
        self.build_only = true;
        self
    }

    /// Matches the whole path against a template.
    ///
    /// Inside a subrouter the template is appended to the parent prefix.
    pub fn path(&mut self, template: &str) -> Result<&mut Self> {
        self.add_pattern(template, PatternKind::Path)
    }

    /// Matches the beginning of the path against a template.
    pub fn path_prefix(&mut self, template: &str) -> Result<&mut Self> {
        self.add_pattern(template, PatternKind::Prefix)
    }

    /// Matches the request host against a template such as
    /// `{subdomain}.example.com`.
    pub fn host(&mut self, template: &str) -> Result<&mut Self> {
        self.add_pattern(template, PatternKind::Host)
    }

    /// Matches query values given as key/template pairs.
    ///
    /// ```
    /// use oxide_mux::Router;
    ///
    /// let mut router = Router::new();
    /// router
    ///     .path("/metrics/{type}")
    ///     .unwrap()
    ///     .queries(&["orgID", "{orgID:[0-9]*?}"])
    ///     .unwrap();
    /// ```
    pub fn queries(&mut self, kv: &[&str]) -> Result<&mut Self> {
        let kv = self.check(pairs(kv))?;
        for (key, value) in kv {
            self.add_pattern(&format!("{key}={value}"), PatternKind::Query)?;
        }
        Ok(self)
    }

    /// Requires header values given as key/value pairs; an empty value
    /// only requires the header to be present.
    pub fn headers(&mut self, kv: &[&str]) -> Result<&mut Self> {
        let kv = self.check(pairs(kv))?;
        let kv = kv
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        self.conf.add_matcher(Matcher::Headers(kv));
        Ok(self)
    }

    /// Requires header values matching expressions given as key/value
    /// pairs; an empty expression only requires presence.
    pub fn headers_regexp(&mut self, kv: &[&str]) -> Result<&mut Self> {
        let kv = self.check(pairs(kv))?;
        let mut compiled = Vec::with_capacity(kv.len());
        for (key, expr) in kv {
            let regex = if expr.is_empty() {
                None
            } else {
                let regex: Result<Regex> = self.conf.compiler.compile(expr).map_err(|source| {
                    MuxError::InvalidRegex {
                        template: expr.to_string(),
                        source,
                    }
                });
                Some(self.check(regex)?)
            };
            compiled.push((key.to_string(), regex));
        }
        self.conf.add_matcher(Matcher::HeadersRegexp(compiled));
        Ok(self)
    }

    /// Restricts the route to the given methods.
    pub fn methods(&mut self, methods: impl IntoIterator<Item = Method>) -> &mut Self {
        let methods = methods.into_iter().collect();
        self.conf.add_matcher(Matcher::Methods(methods));
        self
    }

    /// Restricts the route to the given URL schemes.
    pub fn schemes<S: AsRef<str>>(&mut self, schemes: impl IntoIterator<Item = S>) -> &mut Self {
        let schemes = schemes
            .into_iter()
            .map(|s| s.as_ref().to_ascii_lowercase())
            .collect();
        self.conf.add_matcher(Matcher::Schemes(schemes));
        self
    }

    /// Adds an arbitrary predicate.
    pub fn matcher_fn<F>(&mut self, f: F) -> &mut Self
    where
        F: Fn(&Request) -> bool + Send + Sync + 'static,
    {
        self.conf.add_matcher(Matcher::Custom(Arc::new(f)));
        self
    }

    /// Attaches a metadata entry, replacing any previous value for `key`.
    pub fn metadata(&mut self, key: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Appends route middleware. It runs inside every router middleware.
    pub fn use_middleware(&mut self, mw: impl Middleware + 'static) -> &mut Self {
        self.middlewares.push(Arc::new(mw));
        self
    }

    /// Turns this route into a delegation to a new child router.
    ///
    /// The child inherits this route's matchers, so its routes only see
    /// requests this route already accepts, and their path templates are
    /// appended to this route's path. A route with a subrouter ignores its
    /// own handler.
    pub fn subrouter(&mut self) -> &mut Router {
        debug!(prefix = ?self.get_path_template(), "subrouter created");
        self.subrouter
            .insert(Box::new(Router::with_conf(self.conf.clone())))
    }

    /// Returns the route name.
    pub fn get_name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Returns the handler.
    pub const fn get_handler(&self) -> Option<&Handler> {
        self.handler.as_ref()
    }

    /// Returns the path or prefix template.
    pub fn get_path_template(&self) -> Option<&str> {
        self.conf.path.as_ref().map(Pattern::template)
    }

    /// Returns the host template.
    pub fn get_host_template(&self) -> Option<&str> {
        self.conf.host.as_ref().map(Pattern::template)
    }

    /// Returns the query templates as `key=value` strings.
    pub fn get_queries_templates(&self) -> Vec<&str> {
        self.conf.queries.iter().map(Pattern::template).collect()
    }

    /// Returns the methods the route accepts.
    ///
    /// Method constraints inherited from parent routes narrow each other,
    /// so only methods present in every set are returned. Fails with
    /// [`MuxError::MethodsNotDefined`] when the route accepts any method.
    pub fn get_methods(&self) -> Result<Vec<Method>> {
        self.effective_methods().ok_or(MuxError::MethodsNotDefined)
    }

    /// Intersection of every method constraint, in the order of the first.
    fn effective_methods(&self) -> Option<Vec<Method>> {
        let mut sets = self.conf.matchers.iter().filter_map(|matcher| match matcher {
            Matcher::Methods(accepted) => Some(accepted),
            _ => None,
        });
        let mut methods = sets.next()?.clone();
        for accepted in sets {
            methods.retain(|method| accepted.contains(method));
        }
        Some(methods)
    }

    /// Returns a copy of the metadata.
    pub fn get_metadata(&self) -> HashMap<String, Value> {
        self.metadata.clone()
    }

    /// Returns the metadata value stored under `key`.
    pub fn get_metadata_value(&self, key: &str) -> Result<&Value> {
        self.metadata
            .get(key)
            .ok_or_else(|| MuxError::MetadataKeyNotFound(key.to_string()))
    }

    /// Returns the metadata value stored under `key`, or `fallback`.
    pub fn get_metadata_value_or(&self, key: &str, fallback: impl Into<Value>) -> Value {
        self.metadata
            .get(key)
            .cloned()
            .unwrap_or_else(|| fallback.into())
    }

    /// Returns true for build-only routes.
    pub const fn is_build_only(&self) -> bool {
        self.build_only
    }

    /// Returns the child router, if this route delegates to one.
    pub fn get_subrouter(&self) -> Option<&Router> {
        self.subrouter.as_deref()
    }

    pub(crate) const fn is_inert(&self) -> bool {
        self.inert
    }

    pub(crate) fn middlewares(&self) -> &[Arc<dyn Middleware>] {
        &self.middlewares
    }

    /// Evaluates the route against a request.
    pub(crate) fn evaluate<'r>(&'r self, req: &Request) -> Outcome<'r> {
        if self.build_only || self.inert {
            return Outcome::NotFound;
        }

        let mut vars = Vars::new();
        let mut method_mismatch = false;
        for matcher in &self.conf.matchers {
            match matcher.evaluate(req, &mut vars) {
                MatchOutcome::Matched => {}
                MatchOutcome::NotMatched => return Outcome::NotFound,
                MatchOutcome::MethodMismatch(_) => method_mismatch = true,
            }
        }

        // Child routes carry this route's matchers, so the subrouter
        // decides between a miss and a method mismatch.
        if let Some(router) = &self.subrouter {
            return match router.scan(req) {
                Outcome::Matched(_) | Outcome::Redirect { .. } if method_mismatch => {
                    self.method_mismatch()
                }
                Outcome::Matched(mut found) => {
                    found.vars.fill_from(&vars);
                    Outcome::Matched(found)
                }
                Outcome::Redirect {
                    location,
                    mut route,
                } => {
                    if let Some(found) = &mut route {
                        found.vars.fill_from(&vars);
                    }
                    Outcome::Redirect { location, route }
                }
                other => other,
            };
        }
        if method_mismatch {
            return self.method_mismatch();
        }

        let Some(handler) = &self.handler else {
            return Outcome::NotFound;
        };
        if let Some(location) = self.strict_slash_redirect(req) {
            return Outcome::Redirect {
                location,
                route: Some(RouteMatch::new(self, handler, vars)),
            };
        }
        Outcome::Matched(RouteMatch::new(self, handler, vars))
    }

    fn method_mismatch<'r>(&self) -> Outcome<'r> {
        Outcome::MethodMismatch(self.effective_methods().unwrap_or_default())
    }

    /// Location to redirect to when the request path and the template
    /// disagree only on the trailing slash.
    fn strict_slash_redirect(&self, req: &Request) -> Option<String> {
        let want = self.conf.path.as_ref()?.wants_trailing_slash()?;
        let have = req.path.ends_with('/');
        if want == have {
            return None;
        }
        let mut location = if have {
            req.path[..req.path.len() - 1].to_string()
        } else {
            format!("{}/", req.path)
        };
        if !req.query.is_empty() {
            location.push('?');
            location.push_str(&req.query);
        }
        Some(location)
    }

    fn add_pattern(&mut self, template: &str, kind: PatternKind) -> Result<&mut Self> {
        let added = self.conf.add_pattern(template, kind);
        self.check(added)?;
        Ok(self)
    }

    /// Marks the route inert when a configuration step failed.
    fn check<T>(&mut self, result: Result<T>) -> Result<T> {
        if let Err(err) = &result {
            warn!(error = %err, route = ?self.name, "route configuration failed");
            self.inert = true;
        }
        result
    }
}

impl fmt::Debug for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Route")
            .field("name", &self.name)
            .field("matchers", &self.conf.matchers)
            .field("subrouter", &self.subrouter)
            .field("metadata", &self.metadata)
            .field("build_only", &self.build_only)
            .field("inert", &self.inert)
            .finish_non_exhaustive()
    }
}
