//! Request predicates.
//!
//! A route holds a conjunction of [`Matcher`]s. They are evaluated in a
//! fixed order (scheme, host, path, headers, queries, custom, method) so
//! that a request whose path matched but whose method did not can be told
//! apart from one that matched nothing.

use std::fmt;
use std::sync::Arc;

use regex::Regex;

use crate::pattern::Pattern;
use crate::request::{Method, Request, Vars};

/// A caller supplied predicate.
pub type MatcherFn = Arc<dyn Fn(&Request) -> bool + Send + Sync>;

/// Result of evaluating one matcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchOutcome {
    /// The predicate holds.
    Matched,
    /// The predicate does not hold.
    NotMatched,
    /// Only the method was rejected; carries the accepted methods.
    MethodMismatch(Vec<Method>),
}

/// One predicate of a route.
#[derive(Clone)]
pub enum Matcher {
    /// Accepted URL schemes, lowercased.
    Schemes(Vec<String>),
    /// Host template.
    Host(Pattern),
    /// Full path template.
    Path(Pattern),
    /// Path prefix template.
    PathPrefix(Pattern),
    /// Header name/value pairs; an empty value only requires presence.
    Headers(Vec<(String, String)>),
    /// Header names with optional value expressions.
    HeadersRegexp(Vec<(String, Option<Regex>)>),
    /// One `key=value` query template.
    Query(Pattern),
    /// Arbitrary predicate.
    Custom(MatcherFn),
    /// Accepted methods.
    Methods(Vec<Method>),
}

impl Matcher {
    /// Evaluation priority; lower runs first.
    pub(crate) const fn rank(&self) -> u8 {
        match self {
            Self::Schemes(_) => 0,
            Self::Host(_) => 1,
            Self::Path(_) | Self::PathPrefix(_) => 2,
            Self::Headers(_) | Self::HeadersRegexp(_) => 3,
            Self::Query(_) => 4,
            Self::Custom(_) => 5,
            Self::Methods(_) => 6,
        }
    }

    /// Evaluates the matcher, recording captured variables into `vars`.
    pub fn evaluate(&self, req: &Request, vars: &mut Vars) -> MatchOutcome {
        let matched = match self {
            Self::Schemes(schemes) => {
                let scheme = req.scheme();
                schemes.iter().any(|s| *s == scheme)
            }
            Self::Host(pattern) => pattern.captures(req.host(), vars),
            Self::Path(pattern) | Self::PathPrefix(pattern) => pattern.captures(&req.path, vars),
            Self::Headers(pairs) => pairs.iter().all(|(key, expected)| {
                req.get_header(key)
                    .is_some_and(|value| expected.is_empty() || value == expected)
            }),
            Self::HeadersRegexp(pairs) => pairs.iter().all(|(key, expected)| {
                req.get_header(key).is_some_and(|value| {
                    expected.as_ref().is_none_or(|regex| regex.is_match(value))
                })
            }),
            Self::Query(pattern) => {
                let key = query_key(pattern);
                let pair = req
                    .query_pairs()
                    .into_iter()
                    .find(|(k, _)| k == key)
                    .map(|(k, v)| format!("{k}={v}"))
                    .unwrap_or_default();
                pattern.captures(&pair, vars)
            }
            Self::Custom(predicate) => predicate(req),
            Self::Methods(methods) => {
                if methods.contains(&req.method) {
                    return MatchOutcome::Matched;
                }
                return MatchOutcome::MethodMismatch(methods.clone());
            }
        };

        if matched {
            MatchOutcome::Matched
        } else {
            MatchOutcome::NotMatched
        }
    }
}

fn query_key(pattern: &Pattern) -> &str {
    let template = pattern.template();
    template.split_once('=').map_or(template, |(key, _)| key)
}

impl fmt::Debug for Matcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Schemes(schemes) => f.debug_tuple("Schemes").field(schemes).finish(),
            Self::Host(p) => f.debug_tuple("Host").field(&p.template()).finish(),
            Self::Path(p) => f.debug_tuple("Path").field(&p.template()).finish(),
            Self::PathPrefix(p) => f.debug_tuple("PathPrefix").field(&p.template()).finish(),
            Self::Headers(pairs) => f.debug_tuple("Headers").field(pairs).finish(),
            Self::HeadersRegexp(pairs) => f.debug_tuple("HeadersRegexp").field(pairs).finish(),
            Self::Query(p) => f.debug_tuple("Query").field(&p.template()).finish(),
            Self::Custom(_) => f.write_str("Custom(..)"),
            Self::Methods(methods) => f.debug_tuple("Methods").field(methods).finish(),
        }
    }
}
