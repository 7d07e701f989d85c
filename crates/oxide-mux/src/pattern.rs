//! Template compilation.
//!
//! Templates mix literal text with `{name}` or `{name:constraint}`
//! placeholders. Each template compiles to a single anchored regular
//! expression whose groups, in order, capture the named variables.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use dashmap::DashMap;
use regex::Regex;

use crate::error::{MuxError, Result};
use crate::request::Vars;

type CompileFn = dyn Fn(&str) -> std::result::Result<Regex, regex::Error> + Send + Sync;

/// The hook every template expression is compiled through.
///
/// Routers call it only while routes are registered. The default compiles
/// a fresh expression on every call; [`RegexCompiler::caching`] shares
/// compiled expressions between identical templates.
///
/// # Example
///
/// ```
/// use oxide_mux::{RegexCompiler, Router};
///
/// let mut router = Router::new().with_compiler(RegexCompiler::caching());
/// router.path("/metrics/{type}").unwrap();
/// ```
#[derive(Clone)]
pub struct RegexCompiler {
    compile: Arc<CompileFn>,
}

impl RegexCompiler {
    /// Wraps a caller supplied compile function.
    pub fn from_fn<F>(compile: F) -> Self
    where
        F: Fn(&str) -> std::result::Result<Regex, regex::Error> + Send + Sync + 'static,
    {
        Self {
            compile: Arc::new(compile),
        }
    }

    /// A compiler that memoises compiled expressions by their source.
    ///
    /// The cache never evicts; it is meant for route tables that are built
    /// once at startup.
    #[must_use]
    pub fn caching() -> Self {
        Self::caching_with(Self::default())
    }

    /// Memoises the expressions compiled by `inner`, so `inner` runs at
    /// most once per distinct expression.
    #[must_use]
    pub fn caching_with(inner: Self) -> Self {
        let cache: DashMap<String, Regex> = DashMap::new();
        Self::from_fn(move |expr| {
            if let Some(regex) = cache.get(expr) {
                return Ok(regex.clone());
            }
            let regex = inner.compile(expr)?;
            cache.insert(expr.to_string(), regex.clone());
            Ok(regex)
        })
    }

    /// Compiles one expression.
    pub fn compile(&self, expr: &str) -> std::result::Result<Regex, regex::Error> {
        (self.compile)(expr)
    }
}

impl Default for RegexCompiler {
    fn default() -> Self {
        Self::from_fn(Regex::new)
    }
}

impl fmt::Debug for RegexCompiler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegexCompiler").finish_non_exhaustive()
    }
}

/// What part of the request a pattern is matched against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatternKind {
    /// The whole request path.
    Path,
    /// The beginning of the request path.
    Prefix,
    /// The request host.
    Host,
    /// One `key=value` pair of the query string.
    Query,
}

impl PatternKind {
    const fn default_constraint(self) -> &'static str {
        match self {
            Self::Path | Self::Prefix => "[^/]+",
            Self::Host => "[^.]+",
            Self::Query => ".*",
        }
    }
}

/// Options that change how a template compiles.
#[derive(Debug, Clone, Copy, Default)]
pub struct PatternOptions {
    /// Make a trailing slash optional (path patterns only).
    pub strict_slash: bool,
}

/// A compiled template.
#[derive(Debug, Clone)]
pub struct Pattern {
    /// The original template string.
    template: String,
    kind: PatternKind,
    /// Compiled regex for matching.
    regex: Regex,
    /// Variable names in capture order.
    var_names: Vec<String>,
    strict_slash: bool,
    /// Host templates without a port ignore the request port.
    ignore_port: bool,
}

impl Pattern {
    /// Compiles a template.
    ///
    /// # Example
    ///
    /// ```
    /// use oxide_mux::{Pattern, PatternKind, PatternOptions, RegexCompiler, Vars};
    ///
    /// let pattern = Pattern::compile(
    ///     "/posts/{id:[0-9]+}/comments/{comment_id}",
    ///     PatternKind::Path,
    ///     PatternOptions::default(),
    ///     &RegexCompiler::default(),
    /// )
    /// .unwrap();
    ///
    /// let mut vars = Vars::new();
    /// assert!(pattern.captures("/posts/123/comments/456", &mut vars));
    /// assert_eq!(vars.get("id"), Some("123"));
    /// assert_eq!(vars.get("comment_id"), Some("456"));
    /// ```
    pub fn compile(
        template: &str,
        kind: PatternKind,
        options: PatternOptions,
        compiler: &RegexCompiler,
    ) -> Result<Self> {
        let braces = brace_indices(template)?;
        let strict_slash = options.strict_slash && kind == PatternKind::Path;

        let mut tpl = template;
        if strict_slash {
            tpl = tpl.strip_suffix('/').unwrap_or(tpl);
        }

        let mut expr = String::from("^");
        if kind == PatternKind::Host {
            expr.push_str("(?i)");
        }

        let mut var_names = Vec::with_capacity(braces.len());
        let mut seen = HashSet::new();
        let mut end = 0;
        for &(open, close) in &braces {
            // The stripped slash can never sit inside a placeholder.
            let inner = &tpl[open + 1..close];
            let (name, constraint) = match inner.split_once(':') {
                Some((name, constraint)) => (name, constraint),
                None => (inner, kind.default_constraint()),
            };
            if name.is_empty() || constraint.is_empty() {
                return Err(MuxError::MissingNameOrPattern {
                    template: template.to_string(),
                    variable: tpl[open..=close].to_string(),
                });
            }
            if !seen.insert(name) {
                return Err(MuxError::DuplicateVariable {
                    template: template.to_string(),
                    name: name.to_string(),
                });
            }

            expr.push_str(&regex::escape(&tpl[end..open]));
            expr.push('(');
            expr.push_str(constraint);
            expr.push(')');
            var_names.push(name.to_string());
            end = close + 1;
        }

        expr.push_str(&regex::escape(&tpl[end..]));
        if strict_slash {
            expr.push_str("[/]?");
        }
        if kind == PatternKind::Query && template.ends_with('=') {
            expr.push_str(kind.default_constraint());
        }
        if kind != PatternKind::Prefix {
            expr.push('$');
        }

        let regex = compiler
            .compile(&expr)
            .map_err(|source| MuxError::InvalidRegex {
                template: template.to_string(),
                source,
            })?;
        if regex.captures_len() != var_names.len() + 1 {
            return Err(MuxError::CaptureGroupInConstraint {
                template: template.to_string(),
            });
        }

        Ok(Self {
            template: template.to_string(),
            kind,
            regex,
            var_names,
            strict_slash,
            ignore_port: kind == PatternKind::Host && !template.contains(':'),
        })
    }

    /// Tests `input` and records captured variables on success.
    ///
    /// Nothing is written to `vars` when the input does not match.
    pub fn captures(&self, input: &str, vars: &mut Vars) -> bool {
        let input = if self.ignore_port {
            strip_port(input)
        } else {
            input
        };
        let Some(caps) = self.regex.captures(input) else {
            return false;
        };
        for (i, name) in self.var_names.iter().enumerate() {
            if let Some(value) = caps.get(i + 1) {
                vars.insert(name.clone(), value.as_str());
            }
        }
        true
    }

    /// Tests `input` without capturing.
    pub fn is_match(&self, input: &str) -> bool {
        let input = if self.ignore_port {
            strip_port(input)
        } else {
            input
        };
        self.regex.is_match(input)
    }

    /// Returns the original template string.
    pub fn template(&self) -> &str {
        &self.template
    }

    /// Returns what this pattern is matched against.
    pub const fn kind(&self) -> PatternKind {
        self.kind
    }

    /// Returns the variable names in capture order.
    pub fn var_names(&self) -> &[String] {
        &self.var_names
    }

    /// Returns the compiled expression.
    pub fn regex(&self) -> &Regex {
        &self.regex
    }

    /// Whether the template ends in a slash that was made optional.
    pub(crate) fn wants_trailing_slash(&self) -> Option<bool> {
        self.strict_slash.then(|| self.template.ends_with('/'))
    }
}

/// Positions of every top-level `{` and its matching `}`.
fn brace_indices(template: &str) -> Result<Vec<(usize, usize)>> {
    let mut level = 0usize;
    let mut open = 0;
    let mut pairs = Vec::new();
    for (i, byte) in template.bytes().enumerate() {
        match byte {
            b'{' => {
                if level == 0 {
                    open = i;
                }
                level += 1;
            }
            b'}' => {
                level = level.checked_sub(1).ok_or_else(|| MuxError::UnbalancedBraces {
                    template: template.to_string(),
                })?;
                if level == 0 {
                    pairs.push((open, i));
                }
            }
            _ => {}
        }
    }
    if level != 0 {
        return Err(MuxError::UnbalancedBraces {
            template: template.to_string(),
        });
    }
    Ok(pairs)
}

fn strip_port(host: &str) -> &str {
    // Bracketed IPv6 literals keep their inner colons.
    if let Some(rest) = host.strip_prefix('[') {
        return rest
            .find(']')
            .map_or(host, |end| &host[..end + 2]);
    }
    host.split_once(':').map_or(host, |(name, _)| name)
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    fn compile(template: &str, kind: PatternKind) -> Result<Pattern> {
        Pattern::compile(
            template,
            kind,
            PatternOptions::default(),
            &RegexCompiler::default(),
        )
    }

    fn path(template: &str) -> Pattern {
        compile(template, PatternKind::Path).unwrap()
    }

    #[test]
    fn test_literal_path() {
        let pattern = path("/users");
        assert!(pattern.is_match("/users"));
        assert!(!pattern.is_match("/users/"));
        assert!(!pattern.is_match("/posts"));
        assert!(!pattern.is_match("/users/1"));
    }

    #[test]
    fn test_single_var() {
        let pattern = path("/users/{id}");
        let mut vars = Vars::new();
        assert!(pattern.captures("/users/123", &mut vars));
        assert_eq!(vars.get("id"), Some("123"));
        assert!(!pattern.is_match("/users/123/posts"));
    }

    #[test]
    fn test_multiple_vars_keep_order() {
        let pattern = path("/posts/{post_id}/comments/{comment_id}");
        assert_eq!(pattern.var_names(), ["post_id", "comment_id"]);

        let mut vars = Vars::new();
        assert!(pattern.captures("/posts/42/comments/7", &mut vars));
        assert_eq!(vars.get("post_id"), Some("42"));
        assert_eq!(vars.get("comment_id"), Some("7"));
    }

    #[test]
    fn test_constraint() {
        let pattern = path("/articles/{category}/{id:[0-9]+}");
        assert!(pattern.is_match("/articles/tech/42"));
        assert!(!pattern.is_match("/articles/tech/abc"));
    }

    #[test]
    fn test_constraint_spanning_segments() {
        let pattern = path("/files/{rest:.*}");
        let mut vars = Vars::new();
        assert!(pattern.captures("/files/docs/readme.md", &mut vars));
        assert_eq!(vars.get("rest"), Some("docs/readme.md"));
    }

    #[test]
    fn test_constraint_with_nested_braces() {
        let pattern = path("/year/{y:[0-9]{4}}");
        assert!(pattern.is_match("/year/2024"));
        assert!(!pattern.is_match("/year/24"));
    }

    #[test]
    fn test_literal_is_escaped() {
        let pattern = path("/v1.0/items");
        assert!(pattern.is_match("/v1.0/items"));
        assert!(!pattern.is_match("/v1x0/items"));
    }

    #[test]
    fn test_empty_template_matches_only_empty() {
        let pattern = path("");
        assert!(pattern.is_match(""));
        assert!(!pattern.is_match("/"));
    }

    #[test]
    fn test_prefix_is_open_ended() {
        let pattern = compile("/api/{version}", PatternKind::Prefix).unwrap();
        let mut vars = Vars::new();
        assert!(pattern.captures("/api/v2/users", &mut vars));
        assert_eq!(vars.get("version"), Some("v2"));
        assert!(!pattern.is_match("/other/api/v2"));
    }

    #[test]
    fn test_strict_slash_accepts_both_forms() {
        let options = PatternOptions { strict_slash: true };
        let compiler = RegexCompiler::default();

        let without = Pattern::compile("/path", PatternKind::Path, options, &compiler).unwrap();
        assert!(without.is_match("/path"));
        assert!(without.is_match("/path/"));
        assert_eq!(without.wants_trailing_slash(), Some(false));

        let with = Pattern::compile("/path/", PatternKind::Path, options, &compiler).unwrap();
        assert!(with.is_match("/path"));
        assert!(with.is_match("/path/"));
        assert_eq!(with.wants_trailing_slash(), Some(true));
    }

    #[test]
    fn test_strict_slash_ignored_for_prefix() {
        let options = PatternOptions { strict_slash: true };
        let pattern =
            Pattern::compile("/sub/", PatternKind::Prefix, options, &RegexCompiler::default())
                .unwrap();
        assert_eq!(pattern.wants_trailing_slash(), None);
        assert!(!pattern.is_match("/sub"));
    }

    #[test]
    fn test_host_pattern() {
        let pattern = compile("{subdomain}.domain.com", PatternKind::Host).unwrap();
        let mut vars = Vars::new();
        assert!(pattern.captures("www.domain.com:8080", &mut vars));
        assert_eq!(vars.get("subdomain"), Some("www"));
        assert!(pattern.is_match("WWW.DOMAIN.COM"));
        assert!(!pattern.is_match("a.b.domain.com"));
    }

    #[test]
    fn test_host_pattern_with_port() {
        let pattern = compile("localhost:{port:[0-9]+}", PatternKind::Host).unwrap();
        let mut vars = Vars::new();
        assert!(pattern.captures("localhost:8080", &mut vars));
        assert_eq!(vars.get("port"), Some("8080"));
        assert!(!pattern.is_match("localhost"));
    }

    #[test]
    fn test_query_pattern() {
        let pattern = compile("orgID={orgID:[0-9]*?}", PatternKind::Query).unwrap();
        let mut vars = Vars::new();
        assert!(pattern.captures("orgID=42", &mut vars));
        assert_eq!(vars.get("orgID"), Some("42"));
        assert!(!pattern.is_match("orgID=abc"));
    }

    #[test]
    fn test_query_pattern_empty_value_matches_any() {
        let pattern = compile("debug=", PatternKind::Query).unwrap();
        assert!(pattern.is_match("debug="));
        assert!(pattern.is_match("debug=1"));
        assert!(!pattern.is_match("verbose=1"));
    }

    #[test]
    fn test_unbalanced_braces() {
        assert!(matches!(
            compile("/users/{id", PatternKind::Path),
            Err(MuxError::UnbalancedBraces { .. })
        ));
        assert!(matches!(
            compile("/users/id}", PatternKind::Path),
            Err(MuxError::UnbalancedBraces { .. })
        ));
    }

    #[test]
    fn test_missing_name_or_pattern() {
        assert!(matches!(
            compile("/users/{}", PatternKind::Path),
            Err(MuxError::MissingNameOrPattern { .. })
        ));
        assert!(matches!(
            compile("/users/{id:}", PatternKind::Path),
            Err(MuxError::MissingNameOrPattern { .. })
        ));
    }

    #[test]
    fn test_duplicate_variable() {
        let err = compile("/{id}/posts/{id}", PatternKind::Path).unwrap_err();
        assert!(matches!(err, MuxError::DuplicateVariable { name, .. } if name == "id"));
    }

    #[test]
    fn test_invalid_constraint() {
        assert!(matches!(
            compile("/users/{id:[0-9}", PatternKind::Path),
            Err(MuxError::InvalidRegex { .. })
        ));
    }

    #[test]
    fn test_capturing_group_in_constraint() {
        assert!(matches!(
            compile("/users/{id:(a|b)}", PatternKind::Path),
            Err(MuxError::CaptureGroupInConstraint { .. })
        ));
        assert!(compile("/users/{id:(?:a|b)}", PatternKind::Path).is_ok());
    }

    #[test]
    fn test_hook_called_once_per_template() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let compiler = RegexCompiler::from_fn(move |expr| {
            counter.fetch_add(1, Ordering::SeqCst);
            Regex::new(expr)
        });

        Pattern::compile(
            "/a/{x}/{y:[0-9]+}",
            PatternKind::Path,
            PatternOptions::default(),
            &compiler,
        )
        .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_caching_compiler_reuses_expressions() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let compiler = RegexCompiler::caching_with(RegexCompiler::from_fn(move |expr| {
            counter.fetch_add(1, Ordering::SeqCst);
            Regex::new(expr)
        }));

        let a = Pattern::compile("/a/{x}", PatternKind::Path, PatternOptions::default(), &compiler)
            .unwrap();
        let b = Pattern::compile("/a/{x}", PatternKind::Path, PatternOptions::default(), &compiler)
            .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(a.is_match("/a/1"));
        assert!(b.is_match("/a/2"));

        Pattern::compile("/b/{x}", PatternKind::Path, PatternOptions::default(), &compiler)
            .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_caching_compiler_does_not_cache_errors() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let compiler = RegexCompiler::caching_with(RegexCompiler::from_fn(move |expr| {
            counter.fetch_add(1, Ordering::SeqCst);
            Regex::new(expr)
        }));

        assert!(compiler.compile("[0-9").is_err());
        assert!(compiler.compile("[0-9").is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_strip_port() {
        assert_eq!(strip_port("example.com:80"), "example.com");
        assert_eq!(strip_port("example.com"), "example.com");
        assert_eq!(strip_port("[::1]:8080"), "[::1]");
    }
}
