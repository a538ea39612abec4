//! Ordered, regex based route table.
//!
//! Routes are tried in registration order and the first pattern matching the
//! request path wins. Every pattern is anchored at both ends: a trailing `$`
//! is appended when missing, and matching always starts at the beginning of
//! the path. A catch-all route bound to the default handler is appended
//! last, so [`Router::at`] always returns a match.
//!
//! ```no_run
//! use quill_web::handler::RedirectHandler;
//! use quill_web::router::{Route, Router};
//!
//! # fn main() -> Result<(), quill_web::router::RouteError> {
//! let router = Router::builder()
//!     .add(Route::new("/google", RedirectHandler::default)?.with_kwarg("url", "https://www.google.com"))
//!     .build()?;
//! assert_eq!(router.at("/google").pattern(), "/google$");
//! # Ok(())
//! # }
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use regex::Regex;
use thiserror::Error;
use tracing::trace;

use crate::handler::{DefaultHandler, HandlerFactory};
use crate::value::Value;

/// Handler keyword arguments supplied at registration.
pub type InitKwargs = Arc<BTreeMap<String, Value>>;

/// Matches every path; bound to the default handler.
const CATCH_ALL_PATTERN: &str = "/.*$";

const DEFAULT_ROUTE_NAME: &str = "default";

#[derive(Error, Debug)]
pub enum RouteError {
    #[error("invalid route pattern {pattern:?}: {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

/// A compiled pattern bound to a handler.
#[derive(Clone)]
pub struct Route {
    pattern: String,
    regex: Regex,
    handler: Arc<dyn HandlerFactory>,
    kwargs: BTreeMap<String, Value>,
    name: Option<String>,
    suppress_logging: bool,
}

impl Route {
    /// Compiles `pattern`, appending `$` unless it already ends with one.
    ///
    /// # Errors
    ///
    /// Fails if the pattern is not a valid regular expression.
    pub fn new(pattern: &str, handler: impl HandlerFactory + 'static) -> Result<Self, RouteError> {
        Self::with_factory(pattern, Arc::new(handler))
    }

    fn with_factory(pattern: &str, handler: Arc<dyn HandlerFactory>) -> Result<Self, RouteError> {
        let raw = match pattern.strip_suffix('$') {
            Some(raw) if !raw.ends_with('\\') => raw,
            _ => pattern,
        };
        let pattern = format!("{raw}$");
        let regex = Regex::new(&format!(r"\A(?:{raw})$"))
            .map_err(|source| RouteError::InvalidPattern { pattern: pattern.clone(), source })?;
        Ok(Self { pattern, regex, handler, kwargs: BTreeMap::new(), name: None, suppress_logging: false })
    }

    #[must_use]
    pub fn with_kwarg(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.kwargs.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub fn with_kwargs<K, V>(mut self, kwargs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<Value>,
    {
        self.kwargs.extend(kwargs.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Skips the access log for requests served by this route.
    #[must_use]
    pub fn suppress_logging(mut self, suppress: bool) -> Self {
        self.suppress_logging = suppress;
        self
    }

    /// The anchored pattern source.
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Matches `path`, splitting captures into positional and named groups.
    pub fn matches(&self, path: &str) -> Option<RouteMatch> {
        let captures = self.regex.captures(path)?;

        let mut args = Vec::new();
        let mut kwargs = BTreeMap::new();
        for (index, name) in self.regex.capture_names().enumerate().skip(1) {
            let value = captures.get(index).map(|m| m.as_str().to_string());
            match name {
                Some(name) => {
                    if let Some(value) = value {
                        kwargs.insert(name.to_string(), value);
                    }
                }
                None => args.push(value.unwrap_or_default()),
            }
        }

        Some(self.route_match(args, kwargs))
    }

    fn route_match(&self, args: Vec<String>, kwargs: BTreeMap<String, String>) -> RouteMatch {
        RouteMatch {
            handler: Arc::clone(&self.handler),
            name: self.name.clone(),
            pattern: self.pattern.clone(),
            suppress_logging: self.suppress_logging,
            init_kwargs: Arc::new(self.kwargs.clone()),
            args,
            kwargs,
        }
    }
}

impl fmt::Debug for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Route")
            .field("pattern", &self.pattern)
            .field("handler", &self.handler.type_name())
            .field("kwargs", &self.kwargs)
            .field("name", &self.name)
            .field("suppress_logging", &self.suppress_logging)
            .finish()
    }
}

/// The result of resolving a path: which handler to run and with what.
#[derive(Clone)]
pub struct RouteMatch {
    handler: Arc<dyn HandlerFactory>,
    name: Option<String>,
    pattern: String,
    suppress_logging: bool,
    init_kwargs: InitKwargs,
    args: Vec<String>,
    kwargs: BTreeMap<String, String>,
}

impl RouteMatch {
    pub fn handler(&self) -> &Arc<dyn HandlerFactory> {
        &self.handler
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn suppress_logging(&self) -> bool {
        self.suppress_logging
    }

    /// Keyword arguments passed to the handler's `initialize`.
    pub fn init_kwargs(&self) -> &InitKwargs {
        &self.init_kwargs
    }

    /// Unnamed capture groups in pattern order; groups that didn't
    /// participate in the match are empty.
    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// Named capture groups that participated in the match.
    pub fn kwargs(&self) -> &BTreeMap<String, String> {
        &self.kwargs
    }
}

impl fmt::Debug for RouteMatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouteMatch")
            .field("handler", &self.handler.type_name())
            .field("name", &self.name)
            .field("pattern", &self.pattern)
            .field("args", &self.args)
            .field("kwargs", &self.kwargs)
            .finish_non_exhaustive()
    }
}

/// The route table, immutable once built.
#[derive(Debug, Clone)]
pub struct Router {
    routes: Vec<Route>,
}

impl Router {
    pub fn builder() -> RouterBuilder {
        RouterBuilder::new()
    }

    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    /// Resolves `path` to the first matching route.
    pub fn at(&self, path: &str) -> RouteMatch {
        for route in &self.routes {
            if let Some(route_match) = route.matches(path) {
                trace!(path, pattern = %route.pattern, "route matched");
                return route_match;
            }
        }
        // only paths without a leading slash get past the catch-all
        let fallback = &self.routes[self.routes.len() - 1];
        trace!(path, "no route matched, using default handler");
        fallback.route_match(Vec::new(), BTreeMap::new())
    }
}

pub struct RouterBuilder {
    routes: Vec<Result<Route, RouteError>>,
    default_handler: Arc<dyn HandlerFactory>,
    default_kwargs: BTreeMap<String, Value>,
    default_name: String,
    default_suppress_logging: bool,
}

impl fmt::Debug for RouterBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouterBuilder")
            .field("routes", &self.routes)
            .field("default_handler", &self.default_handler.type_name())
            .field("default_name", &self.default_name)
            .finish_non_exhaustive()
    }
}

impl RouterBuilder {
    fn new() -> Self {
        Self {
            routes: Vec::new(),
            default_handler: Arc::new(DefaultHandler::default),
            default_kwargs: BTreeMap::new(),
            default_name: DEFAULT_ROUTE_NAME.to_string(),
            default_suppress_logging: false,
        }
    }

    /// Adds a route for `pattern`; an invalid pattern is reported by
    /// [`build`](Self::build).
    pub fn route(mut self, pattern: &str, handler: impl HandlerFactory + 'static) -> Self {
        self.routes.push(Route::new(pattern, handler));
        self
    }

    pub fn add(mut self, route: Route) -> Self {
        self.routes.push(Ok(route));
        self
    }

    /// Replaces the handler serving paths no route matched.
    pub fn default_handler(mut self, handler: impl HandlerFactory + 'static) -> Self {
        self.default_handler = Arc::new(handler);
        self
    }

    pub fn default_handler_kwargs<K, V>(mut self, kwargs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<Value>,
    {
        self.default_kwargs = kwargs.into_iter().map(|(k, v)| (k.into(), v.into())).collect();
        self
    }

    pub fn default_handler_name(mut self, name: impl Into<String>) -> Self {
        self.default_name = name.into();
        self
    }

    pub fn default_handler_suppress_logging(mut self, suppress: bool) -> Self {
        self.default_suppress_logging = suppress;
        self
    }

    /// Compiles the table, appending the catch-all route.
    ///
    /// # Errors
    ///
    /// Returns the first invalid pattern.
    pub fn build(self) -> Result<Router, RouteError> {
        let mut routes = self.routes.into_iter().collect::<Result<Vec<_>, _>>()?;

        let mut catch_all = Route::with_factory(CATCH_ALL_PATTERN, self.default_handler)?
            .with_name(self.default_name)
            .suppress_logging(self.default_suppress_logging);
        catch_all.kwargs = self.default_kwargs;
        routes.push(catch_all);

        Ok(Router { routes })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::{RedirectHandler, RequestHandler};
    use async_trait::async_trait;

    #[derive(Default)]
    struct First;

    #[async_trait]
    impl RequestHandler for First {}

    #[derive(Default)]
    struct Second;

    #[async_trait]
    impl RequestHandler for Second {}

    #[test]
    fn anchors_patterns() {
        let route = Route::new("/items", First::default).unwrap();
        assert_eq!(route.pattern(), "/items$");
        assert!(route.matches("/items").is_some());
        assert!(route.matches("/items/1").is_none());
        assert!(route.matches("/x/items").is_none());

        let route = Route::new("/items/?$", First::default).unwrap();
        assert_eq!(route.pattern(), "/items/?$");
        assert!(route.matches("/items/").is_some());
    }

    #[test]
    fn alternation_is_anchored_as_a_whole() {
        let route = Route::new("/a|/b", First::default).unwrap();
        assert!(route.matches("/a").is_some());
        assert!(route.matches("/b").is_some());
        assert!(route.matches("/ab").is_none());

        let route = Route::new("/a|/b$", First::default).unwrap();
        assert_eq!(route.pattern(), "/a|/b$");
        assert!(route.matches("/ab").is_none());
        assert!(route.matches("/a").is_some());
    }

    #[test]
    fn escaped_dollar_is_literal() {
        let route = Route::new(r"/price/\$", First::default).unwrap();
        assert_eq!(route.pattern(), r"/price/\$$");
        assert!(route.matches("/price/$").is_some());
        assert!(route.matches("/price/").is_none());
    }

    #[test]
    fn first_match_wins() {
        let router = Router::builder().route("/items/.*", First::default).route("/items/(\\d+)", Second::default).build().unwrap();

        let matched = router.at("/items/42");
        assert_eq!(matched.pattern(), "/items/.*$");
        assert_eq!(matched.handler().type_name(), "First");
    }

    #[test]
    fn unmatched_paths_reach_the_default_route() {
        let router = Router::builder().route("/", First::default).build().unwrap();
        assert_eq!(router.routes().len(), 2);

        let matched = router.at("/missing");
        assert_eq!(matched.name(), Some("default"));
        assert_eq!(matched.handler().type_name(), "DefaultHandler");

        // no leading slash, so even the catch-all pattern misses
        let matched = router.at("*");
        assert_eq!(matched.name(), Some("default"));
    }

    #[test]
    fn captures_are_split() {
        let router = Router::builder().route(r"/users/(\d+)/posts/(?P<slug>[a-z-]+)(/)?", First::default).build().unwrap();

        let matched = router.at("/users/7/posts/hello-world");
        assert_eq!(matched.args(), ["7", ""]);
        assert_eq!(matched.kwargs().get("slug").map(String::as_str), Some("hello-world"));
    }

    #[test]
    fn route_options_are_carried() {
        let route = Route::new("/google", RedirectHandler::default)
            .unwrap()
            .with_kwarg("url", "https://www.google.com")
            .with_kwargs([("permanent", true)])
            .with_name("google")
            .suppress_logging(true);
        let router = Router::builder().add(route).build().unwrap();

        let matched = router.at("/google");
        assert_eq!(matched.name(), Some("google"));
        assert!(matched.suppress_logging());
        assert_eq!(matched.init_kwargs().get("url").and_then(Value::as_str), Some("https://www.google.com"));
        assert_eq!(matched.init_kwargs().get("permanent").and_then(Value::as_bool), Some(true));
    }

    #[test]
    fn default_route_options() {
        let router = Router::builder()
            .default_handler(Second::default)
            .default_handler_kwargs([("reason", "gone")])
            .default_handler_name("fallback")
            .default_handler_suppress_logging(true)
            .build()
            .unwrap();

        let matched = router.at("/anything");
        assert_eq!(matched.name(), Some("fallback"));
        assert_eq!(matched.handler().type_name(), "Second");
        assert!(matched.suppress_logging());
        assert_eq!(matched.init_kwargs().get("reason").and_then(Value::as_str), Some("gone"));
    }

    #[test]
    fn invalid_pattern_fails_the_build() {
        let err = Router::builder().route("/(unclosed", First::default).build().unwrap_err();
        assert!(matches!(err, RouteError::InvalidPattern { .. }));
    }
}
