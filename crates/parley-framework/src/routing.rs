//! The route table.
//!
//! Routes are registered once through a [`Router`] and frozen into an
//! immutable [`RouteTable`] that every session reads concurrently. For a
//! given text the strategies are tried in a fixed order, and the first one
//! that matches wins:
//!
//! 1. **Exact**: the whole text equals the registered string.
//! 2. **Pattern**: a [`FormatPattern`] matches the whole text; its fields
//!    become arguments. Patterns are tried in registration order.
//! 3. **Regex**: a regular expression matches at the start of the text; its
//!    named groups become arguments. Tried in registration order.
//! 4. The default handler, with no arguments.

use std::collections::HashMap;
use std::fmt;

use parking_lot::Mutex;
use regex::Regex;
use tracing::trace;

use crate::error::{Error, Result};
use crate::extractor::Args;
use crate::handler::{BoxedHandler, Handler};
use crate::pattern::FormatPattern;

/// A text matching strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Strategy {
    Exact,
    Pattern,
    Regex,
}

/// How a text was routed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchKind {
    Exact,
    Pattern,
    Regex,
    Default,
}

/// The outcome of routing a text.
#[derive(Debug, Clone)]
pub struct RouteMatch {
    pub handler: BoxedHandler,
    pub args: Args,
    pub kind: MatchKind,
}

struct RegexRoute {
    source: String,
    regex: Regex,
    handler: BoxedHandler,
}

/// Registration API for routes.
#[derive(Default)]
pub struct Router {
    exact: HashMap<String, BoxedHandler>,
    patterns: Vec<(FormatPattern, BoxedHandler)>,
    regexes: Vec<RegexRoute>,
    default: Option<BoxedHandler>,
    sticker_default: Option<BoxedHandler>,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler` under `pattern` with the given strategy.
    ///
    /// A pattern registered twice with the same strategy keeps only the
    /// later handler. Fails only if the pattern does not compile.
    pub fn register<H, M>(mut self, strategy: Strategy, pattern: &str, handler: H) -> Result<Self>
    where
        H: Handler<M>,
        M: 'static,
    {
        let handler = BoxedHandler::new(handler);
        match strategy {
            Strategy::Exact => {
                self.exact.insert(pattern.to_string(), handler);
            }
            Strategy::Pattern => {
                let compiled = FormatPattern::new(pattern)?;
                match self.patterns.iter_mut().find(|(p, _)| p.as_str() == pattern) {
                    Some(existing) => existing.1 = handler,
                    None => self.patterns.push((compiled, handler)),
                }
            }
            Strategy::Regex => {
                let regex = Regex::new(&format!("^(?:{pattern})")).map_err(|e| {
                    Error::InvalidArgument {
                        name: pattern.to_string(),
                        reason: e.to_string(),
                    }
                })?;
                match self.regexes.iter_mut().find(|r| r.source == pattern) {
                    Some(existing) => {
                        existing.regex = regex;
                        existing.handler = handler;
                    }
                    None => self.regexes.push(RegexRoute {
                        source: pattern.to_string(),
                        regex,
                        handler,
                    }),
                }
            }
        }
        Ok(self)
    }

    /// Registers an exact route.
    pub fn exact<H, M>(mut self, text: impl Into<String>, handler: H) -> Self
    where
        H: Handler<M>,
        M: 'static,
    {
        self.exact.insert(text.into(), BoxedHandler::new(handler));
        self
    }

    /// Registers a format pattern route such as `{a:d}x{b:d}`.
    pub fn pattern<H, M>(self, pattern: &str, handler: H) -> Result<Self>
    where
        H: Handler<M>,
        M: 'static,
    {
        self.register(Strategy::Pattern, pattern, handler)
    }

    /// Registers a regular expression route.
    pub fn regex<H, M>(self, regex: &str, handler: H) -> Result<Self>
    where
        H: Handler<M>,
        M: 'static,
    {
        self.register(Strategy::Regex, regex, handler)
    }

    /// Sets the handler for texts no route matches.
    pub fn default_handler<H, M>(mut self, handler: H) -> Self
    where
        H: Handler<M>,
        M: 'static,
    {
        self.default = Some(BoxedHandler::new(handler));
        self
    }

    /// Sets the handler for stickers that are not dispatched as text.
    pub fn sticker_handler<H, M>(mut self, handler: H) -> Self
    where
        H: Handler<M>,
        M: 'static,
    {
        self.sticker_default = Some(BoxedHandler::new(handler));
        self
    }

    /// Freezes the routes.
    pub fn build(self) -> RouteTable {
        RouteTable {
            exact: self.exact,
            patterns: self.patterns,
            regexes: self.regexes,
            default: self.default,
            sticker_default: self.sticker_default,
            memo: Mutex::new(None),
        }
    }
}

impl fmt::Debug for Router {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Router")
            .field("exact", &self.exact.len())
            .field("patterns", &self.patterns.len())
            .field("regexes", &self.regexes.len())
            .finish_non_exhaustive()
    }
}

/// The immutable set of routes.
pub struct RouteTable {
    exact: HashMap<String, BoxedHandler>,
    patterns: Vec<(FormatPattern, BoxedHandler)>,
    regexes: Vec<RegexRoute>,
    default: Option<BoxedHandler>,
    sticker_default: Option<BoxedHandler>,
    /// The last looked-up text and its result.
    memo: Mutex<Option<(String, Option<RouteMatch>)>>,
}

impl RouteTable {
    /// Tries the exact, pattern and regex routes in that order.
    pub fn lookup(&self, text: &str) -> Option<RouteMatch> {
        {
            let memo = self.memo.lock();
            if let Some((last, result)) = memo.as_ref() {
                if last == text {
                    return result.clone();
                }
            }
        }

        let result = self.lookup_uncached(text);
        *self.memo.lock() = Some((text.to_string(), result.clone()));
        result
    }

    /// Like [`RouteTable::lookup`], falling back to the default handler.
    pub fn resolve(&self, text: &str) -> Option<RouteMatch> {
        self.lookup(text).or_else(|| self.default_match())
    }

    /// The default handler with empty arguments.
    pub fn default_match(&self) -> Option<RouteMatch> {
        self.default.clone().map(|handler| RouteMatch {
            handler,
            args: Args::default(),
            kind: MatchKind::Default,
        })
    }

    pub fn sticker_handler(&self) -> Option<&BoxedHandler> {
        self.sticker_default.as_ref()
    }

    fn lookup_uncached(&self, text: &str) -> Option<RouteMatch> {
        if let Some(handler) = self.exact.get(text) {
            trace!(route = text, "exact route matched");
            return Some(RouteMatch {
                handler: handler.clone(),
                args: Args::default(),
                kind: MatchKind::Exact,
            });
        }

        for (pattern, handler) in &self.patterns {
            if let Some(values) = pattern.parse(text) {
                trace!(route = pattern.as_str(), "pattern route matched");
                return Some(RouteMatch {
                    handler: handler.clone(),
                    args: values.into(),
                    kind: MatchKind::Pattern,
                });
            }
        }

        for route in &self.regexes {
            if let Some(caps) = route.regex.captures(text) {
                trace!(route = %route.source, "regex route matched");
                let args = route
                    .regex
                    .capture_names()
                    .flatten()
                    .filter_map(|name| caps.name(name).map(|m| (name, m.as_str())))
                    .collect();
                return Some(RouteMatch {
                    handler: route.handler.clone(),
                    args,
                    kind: MatchKind::Regex,
                });
            }
        }

        None
    }
}

impl fmt::Debug for RouteTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouteTable")
            .field("exact", &self.exact.keys().collect::<Vec<_>>())
            .field(
                "patterns",
                &self.patterns.iter().map(|(p, _)| p).collect::<Vec<_>>(),
            )
            .field(
                "regexes",
                &self.regexes.iter().map(|r| &r.source).collect::<Vec<_>>(),
            )
            .field("default", &self.default.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn named(name: &'static str) -> BoxedHandler {
        BoxedHandler::from_fn(name, |_| Box::pin(async { Ok(Default::default()) }))
    }

    fn table() -> RouteTable {
        Router::new()
            .register(Strategy::Exact, "Hello", named("exact-hello"))
            .unwrap()
            .register(Strategy::Regex, "H.*", named("regex-h"))
            .unwrap()
            .register(Strategy::Pattern, "{a:d}x{b:d}", named("times"))
            .unwrap()
            .register(Strategy::Pattern, "{greeting}", named("pattern-any"))
            .unwrap()
            .register(Strategy::Regex, r"add (?P<n>\d+)", named("add"))
            .unwrap()
            .default_handler(named("fallback"))
            .build()
    }

    fn name_of(m: Option<RouteMatch>) -> &'static str {
        m.map(|m| m.handler.name()).unwrap_or("none")
    }

    #[test]
    fn exact_beats_overlapping_routes() {
        let table = table();
        for _ in 0..3 {
            assert_eq!(name_of(table.resolve("Hello")), "exact-hello");
        }
    }

    #[test]
    fn pattern_beats_regex() {
        let table = table();
        assert_eq!(name_of(table.lookup("Hi")), "pattern-any");
    }

    #[test]
    fn pattern_fields_become_arguments() {
        let table = Router::new()
            .pattern("{a:d}x{b:d}", named("times"))
            .unwrap()
            .build();
        let m = table.lookup("3x4").unwrap();
        assert_eq!(m.kind, MatchKind::Pattern);
        assert_eq!(m.args.get::<i64>("a").unwrap(), 3);
        assert_eq!(m.args.get::<i64>("b").unwrap(), 4);
    }

    #[test]
    fn regex_matches_at_start_with_named_groups() {
        let table = Router::new()
            .regex(r"add (?P<n>\d+)", named("add"))
            .unwrap()
            .build();
        let m = table.lookup("add 12 please").unwrap();
        assert_eq!(m.args.raw("n"), Some("12"));
        assert!(table.lookup("please add 12").is_none());
    }

    #[test]
    fn unmatched_text_goes_to_default() {
        let table = Router::new()
            .exact("a", named("a"))
            .default_handler(named("fallback"))
            .build();
        let m = table.resolve("zzz").unwrap();
        assert_eq!(m.kind, MatchKind::Default);
        assert!(m.args.is_empty());
        assert!(table.lookup("zzz").is_none());

        let empty = Router::new().build();
        assert!(empty.resolve("zzz").is_none());
    }

    #[test]
    fn reregistering_overwrites() {
        let table = Router::new()
            .exact("x", named("first"))
            .exact("x", named("second"))
            .pattern("{n:d}", named("p1"))
            .unwrap()
            .pattern("{n:d}", named("p2"))
            .unwrap()
            .build();
        assert_eq!(name_of(table.lookup("x")), "second");
        assert_eq!(name_of(table.lookup("5")), "p2");
    }

    #[test]
    fn memo_does_not_change_results() {
        let table = table();
        assert_eq!(name_of(table.lookup("3x4")), "times");
        assert_eq!(name_of(table.lookup("3x4")), "times");
        assert_eq!(name_of(table.lookup("Hello")), "exact-hello");
        assert_eq!(name_of(table.lookup("3x4")), "times");
    }

    #[test]
    fn invalid_patterns_are_rejected() {
        assert!(Router::new().regex("(", named("bad")).is_err());
        assert!(Router::new().pattern("{oops", named("bad")).is_err());
    }
}
