//! Localised answer texts.
//!
//! A [`LanguageTable`] maps locale segments (`en`, `de`, ..., plus the
//! mandatory `default` segment) to message keys and their templates.
//! Templates use positional placeholders: `{}` takes the next argument,
//! `{1}` a specific one, `{{` and `}}` are literal braces.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Name of the fallback segment.
pub const DEFAULT_SEGMENT: &str = "default";

/// Locale segments mapped to message keys mapped to templates.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LanguageTable {
    segments: HashMap<String, HashMap<String, String>>,
    #[serde(skip)]
    strict: bool,
}

impl LanguageTable {
    /// Creates a table from its segments.
    pub fn new(segments: HashMap<String, HashMap<String, String>>) -> Self {
        Self {
            segments,
            strict: false,
        }
    }

    /// Makes missing keys an error instead of echoing them (builder pattern).
    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    /// Adds or replaces one entry (builder pattern).
    pub fn entry(
        mut self,
        segment: impl Into<String>,
        key: impl Into<String>,
        template: impl Into<String>,
    ) -> Self {
        self.segments
            .entry(segment.into())
            .or_default()
            .insert(key.into(), template.into());
        self
    }

    pub fn is_strict(&self) -> bool {
        self.strict
    }

    /// Returns `true` if the table has the mandatory `default` segment.
    pub fn has_default_segment(&self) -> bool {
        self.segments.contains_key(DEFAULT_SEGMENT)
    }

    /// Looks `key` up for `locale`, falling back to the `default` segment.
    pub fn lookup(&self, locale: &str, key: &str) -> Option<&str> {
        let primary = primary_subtag(locale);
        self.segments
            .get(&primary)
            .and_then(|segment| segment.get(key))
            .or_else(|| {
                self.segments
                    .get(DEFAULT_SEGMENT)
                    .and_then(|segment| segment.get(key))
            })
            .map(String::as_str)
    }

    /// Resolves `key` for `locale` and formats it with `args`.
    ///
    /// Unknown keys fail with [`Error::MissingLanguageKey`] in strict mode and
    /// are returned verbatim otherwise.
    pub fn resolve(&self, locale: &str, key: &str, args: &[String]) -> Result<String> {
        match self.lookup(locale, key) {
            Some(template) => format_positional(template, args),
            None if self.strict => Err(Error::MissingLanguageKey {
                locale: locale.to_string(),
                key: key.to_string(),
            }),
            None => Ok(key.to_string()),
        }
    }
}

/// Extracts the lowercase primary subtag: `de_DE` and `de-DE` give `de`.
pub fn primary_subtag(locale: &str) -> String {
    locale
        .split(['_', '-'])
        .next()
        .unwrap_or_default()
        .to_lowercase()
}

/// Substitutes positional placeholders in `template`.
///
/// Without arguments the template is returned untouched. Surplus arguments
/// are ignored; too few arguments fail with [`Error::Format`].
pub fn format_positional(template: &str, args: &[String]) -> Result<String> {
    if args.is_empty() {
        return Ok(template.to_string());
    }

    let fail = |reason: String| Error::Format {
        template: template.to_string(),
        reason,
    };

    let mut out = String::with_capacity(template.len());
    let mut next = 0usize;
    let mut chars = template.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
                out.push('{');
            }
            '}' if chars.peek() == Some(&'}') => {
                chars.next();
                out.push('}');
            }
            '{' => {
                let mut field = String::new();
                loop {
                    match chars.next() {
                        Some('}') => break,
                        Some(c) => field.push(c),
                        None => return Err(fail("unclosed '{'".into())),
                    }
                }
                let index = if field.is_empty() {
                    next += 1;
                    next - 1
                } else {
                    field
                        .parse::<usize>()
                        .map_err(|_| fail(format!("unsupported field '{field}'")))?
                };
                let value = args.get(index).ok_or_else(|| {
                    fail(format!("missing argument {index} ({} given)", args.len()))
                })?;
                out.push_str(value);
            }
            '}' => return Err(fail("single '}'".into())),
            c => out.push(c),
        }
    }
    Ok(out)
}
