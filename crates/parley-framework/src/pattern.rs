//! Structured format patterns such as `{a:d}x{b:d}`.
//!
//! A pattern is literal text with `{field}` placeholders. A field may carry a
//! type: `d` (integer), `f` (decimal number) or `w` (word characters);
//! untyped fields match any non-empty text. Anonymous `{}` fields are named
//! by their position (`"0"`, `"1"`, ...). `{{` and `}}` match literal
//! braces. Matching is case-insensitive and must cover the whole input.

use std::collections::HashMap;
use std::fmt;

use regex::Regex;

use crate::error::{Error, Result};

/// A compiled format pattern.
#[derive(Clone)]
pub struct FormatPattern {
    source: String,
    regex: Regex,
    /// Field names in group order (`f0`, `f1`, ...).
    fields: Vec<String>,
}

impl FormatPattern {
    /// Compiles `pattern`.
    pub fn new(pattern: &str) -> Result<Self> {
        let mut expr = String::from("(?is)^");
        let mut fields = Vec::new();
        let mut literal = String::new();
        let mut anonymous = 0usize;
        let mut chars = pattern.chars().peekable();

        while let Some(c) = chars.next() {
            match c {
                '{' if chars.peek() == Some(&'{') => {
                    chars.next();
                    literal.push('{');
                }
                '}' if chars.peek() == Some(&'}') => {
                    chars.next();
                    literal.push('}');
                }
                '{' => {
                    let mut placeholder = String::new();
                    loop {
                        match chars.next() {
                            Some('}') => break,
                            Some(c) => placeholder.push(c),
                            None => return Err(invalid(pattern, "unclosed '{'")),
                        }
                    }
                    expr.push_str(&regex::escape(&literal));
                    literal.clear();

                    let (name, kind) = match placeholder.split_once(':') {
                        Some((name, kind)) => (name.trim(), kind.trim()),
                        None => (placeholder.trim(), ""),
                    };
                    let name = if name.is_empty() {
                        anonymous += 1;
                        (anonymous - 1).to_string()
                    } else {
                        name.to_string()
                    };
                    if fields.contains(&name) {
                        return Err(invalid(pattern, &format!("duplicate field '{name}'")));
                    }
                    let body = match kind {
                        "" => ".+?",
                        "d" => r"[-+]?\d+",
                        "f" => r"[-+]?(?:\d+\.\d*|\.\d+|\d+)",
                        "w" => r"\w+",
                        other => {
                            return Err(invalid(pattern, &format!("unknown field type '{other}'")));
                        }
                    };
                    expr.push_str(&format!("(?P<f{}>{body})", fields.len()));
                    fields.push(name);
                }
                '}' => return Err(invalid(pattern, "single '}'")),
                c => literal.push(c),
            }
        }
        expr.push_str(&regex::escape(&literal));
        expr.push('$');

        let regex = Regex::new(&expr).map_err(|e| invalid(pattern, &e.to_string()))?;
        Ok(Self {
            source: pattern.to_string(),
            regex,
            fields,
        })
    }

    /// The pattern text as registered.
    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Matches `text`, returning the named field values.
    pub fn parse(&self, text: &str) -> Option<HashMap<String, String>> {
        let caps = self.regex.captures(text)?;
        let values = self
            .fields
            .iter()
            .enumerate()
            .filter_map(|(i, name)| {
                caps.name(&format!("f{i}"))
                    .map(|m| (name.clone(), m.as_str().to_string()))
            })
            .collect();
        Some(values)
    }
}

impl fmt::Debug for FormatPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("FormatPattern").field(&self.source).finish()
    }
}

fn invalid(pattern: &str, reason: &str) -> Error {
    Error::InvalidArgument {
        name: pattern.to_string(),
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn typed_fields() {
        let pattern = FormatPattern::new("{a:d}x{b:d}").unwrap();
        let values = pattern.parse("3x4").unwrap();
        assert_eq!(values["a"], "3");
        assert_eq!(values["b"], "4");
        assert!(pattern.parse("3x").is_none());
        assert!(pattern.parse("ax4").is_none());
    }

    #[test]
    fn whole_input_must_match() {
        let pattern = FormatPattern::new("add {n:d}").unwrap();
        assert!(pattern.parse("add 5").is_some());
        assert!(pattern.parse("please add 5").is_none());
        assert!(pattern.parse("add 5 now").is_none());
    }

    #[test]
    fn matching_ignores_case() {
        let pattern = FormatPattern::new("Hello {name}").unwrap();
        assert_eq!(pattern.parse("hello World").unwrap()["name"], "World");
    }

    #[test]
    fn anonymous_fields_and_escapes() {
        let pattern = FormatPattern::new("{{{}}} = {:f}").unwrap();
        let values = pattern.parse("{pi} = 3.14").unwrap();
        assert_eq!(values["0"], "pi");
        assert_eq!(values["1"], "3.14");
    }

    #[test]
    fn literal_regex_characters_are_escaped() {
        let pattern = FormatPattern::new("1+1=? {x}").unwrap();
        assert!(pattern.parse("1+1=? 2").is_some());
        assert!(pattern.parse("11=? 2").is_none());
    }

    #[test]
    fn malformed_patterns_are_rejected() {
        assert!(FormatPattern::new("{a").is_err());
        assert!(FormatPattern::new("a}").is_err());
        assert!(FormatPattern::new("{a:q}").is_err());
        assert!(FormatPattern::new("{a} {a}").is_err());
    }
}
