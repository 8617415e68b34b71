//! Handler parameters.
//!
//! Any type implementing [`FromContext`] can be a handler parameter. A failed
//! extraction fails the handler invocation with that error.

use std::collections::HashMap;
use std::str::FromStr;

use parley_core::{ChatId, Update, User};

use crate::context::Context;
use crate::error::{Error, Result};

/// Types that can be extracted from a [`Context`].
pub trait FromContext: Sized {
    fn from_context(ctx: &Context) -> Result<Self>;
}

impl FromContext for Context {
    fn from_context(ctx: &Context) -> Result<Self> {
        Ok(ctx.clone())
    }
}

impl FromContext for User {
    fn from_context(ctx: &Context) -> Result<Self> {
        Ok(ctx.user().clone())
    }
}

impl FromContext for ChatId {
    fn from_context(ctx: &Context) -> Result<Self> {
        Ok(ctx.chat())
    }
}

impl FromContext for Update {
    fn from_context(ctx: &Context) -> Result<Self> {
        Ok(ctx.update().clone())
    }
}

/// Optional parameters never fail.
impl<T: FromContext> FromContext for Option<T> {
    fn from_context(ctx: &Context) -> Result<Self> {
        Ok(T::from_context(ctx).ok())
    }
}

/// The handled text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Text(pub String);

impl FromContext for Text {
    fn from_context(ctx: &Context) -> Result<Self> {
        Ok(Self(ctx.text().to_string()))
    }
}

/// Named arguments extracted by a pattern or regex route.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Args {
    values: HashMap<String, String>,
}

impl Args {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.values.insert(name.into(), value.into());
    }

    /// The raw text of argument `name`.
    pub fn raw(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    /// Parses argument `name`.
    ///
    /// Fails with [`Error::InvalidArgument`] when it is missing or does not
    /// parse as `T`.
    pub fn get<T>(&self, name: &str) -> Result<T>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        let raw = self.raw(name).ok_or_else(|| Error::InvalidArgument {
            name: name.to_string(),
            reason: "missing".to_string(),
        })?;
        raw.parse().map_err(|e: T::Err| Error::InvalidArgument {
            name: name.to_string(),
            reason: e.to_string(),
        })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl From<HashMap<String, String>> for Args {
    fn from(values: HashMap<String, String>) -> Self {
        Self { values }
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Args {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            values: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

impl FromContext for Args {
    fn from_context(ctx: &Context) -> Result<Self> {
        Ok(ctx.args().clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn typed_argument_access() {
        let args: Args = [("a", "3"), ("name", "Ada")].into_iter().collect();
        assert_eq!(args.get::<i64>("a").unwrap(), 3);
        assert_eq!(args.get::<String>("name").unwrap(), "Ada");
        assert!(matches!(
            args.get::<i64>("name"),
            Err(Error::InvalidArgument { .. })
        ));
        assert!(matches!(
            args.get::<i64>("b"),
            Err(Error::InvalidArgument { reason, .. }) if reason == "missing"
        ));
    }
}
