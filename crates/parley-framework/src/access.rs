//! Handler wrappers: access levels and required arguments.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use futures::FutureExt;
use tracing::info;

use crate::answer::{Answer, Choice, Reply};
use crate::context::Context;
use crate::conversation::{Conversation, Turns};
use crate::error::Error;
use crate::handler::{BoxedHandler, Handler};

type Checker = Arc<dyn Fn(&Context) -> bool + Send + Sync>;

/// Named access levels guarding handlers.
///
/// ```rust,ignore
/// let access = AccessControl::new()
///     .level("admin", |ctx: &Context| ctx.user().id == 42);
///
/// let router = Router::new()
///     .exact("/shutdown", access.require(["admin"], shutdown));
/// ```
#[derive(Clone, Default)]
pub struct AccessControl {
    checkers: HashMap<String, Checker>,
}

impl AccessControl {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the checker deciding whether a user has `level`.
    pub fn level<F>(mut self, level: impl Into<String>, checker: F) -> Self
    where
        F: Fn(&Context) -> bool + Send + Sync + 'static,
    {
        self.checkers.insert(level.into(), Arc::new(checker));
        self
    }

    /// Returns `true` if any of `levels` grants access. Unknown levels never
    /// do.
    pub fn allows<'a>(&self, ctx: &Context, levels: impl IntoIterator<Item = &'a str>) -> bool {
        levels
            .into_iter()
            .filter_map(|level| self.checkers.get(level))
            .any(|checker| checker(ctx))
    }

    /// Wraps `handler` so it only runs when one of `levels` grants access.
    ///
    /// Otherwise the invocation fails with [`Error::AuthorizationDenied`].
    pub fn require<H, M, I, S>(&self, levels: I, handler: H) -> BoxedHandler
    where
        H: Handler<M>,
        M: 'static,
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let levels: Arc<[String]> = levels.into_iter().map(Into::into).collect();
        let inner = BoxedHandler::new(handler);
        let access = self.clone();
        let name = inner.name();
        BoxedHandler::from_fn(name, move |ctx| {
            let inner = inner.clone();
            let allowed = access.allows(&ctx, levels.iter().map(String::as_str));
            let levels = levels.clone();
            async move {
                if allowed {
                    inner.invoke(ctx).await
                } else {
                    info!(user = %ctx.user(), ?levels, "request blocked by access levels");
                    Err(Error::AuthorizationDenied)
                }
            }
            .boxed()
        })
    }
}

impl fmt::Debug for AccessControl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessControl")
            .field("levels", &self.checkers.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Wraps `handler` so that argument `name` is always present.
///
/// When the matched route did not provide it, the user is asked `phrase`
/// (as a query if `choices` is not empty) and the handler runs with the
/// answer as the argument.
pub fn ensure_arg<H, M, I>(
    name: impl Into<String>,
    phrase: impl Into<String>,
    choices: I,
    handler: H,
) -> BoxedHandler
where
    H: Handler<M>,
    M: 'static,
    I: IntoIterator,
    I::Item: Into<Choice>,
{
    let name: Arc<str> = name.into().into();
    let phrase: Arc<str> = phrase.into().into();
    let choices: Arc<[Choice]> = choices.into_iter().map(Into::into).collect();
    let inner = BoxedHandler::new(handler);
    let handler_name = inner.name();

    BoxedHandler::from_fn(handler_name, move |ctx| {
        let inner = inner.clone();
        let name = name.clone();
        let phrase = phrase.clone();
        let choices = choices.clone();
        async move {
            if ctx.args().contains(&name) {
                return inner.invoke(ctx).await;
            }
            let conversation = Conversation::new(move |mut turns: Turns| async move {
                let mut question = Answer::new(&*phrase);
                if !choices.is_empty() {
                    question = question.choices(choices.iter().cloned());
                }
                let Ok(value) = turns.ask(question).await else {
                    return Ok(Reply::Nothing);
                };
                let ctx = ctx.with_arg(&*name, value);
                inner.invoke(ctx).await
            });
            Ok(Reply::Conversation(conversation))
        }
        .boxed()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extractor::Args;
    use crate::testing;

    #[tokio::test]
    async fn require_checks_levels() {
        let access = AccessControl::new()
            .level("admin", |ctx: &Context| ctx.user().id == 1)
            .level("nobody", |_: &Context| false);

        let allowed = access.require(["nobody", "admin"], || "welcome");
        let reply = allowed.invoke(testing::context("x")).await.unwrap();
        assert!(matches!(reply, Reply::Answers(_)));

        let denied = access.require(["nobody", "unknown"], || "welcome");
        let err = denied.invoke(testing::context("x")).await.unwrap_err();
        assert!(err.is_authorization());
    }

    #[tokio::test]
    async fn ensure_arg_passes_through_present_arguments() {
        let handler = ensure_arg("city", "Which city?", Vec::<Choice>::new(), |args: Args| {
            args.raw("city").unwrap_or_default().to_string()
        });
        let ctx = testing::context("weather").with_arg("city", "Paris");
        let reply = handler.invoke(ctx).await.unwrap();
        assert!(matches!(reply, Reply::Answers(_)));
    }

    #[tokio::test]
    async fn ensure_arg_asks_for_missing_arguments() {
        let handler = ensure_arg("city", "Which city?", ["Paris", "Rome"], |args: Args| {
            args.raw("city").unwrap_or_default().to_string()
        });
        let reply = handler.invoke(testing::context("weather")).await.unwrap();
        assert!(matches!(reply, Reply::Conversation(_)));
    }
}
