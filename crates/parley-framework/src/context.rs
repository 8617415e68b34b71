//! The explicit per-update handler context.
//!
//! Handlers never reach for ambient state: everything about the update being
//! handled, the user's session and the bot's settings is reachable from the
//! [`Context`] they receive (directly or through extractors).

use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;

use parley_core::{BoxedClient, ChatId, Message, SentMessage, Update, User};

use crate::error::Result;
use crate::extractor::Args;
use crate::language::LanguageTable;
use crate::resolver::Services;
use crate::session::SessionState;
use crate::settings::BotSettings;

#[derive(Clone)]
struct Inner {
    update: Update,
    text: String,
    args: Args,
    init_message: Option<Message>,
    session: Arc<SessionState>,
    services: Arc<Services>,
}

/// Everything a handler may need while handling one update.
///
/// Cloning is cheap.
#[derive(Clone)]
pub struct Context {
    inner: Arc<Inner>,
}

impl Context {
    pub(crate) fn new(
        update: Update,
        text: String,
        init_message: Option<Message>,
        session: Arc<SessionState>,
        services: Arc<Services>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                update,
                text,
                args: Args::default(),
                init_message,
                session,
                services,
            }),
        }
    }

    /// Returns a copy of this context carrying `args`.
    pub fn with_args(&self, args: Args) -> Self {
        let mut inner = (*self.inner).clone();
        inner.args = args;
        Self {
            inner: Arc::new(inner),
        }
    }

    /// Returns a copy of this context with one more argument.
    pub fn with_arg(&self, name: impl Into<String>, value: impl Into<String>) -> Self {
        let mut args = self.inner.args.clone();
        args.insert(name, value);
        self.with_args(args)
    }

    // ─── The update ───

    pub fn update(&self) -> &Update {
        &self.inner.update
    }

    pub fn user(&self) -> &User {
        &self.inner.update.from
    }

    pub fn chat(&self) -> ChatId {
        self.inner.update.chat
    }

    /// The text being handled: the message text, a sticker's emoji or the
    /// data of a picked query option.
    pub fn text(&self) -> &str {
        &self.inner.text
    }

    /// Arguments extracted by the matching route.
    pub fn args(&self) -> &Args {
        &self.inner.args
    }

    /// The inbound message, unless the update is a callback query.
    pub fn message(&self) -> Option<&Message> {
        self.inner.update.message()
    }

    /// The message that started the current exchange.
    ///
    /// Inside a conversation this stays the message the conversation was
    /// started by.
    pub fn init_message(&self) -> Option<&Message> {
        self.inner.init_message.as_ref()
    }

    /// The user's language code, e.g. `de_DE`.
    pub fn locale(&self) -> &str {
        &self.inner.update.from.language_code
    }

    // ─── Session ───

    pub fn session(&self) -> &Arc<SessionState> {
        &self.inner.session
    }

    /// Reads a value from the user's persistent storage.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        self.inner.session.get(key)
    }

    /// Writes a value to the user's persistent storage.
    pub fn set<T: Serialize>(&self, key: impl Into<String>, value: T) -> Result<()> {
        self.inner.session.set(key, value)
    }

    /// Removes a value from the user's persistent storage.
    pub fn remove(&self, key: &str) -> bool {
        self.inner.session.remove(key)
    }

    /// Recently sent messages, newest first.
    pub fn history(&self) -> Vec<SentMessage> {
        self.inner.session.history()
    }

    // ─── Services ───

    pub fn client(&self) -> &BoxedClient {
        &self.inner.services.client
    }

    pub fn settings(&self) -> &BotSettings {
        &self.inner.services.settings
    }

    pub fn language(&self) -> Option<&LanguageTable> {
        self.inner.services.language.as_deref()
    }

    /// Resolves a language key for this user.
    ///
    /// Without a language table the key is formatted as literal text.
    pub fn localize(&self, key: &str, args: &[String]) -> Result<String> {
        match self.language() {
            Some(table) => table.resolve(self.locale(), key, args),
            None => crate::language::format_positional(key, args),
        }
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("chat", &self.chat())
            .field("kind", &self.inner.update.kind_name())
            .field("text", &self.inner.text)
            .field("args", &self.inner.args)
            .finish_non_exhaustive()
    }
}
