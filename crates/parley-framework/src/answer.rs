//! Answers and handler replies.
//!
//! An [`Answer`] describes one outbound unit. Whether it is text or media is
//! decided when it is built ([`Body`]); the `kind:payload;caption` text
//! encoding is only decoded at render time for compatibility. A handler's
//! return value becomes a [`Reply`] through [`IntoReply`].

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use tower::BoxError;

use parley_core::{ChatId, Markup, MediaKind, MediaSource, MessageId};

use crate::conversation::Conversation;
use crate::error::{Error, Result};
use crate::handler::{BoxedHandler, Handler};

/// Buttons per row when a flat list is given.
const ROW_WIDTH: usize = 2;

/// What an answer sends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Body {
    /// A language key or literal text with positional format arguments.
    Text { key: String, args: Vec<String> },
    /// A media message.
    Media {
        kind: MediaKind,
        source: MediaSource,
        caption: Option<String>,
    },
}

/// One option of an interactive query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Choice {
    pub label: String,
    /// Delivered back in the callback query when the option is picked.
    pub data: String,
}

impl Choice {
    pub fn new(label: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            data: data.into(),
        }
    }
}

impl From<&str> for Choice {
    fn from(label: &str) -> Self {
        Self::new(label, label)
    }
}

impl From<String> for Choice {
    fn from(label: String) -> Self {
        Self::new(label.clone(), label)
    }
}

impl<L: Into<String>, D: Into<String>> From<(L, D)> for Choice {
    fn from((label, data): (L, D)) -> Self {
        Self::new(label, data)
    }
}

/// A custom reply keyboard, or its removal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Keyboard {
    Remove,
    Rows {
        rows: Vec<Vec<String>>,
        one_time: bool,
    },
}

/// Splits a flat list into rows of two.
fn into_rows<T>(items: Vec<T>) -> Vec<Vec<T>> {
    let mut rows = Vec::with_capacity(items.len().div_ceil(ROW_WIDTH));
    let mut iter = items.into_iter().peekable();
    while iter.peek().is_some() {
        rows.push(iter.by_ref().take(ROW_WIDTH).collect());
    }
    rows
}

/// A descriptor of one outbound message.
#[derive(Clone)]
pub struct Answer {
    pub(crate) body: Body,
    pub(crate) choices: Option<Vec<Vec<Choice>>>,
    pub(crate) keyboard: Option<Keyboard>,
    pub(crate) receiver: Option<ChatId>,
    pub(crate) edit: Option<MessageId>,
    pub(crate) callback: Option<BoxedHandler>,
    pub(crate) delay: Option<Duration>,
    pub(crate) markup: Option<Markup>,
    pub(crate) language: Option<String>,
    /// Resolved through the language table even with the language feature
    /// off.
    pub(crate) localized: bool,
}

impl Answer {
    /// Creates a text answer. With the language feature enabled, `text` is a
    /// language key.
    pub fn new(text: impl Into<String>) -> Self {
        Self::with_body(Body::Text {
            key: text.into(),
            args: Vec::new(),
        })
    }

    /// Alias of [`Answer::new`] that reads better for language keys.
    pub fn key(key: impl Into<String>) -> Self {
        Self::new(key)
    }

    /// A language key answer resolved whether or not the language feature
    /// is enabled.
    pub(crate) fn localized(key: impl Into<String>) -> Self {
        Self {
            localized: true,
            ..Self::new(key)
        }
    }

    /// Creates a media answer uploading the file at `path`.
    pub fn media(kind: MediaKind, path: impl Into<PathBuf>) -> Self {
        Self::with_body(Body::Media {
            kind,
            source: MediaSource::Path(path.into()),
            caption: None,
        })
    }

    /// Creates a sticker answer from a platform file id.
    pub fn sticker(file_id: impl Into<String>) -> Self {
        Self::with_body(Body::Media {
            kind: MediaKind::Sticker,
            source: MediaSource::FileId(file_id.into()),
            caption: None,
        })
    }

    fn with_body(body: Body) -> Self {
        Self {
            body,
            choices: None,
            keyboard: None,
            receiver: None,
            edit: None,
            callback: None,
            delay: None,
            markup: None,
            language: None,
            localized: false,
        }
    }

    /// Appends a positional format argument.
    pub fn arg(mut self, arg: impl fmt::Display) -> Self {
        if let Body::Text { args, .. } = &mut self.body {
            args.push(arg.to_string());
        }
        self
    }

    /// Appends several positional format arguments.
    pub fn args<I>(mut self, args: I) -> Self
    where
        I: IntoIterator,
        I::Item: fmt::Display,
    {
        for arg in args {
            self = self.arg(arg);
        }
        self
    }

    /// Sets the caption of a media answer.
    pub fn caption(mut self, text: impl Into<String>) -> Self {
        if let Body::Media { caption, .. } = &mut self.body {
            *caption = Some(text.into());
        }
        self
    }

    /// Turns the answer into a query, laying the choices out in rows of two.
    pub fn choices<I>(self, choices: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<Choice>,
    {
        let flat: Vec<Choice> = choices.into_iter().map(Into::into).collect();
        self.choice_rows(into_rows(flat))
    }

    /// Turns the answer into a query with an explicit row layout.
    pub fn choice_rows<R, I>(mut self, rows: R) -> Self
    where
        R: IntoIterator<Item = I>,
        I: IntoIterator,
        I::Item: Into<Choice>,
    {
        let rows: Vec<Vec<Choice>> = rows
            .into_iter()
            .map(|row| row.into_iter().map(Into::into).collect())
            .collect();
        self.choices = Some(rows);
        self
    }

    /// Attaches a one-time reply keyboard laid out in rows of two.
    ///
    /// An empty list removes the user's current keyboard.
    pub fn keyboard<I>(self, buttons: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        let flat: Vec<String> = buttons.into_iter().map(Into::into).collect();
        self.keyboard_rows(into_rows(flat))
    }

    /// Attaches a one-time reply keyboard with an explicit row layout.
    pub fn keyboard_rows<R, I>(mut self, rows: R) -> Self
    where
        R: IntoIterator<Item = I>,
        I: IntoIterator,
        I::Item: Into<String>,
    {
        let rows: Vec<Vec<String>> = rows
            .into_iter()
            .map(|row| row.into_iter().map(Into::into).collect())
            .filter(|row: &Vec<String>| !row.is_empty())
            .collect();
        self.keyboard = Some(if rows.is_empty() {
            Keyboard::Remove
        } else {
            Keyboard::Rows {
                rows,
                one_time: true,
            }
        });
        self
    }

    /// Removes the user's current reply keyboard.
    pub fn remove_keyboard(mut self) -> Self {
        self.keyboard = Some(Keyboard::Remove);
        self
    }

    /// Sends to `chat` instead of the originating user.
    pub fn to(mut self, chat: impl Into<ChatId>) -> Self {
        self.receiver = Some(chat.into());
        self
    }

    /// Edits the text of `message` instead of sending a new message.
    pub fn edit(mut self, message: impl Into<MessageId>) -> Self {
        self.edit = Some(message.into());
        self
    }

    /// Binds `handler` to the user's response.
    ///
    /// For a query the handler runs when an option is picked; otherwise it
    /// runs with the user's next plain message.
    pub fn callback<H, M>(mut self, handler: H) -> Self
    where
        H: Handler<M>,
        M: 'static,
    {
        self.callback = Some(BoxedHandler::new(handler));
        self
    }

    /// Sends after `delay` without holding up later answers.
    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Overrides the configured rich text mode.
    pub fn markup(mut self, markup: Markup) -> Self {
        self.markup = Some(markup);
        self
    }

    /// Resolves language keys for `locale` instead of the user's locale.
    pub fn language(mut self, locale: impl Into<String>) -> Self {
        self.language = Some(locale.into());
        self
    }

    pub fn body(&self) -> &Body {
        &self.body
    }

    pub fn receiver(&self) -> Option<ChatId> {
        self.receiver
    }

    pub fn delay_duration(&self) -> Option<Duration> {
        self.delay
    }

    /// Returns `true` if the answer presents choices.
    pub fn is_query(&self) -> bool {
        self.choices.as_ref().is_some_and(|rows| !rows.is_empty())
    }

    /// The choices in reading order.
    pub fn flat_choices(&self) -> impl Iterator<Item = &Choice> {
        self.choices.iter().flatten().flatten()
    }
}

impl fmt::Debug for Answer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Answer")
            .field("body", &self.body)
            .field("choices", &self.choices)
            .field("keyboard", &self.keyboard)
            .field("receiver", &self.receiver)
            .field("edit", &self.edit)
            .field("callback", &self.callback.as_ref().map(BoxedHandler::name))
            .field("delay", &self.delay)
            .finish()
    }
}

impl From<&str> for Answer {
    fn from(text: &str) -> Self {
        Self::new(text)
    }
}

impl From<String> for Answer {
    fn from(text: String) -> Self {
        Self::new(text)
    }
}

// ============================================================================
// Reply
// ============================================================================

/// The normalised result of a handler.
#[derive(Debug, Default)]
pub enum Reply {
    /// Send nothing.
    #[default]
    Nothing,
    /// Send these answers in order.
    Answers(Vec<Answer>),
    /// Start a multi-turn conversation.
    Conversation(Conversation),
}

impl Reply {
    pub fn is_nothing(&self) -> bool {
        match self {
            Self::Nothing => true,
            Self::Answers(answers) => answers.is_empty(),
            Self::Conversation(_) => false,
        }
    }
}

/// Converts handler return values into a [`Reply`].
pub trait IntoReply: Send {
    fn into_reply(self) -> Result<Reply>;
}

impl IntoReply for Reply {
    fn into_reply(self) -> Result<Reply> {
        Ok(self)
    }
}

impl IntoReply for () {
    fn into_reply(self) -> Result<Reply> {
        Ok(Reply::Nothing)
    }
}

impl IntoReply for &'static str {
    fn into_reply(self) -> Result<Reply> {
        Answer::new(self).into_reply()
    }
}

impl IntoReply for String {
    fn into_reply(self) -> Result<Reply> {
        Answer::new(self).into_reply()
    }
}

impl IntoReply for Answer {
    fn into_reply(self) -> Result<Reply> {
        Ok(Reply::Answers(vec![self]))
    }
}

impl IntoReply for Vec<Answer> {
    fn into_reply(self) -> Result<Reply> {
        Ok(Reply::Answers(self))
    }
}

/// The first element is the text, the rest are its format arguments.
impl IntoReply for Vec<String> {
    fn into_reply(self) -> Result<Reply> {
        let mut parts = self.into_iter();
        match parts.next() {
            Some(text) => Answer::new(text).args(parts).into_reply(),
            None => Ok(Reply::Nothing),
        }
    }
}

impl IntoReply for Conversation {
    fn into_reply(self) -> Result<Reply> {
        Ok(Reply::Conversation(self))
    }
}

impl<T: IntoReply> IntoReply for Option<T> {
    fn into_reply(self) -> Result<Reply> {
        match self {
            Some(inner) => inner.into_reply(),
            None => Ok(Reply::Nothing),
        }
    }
}

/// Errors keep their category when they are (or wrap) a framework error.
impl<T, E> IntoReply for std::result::Result<T, E>
where
    T: IntoReply,
    E: Into<BoxError> + Send,
{
    fn into_reply(self) -> Result<Reply> {
        match self {
            Ok(inner) => inner.into_reply(),
            Err(err) => Err(Error::from_boxed(err.into())),
        }
    }
}

macro_rules! impl_into_reply_for_tuple {
    ($($arg:ident),+) => {
        /// Text followed by its format arguments.
        #[allow(non_snake_case)]
        impl<S, $($arg,)+> IntoReply for (S, $($arg,)+)
        where
            S: Into<String> + Send,
            $( $arg: fmt::Display + Send, )+
        {
            fn into_reply(self) -> Result<Reply> {
                let (text, $($arg,)+) = self;
                Answer::new(text)$(.arg($arg))+.into_reply()
            }
        }
    };
}

impl_into_reply_for_tuple!(A1);
impl_into_reply_for_tuple!(A1, A2);
impl_into_reply_for_tuple!(A1, A2, A3);
impl_into_reply_for_tuple!(A1, A2, A3, A4);
