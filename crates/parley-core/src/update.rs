//! Inbound update types.
//!
//! An [`Update`] is one event delivered by the chat platform: a text message,
//! a sticker, a callback query raised by an inline keyboard, or some other
//! payload the dispatcher does not interpret. Platform clients translate
//! their wire format into these types.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Stable identifier of a chat (and, for private chats, of the user).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChatId(pub i64);

impl fmt::Display for ChatId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for ChatId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

/// Identifier of a message within a chat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(pub i64);

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for MessageId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

/// The user who sent an update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    #[serde(default)]
    pub is_bot: bool,
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub username: String,
    /// IETF-ish language tag such as `de` or `de_DE`; empty when unknown.
    #[serde(default)]
    pub language_code: String,
}

impl User {
    /// Creates a user with only an id and a first name.
    pub fn new(id: i64, first_name: impl Into<String>) -> Self {
        Self {
            id,
            is_bot: false,
            first_name: first_name.into(),
            last_name: String::new(),
            username: String::new(),
            language_code: String::new(),
        }
    }

    /// Sets the language code (builder pattern).
    pub fn with_language(mut self, code: impl Into<String>) -> Self {
        self.language_code = code.into();
        self
    }

    /// Returns the chat the user talks to the bot in.
    pub fn chat(&self) -> ChatId {
        ChatId(self.id)
    }
}

impl fmt::Display for User {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.last_name.is_empty() {
            write!(f, "{}", self.first_name)
        } else {
            write!(f, "{} {}", self.first_name, self.last_name)
        }
    }
}

/// An inbound or sent chat message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    /// Unix timestamp in seconds.
    pub date: i64,
    #[serde(default)]
    pub text: Option<String>,
}

impl Message {
    /// Creates a text message.
    pub fn text(id: impl Into<MessageId>, date: i64, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            date,
            text: Some(text.into()),
        }
    }
}

/// Sticker metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sticker {
    pub emoji: String,
    pub file_id: String,
    #[serde(default)]
    pub file_size: Option<u64>,
    #[serde(default)]
    pub height: Option<u32>,
    #[serde(default)]
    pub set_name: Option<String>,
}

/// The user pressed a button of an inline keyboard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallbackQuery {
    /// Identifier used to acknowledge the query.
    pub id: String,
    /// The message the keyboard was attached to.
    pub message_id: MessageId,
    /// The callback data of the pressed button.
    pub data: String,
}

/// The payload of an [`Update`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum UpdateKind {
    /// A plain text message.
    Text(Message),
    /// A sticker message.
    Sticker { message: Message, sticker: Sticker },
    /// A callback query raised by an inline keyboard.
    Callback(CallbackQuery),
    /// Any other payload (photos, locations, service messages ...).
    Other { message: Option<Message> },
}

/// One inbound event from the chat platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Update {
    /// The chat the update belongs to; sessions are keyed by it.
    pub chat: ChatId,
    /// The sender.
    pub from: User,
    pub kind: UpdateKind,
}

impl Update {
    /// Builds a text update sent by `from` in its private chat.
    pub fn text(from: User, message_id: i64, text: impl Into<String>) -> Self {
        Self {
            chat: from.chat(),
            kind: UpdateKind::Text(Message::text(message_id, 0, text)),
            from,
        }
    }

    /// Builds a callback update for the keyboard attached to `message_id`.
    pub fn callback(
        from: User,
        query_id: impl Into<String>,
        message_id: i64,
        data: impl Into<String>,
    ) -> Self {
        Self {
            chat: from.chat(),
            kind: UpdateKind::Callback(CallbackQuery {
                id: query_id.into(),
                message_id: MessageId(message_id),
                data: data.into(),
            }),
            from,
        }
    }

    /// Builds a sticker update.
    pub fn sticker(from: User, message_id: i64, sticker: Sticker) -> Self {
        Self {
            chat: from.chat(),
            kind: UpdateKind::Sticker {
                message: Message {
                    id: MessageId(message_id),
                    date: 0,
                    text: None,
                },
                sticker,
            },
            from,
        }
    }

    /// Returns `true` for chat messages (text, sticker and other payloads),
    /// `false` for callback queries.
    pub fn is_message(&self) -> bool {
        !matches!(self.kind, UpdateKind::Callback(_))
    }

    /// Returns the text of a text message.
    pub fn text_content(&self) -> Option<&str> {
        match &self.kind {
            UpdateKind::Text(message) => message.text.as_deref(),
            _ => None,
        }
    }

    /// The inbound message, unless the update is a callback query.
    pub fn message(&self) -> Option<&Message> {
        match &self.kind {
            UpdateKind::Text(message) | UpdateKind::Sticker { message, .. } => Some(message),
            UpdateKind::Other { message } => message.as_ref(),
            UpdateKind::Callback(_) => None,
        }
    }

    /// A short name of the update kind, used in log spans.
    pub fn kind_name(&self) -> &'static str {
        match self.kind {
            UpdateKind::Text(_) => "text",
            UpdateKind::Sticker { .. } => "sticker",
            UpdateKind::Callback(_) => "callback",
            UpdateKind::Other { .. } => "other",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_display_skips_empty_last_name() {
        let mut user = User::new(7, "Ada");
        assert_eq!(user.to_string(), "Ada");
        user.last_name = "Lovelace".into();
        assert_eq!(user.to_string(), "Ada Lovelace");
    }

    #[test]
    fn update_kind_deserializes_from_tagged_json() {
        let update: Update = serde_json::from_value(serde_json::json!({
            "chat": 5,
            "from": { "id": 5, "first_name": "Bo" },
            "kind": { "type": "callback", "id": "q1", "message_id": 9, "data": "yes" }
        }))
        .unwrap();

        assert!(!update.is_message());
        assert_eq!(update.kind_name(), "callback");
        assert_eq!(update.from.language_code, "");
    }
}
