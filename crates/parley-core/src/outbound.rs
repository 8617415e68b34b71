//! Outbound content and send options.
//!
//! These are the concrete platform actions the answer resolver produces:
//! a [`OutboundContent`] to deliver plus the [`SendOptions`] that go with it.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::update::{ChatId, MessageId};

/// The kind of a media message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Sticker,
    Voice,
    Audio,
    Photo,
    Video,
    Document,
}

impl MediaKind {
    /// The command prefix used by the `kind:payload` text encoding.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sticker => "sticker",
            Self::Voice => "voice",
            Self::Audio => "audio",
            Self::Photo => "photo",
            Self::Video => "video",
            Self::Document => "document",
        }
    }

    /// Whether the platform accepts a caption for this kind.
    pub fn supports_caption(&self) -> bool {
        !matches!(self, Self::Sticker)
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MediaKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sticker" => Ok(Self::Sticker),
            "voice" => Ok(Self::Voice),
            "audio" => Ok(Self::Audio),
            "photo" => Ok(Self::Photo),
            "video" => Ok(Self::Video),
            "document" => Ok(Self::Document),
            _ => Err(()),
        }
    }
}

/// Where the bytes of a media message come from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaSource {
    /// A local file that is uploaded.
    Path(PathBuf),
    /// A file already known to the platform (e.g. a sticker file id).
    FileId(String),
}

/// Rich text mode of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Markup {
    #[serde(rename = "HTML")]
    Html,
    Markdown,
    MarkdownV2,
}

impl Markup {
    /// Wraps `text` in the emphasis syntax of this mode.
    pub fn bold(&self, text: &str) -> String {
        match self {
            Self::Html => format!("<b>{text}</b>"),
            Self::Markdown | Self::MarkdownV2 => format!("**{text}**"),
        }
    }
}

/// A button of an inline keyboard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InlineButton {
    pub text: String,
    pub callback_data: String,
}

/// Keyboard or markup attached to an outbound message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ReplyMarkup {
    /// Buttons attached to the message; pressing one raises a callback query.
    Inline { rows: Vec<Vec<InlineButton>> },
    /// A custom reply keyboard replacing the user's keyboard.
    Keyboard {
        rows: Vec<Vec<String>>,
        one_time: bool,
    },
    /// Removes a previously sent reply keyboard.
    Remove,
}

/// The content of one outbound message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum OutboundContent {
    Text(String),
    Media {
        kind: MediaKind,
        source: MediaSource,
        caption: Option<String>,
    },
}

impl OutboundContent {
    /// Returns the text or the caption.
    pub fn text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            Self::Media { caption, .. } => caption.as_deref(),
        }
    }
}

/// Options accompanying a send or edit call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendOptions {
    pub parse_mode: Option<Markup>,
    /// Links the outbound message as a reply to this inbound message.
    pub reply_to: Option<MessageId>,
    pub disable_notification: bool,
    pub disable_web_preview: bool,
    pub markup: Option<ReplyMarkup>,
}

/// A message the platform confirmed as sent (or edited).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SentMessage {
    pub id: MessageId,
    pub chat: ChatId,
    /// Unix timestamp in seconds.
    pub date: i64,
    pub text: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn media_kind_parses_known_prefixes() {
        assert_eq!("photo".parse::<MediaKind>(), Ok(MediaKind::Photo));
        assert!("gif".parse::<MediaKind>().is_err());
        assert!(!MediaKind::Sticker.supports_caption());
    }

    #[test]
    fn markup_deserializes_platform_names() {
        let markup: Markup = serde_json::from_str("\"HTML\"").unwrap();
        assert_eq!(markup.bold("Yes"), "<b>Yes</b>");
        assert_eq!(Markup::Markdown.bold("Yes"), "**Yes**");
    }
}
