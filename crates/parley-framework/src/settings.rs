//! Behaviour switches of the dispatch engine.
//!
//! [`BotSettings`] is the framework's view of the `[bot]`, `[query]` and
//! `allowed_ids` configuration. It deserialises with a default for every
//! field, so the framework is usable without the runtime's config loader.

use serde::{Deserialize, Serialize};

use parley_core::Markup;

/// Settings consulted while handling updates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BotSettings {
    /// Treat answer texts as keys into the language table.
    pub language_feature: bool,
    /// Reply with the language entry of unrouted texts that are language keys.
    pub implicit_routing: bool,
    /// Fail with `MissingLanguageKey` instead of echoing unknown keys.
    pub strict_mode: bool,
    /// Link outbound messages as replies to the triggering message.
    pub mark_as_answer: bool,
    /// Default rich text mode.
    pub markup: Option<Markup>,
    /// Answer sent when a handler fails.
    pub error_reply: Option<String>,
    /// Answer sent when a handler is denied by an access level.
    pub authorization_reply: Option<String>,
    /// Dispatch stickers as their emoji text.
    pub extract_emojis: bool,
    pub cancel_command: String,
    pub max_history_entries: usize,
    pub disable_web_preview: bool,
    pub disable_notification: bool,
    /// Texts longer than this many characters go through the overflow hook.
    pub max_message_length: usize,
    /// Echo the chosen label into a query's prompt once it is answered.
    pub replace_query: bool,
    /// Chats allowed to talk to the bot; `None` means everyone.
    pub allowed_ids: Option<Vec<i64>>,
}

impl Default for BotSettings {
    fn default() -> Self {
        Self {
            language_feature: false,
            implicit_routing: false,
            strict_mode: false,
            mark_as_answer: false,
            markup: None,
            error_reply: None,
            authorization_reply: None,
            extract_emojis: false,
            cancel_command: "/cancel".to_string(),
            max_history_entries: 10,
            disable_web_preview: false,
            disable_notification: false,
            max_message_length: 4096,
            replace_query: true,
            allowed_ids: None,
        }
    }
}

impl BotSettings {
    /// Returns `true` if `chat` passes the allow-list.
    pub fn is_allowed(&self, chat: i64) -> bool {
        self.allowed_ids
            .as_ref()
            .is_none_or(|ids| ids.contains(&chat))
    }

    /// Whether the language table is needed at all.
    pub fn needs_language(&self) -> bool {
        self.language_feature || self.implicit_routing
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_take_defaults() {
        let settings: BotSettings =
            serde_json::from_str(r#"{ "strict_mode": true, "markup": "HTML" }"#).unwrap();
        assert!(settings.strict_mode);
        assert_eq!(settings.markup, Some(Markup::Html));
        assert_eq!(settings.cancel_command, "/cancel");
        assert_eq!(settings.max_history_entries, 10);
        assert!(settings.replace_query);
    }

    #[test]
    fn allow_list() {
        let mut settings = BotSettings::default();
        assert!(settings.is_allowed(42));

        settings.allowed_ids = Some(vec![1, 2]);
        assert!(settings.is_allowed(2));
        assert!(!settings.is_allowed(42));
    }
}
