//! Turning an [`Answer`] into concrete outbound content.

use parley_core::{
    InlineButton, MediaKind, MediaSource, MessageId, OutboundContent, ReplyMarkup, SendOptions,
};

use crate::answer::{Answer, Body, Keyboard};
use crate::error::{Error, Result};
use crate::language::format_positional;
use crate::resolver::Services;

/// Where an answer is rendered for.
#[derive(Debug, Clone, Default)]
pub(crate) struct Origin {
    /// The language code language keys are resolved with.
    pub locale: String,
    /// The message outbound answers are linked to as replies.
    pub reply_to: Option<MessageId>,
}

/// A rendered answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Rendered {
    pub content: OutboundContent,
    pub options: SendOptions,
}

/// Renders `answer`.
///
/// Language keys are resolved first, then `kind:payload;caption` texts are
/// decoded into media, then oversized texts go through the overflow hook.
pub(crate) async fn render(
    services: &Services,
    answer: &Answer,
    origin: &Origin,
) -> Result<Rendered> {
    let settings = &services.settings;

    let content = match &answer.body {
        Body::Text { key, args } => {
            let locale = answer.language.as_deref().unwrap_or(&origin.locale);
            let text = match &services.language {
                Some(table) if settings.language_feature || answer.localized => {
                    table.resolve(locale, key, args)?
                }
                _ => format_positional(key, args)?,
            };
            match decode_media(&text) {
                Some((kind, source, caption)) => media(kind, source, caption).await?,
                None if text.chars().count() > settings.max_message_length => {
                    let replacement = services.overflow.on_overflow(&text).await?;
                    media(replacement.kind, replacement.source, replacement.caption).await?
                }
                None => OutboundContent::Text(text),
            }
        }
        Body::Media {
            kind,
            source,
            caption,
        } => media(*kind, source.clone(), caption.clone()).await?,
    };

    let options = SendOptions {
        parse_mode: answer.markup.or(settings.markup),
        reply_to: if settings.mark_as_answer && answer.receiver.is_none() {
            origin.reply_to
        } else {
            None
        },
        disable_notification: settings.disable_notification,
        disable_web_preview: settings.disable_web_preview,
        markup: reply_markup(answer),
    };

    Ok(Rendered { content, options })
}

/// Decodes the `kind:payload` and `kind:payload;caption` encodings.
pub(crate) fn decode_media(text: &str) -> Option<(MediaKind, MediaSource, Option<String>)> {
    let (command, payload) = text.split_once(':')?;
    let kind: MediaKind = command.parse().ok()?;
    let (payload, caption) = match payload.split_once(';') {
        Some((payload, caption)) => (payload, Some(caption.to_string())),
        None => (payload, None),
    };
    let source = match kind {
        MediaKind::Sticker => MediaSource::FileId(payload.to_string()),
        _ => MediaSource::Path(payload.into()),
    };
    Some((kind, source, caption))
}

async fn media(
    kind: MediaKind,
    source: MediaSource,
    caption: Option<String>,
) -> Result<OutboundContent> {
    if let MediaSource::Path(path) = &source
        && !tokio::fs::try_exists(path).await.unwrap_or(false)
    {
        return Err(Error::MediaNotFound { path: path.clone() });
    }
    Ok(OutboundContent::Media {
        kind,
        source,
        caption: caption.filter(|_| kind.supports_caption()),
    })
}

fn reply_markup(answer: &Answer) -> Option<ReplyMarkup> {
    if let Some(rows) = answer.choices.as_ref().filter(|rows| !rows.is_empty()) {
        let rows = rows
            .iter()
            .map(|row| {
                row.iter()
                    .map(|choice| InlineButton {
                        text: choice.label.clone(),
                        callback_data: choice.data.clone(),
                    })
                    .collect()
            })
            .collect();
        return Some(ReplyMarkup::Inline { rows });
    }
    answer.keyboard.as_ref().map(|keyboard| match keyboard {
        Keyboard::Remove => ReplyMarkup::Remove,
        Keyboard::Rows { rows, one_time } => ReplyMarkup::Keyboard {
            rows: rows.clone(),
            one_time: *one_time,
        },
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use parley_core::Markup;

    use super::*;
    use crate::language::LanguageTable;
    use crate::settings::BotSettings;
    use crate::testing;

    fn services(settings: BotSettings, language: Option<LanguageTable>) -> Services {
        let client = Arc::new(testing::RecordingClient::new());
        testing::services_with(client, settings, language)
    }

    #[test]
    fn media_prefixes_are_decoded() {
        let (kind, source, caption) = decode_media("photo:cat.png;A cat").unwrap();
        assert_eq!(kind, MediaKind::Photo);
        assert_eq!(source, MediaSource::Path("cat.png".into()));
        assert_eq!(caption.as_deref(), Some("A cat"));

        let (kind, source, _) = decode_media("sticker:CAADAg").unwrap();
        assert_eq!(kind, MediaKind::Sticker);
        assert_eq!(source, MediaSource::FileId("CAADAg".into()));

        assert!(decode_media("note: buy milk").is_none());
        assert!(decode_media("plain text").is_none());
    }

    #[tokio::test]
    async fn language_keys_are_resolved_before_decoding() {
        let table = LanguageTable::default()
            .entry("default", "greet", "Hello {}")
            .entry("default", "cat", "sticker:CAT");
        let settings = BotSettings {
            language_feature: true,
            ..Default::default()
        };
        let services = services(settings, Some(table));

        let greet = Answer::key("greet").arg("Ada");
        let rendered = render(&services, &greet, &Origin::default())
            .await
            .unwrap();
        assert_eq!(rendered.content, OutboundContent::Text("Hello Ada".into()));

        let rendered = render(&services, &Answer::key("cat"), &Origin::default())
            .await
            .unwrap();
        assert!(matches!(
            rendered.content,
            OutboundContent::Media { kind: MediaKind::Sticker, .. }
        ));
    }

    #[tokio::test]
    async fn missing_media_file_is_an_error() {
        let services = services(BotSettings::default(), None);
        let photo = Answer::new("photo:/no/such/file.png");
        let err = render(&services, &photo, &Origin::default())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::MediaNotFound { .. }));
    }

    #[tokio::test]
    async fn options_follow_settings_and_answer() {
        let settings = BotSettings {
            mark_as_answer: true,
            markup: Some(Markup::Html),
            disable_notification: true,
            ..Default::default()
        };
        let services = services(settings, None);
        let origin = Origin {
            locale: "en".into(),
            reply_to: Some(MessageId(3)),
        };

        let rendered = render(&services, &Answer::new("Pick").choices(["a", "b"]), &origin)
            .await
            .unwrap();
        assert_eq!(rendered.options.reply_to, Some(MessageId(3)));
        assert_eq!(rendered.options.parse_mode, Some(Markup::Html));
        assert!(rendered.options.disable_notification);
        assert!(matches!(
            rendered.options.markup,
            Some(ReplyMarkup::Inline { ref rows }) if rows[0].len() == 2
        ));

        let elsewhere = Answer::new("Elsewhere").to(parley_core::ChatId(99));
        let rendered = render(&services, &elsewhere, &origin).await.unwrap();
        assert_eq!(rendered.options.reply_to, None);

        let rendered = render(&services, &Answer::new("Bye").remove_keyboard(), &origin)
            .await
            .unwrap();
        assert_eq!(rendered.options.markup, Some(ReplyMarkup::Remove));
    }
}
