//! Delivery of answers.
//!
//! The resolver sends rendered answers in list order, one platform call per
//! answer, and records the outcome in the session: the sent message goes
//! into the history, queries are registered with the callback correlator
//! and plain-reply callbacks become the session's pending callback. Answers
//! with a delay are handed to a timer task so they do not hold up the ones
//! after them.

use std::fmt;
use std::sync::Arc;

use tracing::{debug, warn};

use parley_core::{BoxedClient, ChatId, OutboundContent, SentMessage};

use crate::answer::Answer;
use crate::callback::Prompt;
use crate::error::{Error, Result};
use crate::language::LanguageTable;
use crate::overflow::OverflowHook;
use crate::render::{Origin, Rendered, render};
use crate::session::SessionState;
use crate::settings::BotSettings;

/// The immutable collaborators shared by every session.
pub(crate) struct Services {
    pub(crate) client: BoxedClient,
    pub(crate) settings: Arc<BotSettings>,
    pub(crate) language: Option<Arc<LanguageTable>>,
    pub(crate) overflow: Arc<dyn OverflowHook>,
}

impl Services {
    pub(crate) fn new(
        client: BoxedClient,
        settings: Arc<BotSettings>,
        language: Option<Arc<LanguageTable>>,
        overflow: Arc<dyn OverflowHook>,
    ) -> Self {
        Self {
            client,
            settings,
            language,
            overflow,
        }
    }
}

impl fmt::Debug for Services {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Services")
            .field("settings", &self.settings)
            .field("language", &self.language.is_some())
            .finish_non_exhaustive()
    }
}

/// Where delivered answers go and are recorded.
#[derive(Clone)]
pub(crate) struct Target {
    /// The default recipient; `None` for answers outside any session.
    pub chat: Option<ChatId>,
    pub session: Option<Arc<SessionState>>,
    pub origin: Origin,
}

/// Delivers `answers` in order, stopping at the first failure.
pub(crate) async fn deliver(
    services: &Arc<Services>,
    answers: Vec<Answer>,
    target: &Target,
) -> Result<()> {
    for answer in answers {
        if let Some(delay) = answer.delay {
            let services = services.clone();
            let target = target.clone();
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                if let Err(e) = send_one(&services, answer, &target).await {
                    warn!(error = %e, "failed to deliver delayed answer");
                }
            });
            continue;
        }
        send_one(services, answer, target).await?;
    }
    Ok(())
}

/// Renders and sends (or edits) one answer and records the result.
pub(crate) async fn send_one(
    services: &Services,
    answer: Answer,
    target: &Target,
) -> Result<SentMessage> {
    let recipient = answer
        .receiver
        .or(target.chat)
        .ok_or(Error::MissingRecipient)?;
    let Rendered { content, options } = render(services, &answer, &target.origin).await?;
    let parse_mode = options.parse_mode;
    let prompt_text = content.text().map(str::to_string);

    let sent = match answer.edit {
        Some(message_id) => {
            let OutboundContent::Text(text) = content else {
                return Err(Error::fault("only text messages can be edited"));
            };
            services
                .client
                .edit(recipient, message_id, text, options)
                .await?
        }
        None => services.client.send(recipient, content, options).await?,
    };
    debug!(chat = %recipient, message = %sent.id, "answer sent");

    if let Some(session) = &target.session {
        session.push_history(sent.clone());
        if recipient == session.chat() {
            if answer.is_query() {
                let prompt = Prompt {
                    text: prompt_text.unwrap_or_default(),
                    choices: answer.flat_choices().cloned().collect(),
                    markup: parse_mode,
                };
                session
                    .queries()
                    .bind(sent.id, prompt, answer.callback.clone());
            } else if let Some(callback) = &answer.callback {
                session.set_pending(callback.clone());
            }
        }
        session.set_last_sent(answer, sent.clone());
    }
    Ok(sent)
}
