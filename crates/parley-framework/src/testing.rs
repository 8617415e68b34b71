//! Test doubles shared by the unit tests.

use std::sync::Arc;
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use parking_lot::Mutex;

use parley_core::{
    BoxedClient, ChatId, MessageId, OutboundContent, PlatformClient, SendOptions, SentMessage,
    TransportError, TransportResult, Update, User,
};

use crate::context::Context;
use crate::error::Result;
use crate::language::LanguageTable;
use crate::overflow::{OverflowHook, Replacement, TempFileOverflow};
use crate::resolver::Services;
use crate::session::Session;
use crate::settings::BotSettings;

#[derive(Debug, Clone)]
pub struct SentRecord {
    pub id: MessageId,
    pub chat: ChatId,
    pub content: OutboundContent,
    pub options: SendOptions,
}

#[derive(Debug, Clone)]
pub struct EditRecord {
    pub chat: ChatId,
    pub message_id: MessageId,
    pub text: String,
    pub options: SendOptions,
}

/// An in-memory [`PlatformClient`] that records every call.
#[derive(Debug, Default)]
pub struct RecordingClient {
    next_id: AtomicI64,
    failures: AtomicUsize,
    sent: Mutex<Vec<SentRecord>>,
    edits: Mutex<Vec<EditRecord>>,
    acks: Mutex<Vec<String>>,
    updates: Mutex<Vec<Update>>,
}

impl RecordingClient {
    pub fn new() -> Self {
        Self {
            next_id: AtomicI64::new(100),
            ..Default::default()
        }
    }

    /// Makes the next `n` sends and edits fail as unreachable.
    pub fn fail_next_sends(&self, n: usize) {
        self.failures.store(n, Ordering::SeqCst);
    }

    /// Queues updates for [`PlatformClient::updates`].
    pub fn push_update(&self, update: Update) {
        self.updates.lock().push(update);
    }

    pub fn sent(&self) -> Vec<SentRecord> {
        self.sent.lock().clone()
    }

    /// Texts of the sent text messages.
    pub fn sent_texts(&self) -> Vec<String> {
        self.sent
            .lock()
            .iter()
            .filter_map(|record| match &record.content {
                OutboundContent::Text(text) => Some(text.clone()),
                OutboundContent::Media { .. } => None,
            })
            .collect()
    }

    pub fn edits(&self) -> Vec<EditRecord> {
        self.edits.lock().clone()
    }

    pub fn acks(&self) -> Vec<String> {
        self.acks.lock().clone()
    }

    fn check_failure(&self) -> TransportResult<()> {
        let failing = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            Err(TransportError::RecipientUnreachable)
        } else {
            Ok(())
        }
    }

    fn next_id(&self) -> MessageId {
        MessageId(self.next_id.fetch_add(1, Ordering::SeqCst))
    }
}

#[async_trait]
impl PlatformClient for RecordingClient {
    async fn send(
        &self,
        recipient: ChatId,
        content: OutboundContent,
        options: SendOptions,
    ) -> TransportResult<SentMessage> {
        self.check_failure()?;
        let id = self.next_id();
        let text = content.text().map(str::to_string);
        self.sent.lock().push(SentRecord {
            id,
            chat: recipient,
            content,
            options,
        });
        Ok(SentMessage {
            id,
            chat: recipient,
            date: 0,
            text,
        })
    }

    async fn edit(
        &self,
        recipient: ChatId,
        message_id: MessageId,
        text: String,
        options: SendOptions,
    ) -> TransportResult<SentMessage> {
        self.check_failure()?;
        self.edits.lock().push(EditRecord {
            chat: recipient,
            message_id,
            text: text.clone(),
            options,
        });
        Ok(SentMessage {
            id: message_id,
            chat: recipient,
            date: 0,
            text: Some(text),
        })
    }

    async fn ack_callback(&self, callback_id: &str) -> TransportResult<()> {
        self.acks.lock().push(callback_id.to_string());
        Ok(())
    }

    async fn updates(&self) -> TransportResult<BoxStream<'static, Update>> {
        let updates = std::mem::take(&mut *self.updates.lock());
        Ok(stream::iter(updates).boxed())
    }
}

/// The default overflow behaviour, counting its invocations.
#[derive(Debug, Default)]
pub struct CountingOverflow {
    inner: TempFileOverflow,
    calls: AtomicUsize,
}

impl CountingOverflow {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl OverflowHook for CountingOverflow {
    async fn on_overflow(&self, text: &str) -> Result<Replacement> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.on_overflow(text).await
    }
}

pub fn user() -> User {
    User::new(1, "Ada").with_language("en_US")
}

pub fn services_with(
    client: BoxedClient,
    settings: BotSettings,
    language: Option<LanguageTable>,
) -> Services {
    Services::new(
        client,
        Arc::new(settings),
        language.map(Arc::new),
        Arc::new(CountingOverflow::default()),
    )
}

/// A context for a text update from [`user`] in a fresh session.
pub fn context(text: &str) -> Context {
    let services = services_with(
        Arc::new(RecordingClient::new()),
        BotSettings::default(),
        None,
    );
    let session = Session::new(ChatId(1), 10);
    let update = Update::text(user(), 1, text);
    let init = update.message().cloned();
    Context::new(
        update,
        text.to_string(),
        init,
        session.state().clone(),
        Arc::new(services),
    )
}
