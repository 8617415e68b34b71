//! A channel-fed platform client for the runtime tests.

use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use futures::StreamExt;
use futures::stream::{self, BoxStream};
use parking_lot::Mutex;
use tokio::sync::mpsc;

use parley_core::{
    ChatId, MessageId, OutboundContent, PlatformClient, SendOptions, SentMessage, TransportError,
    TransportResult, Update,
};

/// Feeds updates pushed through [`ChannelClient::push`] into the update
/// stream and records every sent text.
#[derive(Debug)]
pub struct ChannelClient {
    next_id: AtomicI64,
    sender: Mutex<Option<mpsc::UnboundedSender<Update>>>,
    receiver: Mutex<Option<mpsc::UnboundedReceiver<Update>>>,
    sent: Mutex<Vec<(ChatId, String)>>,
}

impl ChannelClient {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            next_id: AtomicI64::new(1),
            sender: Mutex::new(Some(tx)),
            receiver: Mutex::new(Some(rx)),
            sent: Mutex::new(Vec::new()),
        }
    }

    pub fn push(&self, update: Update) {
        if let Some(tx) = self.sender.lock().as_ref() {
            let _ = tx.send(update);
        }
    }

    /// Ends the update stream once the queued updates are consumed.
    pub fn close(&self) {
        self.sender.lock().take();
    }

    pub fn sent(&self) -> Vec<(ChatId, String)> {
        self.sent.lock().clone()
    }

    pub fn sent_to(&self, chat: ChatId) -> Vec<String> {
        self.sent
            .lock()
            .iter()
            .filter(|(to, _)| *to == chat)
            .map(|(_, text)| text.clone())
            .collect()
    }
}

#[async_trait]
impl PlatformClient for ChannelClient {
    async fn send(
        &self,
        recipient: ChatId,
        content: OutboundContent,
        _options: SendOptions,
    ) -> TransportResult<SentMessage> {
        let text = content.text().unwrap_or_default().to_string();
        self.sent.lock().push((recipient, text.clone()));
        Ok(SentMessage {
            id: MessageId(self.next_id.fetch_add(1, Ordering::SeqCst)),
            chat: recipient,
            date: 0,
            text: Some(text),
        })
    }

    async fn edit(
        &self,
        recipient: ChatId,
        message_id: MessageId,
        text: String,
        _options: SendOptions,
    ) -> TransportResult<SentMessage> {
        Ok(SentMessage {
            id: message_id,
            chat: recipient,
            date: 0,
            text: Some(text),
        })
    }

    async fn ack_callback(&self, _callback_id: &str) -> TransportResult<()> {
        Ok(())
    }

    async fn updates(&self) -> TransportResult<BoxStream<'static, Update>> {
        let receiver = self
            .receiver
            .lock()
            .take()
            .ok_or(TransportError::NotConnected)?;
        Ok(stream::unfold(receiver, |mut receiver| async move {
            receiver.recv().await.map(|update| (update, receiver))
        })
        .boxed())
    }
}
