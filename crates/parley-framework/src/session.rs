//! Per-user session state.
//!
//! A [`Session`] lives for as long as the process does and is only ever
//! touched by one update at a time. The parts that delayed answers must be
//! able to update after the handling update finished live in the shared
//! [`SessionState`]; the running conversation is owned by the [`Session`]
//! itself.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use parley_core::{ChatId, Message, SentMessage, SessionStore, StorageBlob, StorageError};

use crate::answer::Answer;
use crate::callback::CallbackCorrelator;
use crate::conversation::ConversationHandle;
use crate::error::Result;
use crate::handler::BoxedHandler;

/// The shared, internally synchronised part of a session.
pub struct SessionState {
    chat: ChatId,
    storage: Mutex<StorageBlob>,
    history: Mutex<VecDeque<SentMessage>>,
    capacity: usize,
    queries: CallbackCorrelator,
    pending: Mutex<Option<BoxedHandler>>,
    last_sent: Mutex<Option<(Answer, SentMessage)>>,
}

impl SessionState {
    fn new(chat: ChatId, storage: StorageBlob, capacity: usize) -> Self {
        Self {
            chat,
            storage: Mutex::new(storage),
            history: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity: capacity.max(1),
            queries: CallbackCorrelator::with_capacity(capacity),
            pending: Mutex::new(None),
            last_sent: Mutex::new(None),
        }
    }

    pub fn chat(&self) -> ChatId {
        self.chat
    }

    // ─── Storage ───

    /// Reads and deserialises the value stored under `key`.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        let storage = self.storage.lock();
        match storage.get(key) {
            Some(value) => serde_json::from_value(value.clone())
                .map(Some)
                .map_err(|e| StorageError::from(e).into()),
            None => Ok(None),
        }
    }

    /// Serialises and stores `value` under `key`.
    pub fn set<T: Serialize>(&self, key: impl Into<String>, value: T) -> Result<()> {
        let value = serde_json::to_value(value).map_err(StorageError::from)?;
        self.storage.lock().insert(key.into(), value);
        Ok(())
    }

    /// Removes `key`, returning `true` if it was present.
    pub fn remove(&self, key: &str) -> bool {
        self.storage.lock().remove(key).is_some()
    }

    /// A copy of the whole storage blob.
    pub fn storage(&self) -> StorageBlob {
        self.storage.lock().clone()
    }

    // ─── History ───

    /// Records a sent message, evicting the oldest beyond capacity.
    pub fn push_history(&self, sent: SentMessage) {
        let mut history = self.history.lock();
        history.push_front(sent);
        history.truncate(self.capacity);
    }

    /// Recently sent messages, newest first.
    pub fn history(&self) -> Vec<SentMessage> {
        self.history.lock().iter().cloned().collect()
    }

    // ─── Callbacks ───

    pub fn queries(&self) -> &CallbackCorrelator {
        &self.queries
    }

    /// Binds the handler that receives the next plain message.
    pub fn set_pending(&self, handler: BoxedHandler) {
        *self.pending.lock() = Some(handler);
    }

    /// Removes and returns the pending plain-message handler.
    pub fn take_pending(&self) -> Option<BoxedHandler> {
        self.pending.lock().take()
    }

    pub fn has_pending(&self) -> bool {
        self.pending.lock().is_some()
    }

    pub fn clear_pending(&self) {
        self.pending.lock().take();
    }

    // ─── Last sent ───

    pub fn set_last_sent(&self, answer: Answer, sent: SentMessage) {
        *self.last_sent.lock() = Some((answer, sent));
    }

    /// The last answer together with the message it produced.
    pub fn last_sent(&self) -> Option<(Answer, SentMessage)> {
        self.last_sent.lock().clone()
    }
}

impl std::fmt::Debug for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionState")
            .field("chat", &self.chat)
            .field("history", &self.history.lock().len())
            .field("queries", &self.queries.len())
            .field("pending", &self.has_pending())
            .finish()
    }
}

/// The state of one user's dialogue with the bot.
#[derive(Debug)]
pub struct Session {
    state: Arc<SessionState>,
    pub(crate) conversation: Option<ConversationHandle>,
    /// The message that started the current exchange.
    pub(crate) init_message: Option<Message>,
}

impl Session {
    /// Creates a session with an empty transient storage blob.
    pub fn new(chat: ChatId, max_history_entries: usize) -> Self {
        Self::with_storage(chat, StorageBlob::new(), max_history_entries)
    }

    /// Creates a session around an existing storage blob.
    pub fn with_storage(chat: ChatId, storage: StorageBlob, max_history_entries: usize) -> Self {
        Self {
            state: Arc::new(SessionState::new(chat, storage, max_history_entries)),
            conversation: None,
            init_message: None,
        }
    }

    /// Creates a session, loading its storage blob from `store`.
    pub async fn load(
        chat: ChatId,
        store: &dyn SessionStore,
        max_history_entries: usize,
    ) -> Result<Self> {
        let storage = store.load(chat).await?;
        debug!(%chat, keys = storage.len(), "loaded session storage");
        Ok(Self::with_storage(chat, storage, max_history_entries))
    }

    pub fn chat(&self) -> ChatId {
        self.state.chat
    }

    pub fn state(&self) -> &Arc<SessionState> {
        &self.state
    }

    /// Returns `true` while a conversation waits for input.
    pub fn is_conversing(&self) -> bool {
        self.conversation.is_some()
    }

    /// Drops the running conversation, returning `true` if there was one.
    ///
    /// The conversation sees the cancellation as an error from its pending
    /// `ask`.
    pub fn cancel_conversation(&mut self) -> bool {
        self.conversation.take().is_some()
    }

    /// Writes the storage blob back to `store`.
    pub async fn flush(&self, store: &dyn SessionStore) -> Result<()> {
        let blob = self.state.storage();
        store.save(self.chat(), &blob).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use parley_core::{MemoryStore, MessageId};

    use super::*;

    fn sent(id: i64) -> SentMessage {
        SentMessage {
            id: MessageId(id),
            chat: ChatId(1),
            date: 0,
            text: None,
        }
    }

    #[test]
    fn history_is_bounded_and_newest_first() {
        let session = Session::new(ChatId(1), 3);
        for id in 1..=5 {
            session.state().push_history(sent(id));
        }
        let ids: Vec<i64> = session.state().history().iter().map(|m| m.id.0).collect();
        assert_eq!(ids, vec![5, 4, 3]);
    }

    #[test]
    fn storage_round_trips_typed_values() {
        let session = Session::new(ChatId(1), 10);
        let state = session.state();
        state.set("visits", 3u32).unwrap();
        assert_eq!(state.get::<u32>("visits").unwrap(), Some(3));
        assert_eq!(state.get::<u32>("missing").unwrap(), None);
        assert!(state.get::<String>("visits").is_err());
        assert!(state.remove("visits"));
        assert!(!state.remove("visits"));
    }

    #[test]
    fn pending_callback_is_taken_once() {
        let session = Session::new(ChatId(1), 10);
        session.state().set_pending(BoxedHandler::new(|| "next"));
        assert!(session.state().take_pending().is_some());
        assert!(session.state().take_pending().is_none());
    }

    #[tokio::test]
    async fn load_and_flush_go_through_the_store() {
        let store = MemoryStore::new();
        let session = Session::load(ChatId(9), &store, 10).await.unwrap();
        session.state().set("name", "Ada").unwrap();
        session.flush(&store).await.unwrap();

        let reloaded = Session::load(ChatId(9), &store, 10).await.unwrap();
        assert_eq!(
            reloaded.state().get::<String>("name").unwrap().as_deref(),
            Some("Ada")
        );
    }
}
