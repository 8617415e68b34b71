//! Session registry: one worker task per chat.
//!
//! Every chat gets its own queue and a worker that owns the chat's
//! [`Session`](parley_framework::Session). Updates of one chat are handled
//! strictly in arrival order, while different chats run concurrently. A
//! worker that stays idle for longer than the idle timeout closes its
//! session; the next update of the chat opens a fresh one.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, trace};

use parley_core::{ChatId, Update};
use parley_framework::{DispatchService, Dispatcher, Inbound, Session, dispatch};

struct Worker {
    queue: mpsc::UnboundedSender<Update>,
    generation: u64,
}

type Workers = Arc<Mutex<HashMap<ChatId, Worker>>>;

/// Routes updates to per-chat workers.
pub struct SessionRegistry {
    dispatcher: Dispatcher,
    service: DispatchService,
    workers: Workers,
    tracker: TaskTracker,
    submitted: AtomicU64,
    generations: AtomicU64,
    idle_timeout: Option<Duration>,
}

impl SessionRegistry {
    pub fn new(dispatcher: Dispatcher) -> Self {
        let service = dispatcher.service();
        Self {
            dispatcher,
            service,
            workers: Arc::new(Mutex::new(HashMap::new())),
            tracker: TaskTracker::new(),
            submitted: AtomicU64::new(0),
            generations: AtomicU64::new(0),
            idle_timeout: None,
        }
    }

    /// Closes sessions that received no update for `timeout` (builder
    /// pattern).
    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = Some(timeout);
        self
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Queues `update` behind the earlier updates of its chat.
    ///
    /// Must be called from within a tokio runtime.
    pub fn submit(&self, update: Update) {
        let chat = update.chat;
        self.submitted.fetch_add(1, Ordering::Relaxed);
        let mut workers = self.workers.lock();

        let update = match workers.get(&chat) {
            Some(worker) => match worker.queue.send(update) {
                Ok(()) => return,
                // The worker gave up on this chat; start over with a new one.
                Err(mpsc::error::SendError(update)) => {
                    workers.remove(&chat);
                    update
                }
            },
            None => update,
        };

        let (queue, updates) = mpsc::unbounded_channel();
        let _ = queue.send(update);
        let generation = self.generations.fetch_add(1, Ordering::Relaxed);
        workers.insert(chat, Worker { queue, generation });
        trace!(%chat, generation, "session worker spawned");
        self.tracker.spawn(run_worker(
            WorkerContext {
                dispatcher: self.dispatcher.clone(),
                service: self.service.clone(),
                workers: Arc::clone(&self.workers),
                chat,
                generation,
                idle_timeout: self.idle_timeout,
            },
            updates,
        ));
    }

    /// Number of chats with a worker.
    pub fn len(&self) -> usize {
        self.workers.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> RegistryStats {
        RegistryStats {
            sessions: self.len(),
            submitted: self.submitted.load(Ordering::Relaxed),
        }
    }

    /// Closes every queue and waits until the workers have handled what was
    /// already queued.
    pub async fn shutdown(&self) {
        let queues: Vec<_> = self.workers.lock().drain().collect();
        info!(sessions = queues.len(), "Stopping session workers");
        drop(queues);
        self.tracker.close();
        self.tracker.wait().await;
        debug!("All session workers stopped");
    }
}

impl fmt::Debug for SessionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionRegistry")
            .field("stats", &self.stats())
            .field("idle_timeout", &self.idle_timeout)
            .finish_non_exhaustive()
    }
}

struct WorkerContext {
    dispatcher: Dispatcher,
    service: DispatchService,
    workers: Workers,
    chat: ChatId,
    generation: u64,
    idle_timeout: Option<Duration>,
}

impl WorkerContext {
    async fn handle(&self, session: &Arc<tokio::sync::Mutex<Session>>, update: Update) {
        let inbound = Inbound {
            session: Arc::clone(session),
            update,
        };
        if let Err(e) = dispatch(self.service.clone(), inbound).await {
            error!(chat = %self.chat, error = %e, "Failed to handle update");
        }
    }

    /// Removes this worker from the registry unless a newer one replaced it.
    fn detach(&self) {
        let mut workers = self.workers.lock();
        if workers
            .get(&self.chat)
            .is_some_and(|worker| worker.generation == self.generation)
        {
            workers.remove(&self.chat);
        }
    }

    async fn next(&self, updates: &mut mpsc::UnboundedReceiver<Update>) -> Option<Update> {
        match self.idle_timeout {
            Some(timeout) => tokio::time::timeout(timeout, updates.recv())
                .await
                .ok()
                .flatten(),
            None => updates.recv().await,
        }
    }
}

async fn run_worker(worker: WorkerContext, mut updates: mpsc::UnboundedReceiver<Update>) {
    let chat = worker.chat;
    let session = match worker.dispatcher.open_session(chat).await {
        Ok(session) => Arc::new(tokio::sync::Mutex::new(session)),
        Err(e) => {
            error!(%chat, error = %e, "Failed to open session");
            return;
        }
    };

    while let Some(update) = worker.next(&mut updates).await {
        worker.handle(&session, update).await;
    }

    // Idle or shut down. Updates queued before detaching are still handled.
    worker.detach();
    updates.close();
    while let Some(update) = updates.recv().await {
        worker.handle(&session, update).await;
    }
    info!(%chat, "session closed");
}

/// A snapshot of the registry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegistryStats {
    /// Chats with a live worker.
    pub sessions: usize,
    /// Updates submitted since startup.
    pub submitted: u64,
}

impl fmt::Display for RegistryStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Sessions: {}, updates submitted: {}",
            self.sessions, self.submitted
        )
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use parley_core::{MemoryStore, SessionStore, User};
    use parley_framework::{BotSettings, Context, Router, Text};

    use super::*;
    use crate::testing::ChannelClient;

    fn visit(ctx: Context) -> parley_framework::Result<String> {
        let visits = ctx.get::<u64>("visits")?.unwrap_or(0) + 1;
        ctx.set("visits", visits)?;
        Ok(format!("visit {visits}"))
    }

    fn text(chat: i64, body: &str) -> Update {
        Update::text(User::new(chat, "Ada"), 1, body)
    }

    #[tokio::test]
    async fn updates_of_one_chat_are_handled_in_order() {
        let client = Arc::new(ChannelClient::new());
        let router = Router::new().default_handler(|Text(body): Text| async move {
            // Later updates finish faster; order must still hold.
            let delay: u64 = body.parse().unwrap_or(0);
            tokio::time::sleep(Duration::from_millis(delay)).await;
            body
        });
        let dispatcher = Dispatcher::builder(client.clone()).router(router).build();
        let registry = SessionRegistry::new(dispatcher);

        for delay in ["30", "20", "10", "0"] {
            registry.submit(text(1, delay));
        }
        registry.shutdown().await;

        assert_eq!(client.sent_to(ChatId(1)), vec!["30", "20", "10", "0"]);
    }

    #[tokio::test]
    async fn chats_get_separate_sessions() {
        let client = Arc::new(ChannelClient::new());
        let store = Arc::new(MemoryStore::new());
        let router = Router::new().exact("visit", visit);
        let dispatcher = Dispatcher::builder(client.clone())
            .router(router)
            .store(store.clone())
            .build();
        let registry = SessionRegistry::new(dispatcher);

        registry.submit(text(1, "visit"));
        registry.submit(text(2, "visit"));
        registry.submit(text(1, "visit"));
        assert_eq!(registry.len(), 2);
        registry.shutdown().await;

        assert_eq!(client.sent_to(ChatId(1)), vec!["visit 1", "visit 2"]);
        assert_eq!(client.sent_to(ChatId(2)), vec!["visit 1"]);
        let blob = store.load(ChatId(1)).await.unwrap();
        assert_eq!(blob.get("visits"), Some(&serde_json::Value::from(2)));
        assert_eq!(registry.stats().submitted, 3);
    }

    #[tokio::test]
    async fn allow_list_applies_to_submitted_updates() {
        let client = Arc::new(ChannelClient::new());
        let settings = BotSettings {
            allowed_ids: Some(vec![1]),
            ..BotSettings::default()
        };
        let router = Router::new().default_handler(|| "hello");
        let dispatcher = Dispatcher::builder(client.clone())
            .settings(settings)
            .router(router)
            .build();
        let registry = SessionRegistry::new(dispatcher);

        registry.submit(text(1, "hi"));
        registry.submit(text(2, "hi"));
        registry.shutdown().await;

        assert_eq!(client.sent(), vec![(ChatId(1), "hello".to_string())]);
    }

    #[tokio::test(start_paused = true)]
    async fn idle_sessions_are_closed_and_reopened() {
        let client = Arc::new(ChannelClient::new());
        let router = Router::new().exact("visit", visit);
        let dispatcher = Dispatcher::builder(client.clone()).router(router).build();
        let registry =
            SessionRegistry::new(dispatcher).idle_timeout(Duration::from_secs(60));

        registry.submit(text(1, "visit"));
        registry.submit(text(1, "visit"));
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(registry.len(), 1);

        tokio::time::sleep(Duration::from_secs(61)).await;
        assert!(registry.is_empty());

        registry.submit(text(1, "visit"));
        registry.shutdown().await;
        assert_eq!(
            client.sent_to(ChatId(1)),
            vec!["visit 1", "visit 2", "visit 1"]
        );
    }

    #[test]
    fn stats_display() {
        let stats = RegistryStats {
            sessions: 2,
            submitted: 5,
        };
        assert_eq!(stats.to_string(), "Sessions: 2, updates submitted: 5");
    }
}
