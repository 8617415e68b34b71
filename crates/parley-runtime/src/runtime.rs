//! The runtime loop.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use parley_runtime::ParleyRuntime;
//!
//! let runtime = ParleyRuntime::builder(client)
//!     .router(router)
//!     .build()?;
//! runtime.run().await?;
//! ```
//!
//! `build` loads `config/config.toml` (see [`ConfigLoader`]), installs the
//! tracing subscriber, loads the language file when a language feature is
//! enabled and opens the session store. `run` then consumes the client's
//! update stream until Ctrl+C or SIGTERM.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures::stream::{BoxStream, Stream, StreamExt};
use tokio::signal;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use parley_core::{BoxedClient, BoxedStore, StorageResult, Update};
use parley_framework::{
    Answer, Dispatcher, DispatcherBuilder, LanguageTable, OverflowHook, Router,
};

use crate::config::{ConfigLoader, ParleyConfig, load_language_file, validate_config};
use crate::error::RuntimeResult;
use crate::logging;
use crate::registry::SessionRegistry;
use crate::storage::JsonFileStore;

const DEFAULT_LANGUAGE_FILE: &str = "config/lang.toml";

type TerminationHook = Box<dyn FnOnce() + Send>;
type StoreFactory = Box<dyn FnOnce(&[String]) -> StorageResult<BoxedStore> + Send>;

/// A configured bot, ready to run.
///
/// # Custom Configuration
///
/// ```rust,ignore
/// let runtime = ParleyRuntime::builder(client)
///     .config_file("config/production.toml")
///     .language_file("config/lang.toml")
///     .router(router)
///     .on_startup(futures::stream::iter([Answer::new("I am back").to(ADMIN)]))
///     .on_termination(|| println!("bye"))
///     .build()?;
/// ```
pub struct ParleyRuntime {
    config: ParleyConfig,
    registry: Arc<SessionRegistry>,
    startup: Option<BoxStream<'static, Answer>>,
    on_termination: Option<TerminationHook>,
}

impl ParleyRuntime {
    pub fn builder(client: BoxedClient) -> RuntimeBuilder {
        RuntimeBuilder::new(client)
    }

    pub fn config(&self) -> &ParleyConfig {
        &self.config
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        self.registry.dispatcher()
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    /// Runs until Ctrl+C or SIGTERM, or until the update stream ends.
    pub async fn run(self) -> RuntimeResult<()> {
        info!("Parley runtime is now running. Press Ctrl+C to stop.");
        self.run_until(shutdown_signal()).await
    }

    /// Runs until `shutdown` completes, or until the update stream ends.
    ///
    /// The termination hook only runs when `shutdown` fired. Updates that
    /// were already queued are handled before this returns.
    pub async fn run_until<F>(self, shutdown: F) -> RuntimeResult<()>
    where
        F: Future<Output = ()>,
    {
        let Self {
            registry,
            startup,
            on_termination,
            ..
        } = self;

        let mut updates = registry.dispatcher().client().updates().await?;
        info!("Runtime started");

        let startup = startup.map(|answers| {
            tokio::spawn(deliver_startup(registry.dispatcher().clone(), answers))
        });

        tokio::pin!(shutdown);
        let terminated = loop {
            tokio::select! {
                () = &mut shutdown => break true,
                next = updates.next() => match next {
                    Some(update) => submit(&registry, update),
                    None => {
                        info!("Update stream ended");
                        break false;
                    }
                },
            }
        };

        if terminated && let Some(hook) = on_termination {
            debug!("Running termination hook");
            hook();
        }
        stop_startup(startup);

        info!(stats = %registry.stats(), "Stopping runtime");
        registry.shutdown().await;
        info!("Runtime stopped");
        Ok(())
    }
}

impl std::fmt::Debug for ParleyRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParleyRuntime")
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}

fn submit(registry: &SessionRegistry, update: Update) {
    debug!(chat = %update.chat, kind = update.kind_name(), "Update received");
    registry.submit(update);
}

async fn deliver_startup(dispatcher: Dispatcher, mut answers: BoxStream<'static, Answer>) {
    let mut delivered = 0usize;
    while let Some(answer) = answers.next().await {
        match dispatcher.deliver(vec![answer]).await {
            Ok(()) => delivered += 1,
            Err(e) => warn!(error = %e, "Failed to deliver startup answer"),
        }
    }
    debug!(delivered, "Startup answers drained");
}

fn stop_startup(task: Option<JoinHandle<()>>) {
    if let Some(task) = task
        && !task.is_finished()
    {
        debug!("Abandoning pending startup answers");
        task.abort();
    }
}

/// Waits for Ctrl+C or, on unix, SIGTERM.
pub async fn shutdown_signal() {
    #[cfg(unix)]
    {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    () = ctrl_c() => {}
                    _ = sigterm.recv() => {
                        info!("Received SIGTERM, shutting down");
                    }
                }
            }
            Err(e) => {
                warn!(error = %e, "Failed to register SIGTERM handler");
                ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    ctrl_c().await;
}

async fn ctrl_c() {
    match signal::ctrl_c().await {
        Ok(()) => info!("Received Ctrl+C, shutting down"),
        Err(e) => {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    }
}

// =============================================================================
// RuntimeBuilder
// =============================================================================

/// Builder for a [`ParleyRuntime`].
pub struct RuntimeBuilder {
    loader: ConfigLoader,
    config: Option<ParleyConfig>,
    dispatcher: DispatcherBuilder,
    custom_store: bool,
    store_factory: Option<StoreFactory>,
    language: Option<LanguageTable>,
    language_file: PathBuf,
    startup: Option<BoxStream<'static, Answer>>,
    on_termination: Option<TerminationHook>,
}

impl RuntimeBuilder {
    pub fn new(client: BoxedClient) -> Self {
        Self {
            loader: ConfigLoader::new(),
            config: None,
            dispatcher: Dispatcher::builder(client),
            custom_store: false,
            store_factory: None,
            language: None,
            language_file: PathBuf::from(DEFAULT_LANGUAGE_FILE),
            startup: None,
            on_termination: None,
        }
    }

    /// Uses `config` instead of loading one. It is still validated.
    pub fn config(mut self, config: ParleyConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Sets a specific configuration file to load.
    pub fn config_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.loader = self.loader.file(path);
        self
    }

    /// Sets the configuration profile (e.g. "development", "production").
    pub fn profile(mut self, profile: impl Into<String>) -> Self {
        self.loader = self.loader.profile(profile);
        self
    }

    pub fn search_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.loader = self.loader.search_path(path);
        self
    }

    /// Disables `PARLEY_*` environment overrides.
    pub fn without_env(mut self) -> Self {
        self.loader = self.loader.without_env();
        self
    }

    pub fn router(mut self, router: Router) -> Self {
        self.dispatcher = self.dispatcher.router(router);
        self
    }

    /// Uses `table` instead of reading the language file.
    pub fn language(mut self, table: LanguageTable) -> Self {
        self.language = Some(table);
        self
    }

    /// The language file read when a language feature is enabled.
    /// Defaults to `config/lang.toml`.
    pub fn language_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.language_file = path.as_ref().to_path_buf();
        self
    }

    /// Replaces the default handling of over-long messages.
    pub fn overflow<O: OverflowHook>(mut self, hook: O) -> Self {
        self.dispatcher = self.dispatcher.overflow(hook);
        self
    }

    /// Uses `store` for session storage, whatever `persistent_storage` says.
    pub fn store(mut self, store: BoxedStore) -> Self {
        self.dispatcher = self.dispatcher.store(store);
        self.custom_store = true;
        self
    }

    /// Creates the store used when `persistent_storage` is enabled, in place
    /// of the JSON file store. `factory` receives `general.storage_args`
    /// split on whitespace.
    pub fn store_factory<F>(mut self, factory: F) -> Self
    where
        F: FnOnce(&[String]) -> StorageResult<BoxedStore> + Send + 'static,
    {
        self.store_factory = Some(Box::new(factory));
        self
    }

    /// Drops plain messages for which `predicate` returns `false`.
    pub fn before_processing<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&Update) -> bool + Send + Sync + 'static,
    {
        self.dispatcher = self.dispatcher.before_processing(predicate);
        self
    }

    /// Answers sent once the runtime is up. Each needs a receiver.
    pub fn on_startup<S>(mut self, answers: S) -> Self
    where
        S: Stream<Item = Answer> + Send + 'static,
    {
        self.startup = Some(answers.boxed());
        self
    }

    /// Called once when a shutdown signal arrives.
    pub fn on_termination<F>(mut self, hook: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        self.on_termination = Some(Box::new(hook));
        self
    }

    /// Loads the configuration and the language file, sets up logging and
    /// storage, and builds the runtime.
    pub fn build(self) -> RuntimeResult<ParleyRuntime> {
        let config = match self.config {
            Some(config) => {
                validate_config(&config)?;
                config
            }
            None => self.loader.load()?,
        };

        logging::init_from_config(&config.effective_logging());

        let mut dispatcher = self.dispatcher.settings(config.settings());

        let language = match self.language {
            Some(table) => Some(table),
            None if config.needs_language() => Some(load_language_file(&self.language_file)?),
            None => None,
        };
        if let Some(table) = language {
            dispatcher = dispatcher.language(table);
        }

        if !self.custom_store && config.general.persistent_storage {
            let store: BoxedStore = match self.store_factory {
                Some(factory) => {
                    let args = config.general.storage_args();
                    info!(?args, "Using custom persistent storage");
                    factory(&args)?
                }
                None => {
                    let store = JsonFileStore::new(&config.general.storage_file);
                    info!(path = %store.path().display(), "Using persistent storage");
                    Arc::new(store)
                }
            };
            dispatcher = dispatcher.store(store);
        }

        let registry = SessionRegistry::new(dispatcher.build())
            .idle_timeout(config.bot.timeout());
        let registry = Arc::new(registry);

        info!(
            log_level = %config.general.logging,
            persistent_storage = config.general.persistent_storage,
            "Runtime initialized from configuration"
        );

        Ok(ParleyRuntime {
            config,
            registry,
            startup: self.startup,
            on_termination: self.on_termination,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    use futures::stream;
    use parley_core::{ChatId, MemoryStore, SessionStore, StorageError, User};
    use parley_framework::{Context, Result};

    use super::*;
    use crate::config::ConfigError;
    use crate::error::RuntimeError;
    use crate::testing::ChannelClient;

    fn config() -> ParleyConfig {
        let mut config = ParleyConfig::default();
        config.bot.token = "123:abc".into();
        config
    }

    fn text(chat: i64, body: &str) -> Update {
        Update::text(User::new(chat, "Ada"), 1, body)
    }

    async fn sent_eventually(client: &ChannelClient, expected: usize) {
        while client.sent().len() < expected {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    #[tokio::test]
    async fn handles_updates_until_the_stream_ends() {
        let client = Arc::new(ChannelClient::new());
        let router = Router::new().exact("ping", || "pong");
        let runtime = ParleyRuntime::builder(client.clone())
            .config(config())
            .router(router)
            .build()
            .unwrap();

        client.push(text(1, "ping"));
        client.push(text(2, "ping"));
        client.close();
        tokio_test::assert_ok!(runtime.run_until(std::future::pending()).await);

        assert_eq!(client.sent_to(ChatId(1)), vec!["pong"]);
        assert_eq!(client.sent_to(ChatId(2)), vec!["pong"]);
    }

    #[tokio::test]
    async fn startup_answers_and_termination_hook() {
        let client = Arc::new(ChannelClient::new());
        let terminated = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&terminated);
        let runtime = ParleyRuntime::builder(client.clone())
            .config(config())
            .on_startup(stream::iter([
                Answer::new("online").to(ChatId(7)),
                Answer::new("nobody"),
            ]))
            .on_termination(move || flag.store(true, Ordering::SeqCst))
            .build()
            .unwrap();

        runtime
            .run_until(sent_eventually(&client, 1))
            .await
            .unwrap();

        assert_eq!(client.sent(), vec![(ChatId(7), "online".to_string())]);
        assert!(terminated.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn stream_end_skips_the_termination_hook() {
        let client = Arc::new(ChannelClient::new());
        let terminated = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&terminated);
        let runtime = ParleyRuntime::builder(client.clone())
            .config(config())
            .on_termination(move || flag.store(true, Ordering::SeqCst))
            .build()
            .unwrap();

        client.close();
        tokio_test::assert_ok!(runtime.run_until(std::future::pending()).await);
        assert!(!terminated.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn missing_language_file_is_a_configuration_error() {
        let mut config = config();
        config.bot.language_feature = true;
        let err = ParleyRuntime::builder(Arc::new(ChannelClient::new()))
            .config(config)
            .language_file("/no/such/lang.toml")
            .build()
            .unwrap_err();

        assert!(matches!(
            err,
            RuntimeError::Config(ConfigError::FileNotFound(_))
        ));
        assert_eq!(err.exit_code(), 2);
    }

    #[tokio::test]
    async fn explicit_configuration_is_validated() {
        let err = ParleyRuntime::builder(Arc::new(ChannelClient::new()))
            .config(ParleyConfig::default())
            .build()
            .unwrap_err();
        assert!(matches!(
            err,
            RuntimeError::Config(ConfigError::MissingField { .. })
        ));
    }

    #[tokio::test]
    async fn store_factory_receives_the_storage_args() {
        let mut config = config();
        config.general.persistent_storage = true;
        config.general.storage_args = Some("sqlite  bot.db".into());

        let store = Arc::new(MemoryStore::new());
        let seen_args = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let client = Arc::new(ChannelClient::new());
        let router = Router::new().exact("remember", |ctx: Context| -> Result<&'static str> {
            ctx.set("seen", true)?;
            Ok("noted")
        });
        let runtime = ParleyRuntime::builder(client.clone())
            .config(config)
            .router(router)
            .store_factory({
                let store = store.clone();
                let seen_args = seen_args.clone();
                move |args: &[String]| -> StorageResult<BoxedStore> {
                    seen_args.lock().extend_from_slice(args);
                    Ok(store as BoxedStore)
                }
            })
            .build()
            .unwrap();
        assert_eq!(*seen_args.lock(), vec!["sqlite", "bot.db"]);

        client.push(text(5, "remember"));
        client.close();
        runtime.run_until(std::future::pending()).await.unwrap();
        let blob = store.load(ChatId(5)).await.unwrap();
        assert_eq!(blob.get("seen"), Some(&serde_json::Value::Bool(true)));
    }

    #[test]
    fn failing_store_factory_stops_the_build() {
        let mut config = config();
        config.general.persistent_storage = true;
        let err = ParleyRuntime::builder(Arc::new(ChannelClient::new()))
            .config(config)
            .store_factory(|_: &[String]| -> StorageResult<BoxedStore> {
                Err(StorageError::Backend("unreachable database".into()))
            })
            .build()
            .unwrap_err();
        assert!(matches!(err, RuntimeError::Storage(_)));
        assert_eq!(err.exit_code(), 1);
    }

    #[tokio::test]
    async fn persistent_storage_writes_the_storage_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("db.json");
        let mut config = config();
        config.general.persistent_storage = true;
        config.general.storage_file = path.clone();

        let client = Arc::new(ChannelClient::new());
        let router = Router::new().exact("remember", |ctx: Context| -> Result<&'static str> {
            ctx.set("seen", true)?;
            Ok("noted")
        });
        let runtime = ParleyRuntime::builder(client.clone())
            .config(config)
            .router(router)
            .build()
            .unwrap();

        client.push(text(5, "remember"));
        client.close();
        runtime.run_until(std::future::pending()).await.unwrap();

        let raw: serde_json::Value =
            serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(raw["5"]["seen"], serde_json::Value::Bool(true));
        assert_eq!(client.sent_to(ChatId(5)), vec!["noted"]);
    }

    #[tokio::test]
    async fn updates_stream_can_only_be_opened_once() {
        let client = Arc::new(ChannelClient::new());
        client.close();
        let build = || {
            ParleyRuntime::builder(client.clone())
                .config(config())
                .build()
                .unwrap()
        };
        build().run_until(std::future::pending()).await.unwrap();

        let err = build()
            .run_until(std::future::pending())
            .await
            .unwrap_err();
        assert!(matches!(err, RuntimeError::Transport(_)));
        assert_eq!(err.exit_code(), 1);
    }
}
