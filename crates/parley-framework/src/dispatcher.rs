//! The update dispatcher.
//!
//! The [`Dispatcher`] decides, for every inbound update of a session, what
//! handles it:
//!
//! 1. the cancel command stops a running conversation (and then routes
//!    normally);
//! 2. a running conversation is resumed with the message;
//! 3. the session's pending plain-message callback runs once;
//! 4. the route table is consulted, followed by implicit routing and the
//!    default handler.
//!
//! Callback queries go through the session's callback correlator instead,
//! and stickers are either re-dispatched as their emoji or handed to the
//! sticker handler.
//!
//! Every handler failure is contained here: it is logged and answered with
//! the configured error (or authorization) reply. Only a failure to flush
//! the session storage is reported to the caller.
//!
//! ```rust,ignore
//! let router = Router::new()
//!     .exact("Hello", || "Hi!")
//!     .pattern("{a:d}x{b:d}", multiply)?;
//!
//! let dispatcher = Dispatcher::builder(client)
//!     .settings(settings)
//!     .routes(router.build())
//!     .build();
//!
//! let mut session = dispatcher.open_session(chat).await?;
//! dispatcher.handle_update(&mut session, update).await?;
//! ```

use std::fmt;
use std::sync::Arc;
use std::task::Poll;

use futures::FutureExt;
use futures::future::BoxFuture;
use tower::filter::Predicate;
use tower::util::BoxCloneSyncService;
use tower::{BoxError, Service, ServiceBuilder, ServiceExt};
use tracing::{Instrument, Level, debug, info, span, trace, warn};

use parley_core::{
    BoxedClient, BoxedStore, CallbackQuery, ChatId, SendOptions, Update, UpdateKind,
};

use crate::answer::{Answer, Reply};
use crate::context::Context;
use crate::conversation::{ConversationHandle, Step};
use crate::error::{Error, Result, UpdateSkipped};
use crate::handler::BoxedHandler;
use crate::language::LanguageTable;
use crate::overflow::{OverflowHook, TempFileOverflow};
use crate::render::Origin;
use crate::resolver::{Services, Target, deliver};
use crate::routing::{RouteTable, Router};
use crate::session::Session;
use crate::settings::BotSettings;

struct Inner {
    services: Arc<Services>,
    routes: RouteTable,
    store: Option<BoxedStore>,
    before_processing: Option<UpdateFilter>,
}

/// Routes updates to handlers and delivers what they return.
///
/// Cloning is cheap; all clones share the same routes and collaborators.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<Inner>,
}

impl Dispatcher {
    pub fn builder(client: BoxedClient) -> DispatcherBuilder {
        DispatcherBuilder::new(client)
    }

    pub fn settings(&self) -> &BotSettings {
        &self.inner.services.settings
    }

    pub fn routes(&self) -> &RouteTable {
        &self.inner.routes
    }

    pub fn client(&self) -> &BoxedClient {
        &self.inner.services.client
    }

    /// Creates the session for `chat`, loading its storage when a store is
    /// configured.
    pub async fn open_session(&self, chat: ChatId) -> Result<Session> {
        let max = self.settings().max_history_entries;
        let session = match &self.inner.store {
            Some(store) => Session::load(chat, store.as_ref(), max).await?,
            None => Session::new(chat, max),
        };
        info!(%chat, "user connected");
        Ok(session)
    }

    /// Handles one update of `session`.
    ///
    /// Handler failures never surface here; the returned error only reports
    /// that the session storage could not be written back.
    pub async fn handle_update(&self, session: &mut Session, update: Update) -> Result<()> {
        let span = span!(
            Level::DEBUG,
            "update",
            chat = %update.chat,
            kind = update.kind_name()
        );
        async {
            self.route_update(session, update).await;
            if let Some(store) = &self.inner.store {
                session.flush(store.as_ref()).await?;
            }
            Ok(())
        }
        .instrument(span)
        .await
    }

    /// Delivers answers that belong to no session, such as startup
    /// announcements. Every answer needs an explicit receiver.
    pub async fn deliver(&self, answers: Vec<Answer>) -> Result<()> {
        let target = Target {
            chat: None,
            session: None,
            origin: Origin::default(),
        };
        deliver(&self.inner.services, answers, &target).await
    }

    /// Wraps the dispatcher into a tower service behind the allow-list and
    /// the pre-processing predicate.
    ///
    /// Rejected plain messages fail with [`UpdateSkipped`]; callback queries
    /// always pass.
    pub fn service(&self) -> DispatchService {
        let allow_list = match &self.settings().allowed_ids {
            Some(ids) => UpdateFilter::allow_list(ids.iter().copied()),
            None => UpdateFilter::always(),
        };
        let before = self
            .inner
            .before_processing
            .clone()
            .unwrap_or_else(UpdateFilter::always);
        let service = ServiceBuilder::new()
            .filter(allow_list)
            .filter(before)
            .service(self.clone());
        BoxCloneSyncService::new(service)
    }

    async fn route_update(&self, session: &mut Session, update: Update) {
        match &update.kind {
            UpdateKind::Text(message) => {
                let text = message.text.clone().unwrap_or_default();
                self.handle_text(session, update, text).await;
            }
            UpdateKind::Sticker { sticker, .. } => {
                let emoji = sticker.emoji.clone();
                if self.settings().extract_emojis {
                    self.handle_text(session, update, emoji).await;
                } else if let Some(handler) = self.inner.routes.sticker_handler().cloned() {
                    let ctx = self.context(session, update, emoji);
                    self.run(session, &handler, ctx).await;
                } else {
                    trace!("no sticker handler registered");
                }
            }
            UpdateKind::Callback(query) => {
                let query = query.clone();
                self.handle_callback(session, update, query).await;
            }
            UpdateKind::Other { .. } => trace!("ignoring unsupported update"),
        }
    }

    async fn handle_text(&self, session: &mut Session, update: Update, text: String) {
        let settings = &self.inner.services.settings;
        if text == settings.cancel_command {
            if session.cancel_conversation() {
                info!(chat = %session.chat(), "conversation cancelled");
            }
            session.state().clear_pending();
        }

        if !session.is_conversing() {
            session.init_message = update.message().cloned();
        }
        let ctx = self.context(session, update, text);

        if let Some(handle) = session.conversation.take() {
            if handle.resume(ctx.clone()) {
                trace!("resuming conversation");
                if let Err(e) = self.drive(session, handle, &ctx).await {
                    self.report(&ctx, "conversation", e).await;
                }
                return;
            }
            debug!("conversation ended before it could be resumed");
        }

        if let Some(callback) = session.state().take_pending() {
            trace!(handler = callback.name(), "running pending callback");
            self.run(session, &callback, ctx).await;
            return;
        }

        if let Some(matched) = self.inner.routes.lookup(ctx.text()) {
            let ctx = ctx.with_args(matched.args);
            self.run(session, &matched.handler, ctx).await;
            return;
        }

        if settings.implicit_routing && self.is_language_key(&ctx) {
            trace!(key = ctx.text(), "implicit route matched");
            let reply = Reply::Answers(vec![Answer::localized(ctx.text())]);
            if let Err(e) = self.apply(session, reply, &ctx).await {
                self.report(&ctx, "implicit route", e).await;
            }
            return;
        }

        match self.inner.routes.default_match() {
            Some(matched) => self.run(session, &matched.handler, ctx).await,
            None => debug!(text = ctx.text(), "no route for message"),
        }
    }

    async fn handle_callback(&self, session: &mut Session, update: Update, query: CallbackQuery) {
        let services = &self.inner.services;
        if let Err(e) = services.client.ack_callback(&query.id).await {
            warn!(error = %e, "failed to acknowledge callback query");
        }

        let Some(entry) = session.state().queries().take(query.message_id) else {
            debug!(message = %query.message_id, "stale callback ignored");
            return;
        };

        if services.settings.replace_query {
            let options = SendOptions {
                parse_mode: entry.prompt.markup,
                disable_web_preview: services.settings.disable_web_preview,
                ..SendOptions::default()
            };
            let text = entry.prompt.answered(&query.data);
            if let Err(e) = services
                .client
                .edit(update.chat, query.message_id, text, options)
                .await
            {
                warn!(error = %e, message = %query.message_id, "failed to replace query");
            }
        }

        let ctx = self.context(session, update, query.data);
        if let Some(handler) = entry.handler {
            self.run(session, &handler, ctx).await;
        } else if let Some(handle) = session.conversation.take()
            && handle.resume(ctx.clone())
        {
            if let Err(e) = self.drive(session, handle, &ctx).await {
                self.report(&ctx, "conversation", e).await;
            }
        } else {
            debug!(message = %query.message_id, "callback without handler ignored");
        }
    }

    fn context(&self, session: &Session, update: Update, text: String) -> Context {
        Context::new(
            update,
            text,
            session.init_message.clone(),
            session.state().clone(),
            self.inner.services.clone(),
        )
    }

    fn is_language_key(&self, ctx: &Context) -> bool {
        self.inner
            .services
            .language
            .as_ref()
            .is_some_and(|table| table.lookup(ctx.locale(), ctx.text()).is_some())
    }

    /// Invokes `handler` and applies its reply, reporting any failure.
    async fn run(&self, session: &mut Session, handler: &BoxedHandler, ctx: Context) {
        let result = match handler.invoke(ctx.clone()).await {
            Ok(reply) => self.apply(session, reply, &ctx).await,
            Err(e) => Err(e),
        };
        if let Err(e) = result {
            self.report(&ctx, handler.name(), e).await;
        }
    }

    /// Delivers answers or starts a conversation.
    fn apply<'a>(
        &'a self,
        session: &'a mut Session,
        reply: Reply,
        ctx: &'a Context,
    ) -> BoxFuture<'a, Result<()>> {
        async move {
            match reply {
                Reply::Nothing => Ok(()),
                Reply::Answers(answers) => {
                    let target = self.target(session, ctx);
                    deliver(&self.inner.services, answers, &target).await
                }
                Reply::Conversation(conversation) => {
                    if session.cancel_conversation() {
                        debug!("conversation replaced by a new one");
                    }
                    let handle = conversation.start(ctx.clone());
                    self.drive(session, handle, ctx).await
                }
            }
        }
        .boxed()
    }

    /// Delivers the steps of a running conversation until it asks for input
    /// or finishes.
    async fn drive(
        &self,
        session: &mut Session,
        mut handle: ConversationHandle,
        ctx: &Context,
    ) -> Result<()> {
        loop {
            match handle.next_step().await {
                Step::Say(reply) => self.apply(session, reply?, ctx).await?,
                Step::Ask(reply) => {
                    session.conversation = Some(handle);
                    return self.apply(session, reply?, ctx).await;
                }
                Step::Finished(reply) => {
                    trace!("conversation finished");
                    return self.apply(session, reply?, ctx).await;
                }
            }
        }
    }

    fn target(&self, session: &Session, ctx: &Context) -> Target {
        Target {
            chat: Some(session.chat()),
            session: Some(session.state().clone()),
            origin: Origin {
                locale: ctx.locale().to_string(),
                reply_to: ctx.init_message().map(|message| message.id),
            },
        }
    }

    /// Logs a contained failure and sends the configured reply for it.
    async fn report(&self, ctx: &Context, handler: &str, err: Error) {
        let settings = &self.inner.services.settings;
        let reply = if err.is_authorization() {
            info!(user = %ctx.user(), handler, "access denied");
            settings.authorization_reply.clone()
        } else {
            match &err {
                Error::HandlerFault {
                    location: Some(location),
                    ..
                } => warn!(
                    handler,
                    file = location.file(),
                    line = location.line(),
                    text = ctx.text(),
                    error = %err,
                    "handler failed"
                ),
                _ => warn!(handler, text = ctx.text(), error = %err, "handler failed"),
            }
            settings.error_reply.clone()
        };

        let Some(key) = reply else {
            return;
        };
        let target = Target {
            chat: Some(ctx.chat()),
            session: Some(ctx.session().clone()),
            origin: Origin {
                locale: ctx.locale().to_string(),
                reply_to: ctx.init_message().map(|message| message.id),
            },
        };
        if let Err(e) = deliver(&self.inner.services, vec![Answer::key(key)], &target).await {
            warn!(error = %e, "failed to send error reply");
        }
    }
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("services", &self.inner.services)
            .field("routes", &self.inner.routes)
            .field("store", &self.inner.store.is_some())
            .finish()
    }
}

// ============================================================================
// Builder
// ============================================================================

/// Assembles a [`Dispatcher`].
pub struct DispatcherBuilder {
    client: BoxedClient,
    settings: BotSettings,
    routes: Option<RouteTable>,
    language: Option<LanguageTable>,
    overflow: Option<Arc<dyn OverflowHook>>,
    store: Option<BoxedStore>,
    before_processing: Option<UpdateFilter>,
}

impl DispatcherBuilder {
    fn new(client: BoxedClient) -> Self {
        Self {
            client,
            settings: BotSettings::default(),
            routes: None,
            language: None,
            overflow: None,
            store: None,
            before_processing: None,
        }
    }

    pub fn settings(mut self, settings: BotSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn routes(mut self, routes: RouteTable) -> Self {
        self.routes = Some(routes);
        self
    }

    pub fn router(self, router: Router) -> Self {
        self.routes(router.build())
    }

    /// Sets the language table. Its strictness follows the settings.
    pub fn language(mut self, table: LanguageTable) -> Self {
        self.language = Some(table);
        self
    }

    /// Replaces the default temp-file overflow behaviour.
    pub fn overflow<O: OverflowHook>(mut self, hook: O) -> Self {
        self.overflow = Some(Arc::new(hook));
        self
    }

    pub fn store(mut self, store: BoxedStore) -> Self {
        self.store = Some(store);
        self
    }

    /// Drops plain messages for which `predicate` returns `false`.
    pub fn before_processing<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&Update) -> bool + Send + Sync + 'static,
    {
        self.before_processing = Some(UpdateFilter::new(predicate));
        self
    }

    pub fn build(self) -> Dispatcher {
        let strict = self.settings.strict_mode;
        let language = self.language.map(|table| Arc::new(table.strict(strict)));
        if self.settings.needs_language() && language.is_none() {
            warn!("language features are enabled but no language table was given");
        }
        let overflow: Arc<dyn OverflowHook> = match self.overflow {
            Some(hook) => hook,
            None => Arc::new(TempFileOverflow::new()),
        };
        let services = Services::new(self.client, Arc::new(self.settings), language, overflow);
        Dispatcher {
            inner: Arc::new(Inner {
                services: Arc::new(services),
                routes: self.routes.unwrap_or_else(|| Router::new().build()),
                store: self.store,
                before_processing: self.before_processing,
            }),
        }
    }
}

impl fmt::Debug for DispatcherBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DispatcherBuilder")
            .field("settings", &self.settings)
            .field("routes", &self.routes.is_some())
            .field("language", &self.language.is_some())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Tower service
// ============================================================================

/// A session together with one of its updates.
///
/// The session is locked for the whole handling of the update, which keeps
/// one session's updates strictly ordered.
pub struct Inbound {
    pub session: Arc<tokio::sync::Mutex<Session>>,
    pub update: Update,
}

impl fmt::Debug for Inbound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Inbound")
            .field("update", &self.update)
            .finish_non_exhaustive()
    }
}

/// The filtered, type-erased dispatcher service.
///
/// Errors are [`BoxError`]s: [`UpdateSkipped`] for filtered updates, which
/// callers ignore, or the storage [`Error`] of a failed flush.
pub type DispatchService = BoxCloneSyncService<Inbound, (), BoxError>;

impl Service<Inbound> for Dispatcher {
    type Response = ();
    type Error = BoxError;
    type Future = BoxFuture<'static, Result<(), BoxError>>;

    fn poll_ready(&mut self, _cx: &mut std::task::Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, request: Inbound) -> Self::Future {
        let dispatcher = self.clone();
        async move {
            let mut session = request.session.lock().await;
            dispatcher
                .handle_update(&mut session, request.update)
                .await
                .map_err(BoxError::from)
        }
        .boxed()
    }
}

/// A [`Predicate`] over plain-message updates.
///
/// Callback queries are never filtered; a message the inner closure rejects
/// fails with [`UpdateSkipped`].
#[derive(Clone)]
pub struct UpdateFilter(Arc<dyn Fn(&Update) -> bool + Send + Sync>);

impl UpdateFilter {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&Update) -> bool + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    /// Lets everything through.
    pub fn always() -> Self {
        Self::new(|_| true)
    }

    /// Only lets messages from the given chats through.
    pub fn allow_list(ids: impl IntoIterator<Item = i64>) -> Self {
        let ids: std::collections::HashSet<i64> = ids.into_iter().collect();
        Self::new(move |update| ids.contains(&update.chat.0))
    }
}

impl Predicate<Inbound> for UpdateFilter {
    type Request = Inbound;

    fn check(&mut self, request: Inbound) -> Result<Inbound, BoxError> {
        if !request.update.is_message() || (self.0)(&request.update) {
            Ok(request)
        } else {
            trace!(chat = %request.update.chat, "update filtered");
            Err(Box::new(UpdateSkipped))
        }
    }
}

impl fmt::Debug for UpdateFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("UpdateFilter").finish_non_exhaustive()
    }
}

/// Runs an update through `service`, treating [`UpdateSkipped`] as success.
pub async fn dispatch(service: DispatchService, inbound: Inbound) -> Result<()> {
    match service.oneshot(inbound).await {
        Ok(()) => Ok(()),
        Err(e) if e.is::<UpdateSkipped>() => Ok(()),
        Err(e) => Err(Error::from_boxed(e)),
    }
}
