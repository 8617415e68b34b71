//! # Parley Framework
//!
//! The dispatch engine of parley: everything between an inbound [`Update`]
//! and the platform calls it results in.
//!
//! - **Routing**: exact, format-pattern and regex routes plus default and
//!   sticker handlers ([`Router`], [`RouteTable`])
//! - **Handlers**: plain or async functions whose arguments are extracted
//!   from the [`Context`] ([`Handler`], [`FromContext`])
//! - **Answers**: what handlers return ([`Answer`], [`Reply`], [`IntoReply`])
//!   and how it is rendered and delivered
//! - **Sessions**: per-user storage, history, pending callbacks and
//!   running conversations ([`Session`], [`Conversation`])
//! - **Dispatcher**: the orchestrator, usable directly or as a filtered
//!   tower service ([`Dispatcher`], [`DispatchService`])
//!
//! ```rust,ignore
//! use parley_framework::prelude::*;
//!
//! fn multiply(args: Args) -> Result<String> {
//!     let a: i64 = args.get("a")?;
//!     let b: i64 = args.get("b")?;
//!     Ok(format!("{a} times {b} equals {}", a * b))
//! }
//!
//! let router = Router::new()
//!     .exact("Hello", || "Hi!")
//!     .pattern("{a:d}x{b:d}", multiply)?;
//! let dispatcher = Dispatcher::builder(client).router(router).build();
//! ```
//!
//! [`Update`]: parley_core::Update

pub mod access;
pub mod answer;
pub mod callback;
pub mod context;
pub mod conversation;
pub mod dispatcher;
pub mod error;
pub mod extractor;
pub mod handler;
pub mod language;
pub mod overflow;
pub mod pattern;
pub mod routing;
pub mod session;
pub mod settings;

mod render;
mod resolver;

#[cfg(test)]
mod testing;

pub use access::{AccessControl, ensure_arg};
pub use answer::{Answer, Body, Choice, IntoReply, Keyboard, Reply};
pub use callback::{CallbackCorrelator, Prompt, QueryEntry};
pub use context::Context;
pub use conversation::{Conversation, ConversationHandle, Turns};
pub use dispatcher::{
    DispatchService, Dispatcher, DispatcherBuilder, Inbound, UpdateFilter, dispatch,
};
pub use error::{ConversationCancelled, Error, Result, UpdateSkipped};
pub use extractor::{Args, FromContext, Text};
pub use handler::{Awaitable, BoxedHandler, Erased, Handler, HandlerResult, Immediate};
pub use language::{DEFAULT_SEGMENT, LanguageTable};
pub use overflow::{OverflowHook, Replacement, TempFileOverflow};
pub use pattern::FormatPattern;
pub use routing::{MatchKind, RouteMatch, RouteTable, Router, Strategy};
pub use session::{Session, SessionState};
pub use settings::BotSettings;

/// The types needed to write handlers and assemble a dispatcher.
pub mod prelude {
    pub use crate::{
        AccessControl, Answer, Args, BotSettings, Choice, Context, Conversation,
        ConversationCancelled, Dispatcher, Error, IntoReply, Keyboard, LanguageTable, Reply,
        Result, Router, Text, Turns, ensure_arg,
    };
    pub use parley_core::{ChatId, MediaKind, MessageId, Update, User};
}
