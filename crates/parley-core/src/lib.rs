//! # Parley Core
//!
//! Platform-neutral building blocks shared by every parley crate:
//!
//! - **Updates**: what arrives from the chat platform ([`Update`], [`UpdateKind`], [`User`])
//! - **Outbound**: what is sent back ([`OutboundContent`], [`SendOptions`], [`ReplyMarkup`])
//! - **Collaborators**: the narrow interfaces to the outside world,
//!   [`PlatformClient`] for the chat platform and [`SessionStore`] for
//!   persistent per-user storage
//!
//! ```text
//! ┌────────────────┐ Update  ┌────────────┐ OutboundContent ┌────────────────┐
//! │ PlatformClient │────────▶│ Dispatcher │────────────────▶│ PlatformClient │
//! └────────────────┘         └────────────┘                 └────────────────┘
//!                                  │ ▲
//!                       StorageBlob│ │
//!                                  ▼ │
//!                           ┌──────────────┐
//!                           │ SessionStore │
//!                           └──────────────┘
//! ```

pub mod client;
pub mod error;
pub mod outbound;
pub mod store;
pub mod update;

pub use client::{BoxedClient, PlatformClient};
pub use error::{StorageError, StorageResult, TransportError, TransportResult};
pub use outbound::{
    InlineButton, Markup, MediaKind, MediaSource, OutboundContent, ReplyMarkup, SendOptions,
    SentMessage,
};
pub use store::{BoxedStore, MemoryStore, SessionStore, StorageBlob};
pub use update::{CallbackQuery, ChatId, Message, MessageId, Sticker, Update, UpdateKind, User};
