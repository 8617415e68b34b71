//! The platform client collaborator.
//!
//! A [`PlatformClient`] is the wire-level connection to a chat platform. The
//! dispatch engine never speaks the platform protocol itself; it only calls
//! the four operations below and consumes the update stream.

use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::error::TransportResult;
use crate::outbound::{OutboundContent, SendOptions, SentMessage};
use crate::update::{ChatId, MessageId, Update};

/// The interface a chat platform client must expose.
///
/// Implementations own the transport (long polling, webhooks, a websocket
/// ...) and are responsible for delivery once a message has been handed
/// over; the engine only observes success or failure.
#[async_trait]
pub trait PlatformClient: Send + Sync + 'static {
    /// Sends a new message to `recipient` and returns the sent message.
    async fn send(
        &self,
        recipient: ChatId,
        content: OutboundContent,
        options: SendOptions,
    ) -> TransportResult<SentMessage>;

    /// Replaces the text of an earlier message.
    ///
    /// Only `parse_mode`, `disable_web_preview` and an inline `markup` are
    /// meaningful for edits; other options are ignored.
    async fn edit(
        &self,
        recipient: ChatId,
        message_id: MessageId,
        text: String,
        options: SendOptions,
    ) -> TransportResult<SentMessage>;

    /// Acknowledges a callback query so the user's client stops waiting.
    async fn ack_callback(&self, callback_id: &str) -> TransportResult<()>;

    /// Opens the stream of inbound updates.
    ///
    /// The stream ends when the client shuts down.
    async fn updates(&self) -> TransportResult<BoxStream<'static, Update>>;
}

/// A shared platform client trait object.
pub type BoxedClient = Arc<dyn PlatformClient>;
