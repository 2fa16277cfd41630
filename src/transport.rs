//! Transport abstraction
//!
//! The session consumes the assistant server only through this trait, which
//! lets tests drive it with scripted streams.

mod error;
mod http;
pub mod sse;

pub use error::{TransportError, TransportErrorKind};
pub use http::HttpTransport;

use crate::protocol::{ConversationRecord, ConversationSummary, NotificationEvent, TurnEvent};
use async_trait::async_trait;
use futures::stream::BoxStream;
use std::sync::Arc;

/// Events of a single turn; finite, lazily produced, not restartable
pub type TurnStream = BoxStream<'static, Result<TurnEvent, TransportError>>;

/// Long-lived notification feed; `Err` items report failed (re)connections
pub type NotificationStream = BoxStream<'static, Result<NotificationEvent, TransportError>>;

/// Client side of the assistant server
#[async_trait]
pub trait Transport: Send + Sync {
    /// Open one turn. Nothing is sent until the stream is first polled.
    fn send_turn(&self, message: &str, conversation_id: Option<i64>) -> TurnStream;

    /// Subscribe to out-of-band notifications.
    fn notification_feed(&self) -> NotificationStream;

    async fn check_health(&self) -> Result<(), TransportError>;

    async fn get_conversation(&self, id: i64) -> Result<ConversationRecord, TransportError>;

    async fn list_conversations(
        &self,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<ConversationSummary>, TransportError>;

    async fn delete_conversation(&self, id: i64) -> Result<(), TransportError>;
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for Arc<T> {
    fn send_turn(&self, message: &str, conversation_id: Option<i64>) -> TurnStream {
        (**self).send_turn(message, conversation_id)
    }

    fn notification_feed(&self) -> NotificationStream {
        (**self).notification_feed()
    }

    async fn check_health(&self) -> Result<(), TransportError> {
        (**self).check_health().await
    }

    async fn get_conversation(&self, id: i64) -> Result<ConversationRecord, TransportError> {
        (**self).get_conversation(id).await
    }

    async fn list_conversations(
        &self,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<ConversationSummary>, TransportError> {
        (**self).list_conversations(limit, offset).await
    }

    async fn delete_conversation(&self, id: i64) -> Result<(), TransportError> {
        (**self).delete_conversation(id).await
    }
}
