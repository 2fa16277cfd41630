//! Session facade
//!
//! A [`Session`] is a cheap, cloneable handle onto a background runtime task
//! that owns the transcript, the conversation identity and the active turn.
//! Every operation is a message to that task, so mutations are serialized
//! without locks and observers see them through [`Session::subscribe`].

mod runtime;

#[cfg(test)]
pub mod testing;

use crate::config::ClientConfig;
use crate::notifications;
use crate::protocol::ConversationSummary;
use crate::transcript::{Snapshot, TranscriptError};
use crate::transport::{Transport, TransportError};
use crate::turn::TurnOutcome;
use futures::Stream;
use runtime::{Command, SessionRuntime};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;
use tokio_util::sync::CancellationToken;

/// Errors surfaced by session operations
#[derive(Debug, Clone, Error)]
pub enum SessionError {
    #[error("A response is still streaming")]
    TurnInProgress,
    #[error(transparent)]
    Transcript(#[from] TranscriptError),
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("Session is closed")]
    Closed,
}

/// Change notifications delivered to observers after each mutation
#[derive(Debug, Clone, PartialEq)]
pub enum SessionUpdate {
    Transcript(Snapshot),
    ConversationAssigned(i64),
    TitleChanged(String),
    Connection(bool),
    TurnFinished(TurnOutcome),
}

/// Point-in-time view of everything the session owns
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionSnapshot {
    pub conversation_id: Option<i64>,
    pub title: Option<String>,
    pub messages: Snapshot,
    pub connected: bool,
    pub turn_active: bool,
}

pub(crate) type TurnReply = oneshot::Sender<Result<Option<TurnOutcome>, SessionError>>;

/// Handle to a running session
#[derive(Clone)]
pub struct Session {
    commands: mpsc::Sender<Command>,
    updates: broadcast::Sender<SessionUpdate>,
    transport: Arc<dyn Transport>,
    /// Abandons the active turn and stops the runtime
    cancel: CancellationToken,
    /// Cancelled once the runtime task has exited
    stopped: CancellationToken,
}

impl Session {
    /// Check server health, then spawn the runtime and the notification bridge.
    pub async fn start(transport: Arc<dyn Transport>, config: &ClientConfig) -> Self {
        let connected = match transport.check_health().await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(error = %e, kind = ?e.kind, "Health check failed");
                false
            }
        };

        let (command_tx, command_rx) = mpsc::channel(32);
        let (notify_tx, notify_rx) = mpsc::channel(32);
        let (updates, _) = broadcast::channel(config.update_buffer.max(1));
        let cancel = CancellationToken::new();
        let stopped = CancellationToken::new();
        let bridge_cancel = CancellationToken::new();

        notifications::spawn_bridge(Arc::clone(&transport), notify_tx, bridge_cancel.clone());

        let runtime = SessionRuntime::new(
            Arc::clone(&transport),
            connected,
            command_rx,
            notify_rx,
            updates.clone(),
            cancel.clone(),
        );
        let stopped_guard = stopped.clone().drop_guard();
        tokio::spawn(async move {
            let _stopped = stopped_guard;
            let _bridge = bridge_cancel.drop_guard();
            runtime.run().await;
        });

        tracing::info!(connected, "Session started");
        Self {
            commands: command_tx,
            updates,
            transport,
            cancel,
            stopped,
        }
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> Result<T, SessionError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.commands
            .send(build(reply_tx))
            .await
            .map_err(|_| SessionError::Closed)?;
        reply_rx.await.map_err(|_| SessionError::Closed)
    }

    /// Run one turn for `text`. Resolves when the turn settles; `Ok(None)`
    /// when the text is blank and nothing was sent.
    pub async fn send_message(&self, text: &str) -> Result<Option<TurnOutcome>, SessionError> {
        if text.trim().is_empty() {
            return Ok(None);
        }
        let text = text.to_string();
        self.request(|reply| Command::Send { text, reply }).await?
    }

    /// Replace the user entry at `index` with `text`, dropping everything
    /// after it, and resend. Out-of-range or non-user indices are a no-op.
    pub async fn edit_message(
        &self,
        index: usize,
        text: &str,
    ) -> Result<Option<TurnOutcome>, SessionError> {
        if text.trim().is_empty() {
            return Ok(None);
        }
        let text = text.to_string();
        self.request(|reply| Command::Edit { index, text, reply })
            .await?
    }

    /// Drop everything after the last user entry and resend it.
    pub async fn regenerate_last_response(&self) -> Result<Option<TurnOutcome>, SessionError> {
        self.request(|reply| Command::Regenerate { reply }).await?
    }

    /// Replace the session's state with a stored conversation.
    pub async fn load_conversation(&self, id: i64) -> Result<(), SessionError> {
        let record = self.transport.get_conversation(id).await?;
        tracing::info!(conversation_id = id, messages = record.messages.len(), "Loaded conversation");
        self.request(|reply| Command::Load { record, reply }).await?
    }

    /// Reset to an empty, unidentified conversation. An active turn is
    /// cancelled first.
    pub async fn clear_conversation(&self) -> Result<(), SessionError> {
        self.request(|reply| Command::Clear { reply }).await
    }

    /// Delete a stored conversation. Deleting the one this session holds
    /// resets the session as [`clear_conversation`](Self::clear_conversation)
    /// does. Refused while a turn is active.
    pub async fn delete_conversation(&self, id: i64) -> Result<(), SessionError> {
        if self.snapshot().await?.turn_active {
            return Err(SessionError::TurnInProgress);
        }
        self.transport.delete_conversation(id).await?;
        tracing::info!(conversation_id = id, "Deleted conversation");
        self.request(|reply| Command::Forget { id, reply }).await
    }

    pub async fn list_conversations(
        &self,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<ConversationSummary>, SessionError> {
        Ok(self.transport.list_conversations(limit, offset).await?)
    }

    pub async fn snapshot(&self) -> Result<SessionSnapshot, SessionError> {
        self.request(|reply| Command::Snapshot { reply }).await
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionUpdate> {
        self.updates.subscribe()
    }

    /// Update stream for observers; lagged updates are skipped.
    pub fn updates(&self) -> impl Stream<Item = SessionUpdate> {
        BroadcastStream::new(self.updates.subscribe()).filter_map(Result::ok)
    }

    /// Stop accepting work, let the active turn finish, then shut down.
    pub async fn close(&self) {
        // A send failure means the runtime is already gone.
        let _ = self.commands.send(Command::Close).await;
        self.stopped.cancelled().await;
    }

    /// Abandon the active turn and shut down immediately.
    pub async fn abort(&self) {
        self.cancel.cancel();
        self.stopped.cancelled().await;
    }

    pub fn is_closed(&self) -> bool {
        self.stopped.is_cancelled()
    }
}
