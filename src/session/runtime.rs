//! Session runtime task
//!
//! Owns all mutable session state and multiplexes three inputs: commands from
//! [`Session`](super::Session) handles, events from the active turn's stream,
//! and reminders from the notification bridge.

use super::{SessionError, SessionSnapshot, SessionUpdate, TurnReply};
use crate::notifications;
use crate::protocol::{ConversationRecord, NotificationEvent, TurnEvent};
use crate::transcript::{Message, Transcript, TranscriptError};
use crate::transport::{Transport, TransportError, TurnStream};
use crate::turn::{Effect, TurnOutcome, TurnState};
use futures::StreamExt;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio_util::sync::CancellationToken;

pub(crate) enum Command {
    Send {
        text: String,
        reply: TurnReply,
    },
    Edit {
        index: usize,
        text: String,
        reply: TurnReply,
    },
    Regenerate {
        reply: TurnReply,
    },
    Load {
        record: ConversationRecord,
        reply: oneshot::Sender<Result<(), SessionError>>,
    },
    Clear {
        reply: oneshot::Sender<()>,
    },
    /// A stored conversation was deleted server-side
    Forget {
        id: i64,
        reply: oneshot::Sender<()>,
    },
    Snapshot {
        reply: oneshot::Sender<SessionSnapshot>,
    },
    Close,
}

struct ActiveTurn {
    state: TurnState,
    events: TurnStream,
    reply: Option<TurnReply>,
}

impl ActiveTurn {
    fn resolve(&mut self, result: Result<Option<TurnOutcome>, SessionError>) {
        if let Some(reply) = self.reply.take() {
            // The caller may have stopped waiting.
            let _ = reply.send(result);
        }
    }
}

pub(crate) struct SessionRuntime {
    transport: Arc<dyn Transport>,
    conversation_id: Option<i64>,
    title: Option<String>,
    transcript: Transcript,
    connected: bool,
    active: Option<ActiveTurn>,
    /// Transcript revision last published to observers
    published: u64,
    closing: bool,
    commands: mpsc::Receiver<Command>,
    notifications: mpsc::Receiver<NotificationEvent>,
    updates: broadcast::Sender<SessionUpdate>,
    cancel: CancellationToken,
}

impl SessionRuntime {
    pub(crate) fn new(
        transport: Arc<dyn Transport>,
        connected: bool,
        commands: mpsc::Receiver<Command>,
        notifications: mpsc::Receiver<NotificationEvent>,
        updates: broadcast::Sender<SessionUpdate>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            transport,
            conversation_id: None,
            title: None,
            transcript: Transcript::new(),
            connected,
            active: None,
            published: 0,
            closing: false,
            commands,
            notifications,
            updates,
            cancel,
        }
    }

    pub(crate) async fn run(mut self) {
        tracing::info!(connected = self.connected, "Session runtime started");

        loop {
            tokio::select! {
                biased;

                () = self.cancel.cancelled() => {
                    self.abandon_turn(TurnOutcome::Cancelled);
                    break;
                }

                command = self.commands.recv(), if !self.closing => match command {
                    Some(command) => self.handle_command(command),
                    None => {
                        tracing::debug!("All session handles dropped");
                        self.closing = true;
                    }
                },

                // Reminders ahead of turn events so a busy stream cannot hold them back
                Some(event) = self.notifications.recv() => self.on_notification(&event),

                next = next_turn_event(&mut self.active) => self.on_turn_event(next),
            }

            if self.closing && self.active.is_none() {
                break;
            }
        }

        tracing::info!(conversation_id = ?self.conversation_id, "Session runtime stopped");
    }

    // ------------------------------------------------------------------
    // Commands
    // ------------------------------------------------------------------

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Send { text, reply } => {
                if let Some(reply) = self.idle_or_reject(reply) {
                    self.start_turn(Some(&text), &text, reply);
                }
            }
            Command::Edit { index, text, reply } => {
                if let Some(reply) = self.idle_or_reject(reply) {
                    self.edit(index, &text, reply);
                }
            }
            Command::Regenerate { reply } => {
                if let Some(reply) = self.idle_or_reject(reply) {
                    self.regenerate(reply);
                }
            }
            Command::Load { record, reply } => {
                let result = if self.active.is_some() {
                    Err(SessionError::TurnInProgress)
                } else {
                    self.load(&record);
                    Ok(())
                };
                let _ = reply.send(result);
            }
            Command::Clear { reply } => {
                self.clear();
                let _ = reply.send(());
            }
            Command::Forget { id, reply } => {
                if self.conversation_id == Some(id) {
                    self.clear();
                }
                let _ = reply.send(());
            }
            Command::Snapshot { reply } => {
                let _ = reply.send(self.snapshot());
            }
            Command::Close => {
                tracing::info!(turn_active = self.active.is_some(), "Session closing");
                self.closing = true;
            }
        }
    }

    /// Hand `reply` back when idle; otherwise answer it with `TurnInProgress`.
    fn idle_or_reject(&self, reply: TurnReply) -> Option<TurnReply> {
        if self.active.is_some() {
            let _ = reply.send(Err(SessionError::TurnInProgress));
            return None;
        }
        Some(reply)
    }

    fn edit(&mut self, index: usize, text: &str, reply: TurnReply) {
        match self.transcript.get(index) {
            Some(message) if message.author.is_user() => {}
            Some(_) => {
                tracing::debug!(index, "Edit target is not a user message");
                let _ = reply.send(Ok(None));
                return;
            }
            None => {
                tracing::debug!(index, len = self.transcript.len(), "Edit index out of range");
                let _ = reply.send(Ok(None));
                return;
            }
        }

        if let Err(e) = self.transcript.truncate_to(index) {
            let _ = reply.send(Err(e.into()));
            return;
        }
        tracing::info!(index, "Editing message");
        self.start_turn(Some(text), text, reply);
    }

    fn regenerate(&mut self, reply: TurnReply) {
        let Some(index) = self.transcript.last_user_index() else {
            let _ = reply.send(Ok(None));
            return;
        };
        let text = self
            .transcript
            .get(index)
            .map(|m| m.content.clone())
            .unwrap_or_default();

        if let Err(e) = self.transcript.truncate_to(index + 1) {
            let _ = reply.send(Err(e.into()));
            return;
        }
        tracing::info!(index, "Regenerating last response");
        self.start_turn(None, &text, reply);
    }

    fn load(&mut self, record: &ConversationRecord) {
        let messages = record.messages.iter().map(Message::from_record).collect();
        self.transcript = Transcript::from_messages(messages);
        self.title = None;
        self.assign_conversation(record.id, true);
        self.force_publish_transcript();
    }

    fn clear(&mut self) {
        self.abandon_turn(TurnOutcome::Cancelled);
        self.transcript.clear();
        self.conversation_id = None;
        self.title = None;
        tracing::info!("Conversation cleared");
        self.publish_transcript();
    }

    fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            conversation_id: self.conversation_id,
            title: self.title.clone(),
            messages: self.transcript.snapshot(),
            connected: self.connected,
            turn_active: self.active.is_some(),
        }
    }

    // ------------------------------------------------------------------
    // Turn lifecycle
    // ------------------------------------------------------------------

    /// Open a turn and hand its stream to the select loop. `user_text` is
    /// `None` when resending an entry already in the transcript.
    fn start_turn(&mut self, user_text: Option<&str>, text: &str, reply: TurnReply) {
        let state = match TurnState::begin(&mut self.transcript, user_text) {
            Ok(state) => state,
            Err(e) => {
                let _ = reply.send(Err(e.into()));
                return;
            }
        };

        tracing::info!(conversation_id = ?self.conversation_id, "Turn started");
        let events = self.transport.send_turn(text, self.conversation_id);
        self.active = Some(ActiveTurn {
            state,
            events,
            reply: Some(reply),
        });
        self.publish_transcript();
    }

    fn on_turn_event(&mut self, next: Option<Result<TurnEvent, TransportError>>) {
        let Some(mut turn) = self.active.take() else {
            return;
        };

        let result = match next {
            Some(Ok(event)) => {
                tracing::debug!(event = event.kind(), "Turn event");
                turn.state.apply(event, &mut self.transcript)
            }
            Some(Err(e)) => {
                tracing::warn!(error = %e, kind = ?e.kind, "Turn stream failed");
                turn.state.fail(
                    &mut self.transcript,
                    TurnOutcome::Faulted {
                        error: e.to_string(),
                    },
                )
            }
            None => {
                tracing::warn!("Turn stream ended without a terminal event");
                turn.state.fail(&mut self.transcript, TurnOutcome::Exhausted)
            }
        };

        match result {
            Ok(effects) => {
                let finished = self.apply_effects(effects);
                self.publish_transcript();
                match finished {
                    Some(outcome) => self.finish_turn(turn, outcome),
                    None => self.active = Some(turn),
                }
            }
            Err(e) => self.break_turn(turn, &e),
        }
    }

    /// Settle a turn whose event could not be applied. The reply settles the
    /// tail like any fault, and the caller sees the transcript error.
    fn break_turn(&mut self, mut turn: ActiveTurn, error: &TranscriptError) {
        tracing::error!(error = %error, "Turn event violated transcript state");
        let outcome = TurnOutcome::Faulted {
            error: error.to_string(),
        };
        if let Ok(effects) = turn.state.fail(&mut self.transcript, outcome) {
            self.apply_effects(effects);
        }
        self.publish_transcript();
        self.publish(SessionUpdate::TurnFinished(TurnOutcome::Faulted {
            error: error.to_string(),
        }));
        turn.resolve(Err(error.clone().into()));
    }

    fn finish_turn(&mut self, mut turn: ActiveTurn, outcome: TurnOutcome) {
        tracing::info!(outcome = ?outcome, "Turn finished");
        self.publish(SessionUpdate::TurnFinished(outcome.clone()));
        turn.resolve(Ok(Some(outcome)));
    }

    /// Settle the active turn, if any, without waiting for its stream.
    fn abandon_turn(&mut self, outcome: TurnOutcome) {
        let Some(mut turn) = self.active.take() else {
            return;
        };
        tracing::info!(outcome = ?outcome, "Abandoning active turn");
        match turn.state.fail(&mut self.transcript, outcome.clone()) {
            Ok(effects) => {
                self.apply_effects(effects);
                self.publish_transcript();
                self.finish_turn(turn, outcome);
            }
            Err(e) => self.break_turn(turn, &e),
        }
    }

    /// Apply side effects; returns the outcome when the turn finished.
    fn apply_effects(&mut self, effects: Vec<Effect>) -> Option<TurnOutcome> {
        let mut finished = None;
        for effect in effects {
            match effect {
                Effect::AssignConversation(id) => self.assign_conversation(id, false),
                Effect::SetTitle(title) => self.set_title(title),
                Effect::SetConnected(connected) => self.set_connected(connected),
                Effect::Finish(outcome) => finished = Some(outcome),
            }
        }
        finished
    }

    /// Record the conversation id. A server-sent id never replaces one the
    /// session already has; a loaded conversation always does.
    fn assign_conversation(&mut self, id: i64, replace: bool) {
        match self.conversation_id {
            Some(existing) if existing == id => {}
            Some(existing) if !replace => {
                tracing::warn!(existing, received = id, "Ignoring conflicting conversation id");
            }
            _ => {
                tracing::info!(conversation_id = id, "Conversation assigned");
                self.conversation_id = Some(id);
                self.publish(SessionUpdate::ConversationAssigned(id));
            }
        }
    }

    fn set_title(&mut self, title: String) {
        if self.title.is_some() {
            tracing::debug!(title = %title, "Title already set");
            return;
        }
        tracing::info!(title = %title, "Conversation titled");
        self.title = Some(title.clone());
        self.publish(SessionUpdate::TitleChanged(title));
    }

    fn set_connected(&mut self, connected: bool) {
        if self.connected != connected {
            tracing::info!(connected, "Connection state changed");
            self.connected = connected;
            self.publish(SessionUpdate::Connection(connected));
        }
    }

    // ------------------------------------------------------------------
    // Notifications
    // ------------------------------------------------------------------

    fn on_notification(&mut self, event: &NotificationEvent) {
        let added = notifications::merge(event, &mut self.transcript);
        if added > 0 {
            tracing::debug!(added, "Merged reminders");
            self.publish_transcript();
        }
    }

    // ------------------------------------------------------------------
    // Observers
    // ------------------------------------------------------------------

    fn publish(&self, update: SessionUpdate) {
        // No receivers is fine.
        let _ = self.updates.send(update);
    }

    /// Publish the transcript if it changed since the last publish.
    fn publish_transcript(&mut self) {
        if self.transcript.revision() != self.published {
            self.force_publish_transcript();
        }
    }

    fn force_publish_transcript(&mut self) {
        self.published = self.transcript.revision();
        self.publish(SessionUpdate::Transcript(self.transcript.snapshot()));
    }
}

/// Next event of the active turn; pending while idle.
async fn next_turn_event(
    active: &mut Option<ActiveTurn>,
) -> Option<Result<TurnEvent, TransportError>> {
    match active {
        Some(turn) => turn.events.next().await,
        None => std::future::pending().await,
    }
}
