//! Mock transport for session tests
//!
//! Turns are either scripted up front or driven live through a channel, so
//! tests can interleave commands and reminders with a turn in flight.

use crate::protocol::{ConversationRecord, ConversationSummary, NotificationEvent, TurnEvent};
use crate::transport::{NotificationStream, Transport, TransportError, TurnStream};
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

pub type EventSender = mpsc::UnboundedSender<Result<TurnEvent, TransportError>>;
pub type ReminderSender = mpsc::UnboundedSender<Result<NotificationEvent, TransportError>>;

/// One `send_turn` call as the transport saw it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnRequest {
    pub message: String,
    pub conversation_id: Option<i64>,
}

#[allow(dead_code)]
pub struct MockTransport {
    turns: Mutex<VecDeque<TurnStream>>,
    feed: Mutex<Option<NotificationStream>>,
    health: Mutex<Result<(), TransportError>>,
    conversations: Mutex<HashMap<i64, ConversationRecord>>,
    summaries: Mutex<Vec<ConversationSummary>>,
    /// Record of all turns opened
    pub requests: Mutex<Vec<TurnRequest>>,
    /// Ids passed to `delete_conversation`, found or not
    pub deletions: Mutex<Vec<i64>>,
}

#[allow(dead_code)]
impl MockTransport {
    pub fn new() -> Self {
        Self {
            turns: Mutex::new(VecDeque::new()),
            feed: Mutex::new(None),
            health: Mutex::new(Ok(())),
            conversations: Mutex::new(HashMap::new()),
            summaries: Mutex::new(Vec::new()),
            requests: Mutex::new(Vec::new()),
            deletions: Mutex::new(Vec::new()),
        }
    }

    /// Queue a turn that replays `events` and then ends
    pub fn queue_turn(&self, events: Vec<Result<TurnEvent, TransportError>>) {
        self.turns
            .lock()
            .unwrap()
            .push_back(stream::iter(events).boxed());
    }

    /// Queue a turn whose events the test sends; dropping the sender ends it
    pub fn queue_live_turn(&self) -> EventSender {
        let (tx, rx) = mpsc::unbounded_channel();
        self.turns
            .lock()
            .unwrap()
            .push_back(UnboundedReceiverStream::new(rx).boxed());
        tx
    }

    /// Drive the notification feed. Call before starting the session.
    pub fn notification_sender(&self) -> ReminderSender {
        let (tx, rx) = mpsc::unbounded_channel();
        *self.feed.lock().unwrap() = Some(UnboundedReceiverStream::new(rx).boxed());
        tx
    }

    pub fn set_health(&self, result: Result<(), TransportError>) {
        *self.health.lock().unwrap() = result;
    }

    pub fn insert_conversation(&self, record: ConversationRecord) {
        self.conversations.lock().unwrap().insert(record.id, record);
    }

    pub fn set_summaries(&self, summaries: Vec<ConversationSummary>) {
        *self.summaries.lock().unwrap() = summaries;
    }

    pub fn recorded_requests(&self) -> Vec<TurnRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn recorded_deletions(&self) -> Vec<i64> {
        self.deletions.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transport for MockTransport {
    fn send_turn(&self, message: &str, conversation_id: Option<i64>) -> TurnStream {
        self.requests.lock().unwrap().push(TurnRequest {
            message: message.to_string(),
            conversation_id,
        });
        self.turns.lock().unwrap().pop_front().unwrap_or_else(|| {
            stream::once(async { Err(TransportError::network("No mock turn queued")) }).boxed()
        })
    }

    fn notification_feed(&self) -> NotificationStream {
        self.feed
            .lock()
            .unwrap()
            .take()
            .unwrap_or_else(|| stream::pending().boxed())
    }

    async fn check_health(&self) -> Result<(), TransportError> {
        self.health.lock().unwrap().clone()
    }

    async fn get_conversation(&self, id: i64) -> Result<ConversationRecord, TransportError> {
        self.conversations
            .lock()
            .unwrap()
            .get(&id)
            .cloned()
            .ok_or_else(|| TransportError::not_found("Conversation not found"))
    }

    async fn list_conversations(
        &self,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<ConversationSummary>, TransportError> {
        Ok(self
            .summaries
            .lock()
            .unwrap()
            .iter()
            .skip(offset as usize)
            .take(limit as usize)
            .cloned()
            .collect())
    }

    async fn delete_conversation(&self, id: i64) -> Result<(), TransportError> {
        self.deletions.lock().unwrap().push(id);
        self.conversations
            .lock()
            .unwrap()
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| TransportError::not_found("Conversation not found"))
    }
}
