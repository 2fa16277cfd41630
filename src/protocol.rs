//! Wire types exchanged with the assistant server
//!
//! Both event streams are `data:`-framed JSON objects tagged by `"type"`.

use crate::transcript::Action;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One event of a chat turn stream.
///
/// Closed: an unknown `type` fails to decode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TurnEvent {
    Start {
        conversation_id: i64,
    },
    FunctionStart {
        #[serde(rename = "name")]
        function_name: String,
    },
    FunctionResult {
        #[serde(rename = "name", default)]
        function_name: Option<String>,
        #[serde(default)]
        result: Value,
    },
    Chunk {
        content: String,
    },
    Done {
        #[serde(default)]
        content: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        actions: Option<Vec<Action>>,
    },
    TitleGenerated {
        title: String,
    },
    Error {
        message: String,
    },
}

impl TurnEvent {
    /// Short tag for logging
    pub fn kind(&self) -> &'static str {
        match self {
            TurnEvent::Start { .. } => "start",
            TurnEvent::FunctionStart { .. } => "function_start",
            TurnEvent::FunctionResult { .. } => "function_result",
            TurnEvent::Chunk { .. } => "chunk",
            TurnEvent::Done { .. } => "done",
            TurnEvent::TitleGenerated { .. } => "title_generated",
            TurnEvent::Error { .. } => "error",
        }
    }
}

/// One event of the long-lived notification feed
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NotificationEvent {
    Reminder {
        #[serde(default)]
        timestamp: Option<String>,
        #[serde(default)]
        items: Vec<ReminderItem>,
    },
    /// Keep-alive sent when nothing is due
    Heartbeat,
    /// Any other feed event type
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ReminderItem {
    pub title: String,
    pub status: ReminderStatus,
    #[serde(default)]
    pub due_date: Option<String>,
}

/// Urgency of a reminder item; only `overdue` is distinguished
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(from = "String")]
pub enum ReminderStatus {
    Overdue,
    DueSoon,
}

impl From<String> for ReminderStatus {
    fn from(raw: String) -> Self {
        if raw == "overdue" {
            ReminderStatus::Overdue
        } else {
            ReminderStatus::DueSoon
        }
    }
}

impl ReminderStatus {
    pub fn label(self) -> &'static str {
        match self {
            ReminderStatus::Overdue => "Overdue",
            ReminderStatus::DueSoon => "Due soon",
        }
    }
}

/// Body of a turn request
#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest<'a> {
    pub message: &'a str,
    pub timezone: &'a str,
}

/// Persisted conversation as returned by the history endpoint
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ConversationRecord {
    pub id: i64,
    #[serde(default)]
    pub started_at: Option<String>,
    #[serde(default)]
    pub messages: Vec<MessageRecord>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MessageRecord {
    #[serde(default)]
    pub id: Option<i64>,
    pub role: String,
    pub content: String,
    pub created_at: String,
}

/// The history endpoint answers a missing conversation with `{"error": ...}`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum ConversationLookup {
    Found(ConversationRecord),
    Missing { error: String },
}

/// Reply of the delete endpoint; a missing conversation is again `{"error": ...}`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum DeleteReply {
    Deleted {
        success: bool,
        #[serde(default)]
        message: Option<String>,
    },
    Missing {
        error: String,
    },
}

/// Entry of the conversation listing
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ConversationSummary {
    pub id: i64,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub started_at: Option<String>,
    #[serde(default)]
    pub preview: Option<String>,
    #[serde(default)]
    pub message_count: usize,
}
