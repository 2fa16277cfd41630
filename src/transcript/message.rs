//! Transcript entry types

use crate::protocol::MessageRecord;
use crate::status::GENERIC_STARTED;
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Who wrote a transcript entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Author {
    User,
    Assistant,
    /// Out-of-band entries such as reminders
    System,
}

impl Author {
    /// Map a persisted role string to an author.
    ///
    /// Anything that is not `user` or `system` was written by the assistant.
    pub fn from_role(role: &str) -> Self {
        match role {
            "user" => Author::User,
            "system" => Author::System,
            _ => Author::Assistant,
        }
    }

    pub fn is_user(self) -> bool {
        matches!(self, Author::User)
    }
}

/// Suggested follow-up action attached to an assistant reply
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    #[serde(rename = "type")]
    pub action_type: String,
    #[serde(default)]
    pub payload: Value,
    #[serde(default)]
    pub message: Option<String>,
}

/// One transcript entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Local identity, stable across tail replacements within a turn
    pub id: Uuid,
    pub content: String,
    pub author: Author,
    pub timestamp: DateTime<Utc>,
    pub is_streaming: bool,
    pub is_function_call: bool,
    pub function_name: Option<String>,
    pub function_result: Option<Value>,
    /// Transient progress line, only present while streaming
    pub processing_status: Option<String>,
    pub actions: Option<Vec<Action>>,
}

impl Message {
    fn new(author: Author, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            content: content.into(),
            author,
            timestamp: Utc::now(),
            is_streaming: false,
            is_function_call: false,
            function_name: None,
            function_result: None,
            processing_status: None,
            actions: None,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Author::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Author::Assistant, content)
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Author::System, content)
    }

    /// Empty streaming assistant entry that a turn evolves in place
    pub fn placeholder() -> Self {
        Self {
            is_streaming: true,
            processing_status: Some(GENERIC_STARTED.to_string()),
            ..Self::new(Author::Assistant, "")
        }
    }

    /// Rebuild a transcript entry from persisted history.
    pub fn from_record(record: &MessageRecord) -> Self {
        let timestamp = parse_timestamp(&record.created_at).unwrap_or_else(|| {
            tracing::warn!(created_at = %record.created_at, "Unparseable message timestamp");
            Utc::now()
        });
        Self {
            timestamp,
            ..Self::new(Author::from_role(&record.role), record.content.clone())
        }
    }

    /// Not streaming and carrying no progress line
    pub fn is_settled(&self) -> bool {
        !self.is_streaming && self.processing_status.is_none()
    }
}

/// Parse RFC 3339, falling back to naive ISO-8601 read as UTC.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}
