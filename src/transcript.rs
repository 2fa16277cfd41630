//! Transcript store
//!
//! Ordered, append-biased message sequence. Only the tail may be rewritten,
//! and truncation always drops a contiguous suffix. Snapshots share storage
//! with the store until the next mutation copies it.

mod message;

pub use message::{parse_timestamp, Action, Author, Message};

use std::ops::Deref;
use std::sync::Arc;
use thiserror::Error;

/// Errors from transcript mutation primitives
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TranscriptError {
    #[error("Invalid transcript state: {0}")]
    InvalidState(&'static str),
    #[error("Index {index} out of range for transcript of length {len}")]
    OutOfRange { index: usize, len: usize },
}

/// Immutable view of the transcript at one point in time
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot(Arc<Vec<Message>>);

impl Deref for Snapshot {
    type Target = [Message];

    fn deref(&self) -> &[Message] {
        &self.0
    }
}

#[derive(Debug, Clone, Default)]
pub struct Transcript {
    messages: Arc<Vec<Message>>,
    /// Bumped on every mutation
    revision: u64,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_messages(messages: Vec<Message>) -> Self {
        Self {
            messages: Arc::new(messages),
            revision: 0,
        }
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Message> {
        self.messages.get(index)
    }

    pub fn tail(&self) -> Option<&Message> {
        self.messages.last()
    }

    pub fn has_streaming_tail(&self) -> bool {
        self.tail().is_some_and(|m| m.is_streaming)
    }

    /// Index of the last user-authored entry
    pub fn last_user_index(&self) -> Option<usize> {
        self.messages.iter().rposition(|m| m.author.is_user())
    }

    /// Add to the end. Callers uphold the single-streaming-tail invariant.
    pub fn append(&mut self, message: Message) {
        Arc::make_mut(&mut self.messages).push(message);
        self.revision += 1;
    }

    /// Add a settled entry without displacing a streaming tail.
    ///
    /// With a streaming tail the entry lands immediately ahead of it, so the
    /// in-flight message stays last and everything before the insertion point
    /// is untouched. Returns the index the entry landed at.
    pub fn insert_settled(&mut self, message: Message) -> usize {
        let messages = Arc::make_mut(&mut self.messages);
        let index = match messages.last() {
            Some(tail) if tail.is_streaming => messages.len() - 1,
            _ => messages.len(),
        };
        messages.insert(index, message);
        self.revision += 1;
        index
    }

    pub fn replace_tail(&mut self, message: Message) -> Result<(), TranscriptError> {
        let messages = Arc::make_mut(&mut self.messages);
        let tail = messages
            .last_mut()
            .ok_or(TranscriptError::InvalidState("cannot replace the tail of an empty transcript"))?;
        *tail = message;
        self.revision += 1;
        Ok(())
    }

    /// Keep entries `[0, index)`.
    pub fn truncate_to(&mut self, index: usize) -> Result<(), TranscriptError> {
        let len = self.messages.len();
        if index > len {
            return Err(TranscriptError::OutOfRange { index, len });
        }
        if index < len {
            Arc::make_mut(&mut self.messages).truncate(index);
            self.revision += 1;
        }
        Ok(())
    }

    pub fn clear(&mut self) {
        self.messages = Arc::new(Vec::new());
        self.revision += 1;
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot(Arc::clone(&self.messages))
    }
}
