//! Message store trait and the records it persists

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::audit::TurnAudit;
use crate::error::Result;
use crate::id::ConversationId;

/// Who produced a stored entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryRole {
    User,
    Assistant,
    /// Synthetic entry condensing earlier messages
    Summary,
}

impl EntryRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::Summary => "summary",
        }
    }
}

/// One persisted line of a conversation log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageEntry {
    /// Monotonic per conversation, starting at 1
    pub seq: u64,
    pub role: EntryRole,
    pub content: String,
    pub created_at: DateTime<Utc>,
    /// Summaries only: last sequence number folded into this summary
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub covers_through: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub turn_id: Option<String>,
}

impl MessageEntry {
    pub fn is_summary(&self) -> bool {
        self.role == EntryRole::Summary
    }
}

/// An entry before the store assigns its sequence number
#[derive(Debug, Clone)]
pub struct NewEntry {
    pub role: EntryRole,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub covers_through: Option<u64>,
    pub turn_id: Option<String>,
}

impl NewEntry {
    fn new(role: EntryRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            created_at: Utc::now(),
            covers_through: None,
            turn_id: None,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(EntryRole::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(EntryRole::Assistant, content)
    }

    pub fn summary(content: impl Into<String>, covers_through: u64) -> Self {
        let mut entry = Self::new(EntryRole::Summary, content);
        entry.covers_through = Some(covers_through);
        entry
    }

    pub fn with_turn(mut self, turn_id: impl Into<String>) -> Self {
        self.turn_id = Some(turn_id.into());
        self
    }

    /// Stamp with the next sequence number after `existing`
    pub(crate) fn into_entry(self, existing: &[MessageEntry]) -> MessageEntry {
        let seq = existing.last().map(|e| e.seq + 1).unwrap_or(1);
        MessageEntry {
            seq,
            role: self.role,
            content: self.content,
            created_at: self.created_at,
            covers_through: self.covers_through,
            turn_id: self.turn_id,
        }
    }
}

/// Append-only message log keyed by conversation id
///
/// Callers serialize writes per conversation; implementations only need to
/// keep sequence numbers monotonic under their own lock.
pub trait MessageStore: Send + Sync {
    /// Append an entry, returning it with its assigned sequence number
    fn append(&self, conversation: &ConversationId, entry: NewEntry) -> Result<MessageEntry>;

    /// Every entry of a conversation in append order (empty when unknown)
    fn read(&self, conversation: &ConversationId) -> Result<Vec<MessageEntry>>;

    /// Append a turn audit record
    fn append_audit(&self, audit: &TurnAudit) -> Result<()>;

    /// Audit records of a conversation in append order
    fn read_audit(&self, conversation: &ConversationId) -> Result<Vec<TurnAudit>>;
}
