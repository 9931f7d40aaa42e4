//! In-process message store

use std::collections::HashMap;
use std::sync::RwLock;

use super::traits::{MessageEntry, MessageStore, NewEntry};
use crate::audit::TurnAudit;
use crate::error::{OpsError, Result};
use crate::id::ConversationId;

/// Message store that lives only as long as the process
#[derive(Default)]
pub struct MemoryMessageStore {
    conversations: RwLock<HashMap<ConversationId, Vec<MessageEntry>>>,
    audits: RwLock<HashMap<ConversationId, Vec<TurnAudit>>>,
}

impl MemoryMessageStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl MessageStore for MemoryMessageStore {
    fn append(&self, conversation: &ConversationId, entry: NewEntry) -> Result<MessageEntry> {
        let mut conversations = self
            .conversations
            .write()
            .map_err(|e| OpsError::Storage(e.to_string()))?;
        let entries = conversations.entry(conversation.clone()).or_default();
        let entry = entry.into_entry(entries);
        entries.push(entry.clone());
        Ok(entry)
    }

    fn read(&self, conversation: &ConversationId) -> Result<Vec<MessageEntry>> {
        let conversations = self
            .conversations
            .read()
            .map_err(|e| OpsError::Storage(e.to_string()))?;
        Ok(conversations.get(conversation).cloned().unwrap_or_default())
    }

    fn append_audit(&self, audit: &TurnAudit) -> Result<()> {
        let mut audits = self.audits.write().map_err(|e| OpsError::Storage(e.to_string()))?;
        audits
            .entry(audit.conversation_id.clone())
            .or_default()
            .push(audit.clone());
        Ok(())
    }

    fn read_audit(&self, conversation: &ConversationId) -> Result<Vec<TurnAudit>> {
        let audits = self.audits.read().map_err(|e| OpsError::Storage(e.to_string()))?;
        Ok(audits.get(conversation).cloned().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_assigns_sequence() {
        let store = MemoryMessageStore::new();
        let id = ConversationId::parse("m1").unwrap();
        store.append(&id, NewEntry::user("a")).unwrap();
        let summary = store.append(&id, NewEntry::summary("s", 1)).unwrap();
        assert_eq!(summary.seq, 2);
        assert_eq!(store.read(&id).unwrap().len(), 2);
    }
}
