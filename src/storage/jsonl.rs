//! JSONL-based message store with in-memory caching.
//!
//! Layout under the base path:
//! - `conversations/<id>.jsonl`: one `MessageEntry` per line
//! - `audit/<id>.jsonl`: one `TurnAudit` per line
//!
//! The files are the source of truth; the cache only saves re-reading them.

use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use serde::Serialize;
use serde::de::DeserializeOwned;

use super::traits::{MessageEntry, MessageStore, NewEntry};
use crate::audit::TurnAudit;
use crate::error::{OpsError, Result};
use crate::id::ConversationId;

const CONVERSATIONS_DIR: &str = "conversations";
const AUDIT_DIR: &str = "audit";

/// JSONL-based message store with a read-through cache.
pub struct JsonlMessageStore {
    base_path: PathBuf,
    cache: RwLock<HashMap<ConversationId, Vec<MessageEntry>>>,
}

impl JsonlMessageStore {
    /// Create a new store at the given path.
    pub fn new(base_path: impl AsRef<Path>) -> Result<Self> {
        let base_path = base_path.as_ref().to_path_buf();
        fs::create_dir_all(base_path.join(CONVERSATIONS_DIR))?;
        fs::create_dir_all(base_path.join(AUDIT_DIR))?;
        Ok(Self {
            base_path,
            cache: RwLock::new(HashMap::new()),
        })
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    fn conversation_path(&self, conversation: &ConversationId) -> PathBuf {
        self.base_path
            .join(CONVERSATIONS_DIR)
            .join(format!("{}.jsonl", conversation))
    }

    fn audit_path(&self, conversation: &ConversationId) -> PathBuf {
        self.base_path.join(AUDIT_DIR).join(format!("{}.jsonl", conversation))
    }

    /// Load a conversation into cache if not already loaded.
    fn ensure_loaded(&self, conversation: &ConversationId) -> Result<()> {
        {
            let cache = self.cache.read().map_err(|e| OpsError::Storage(e.to_string()))?;
            if cache.contains_key(conversation) {
                return Ok(());
            }
        }

        let mut cache = self.cache.write().map_err(|e| OpsError::Storage(e.to_string()))?;
        if cache.contains_key(conversation) {
            return Ok(());
        }

        let entries = read_lines(&self.conversation_path(conversation))?;
        log::debug!("Loaded {} entries for conversation {}", entries.len(), conversation);
        cache.insert(conversation.clone(), entries);
        Ok(())
    }
}

/// Parse every non-blank line of a JSONL file; a missing file is empty.
fn read_lines<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let reader = BufReader::new(File::open(path)?);
    let mut records = Vec::new();
    for line in reader.lines() {
        let line = line?;
        if !line.trim().is_empty() {
            records.push(serde_json::from_str(&line)?);
        }
    }
    Ok(records)
}

/// Append one record to a JSONL file.
fn append_line<T: Serialize>(path: &Path, record: &T) -> Result<()> {
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    writeln!(file, "{}", serde_json::to_string(record)?)?;
    Ok(())
}

impl MessageStore for JsonlMessageStore {
    fn append(&self, conversation: &ConversationId, entry: NewEntry) -> Result<MessageEntry> {
        self.ensure_loaded(conversation)?;

        let mut cache = self.cache.write().map_err(|e| OpsError::Storage(e.to_string()))?;
        let entries = cache
            .get_mut(conversation)
            .ok_or_else(|| OpsError::Storage(format!("Conversation not loaded: {}", conversation)))?;

        let entry = entry.into_entry(entries);

        // Append to file first (source of truth)
        append_line(&self.conversation_path(conversation), &entry)?;

        entries.push(entry.clone());
        Ok(entry)
    }

    fn read(&self, conversation: &ConversationId) -> Result<Vec<MessageEntry>> {
        self.ensure_loaded(conversation)?;

        let cache = self.cache.read().map_err(|e| OpsError::Storage(e.to_string()))?;
        Ok(cache.get(conversation).cloned().unwrap_or_default())
    }

    fn append_audit(&self, audit: &TurnAudit) -> Result<()> {
        append_line(&self.audit_path(&audit.conversation_id), audit)
    }

    fn read_audit(&self, conversation: &ConversationId) -> Result<Vec<TurnAudit>> {
        read_lines(&self.audit_path(conversation))
    }
}
