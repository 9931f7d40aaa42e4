//! Memory manager: loads context and condenses long conversations
//!
//! The persisted log is re-read on every call. Once the messages after the
//! latest summary exceed `summarize_threshold`, all but the `keep_recent`
//! newest are folded into a new summary entry. If the inference backend is
//! down the context is truncated to the newest messages instead.

use std::sync::Arc;

use crate::config::MemoryConfig;
use crate::error::Result;
use crate::id::ConversationId;
use crate::llm::{CompletionRequest, LlmClient, Message};
use crate::storage::{EntryRole, MessageEntry, MessageStore, NewEntry};

use super::context::ConversationContext;

const SUMMARIZER_PROMPT: &str = "You are a concise summarizer. Summarize the following chat history into \
2-4 bullet points capturing the key facts and actions taken. Be brief.";

/// Default temperature for summaries
pub const SUMMARY_TEMPERATURE: f32 = 0.2;

pub struct MemoryManager {
    store: Arc<dyn MessageStore>,
    llm: Arc<dyn LlmClient>,
    config: MemoryConfig,
    temperature: f32,
}

impl MemoryManager {
    pub fn new(store: Arc<dyn MessageStore>, llm: Arc<dyn LlmClient>, config: MemoryConfig) -> Self {
        Self {
            store,
            llm,
            config,
            temperature: SUMMARY_TEMPERATURE,
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn store(&self) -> &Arc<dyn MessageStore> {
        &self.store
    }

    /// Latest summary plus at most `summarize_threshold` recent messages
    pub fn build_context(&self, conversation: &ConversationId) -> Result<ConversationContext> {
        let entries = self.store.read(conversation)?;
        let summary = latest_summary(&entries).map(|s| s.content.clone());
        let mut live = live_entries(&entries);

        let limit = self.config.summarize_threshold;
        if live.len() > limit {
            log::debug!(
                "Context for {} has {} messages, keeping newest {}",
                conversation,
                live.len(),
                limit
            );
            live.drain(..live.len() - limit);
        }

        let turns = live
            .into_iter()
            .map(|entry| match entry.role {
                EntryRole::User => Message::user(&entry.content),
                _ => Message::assistant(&entry.content),
            })
            .collect();

        Ok(ConversationContext::new(summary, turns))
    }

    /// Append a user/assistant pair, then condense if over the threshold
    ///
    /// Returns the stored assistant entry. Summarization problems are logged
    /// and never fail the call.
    pub async fn record_turn(
        &self,
        conversation: &ConversationId,
        turn_id: &str,
        user_text: &str,
        assistant_text: &str,
    ) -> Result<MessageEntry> {
        self.store
            .append(conversation, NewEntry::user(user_text).with_turn(turn_id))?;
        let assistant = self
            .store
            .append(conversation, NewEntry::assistant(assistant_text).with_turn(turn_id))?;

        if let Err(e) = self.maybe_summarize(conversation).await {
            log::warn!("Summarization for {} failed to persist: {}", conversation, e);
        }
        Ok(assistant)
    }

    /// Returns the new summary entry when one was written
    async fn maybe_summarize(&self, conversation: &ConversationId) -> Result<Option<MessageEntry>> {
        let entries = self.store.read(conversation)?;
        let live = live_entries(&entries);
        if live.len() <= self.config.summarize_threshold {
            return Ok(None);
        }

        let split = live.len() - self.config.keep_recent.min(live.len());
        let to_summarize = &live[..split];
        let Some(last) = to_summarize.last() else {
            return Ok(None);
        };
        let covers_through = last.seq;

        let mut history = String::new();
        if let Some(previous) = latest_summary(&entries) {
            history.push_str(&format!("EARLIER SUMMARY: {}\n", previous.content.trim()));
        }
        for entry in to_summarize {
            let content: String = entry.content.chars().take(self.config.summary_input_chars).collect();
            history.push_str(&format!("{}: {}\n", entry.role.as_str().to_uppercase(), content));
        }

        let request = CompletionRequest::new(SUMMARIZER_PROMPT)
            .with_user_message(history)
            .with_temperature(self.temperature);

        let summary = match self.llm.complete(request).await {
            Ok(response) if !response.content.trim().is_empty() => response.content.trim().to_string(),
            Ok(_) => {
                log::warn!("Empty summary for {}, falling back to truncation", conversation);
                return Ok(None);
            }
            Err(e) => {
                log::warn!("Summarization for {} unavailable ({}), falling back to truncation", conversation, e);
                return Ok(None);
            }
        };

        log::info!(
            "Summarized {} messages of {} through seq {}",
            to_summarize.len(),
            conversation,
            covers_through
        );
        let entry = self
            .store
            .append(conversation, NewEntry::summary(summary, covers_through))?;
        Ok(Some(entry))
    }
}

fn latest_summary(entries: &[MessageEntry]) -> Option<&MessageEntry> {
    entries.iter().rev().find(|e| e.is_summary())
}

/// Messages not yet folded into the latest summary
fn live_entries(entries: &[MessageEntry]) -> Vec<&MessageEntry> {
    let covered = latest_summary(entries).and_then(|s| s.covers_through).unwrap_or(0);
    entries
        .iter()
        .filter(|e| !e.is_summary() && e.seq > covered)
        .collect()
}
