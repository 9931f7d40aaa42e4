//! Turn orchestrator: Router -> Policy -> Executor -> Formatter -> Memory
//!
//! Turns of different conversations run concurrently; turns of the same
//! conversation queue behind a per-conversation lock. Every turn ends with
//! the user message, the assistant reply and a `TurnAudit` persisted.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;

use crate::audit::{TurnAudit, TurnState, VerdictRecord};
use crate::config::TurnConfig;
use crate::error::{OpsError, Result};
use crate::executor::{ExecutionResult, ExecutionStatus, RemoteExecutor};
use crate::format::{ResponseFormatter, TurnOutcome};
use crate::id::{ConversationId, generate_turn_id};
use crate::memory::MemoryManager;
use crate::policy::{PolicyEngine, PolicyVerdict};
use crate::router::IntentRouter;

use super::stream::{TurnChunk, TurnStream, chunk_words};

const STREAM_BUFFER: usize = 16;

/// A completed, persisted turn
#[derive(Debug, Clone)]
pub struct TurnReply {
    pub turn_id: String,
    pub text: String,
    pub created_at: DateTime<Utc>,
    pub audit: TurnAudit,
}

type ConversationLocks = Mutex<HashMap<ConversationId, Arc<tokio::sync::Mutex<()>>>>;

pub struct TurnOrchestrator {
    router: IntentRouter,
    policy: PolicyEngine,
    executor: RemoteExecutor,
    memory: MemoryManager,
    formatter: Arc<dyn ResponseFormatter>,
    config: TurnConfig,
    locks: ConversationLocks,
}

impl TurnOrchestrator {
    pub fn new(
        router: IntentRouter,
        policy: PolicyEngine,
        executor: RemoteExecutor,
        memory: MemoryManager,
        formatter: Arc<dyn ResponseFormatter>,
        config: TurnConfig,
    ) -> Self {
        Self {
            router,
            policy,
            executor,
            memory,
            formatter,
            config,
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn policy(&self) -> &PolicyEngine {
        &self.policy
    }

    pub fn memory(&self) -> &MemoryManager {
        &self.memory
    }

    /// Process one turn in the background and stream its reply
    ///
    /// Chunks are sent only after the reply is formatted and persisted.
    pub fn process_turn(self: &Arc<Self>, conversation: ConversationId, user_text: impl Into<String>) -> TurnStream {
        let (tx, rx) = mpsc::channel(STREAM_BUFFER);
        let orchestrator = Arc::clone(self);
        let user_text = user_text.into();

        tokio::spawn(async move {
            let terminal = match orchestrator.run_turn(&conversation, &user_text).await {
                Ok(reply) => {
                    for chunk in chunk_words(&reply.text, orchestrator.config.stream_words_per_chunk) {
                        if tx.send(TurnChunk::Text(chunk)).await.is_err() {
                            log::debug!("[{}] Reader went away, turn {} already persisted", conversation, reply.turn_id);
                            return;
                        }
                    }
                    TurnChunk::Done {
                        turn_id: reply.turn_id,
                        created_at: reply.created_at,
                    }
                }
                Err(e) => {
                    log::error!("[{}] Turn failed: {}", conversation, e);
                    TurnChunk::Failed { message: e.to_string() }
                }
            };
            let _ = tx.send(terminal).await;
        });

        TurnStream::new(rx)
    }

    /// Process one turn to completion
    ///
    /// Only persistence failures are errors; every other outcome is a reply.
    pub async fn run_turn(&self, conversation: &ConversationId, user_text: &str) -> Result<TurnReply> {
        let lock = self.conversation_lock(conversation)?;
        let result = {
            let _guard = lock.lock().await;
            self.run_locked(conversation, user_text).await
        };
        drop(lock);
        self.release_lock(conversation);
        result
    }

    async fn run_locked(&self, conversation: &ConversationId, user_text: &str) -> Result<TurnReply> {
        let turn_id = generate_turn_id();
        let mut audit = TurnAudit::begin(&turn_id, conversation.clone(), user_text);
        log::debug!("[{}] {} -> {}", conversation, turn_id, TurnState::Received);

        let deadline = Duration::from_millis(self.config.turn_timeout_ms);
        let decided = tokio::time::timeout(deadline, self.decide(conversation, user_text, &mut audit)).await;
        let outcome = match decided {
            Ok(outcome) => outcome?,
            Err(_) => {
                log::warn!("[{}] Turn {} exceeded {}ms", conversation, turn_id, deadline.as_millis());
                timed_out(&mut audit, deadline)
            }
        };

        let text = self.formatter.format(&outcome, user_text).await;
        advance(&mut audit, TurnState::Formatted);

        let assistant = self
            .memory
            .record_turn(conversation, &turn_id, user_text, &text)
            .await?;
        advance(&mut audit, TurnState::Persisted);
        audit.finish();
        self.memory.store().append_audit(&audit)?;

        log::info!(
            "[{}] Turn {} finished via {}",
            conversation,
            turn_id,
            audit
                .states
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(" -> ")
        );

        Ok(TurnReply {
            turn_id,
            text,
            created_at: assistant.created_at,
            audit,
        })
    }

    /// Route, check, and execute; stops at the first terminal state
    async fn decide(&self, conversation: &ConversationId, user_text: &str, audit: &mut TurnAudit) -> Result<TurnOutcome> {
        let context = self.memory.build_context(conversation)?;

        let invocation = match self.router.route(user_text, &context).await {
            Ok(invocation) => invocation,
            Err(e @ OpsError::InferenceUnreachable(_)) => {
                audit.record_error(e.to_string());
                return Ok(TurnOutcome::Unavailable);
            }
            Err(e) => return Err(e),
        };
        audit.record_invocation(&invocation);
        advance(audit, TurnState::Routed);

        let verdict = self.policy.evaluate(&invocation);
        audit.record_verdict(&verdict);
        advance(audit, TurnState::PolicyChecked);

        let outcome = match verdict {
            PolicyVerdict::Approved(approved) => {
                let result = self.executor.execute(&approved).await;
                audit.record_execution(&result);
                advance(audit, TurnState::Executed);
                TurnOutcome::Executed(result)
            }
            PolicyVerdict::Denied(reason) => {
                advance(audit, TurnState::Denied);
                TurnOutcome::Denied(reason)
            }
            PolicyVerdict::NeedsClarification { question } => {
                advance(audit, TurnState::Clarify);
                TurnOutcome::Clarification(question)
            }
        };
        Ok(outcome)
    }

    fn conversation_lock(&self, conversation: &ConversationId) -> Result<Arc<tokio::sync::Mutex<()>>> {
        let mut locks = self.locks.lock().map_err(|e| OpsError::Storage(e.to_string()))?;
        Ok(locks.entry(conversation.clone()).or_default().clone())
    }

    /// Drop the lock entry once no turn holds or waits on it
    fn release_lock(&self, conversation: &ConversationId) {
        if let Ok(mut locks) = self.locks.lock() {
            if locks.get(conversation).is_some_and(|lock| Arc::strong_count(lock) == 1) {
                locks.remove(conversation);
            }
        }
    }

    /// Conversations with a turn in flight or queued
    pub fn active_conversations(&self) -> usize {
        self.locks.lock().map(|locks| locks.len()).unwrap_or(0)
    }

    pub async fn shutdown(&self) {
        self.executor.shutdown().await;
    }
}

/// Close out a turn whose deadline passed inside `decide`
///
/// An approved call that was still running ends as an executed timeout;
/// a router that never answered counts as an unreachable backend.
fn timed_out(audit: &mut TurnAudit, deadline: Duration) -> TurnOutcome {
    let message = format!("Turn exceeded {}ms", deadline.as_millis());
    audit.record_error(message.clone());

    let approved = matches!(audit.verdict, Some(VerdictRecord::Approved { .. }));
    let tool = audit.invocation.as_ref().map(|inv| inv.tool);
    match tool {
        Some(tool) if approved && audit.state() == TurnState::PolicyChecked => {
            let result = ExecutionResult::failed(tool, ExecutionStatus::Timeout, message)
                .with_duration(deadline.as_millis() as u64);
            audit.record_execution(&result);
            advance(audit, TurnState::Executed);
            TurnOutcome::Executed(result)
        }
        _ => TurnOutcome::Unavailable,
    }
}

fn advance(audit: &mut TurnAudit, state: TurnState) {
    log::debug!(
        "[{}] {} {} -> {}",
        audit.conversation_id,
        audit.turn_id,
        audit.state(),
        state
    );
    audit.enter(state);
}
