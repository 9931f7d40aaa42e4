//! Turn Orchestrator - sequences one user turn through the pipeline
//!
//! States: RECEIVED -> ROUTED -> POLICY_CHECKED -> {EXECUTED | DENIED | CLARIFY}
//! -> FORMATTED -> PERSISTED

mod stream;
mod turn;

pub use stream::{TurnChunk, TurnStream, chunk_words};
pub use turn::{TurnOrchestrator, TurnReply};
