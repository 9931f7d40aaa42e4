//! Context/Memory Manager - bounded conversation history for the router

mod context;
mod manager;

pub use context::ConversationContext;
pub use manager::{MemoryManager, SUMMARY_TEMPERATURE};
