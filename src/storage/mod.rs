//! Storage layer for opsgate - append-only conversation logs and turn audits.
//!
//! This module provides the `MessageStore` abstraction with a JSONL-backed
//! implementation for the binary and an in-process one for tests.

mod jsonl;
mod memory;
mod traits;

pub use jsonl::JsonlMessageStore;
pub use memory::MemoryMessageStore;
pub use traits::{EntryRole, MessageEntry, MessageStore, NewEntry};
