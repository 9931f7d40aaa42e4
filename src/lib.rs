//! opsgate - natural-language operations against one remote host
//!
//! Free-form requests are routed to a single allowlisted tool, checked by the
//! policy engine, executed over SSH with strict argument containment, and
//! answered conversationally with bounded, summarized history.

pub mod audit;
pub mod config;
pub mod error;
pub mod executor;
pub mod format;
pub mod id;
pub mod llm;
pub mod memory;
pub mod orchestrator;
pub mod policy;
pub mod router;
pub mod storage;
pub mod tools;

pub use error::{OpsError, Result};
