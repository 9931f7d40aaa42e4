//! Policy Engine - validates proposed invocations before anything reaches the remote host
//!
//! This module provides:
//! - ToolInvocation / PolicyVerdict / DenialReason types
//! - ApprovedInvocation, the only input the executor accepts
//! - Lexical workspace path containment
//! - PolicyEngine, a pure and deterministic evaluator

mod engine;
mod path;
mod verdict;

pub use engine::PolicyEngine;
pub use path::{ForbiddenPattern, PathRejection, ResolvedPath, WorkspaceRoot};
pub use verdict::{ApprovedInvocation, DenialReason, PolicyVerdict, ToolInvocation};
