//! Tool Router - turns user text into a single structured decision
//!
//! The router makes exactly one inference call per turn and never executes
//! anything; malformed replies degrade to the clarification sentinel.

mod decision;
mod intent;

pub use decision::parse_decision;
pub use intent::{IntentRouter, MALFORMED_CLARIFICATION, ROUTER_TEMPERATURE};
