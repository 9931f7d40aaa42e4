//! ID generation utilities for opsgate
//!
//! Provides identifiers for turns and remote sessions, plus the validated
//! conversation id used as the persistence key.

use std::fmt;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::{OpsError, Result};

/// Get current timestamp in milliseconds since Unix epoch
pub fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Generate a unique turn ID
///
/// Format: `turn-{timestamp_ms}-{random_hex}`
/// Example: `turn-1738300800123-a1b2`
pub fn generate_turn_id() -> String {
    let random: u16 = rand::rng().random();
    format!("turn-{}-{:04x}", now_ms(), random)
}

/// Generate a remote session ID (also names the ssh control socket)
///
/// Format: `s{random_hex}`, kept short because unix socket paths are length-limited
pub fn generate_session_id() -> String {
    let random: u32 = rand::rng().random();
    format!("s{:08x}", random)
}

/// Validated conversation key: 1-64 chars of `[A-Za-z0-9_-]`
///
/// The id doubles as a file name in the JSONL store, so nothing else is accepted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ConversationId(String);

impl ConversationId {
    /// Validate and wrap a conversation id
    pub fn parse(raw: impl Into<String>) -> Result<Self> {
        let raw = raw.into();
        let valid = !raw.is_empty()
            && raw.len() <= 64
            && raw.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if valid {
            Ok(Self(raw))
        } else {
            Err(OpsError::InvalidConversation(raw))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConversationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for ConversationId {
    type Error = OpsError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(value)
    }
}

impl From<ConversationId> for String {
    fn from(id: ConversationId) -> Self {
        id.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_now_ms_returns_reasonable_timestamp() {
        let ts = now_ms();
        // Should be after 2020-01-01 and before 2100-01-01
        assert!(ts > 1577836800000);
        assert!(ts < 4102444800000);
    }

    #[test]
    fn test_generate_turn_id_format() {
        let id = generate_turn_id();
        let parts: Vec<&str> = id.split('-').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "turn");
        assert!(parts[1].chars().all(|c| c.is_ascii_digit()));
        assert_eq!(parts[2].len(), 4);
        assert!(parts[2].chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_generate_session_id_is_short() {
        let id = generate_session_id();
        assert!(id.starts_with('s'));
        assert_eq!(id.len(), 9);
    }

    #[test]
    fn test_conversation_id_accepts_simple_ids() {
        assert!(ConversationId::parse("conv-42").is_ok());
        assert!(ConversationId::parse("a_B_9").is_ok());
    }

    #[test]
    fn test_conversation_id_rejects_path_like_ids() {
        assert!(ConversationId::parse("").is_err());
        assert!(ConversationId::parse("../etc").is_err());
        assert!(ConversationId::parse("a/b").is_err());
        assert!(ConversationId::parse("x".repeat(65)).is_err());
    }

    #[test]
    fn test_conversation_id_deserialization_validates() {
        let ok: ConversationId = serde_json::from_str("\"ops-1\"").unwrap();
        assert_eq!(ok.as_str(), "ops-1");
        assert!(serde_json::from_str::<ConversationId>("\"bad id\"").is_err());
    }
}
