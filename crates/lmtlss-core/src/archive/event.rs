//! The Event type and its canonical/legacy event-type vocabulary.

use crate::error::ArchiveError;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Canonical event type vocabulary. `Display`/`FromStr` normalize legacy
/// aliases (e.g. `user_message` → `author_message`) on append.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    AuthorMessage,
    AssistantMessage,
    SystemEvent,
    IdentityCheck,
    Heartbeat,
    WorldAction,
    SensorData,
    CompilationEvent,
    ReflectionEvent,
}

impl EventType {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::AuthorMessage => "author_message",
            Self::AssistantMessage => "assistant_message",
            Self::SystemEvent => "system_event",
            Self::IdentityCheck => "identity_check",
            Self::Heartbeat => "heartbeat",
            Self::WorldAction => "world_action",
            Self::SensorData => "sensor_data",
            Self::CompilationEvent => "compilation_event",
            Self::ReflectionEvent => "reflection_event",
        }
    }

    /// Normalize a raw event type string, accepting both canonical names and
    /// known legacy aliases.
    ///
    /// # Errors
    ///
    /// Returns [`ArchiveError::UnknownEventType`] if the string matches
    /// neither a canonical name nor a known alias.
    pub fn normalize(raw: &str) -> Result<Self, ArchiveError> {
        Ok(match raw {
            "author_message" | "user_message" => Self::AuthorMessage,
            "assistant_message" | "agent_message" => Self::AssistantMessage,
            "system_event" => Self::SystemEvent,
            "identity_check" | "presence" => Self::IdentityCheck,
            "heartbeat" => Self::Heartbeat,
            "world_action" | "action" => Self::WorldAction,
            "sensor_data" | "sensor" => Self::SensorData,
            "compilation_event" | "compile_event" => Self::CompilationEvent,
            "reflection_event" | "reflection" => Self::ReflectionEvent,
            other => {
                return Err(ArchiveError::UnknownEventType {
                    event_type: other.to_string(),
                });
            }
        })
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// An Archive entry: one line of a day partition plus its index locators.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Event {
    #[serde(rename = "eventHash")]
    pub event_hash: String,
    #[serde(rename = "parentHash")]
    pub parent_hash: Option<String>,
    pub timestamp: String,
    #[serde(rename = "sessionKey")]
    pub session_key: String,
    #[serde(rename = "eventType")]
    pub event_type: String,
    #[serde(rename = "agentId")]
    pub agent_id: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub channel: Option<String>,
    #[serde(default)]
    pub peer: Option<String>,
    pub payload: Value,

    /// Locators, not part of the JSONL record itself — populated from the
    /// index row when an event is read back.
    #[serde(skip)]
    pub payload_file: String,
    #[serde(skip)]
    pub payload_line: usize,
}

impl Event {
    /// Recompute the hash from this event's stored fields and compare to
    /// `event_hash`.
    #[must_use]
    pub fn verify_hash(&self) -> bool {
        let recomputed = crate::archive::hash::compute_event_hash(
            self.parent_hash.as_deref(),
            &self.timestamp,
            &self.event_type,
            &self.agent_id,
            &self.payload,
        );
        recomputed == self.event_hash
    }

    /// Serialize this event to its JSONL record form (no trailing newline,
    /// locators excluded).
    ///
    /// # Errors
    ///
    /// Returns a `serde_json::Error` if serialization fails, which should
    /// not happen for a well-formed `Event`.
    pub fn to_jsonl_line(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
