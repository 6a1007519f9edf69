//! Per-turn context passed to every tool execution.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// Context for the turn a tool call belongs to.
#[derive(Debug, Clone, Serialize)]
pub struct TurnContext {
    /// Unique turn ID.
    pub turn_id: Uuid,
    /// Conversation session this turn runs under.
    pub session_id: String,
    /// When the turn started.
    pub started_at: DateTime<Utc>,
    /// Free-form metadata.
    pub metadata: serde_json::Value,
}

impl Default for TurnContext {
    fn default() -> Self {
        Self {
            turn_id: Uuid::new_v4(),
            session_id: "default".to_string(),
            started_at: Utc::now(),
            metadata: serde_json::Value::Null,
        }
    }
}

impl TurnContext {
    /// Create a context for a new turn in `session_id`.
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            ..Default::default()
        }
    }
}
