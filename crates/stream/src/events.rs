use std::fmt;

use chrono::Utc;
use livequote_core::SessionId;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    QuoteUpdate,
    AiResponse,
    Connection,
    Error,
}

impl EventType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::QuoteUpdate => "quote_update",
            Self::AiResponse => "ai_response",
            Self::Connection => "connection",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One JSON object delivered to a subscriber.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct QuoteEvent {
    #[serde(rename = "type")]
    pub event_type: EventType,
    pub data: Value,
    /// Epoch milliseconds.
    pub timestamp: i64,
}

impl QuoteEvent {
    pub fn new(event_type: EventType, data: Value) -> Self {
        Self { event_type, data, timestamp: Utc::now().timestamp_millis() }
    }

    pub fn connection(session_id: &SessionId) -> Self {
        Self::new(EventType::Connection, json!({"status": "connected", "sessionId": session_id.as_str()}))
    }

    pub fn quote_update<T: Serialize>(payload: &T) -> Result<Self, serde_json::Error> {
        Ok(Self::new(EventType::QuoteUpdate, serde_json::to_value(payload)?))
    }

    pub fn ai_response<T: Serialize>(payload: &T) -> Result<Self, serde_json::Error> {
        Ok(Self::new(EventType::AiResponse, serde_json::to_value(payload)?))
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(EventType::Error, json!({"message": message.into()}))
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
