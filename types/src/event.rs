use serde::{Deserialize, Serialize};

/// Event type used when a wire frame carries no `event` field.
pub const DEFAULT_EVENT_TYPE: &str = "message";

/// Payload of a [`RunEvent`].
///
/// The stream reader attempts a JSON decode of the joined `data` lines by
/// default; a payload that is not valid JSON is delivered as [`Text`]
/// verbatim rather than dropped. Callers that want strict handling supply
/// their own parser and map failures however they like.
///
/// [`Text`]: EventPayload::Text
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EventPayload {
    Json(serde_json::Value),
    Text(String),
}

impl EventPayload {
    /// Best-effort decode: JSON if the raw text parses, raw text otherwise.
    #[must_use]
    pub fn decode(raw: &str) -> Self {
        match serde_json::from_str(raw) {
            Ok(value) => Self::Json(value),
            Err(_) => Self::Text(raw.to_owned()),
        }
    }

    #[must_use]
    pub fn as_json(&self) -> Option<&serde_json::Value> {
        match self {
            Self::Json(value) => Some(value),
            Self::Text(_) => None,
        }
    }

    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Json(_) => None,
            Self::Text(text) => Some(text),
        }
    }
}

/// One decoded unit of a run's event feed.
///
/// Ephemeral: exists only for the duration of the callback invocation; the
/// reader keeps no history.
#[derive(Debug, Clone, PartialEq)]
pub struct RunEvent {
    /// Type tag from the wire frame, or [`DEFAULT_EVENT_TYPE`] when omitted.
    pub event_type: String,
    /// Decoded payload; `None` when the frame carried no `data` lines.
    pub payload: Option<EventPayload>,
    /// Server timestamp, passed through verbatim when present.
    pub ts: Option<String>,
}
