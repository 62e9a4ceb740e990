//! Nostr relay message types.
//!
//! This module implements the relay protocol messages:
//! - Client to Relay: EVENT, REQ, CLOSE, AUTH (NIP-42), COUNT (NIP-45)
//! - Relay to Client: EVENT, OK, EOSE, CLOSED, NOTICE, AUTH, COUNT
//!
//! It also implements the envelope used when talking to a multiplexing
//! proxy. Outbound frames are wrapped as `[{"relays": [...]}, <message>]` and
//! inbound frames arrive as `[{"url": "..."}, <message>]`.

use nostr::{Event, Filter};
use serde_json::{Value, json};
use thiserror::Error;

/// Errors that can occur when parsing relay messages.
#[derive(Debug, Error)]
pub enum MessageError {
    #[error("invalid message format: {0}")]
    InvalidFormat(String),

    #[error("unknown message type: {0}")]
    UnknownType(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("missing field: {0}")]
    MissingField(String),
}

/// Messages sent from client to relay.
#[derive(Debug, Clone)]
pub enum ClientMessage {
    /// Publish an event: ["EVENT", <event JSON>]
    Event(Event),

    /// Subscribe to events: ["REQ", <subscription_id>, <filter1>, <filter2>, ...]
    Req {
        subscription_id: String,
        filters: Vec<Filter>,
    },

    /// Close a subscription: ["CLOSE", <subscription_id>]
    Close { subscription_id: String },

    /// Authentication (NIP-42): ["AUTH", <event JSON>]
    Auth(Event),

    /// Count request (NIP-45): ["COUNT", <subscription_id>, <filter1>, ...]
    Count {
        subscription_id: String,
        filters: Vec<Filter>,
    },
}

impl ClientMessage {
    /// Build the JSON array sent to the relay.
    pub fn to_value(&self) -> Result<Value, MessageError> {
        let value = match self {
            ClientMessage::Event(event) => json!(["EVENT", event]),
            ClientMessage::Req {
                subscription_id,
                filters,
            } => with_filters("REQ", subscription_id, filters)?,
            ClientMessage::Close { subscription_id } => json!(["CLOSE", subscription_id]),
            ClientMessage::Auth(event) => json!(["AUTH", event]),
            ClientMessage::Count {
                subscription_id,
                filters,
            } => with_filters("COUNT", subscription_id, filters)?,
        };
        Ok(value)
    }

    /// Serialize to JSON text.
    pub fn to_json(&self) -> Result<String, MessageError> {
        Ok(self.to_value()?.to_string())
    }
}

fn with_filters(verb: &str, subscription_id: &str, filters: &[Filter]) -> Result<Value, MessageError> {
    let mut arr: Vec<Value> = vec![
        Value::String(verb.to_string()),
        Value::String(subscription_id.to_string()),
    ];
    for filter in filters {
        arr.push(serde_json::to_value(filter)?);
    }
    Ok(Value::Array(arr))
}

/// Messages sent from relay to client.
#[derive(Debug, Clone)]
pub enum RelayMessage {
    /// Event matching a subscription: ["EVENT", <subscription_id>, <event JSON>]
    Event {
        subscription_id: String,
        event: Event,
    },

    /// Command result: ["OK", <event_id>, <true|false>, <message>]
    Ok {
        event_id: String,
        success: bool,
        message: String,
    },

    /// End of stored events: ["EOSE", <subscription_id>]
    Eose { subscription_id: String },

    /// Subscription closed by relay: ["CLOSED", <subscription_id>, <message>]
    Closed {
        subscription_id: String,
        message: String,
    },

    /// Human-readable notice: ["NOTICE", <message>]
    Notice { message: String },

    /// Authentication challenge (NIP-42): ["AUTH", <challenge>]
    Auth { challenge: String },

    /// Count response (NIP-45): ["COUNT", <subscription_id>, {"count": <n>}]
    Count { subscription_id: String, count: u64 },
}

fn string_at(arr: &[Value], index: usize, field: &str) -> Result<String, MessageError> {
    arr.get(index)
        .ok_or_else(|| MessageError::MissingField(field.to_string()))?
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| MessageError::InvalidFormat(format!("{} not a string", field)))
}

impl RelayMessage {
    /// Parse a JSON message from the relay.
    pub fn from_json(json: &str) -> Result<Self, MessageError> {
        let value: Value =
            serde_json::from_str(json).map_err(|e| MessageError::InvalidFormat(e.to_string()))?;
        Self::from_value(value)
    }

    /// Parse an already decoded frame.
    pub fn from_value(value: Value) -> Result<Self, MessageError> {
        let Value::Array(mut arr) = value else {
            return Err(MessageError::InvalidFormat("not an array".to_string()));
        };

        if arr.is_empty() {
            return Err(MessageError::InvalidFormat("empty array".to_string()));
        }

        let msg_type = arr[0]
            .as_str()
            .ok_or_else(|| MessageError::InvalidFormat("first element not a string".to_string()))?
            .to_string();

        match msg_type.as_str() {
            "EVENT" => {
                let subscription_id = string_at(&arr, 1, "subscription_id")?;
                if arr.len() < 3 {
                    return Err(MessageError::MissingField("event".to_string()));
                }
                let event: Event = serde_json::from_value(arr.swap_remove(2))?;
                Ok(RelayMessage::Event {
                    subscription_id,
                    event,
                })
            }
            "OK" => {
                let event_id = string_at(&arr, 1, "event_id")?;
                let success = arr
                    .get(2)
                    .ok_or_else(|| MessageError::MissingField("success".to_string()))?
                    .as_bool()
                    .ok_or_else(|| {
                        MessageError::InvalidFormat("success not a boolean".to_string())
                    })?;
                let message = arr.get(3).and_then(Value::as_str).unwrap_or("").to_string();
                Ok(RelayMessage::Ok {
                    event_id,
                    success,
                    message,
                })
            }
            "EOSE" => Ok(RelayMessage::Eose {
                subscription_id: string_at(&arr, 1, "subscription_id")?,
            }),
            "CLOSED" => Ok(RelayMessage::Closed {
                subscription_id: string_at(&arr, 1, "subscription_id")?,
                message: arr.get(2).and_then(Value::as_str).unwrap_or("").to_string(),
            }),
            "NOTICE" => Ok(RelayMessage::Notice {
                message: string_at(&arr, 1, "message")?,
            }),
            "AUTH" => Ok(RelayMessage::Auth {
                challenge: string_at(&arr, 1, "challenge")?,
            }),
            "COUNT" => {
                let subscription_id = string_at(&arr, 1, "subscription_id")?;
                let count = arr
                    .get(2)
                    .and_then(Value::as_object)
                    .ok_or_else(|| MessageError::InvalidFormat("count not an object".to_string()))?
                    .get("count")
                    .and_then(Value::as_u64)
                    .ok_or_else(|| MessageError::MissingField("count value".to_string()))?;
                Ok(RelayMessage::Count {
                    subscription_id,
                    count,
                })
            }
            _ => Err(MessageError::UnknownType(msg_type)),
        }
    }
}

/// Wrap an outbound frame for a multiplexing proxy.
pub fn wrap_multiplexed(relays: &[String], frame: Value) -> Value {
    json!([{ "relays": relays }, frame])
}

/// Split an inbound multiplexed frame into its origin relay and the inner message.
pub fn unwrap_multiplexed(frame: Value) -> Result<(String, Value), MessageError> {
    let Value::Array(mut arr) = frame else {
        return Err(MessageError::InvalidFormat("envelope not an array".to_string()));
    };

    if arr.len() != 2 {
        return Err(MessageError::InvalidFormat(format!(
            "envelope has {} elements",
            arr.len()
        )));
    }

    let message = arr.pop().unwrap_or(Value::Null);
    let url = arr[0]
        .get("url")
        .and_then(Value::as_str)
        .ok_or_else(|| MessageError::MissingField("url".to_string()))?
        .to_string();

    Ok((url, message))
}
