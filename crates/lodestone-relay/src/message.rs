//! Relay wire frames and subscription filters
//!
//! Frames are JSON arrays with a leading verb, exchanged over a duplex
//! channel to each relay: the client sends `["EVENT", ...]`,
//! `["REQ", ...]`, `["CLOSE", ...]`; the relay answers with
//! `["EVENT", sub, ...]`, `["OK", id, bool, msg]`, `["EOSE", sub]`,
//! `["CLOSED", sub, msg]`, and `["NOTICE", msg]`. The socket itself is
//! supplied by the embedding application; this module only speaks the
//! frame grammar.

use lodestone_core::error::{Error, Result};
use lodestone_core::Event;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Frame sent from client to relay
#[derive(Clone, Debug, PartialEq)]
pub enum ClientMessage {
    /// Publish an event
    Event(Event),
    /// Open a subscription
    Req {
        subscription_id: String,
        filter: Filter,
    },
    /// Close a subscription
    Close { subscription_id: String },
}

/// Frame sent from relay to client
#[derive(Clone, Debug, PartialEq)]
pub enum RelayMessage {
    /// One event matching a subscription
    Event {
        subscription_id: String,
        event: Event,
    },
    /// Publish acknowledgement
    Ok {
        event_id: String,
        accepted: bool,
        message: String,
    },
    /// End of stored events for a subscription
    Eose { subscription_id: String },
    /// Relay-side subscription termination
    Closed {
        subscription_id: String,
        message: String,
    },
    /// Human-readable notice
    Notice { message: String },
}

impl ClientMessage {
    pub fn to_json(&self) -> Result<Value> {
        Ok(match self {
            ClientMessage::Event(event) => json!(["EVENT", event]),
            ClientMessage::Req {
                subscription_id,
                filter,
            } => json!(["REQ", subscription_id, filter]),
            ClientMessage::Close { subscription_id } => json!(["CLOSE", subscription_id]),
        })
    }

    pub fn from_json(value: &Value) -> Result<Self> {
        let frame = value
            .as_array()
            .ok_or_else(|| Error::Relay("frame is not an array".into()))?;
        let verb = frame
            .first()
            .and_then(Value::as_str)
            .ok_or_else(|| Error::Relay("frame missing verb".into()))?;

        match (verb, frame.len()) {
            ("EVENT", 2) => Ok(ClientMessage::Event(frame_value(&frame[1])?)),
            ("REQ", 3) => Ok(ClientMessage::Req {
                subscription_id: frame_str(&frame[1])?,
                filter: frame_value(&frame[2])?,
            }),
            ("CLOSE", 2) => Ok(ClientMessage::Close {
                subscription_id: frame_str(&frame[1])?,
            }),
            _ => Err(Error::Relay(format!("unrecognized client frame: {verb}"))),
        }
    }
}

impl RelayMessage {
    pub fn to_json(&self) -> Result<Value> {
        Ok(match self {
            RelayMessage::Event {
                subscription_id,
                event,
            } => json!(["EVENT", subscription_id, event]),
            RelayMessage::Ok {
                event_id,
                accepted,
                message,
            } => json!(["OK", event_id, accepted, message]),
            RelayMessage::Eose { subscription_id } => json!(["EOSE", subscription_id]),
            RelayMessage::Closed {
                subscription_id,
                message,
            } => json!(["CLOSED", subscription_id, message]),
            RelayMessage::Notice { message } => json!(["NOTICE", message]),
        })
    }

    pub fn from_json(value: &Value) -> Result<Self> {
        let frame = value
            .as_array()
            .ok_or_else(|| Error::Relay("frame is not an array".into()))?;
        let verb = frame
            .first()
            .and_then(Value::as_str)
            .ok_or_else(|| Error::Relay("frame missing verb".into()))?;

        match (verb, frame.len()) {
            ("EVENT", 3) => Ok(RelayMessage::Event {
                subscription_id: frame_str(&frame[1])?,
                event: frame_value(&frame[2])?,
            }),
            ("OK", 4) => Ok(RelayMessage::Ok {
                event_id: frame_str(&frame[1])?,
                accepted: frame[2]
                    .as_bool()
                    .ok_or_else(|| Error::Relay("OK frame flag must be a bool".into()))?,
                message: frame_str(&frame[3])?,
            }),
            ("EOSE", 2) => Ok(RelayMessage::Eose {
                subscription_id: frame_str(&frame[1])?,
            }),
            ("CLOSED", 3) => Ok(RelayMessage::Closed {
                subscription_id: frame_str(&frame[1])?,
                message: frame_str(&frame[2])?,
            }),
            ("NOTICE", 2) => Ok(RelayMessage::Notice {
                message: frame_str(&frame[1])?,
            }),
            _ => Err(Error::Relay(format!("unrecognized relay frame: {verb}"))),
        }
    }
}

fn frame_value<T: serde::de::DeserializeOwned>(value: &Value) -> Result<T> {
    serde_json::from_value(value.clone())
        .map_err(|e| Error::Relay(format!("malformed frame field: {e}")))
}

fn frame_str(value: &Value) -> Result<String> {
    value
        .as_str()
        .map(str::to_owned)
        .ok_or_else(|| Error::Relay("frame field must be a string".into()))
}

/// Subscription filter
///
/// Absent fields do not constrain. The `#d` entry is available for
/// identifier-scoped queries, though the resolver deliberately leaves
/// it unset and matches identifiers client-side.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Filter {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ids: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authors: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kinds: Option<Vec<u16>>,
    #[serde(rename = "#d", default, skip_serializing_if = "Option::is_none")]
    pub identifiers: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub since: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub until: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn author(mut self, pubkey: impl Into<String>) -> Self {
        self.authors.get_or_insert_with(Vec::new).push(pubkey.into());
        self
    }

    pub fn kind(mut self, kind: u16) -> Self {
        self.kinds.get_or_insert_with(Vec::new).push(kind);
        self
    }

    pub fn identifier(mut self, identifier: impl Into<String>) -> Self {
        self.identifiers
            .get_or_insert_with(Vec::new)
            .push(identifier.into());
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Whether `event` satisfies every set constraint (`limit` is a
    /// result cap, not a match condition)
    pub fn matches(&self, event: &Event) -> bool {
        if let Some(ids) = &self.ids {
            if !ids.iter().any(|id| *id == event.id) {
                return false;
            }
        }
        if let Some(authors) = &self.authors {
            if !authors.iter().any(|a| *a == event.pubkey) {
                return false;
            }
        }
        if let Some(kinds) = &self.kinds {
            if !kinds.contains(&event.kind) {
                return false;
            }
        }
        if let Some(identifiers) = &self.identifiers {
            let d = event.identifier().unwrap_or_default();
            if !identifiers.iter().any(|i| i == d) {
                return false;
            }
        }
        if let Some(since) = self.since {
            if event.created_at < since {
                return false;
            }
        }
        if let Some(until) = self.until {
            if event.created_at > until {
                return false;
            }
        }
        true
    }
}
