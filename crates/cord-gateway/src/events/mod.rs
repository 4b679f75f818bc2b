//! Dispatch events
//!
//! What the gateway forwards on its event channel: named server events with
//! their sequence number and an opaque payload, decoded lazily by the
//! consumer.

mod event_types;

pub use event_types::EventType;

use crate::protocol::Envelope;
use serde_json::Value;

/// A dispatch event received from the gateway.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    /// Event name from the `t` field, e.g. `MESSAGE_CREATE`
    pub name: String,

    /// Sequence number from the `s` field
    pub sequence: Option<u64>,

    /// Raw event payload
    pub data: Option<Value>,
}

impl Event {
    /// Build an event from a dispatch envelope.
    #[must_use]
    pub fn from_envelope(envelope: &Envelope) -> Self {
        Self {
            name: envelope.t.clone().unwrap_or_default(),
            sequence: envelope.s,
            data: envelope.d.clone(),
        }
    }

    /// The typed event kind, when the name is one this crate knows.
    #[must_use]
    pub fn kind(&self) -> Option<EventType> {
        EventType::parse(&self.name)
    }
}

impl std::fmt::Display for Event {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.sequence {
            Some(seq) => write!(f, "{} (s={seq})", self.name),
            None => write!(f, "{}", self.name),
        }
    }
}
