//! Gateway control envelope
//!
//! Every frame on the wire is an envelope of opcode, optional sequence
//! number, optional event type, and an opaque payload that consumers decode
//! lazily.

use super::{Hello, Identify, OpCode, Resume};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The gateway control envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    /// Operation code
    pub op: OpCode,

    /// Event data payload
    #[serde(skip_serializing_if = "Option::is_none")]
    pub d: Option<Value>,

    /// Sequence number (only on op=0 Dispatch)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub s: Option<u64>,

    /// Event type (only on op=0 Dispatch)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub t: Option<String>,
}

impl Envelope {
    // === Client frames ===

    /// Wrap an arbitrary payload under the given op code.
    #[must_use]
    pub fn wrap(op: OpCode, data: Option<Value>) -> Self {
        Self {
            op,
            d: data,
            s: None,
            t: None,
        }
    }

    /// Create a Heartbeat frame (op=1) carrying the last observed sequence
    /// number, or null when none has been seen yet.
    #[must_use]
    pub fn heartbeat(last_sequence: Option<u64>) -> Self {
        Self::wrap(OpCode::Heartbeat, Some(match last_sequence {
            Some(seq) => Value::Number(seq.into()),
            None => Value::Null,
        }))
    }

    /// Create an Identify frame (op=2).
    #[must_use]
    pub fn identify(payload: &Identify) -> Self {
        Self::wrap(OpCode::Identify, serde_json::to_value(payload).ok())
    }

    /// Create a Resume frame (op=6).
    #[must_use]
    pub fn resume(payload: &Resume) -> Self {
        Self::wrap(OpCode::Resume, serde_json::to_value(payload).ok())
    }

    // === Parsing server frames ===

    /// Try to parse as a Hello payload (op=10).
    pub fn as_hello(&self) -> Option<Hello> {
        if self.op != OpCode::Hello {
            return None;
        }
        self.d.as_ref().and_then(|d| serde_json::from_value(d.clone()).ok())
    }

    /// Decode the payload into a concrete type.
    pub fn payload<T: serde::de::DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        let data = self.d.clone().unwrap_or(Value::Null);
        serde_json::from_value(data)
    }

    /// The dispatch event name, when this is a Dispatch frame.
    #[must_use]
    pub fn event_name(&self) -> Option<&str> {
        if self.op != OpCode::Dispatch {
            return None;
        }
        self.t.as_deref()
    }
}

impl std::fmt::Display for Envelope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(t) = &self.t {
            write!(f, "Envelope(op={}, t={}", self.op, t)?;
            if let Some(s) = self.s {
                write!(f, ", s={s}")?;
            }
            write!(f, ")")
        } else {
            write!(f, "Envelope(op={})", self.op)
        }
    }
}
