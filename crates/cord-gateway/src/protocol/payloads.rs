//! Handshake payload definitions
//!
//! Payload structures for the control frames the session controller
//! exchanges; event payloads beyond these stay opaque.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Payload of op 10 (Hello)
///
/// First frame the server sends after the socket opens.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Hello {
    /// Heartbeat interval in milliseconds
    pub heartbeat_interval: u64,
}

impl Hello {
    /// The heartbeat interval as a duration.
    #[must_use]
    pub fn heartrate(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.heartbeat_interval)
    }
}

/// Payload of op 2 (Identify)
///
/// Sent by the client to authenticate a fresh session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Identify {
    /// Bot token
    pub token: String,

    /// Client properties
    pub properties: IdentifyProperties,

    /// Whether the server may compress payloads
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compress: Option<bool>,

    /// Offline-member threshold for large guilds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub large_threshold: Option<u64>,

    /// Initial presence, sent verbatim
    #[serde(skip_serializing_if = "Option::is_none")]
    pub presence: Option<Value>,

    /// Gateway intents bitmask
    #[serde(skip_serializing_if = "Option::is_none")]
    pub intents: Option<u64>,
}

impl Identify {
    /// Create an Identify payload with default properties.
    #[must_use]
    pub fn new(token: String) -> Self {
        Self {
            token,
            properties: IdentifyProperties::default(),
            compress: None,
            large_threshold: None,
            presence: None,
            intents: None,
        }
    }
}

/// Client connection properties
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentifyProperties {
    /// Operating system
    #[serde(rename = "$os")]
    pub os: String,

    /// Library name
    #[serde(rename = "$browser")]
    pub browser: String,

    /// Device name
    #[serde(rename = "$device")]
    pub device: String,
}

impl IdentifyProperties {
    /// Properties describing this library on the current platform.
    #[must_use]
    pub fn new() -> Self {
        Self {
            os: std::env::consts::OS.to_string(),
            browser: "cord".to_string(),
            device: "cord".to_string(),
        }
    }

    /// Set the operating system
    #[must_use]
    pub fn with_os(mut self, os: impl Into<String>) -> Self {
        self.os = os.into();
        self
    }

    /// Set the browser name
    #[must_use]
    pub fn with_browser(mut self, browser: impl Into<String>) -> Self {
        self.browser = browser.into();
        self
    }

    /// Set the device name
    #[must_use]
    pub fn with_device(mut self, device: impl Into<String>) -> Self {
        self.device = device.into();
        self
    }
}

impl Default for IdentifyProperties {
    fn default() -> Self {
        Self::new()
    }
}

/// Payload of op 6 (Resume)
///
/// Sent by the client to recover a dropped session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Resume {
    /// Bot token
    pub token: String,

    /// Session ID to resume
    pub session_id: String,

    /// Last received sequence number
    pub seq: u64,
}

/// The slice of the READY dispatch payload the controller needs.
///
/// Everything else in READY is left to consumers of the event channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ready {
    /// Gateway protocol version
    #[serde(default)]
    pub v: Option<u64>,

    /// Session ID required for resuming
    pub session_id: String,
}
