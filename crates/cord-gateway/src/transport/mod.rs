//! Websocket transport seam
//!
//! The controller only needs dial/send/recv/close; the concrete websocket
//! lives behind this trait so tests can script the wire.

mod websocket;

pub use websocket::WebsocketTransport;

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

/// Transport errors
#[derive(Debug, Error)]
pub enum TransportError {
    /// Operation attempted before a successful dial
    #[error("websocket is not connected")]
    NotConnected,

    /// Failed to establish the connection
    #[error("failed to dial websocket: {0}")]
    Dial(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// Failed to write a frame
    #[error("failed to send frame: {0}")]
    Send(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// Failed to read a frame
    #[error("failed to receive frame: {0}")]
    Receive(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// The read deadline elapsed without a frame
    #[error("read deadline elapsed")]
    ReadTimeout,

    /// The server closed the connection
    #[error("connection closed by peer: code {code}, reason: {reason}")]
    Closed {
        /// Websocket close code
        code: u16,
        /// Close reason, possibly empty
        reason: String,
    },

    /// The inbound stream ended without a close frame
    #[error("inbound stream ended")]
    StreamEnded,
}

/// Close frame sent when shutting the connection down.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseFrame {
    /// Websocket close code
    pub code: u16,
    /// Close reason
    pub reason: String,
}

impl CloseFrame {
    /// A normal-closure frame.
    #[must_use]
    pub fn normal() -> Self {
        Self {
            code: crate::protocol::CloseCode::Normal.as_u16(),
            reason: String::new(),
        }
    }
}

/// A connect/send/listen/close abstraction over one websocket connection.
///
/// `recv` surfaces the listen stream pull-style: each call yields the next
/// inbound frame or the error that ended the stream.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Establish the connection. Dialing again after a disconnect replaces
    /// the previous connection.
    async fn dial(&self) -> Result<(), TransportError>;

    /// Write one frame.
    async fn send(&self, frame: Vec<u8>) -> Result<(), TransportError>;

    /// Receive the next inbound frame.
    async fn recv(&self) -> Result<Vec<u8>, TransportError>;

    /// Terminate the connection, optionally sending a close frame first.
    async fn close(&self, frame: Option<CloseFrame>) -> Result<(), TransportError>;

    /// Set the deadline applied to each inbound read. `None` disables it.
    async fn set_read_timeout(&self, _timeout: Option<Duration>) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_close_frame_normal() {
        let frame = CloseFrame::normal();
        assert_eq!(frame.code, 1000);
        assert!(frame.reason.is_empty());
    }

    #[test]
    fn test_closed_error_display() {
        let err = TransportError::Closed {
            code: 4009,
            reason: "Session timed out".to_string(),
        };
        let display = err.to_string();
        assert!(display.contains("4009"));
        assert!(display.contains("Session timed out"));
    }
}
