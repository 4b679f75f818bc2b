//! Gateway error types

use crate::codec::CodecError;
use crate::protocol::{CloseCode, OpCode};
use crate::rest::RestError;
use crate::transport::TransportError;
use cord_heart::HeartError;
use thiserror::Error;

/// Gateway error type
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Fetching the gateway endpoint failed
    #[error("failed to get gateway endpoint: {0}")]
    Rest(#[from] RestError),

    /// The websocket transport failed
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Encoding or decoding an envelope failed
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// Converting a payload to a JSON value failed
    #[error("failed to encode payload: {0}")]
    Payload(#[from] serde_json::Error),

    /// The pacemaker died
    #[error("pacemaker died: {0}")]
    Heart(#[from] HeartError),

    /// An outbound write missed its deadline
    #[error("send deadline elapsed")]
    SendTimeout,

    /// The handshake saw a frame it did not expect
    #[error("unexpected opcode during handshake: expected {expected}, got {got}")]
    UnexpectedOpcode {
        /// The opcode the handshake required
        expected: OpCode,
        /// The opcode that actually arrived
        got: OpCode,
    },

    /// A handshake frame was missing its payload
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The server delivered a frame with no payload at all
    #[error("server sent an empty frame")]
    EmptyFrame,

    /// The server rejected the session; a fresh login is required
    #[error("session invalidated by the server")]
    InvalidSession,

    /// The server asked the client to reconnect
    #[error("reconnect requested by the server")]
    ReconnectRequested,

    /// Resume was attempted without a session id or sequence
    #[error("missing session id or sequence for resuming")]
    MissingForResume,

    /// Every reconnect attempt failed
    #[error("max reconnect tries reached")]
    MaxTriesReached,
}

impl GatewayError {
    /// Whether this error makes the current session unusable.
    ///
    /// Session-fatal errors end the event loop and drive the reconnect path;
    /// everything else is logged and the loop keeps going.
    #[must_use]
    pub fn is_session_fatal(&self) -> bool {
        match self {
            Self::Transport(_)
            | Self::Codec(_)
            | Self::Heart(_)
            | Self::SendTimeout
            | Self::EmptyFrame
            | Self::InvalidSession
            | Self::ReconnectRequested => true,
            Self::Rest(_)
            | Self::Payload(_)
            | Self::UnexpectedOpcode { .. }
            | Self::Protocol(_)
            | Self::MissingForResume
            | Self::MaxTriesReached => false,
        }
    }

    /// Whether the reconnect machinery should bother retrying after this
    /// error.
    ///
    /// A server close frame carrying a non-recoverable gateway code (bad
    /// token, rejected intents) fails identically on every redial; such an
    /// error goes straight to the fatal slot instead.
    #[must_use]
    pub fn should_reconnect(&self) -> bool {
        match self {
            Self::Transport(TransportError::Closed { code, .. }) => {
                CloseCode::from_u16(*code).map_or(true, CloseCode::should_reconnect)
            }
            _ => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_fatal_classification() {
        assert!(GatewayError::EmptyFrame.is_session_fatal());
        assert!(GatewayError::InvalidSession.is_session_fatal());
        assert!(GatewayError::ReconnectRequested.is_session_fatal());
        assert!(GatewayError::Transport(TransportError::StreamEnded).is_session_fatal());
        assert!(GatewayError::Heart(HeartError::Dead).is_session_fatal());

        assert!(!GatewayError::Protocol("bad hello".to_string()).is_session_fatal());
        assert!(!GatewayError::MaxTriesReached.is_session_fatal());
        assert!(!GatewayError::MissingForResume.is_session_fatal());
    }

    #[test]
    fn test_close_code_reconnect_policy() {
        let closed = |code| {
            GatewayError::Transport(TransportError::Closed {
                code,
                reason: String::new(),
            })
        };

        assert!(!closed(4004).should_reconnect(), "bad token is terminal");
        assert!(!closed(4014).should_reconnect(), "rejected intents are terminal");
        assert!(closed(4009).should_reconnect(), "session timeout is retryable");
        assert!(closed(3999).should_reconnect(), "unknown codes default to retry");

        // Everything that is not a close frame stays on the retry path.
        assert!(GatewayError::EmptyFrame.should_reconnect());
        assert!(GatewayError::Heart(HeartError::Dead).should_reconnect());
    }

    #[test]
    fn test_error_chains_display() {
        let err = GatewayError::Transport(TransportError::NotConnected);
        assert!(err.to_string().contains("not connected"));

        let err = GatewayError::UnexpectedOpcode {
            expected: OpCode::Hello,
            got: OpCode::HeartbeatAck,
        };
        assert!(err.to_string().contains("Hello"));
        assert!(err.to_string().contains("HeartbeatAck"));
    }
}
