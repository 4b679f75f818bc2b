//! Gateway operation codes.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Which side of the connection emits a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Server to client
    Inbound,
    /// Client to server
    Outbound,
    /// Either side (heartbeats)
    Bidirectional,
}

/// Operation code of a gateway frame.
///
/// Carried on the wire as the bare integer in the `op` field; numbers this
/// client does not speak fail decoding with [`UnknownOpCode`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum OpCode {
    /// A named server event with a sequence number
    Dispatch,
    /// Liveness ping, answered by [`OpCode::HeartbeatAck`]
    Heartbeat,
    /// Fresh-session authentication
    Identify,
    /// Presence change
    StatusUpdate,
    /// Session recovery after a dropped socket
    Resume,
    /// Server orders the client to reconnect
    Reconnect,
    /// Server refused the session
    InvalidSession,
    /// Server's opening frame, carries the heartbeat interval
    Hello,
    /// Liveness pong
    HeartbeatAck,
}

impl OpCode {
    /// Which side of the connection may emit this frame.
    #[must_use]
    pub const fn direction(self) -> Direction {
        match self {
            Self::Heartbeat => Direction::Bidirectional,
            Self::Identify | Self::StatusUpdate | Self::Resume => Direction::Outbound,
            Self::Dispatch
            | Self::Reconnect
            | Self::InvalidSession
            | Self::Hello
            | Self::HeartbeatAck => Direction::Inbound,
        }
    }

    /// Whether a frame with this code is legitimate coming *from* the server.
    #[must_use]
    pub const fn expected_inbound(self) -> bool {
        !matches!(self.direction(), Direction::Outbound)
    }
}

impl From<OpCode> for u8 {
    fn from(op: OpCode) -> Self {
        match op {
            OpCode::Dispatch => 0,
            OpCode::Heartbeat => 1,
            OpCode::Identify => 2,
            OpCode::StatusUpdate => 3,
            OpCode::Resume => 6,
            OpCode::Reconnect => 7,
            OpCode::InvalidSession => 9,
            OpCode::Hello => 10,
            OpCode::HeartbeatAck => 11,
        }
    }
}

impl TryFrom<u8> for OpCode {
    type Error = UnknownOpCode;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Ok(match value {
            0 => Self::Dispatch,
            1 => Self::Heartbeat,
            2 => Self::Identify,
            3 => Self::StatusUpdate,
            6 => Self::Resume,
            7 => Self::Reconnect,
            9 => Self::InvalidSession,
            10 => Self::Hello,
            11 => Self::HeartbeatAck,
            other => return Err(UnknownOpCode(other)),
        })
    }
}

impl fmt::Display for OpCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Dispatch => "Dispatch",
            Self::Heartbeat => "Heartbeat",
            Self::Identify => "Identify",
            Self::StatusUpdate => "StatusUpdate",
            Self::Resume => "Resume",
            Self::Reconnect => "Reconnect",
            Self::InvalidSession => "InvalidSession",
            Self::Hello => "Hello",
            Self::HeartbeatAck => "HeartbeatAck",
        };
        f.write_str(name)
    }
}

/// An `op` number this client does not speak.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnknownOpCode(pub u8);

impl fmt::Display for UnknownOpCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown gateway op code {}", self.0)
    }
}

impl std::error::Error for UnknownOpCode {}
