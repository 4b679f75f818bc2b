//! # cord-gateway
//!
//! Client for the Discord real-time event gateway: the long-lived websocket
//! session that authenticates a bot, receives server push events, and keeps
//! itself alive through heartbeats with automatic reconnection and session
//! resumption.
//!
//! This crate does not abstract events into handlers; it exposes a single
//! dispatch event channel and leaves the rest to higher layers.

pub mod client;
pub mod codec;
pub mod error;
pub mod events;
pub mod protocol;
pub mod rest;
pub mod transport;

pub use client::{Gateway, Identifier, IdentifyProperties, Sequence};
pub use codec::{Codec, CodecError, Json};
pub use error::GatewayError;
pub use events::{Event, EventType};
pub use protocol::{CloseCode, Envelope, OpCode};
pub use transport::{CloseFrame, Transport, TransportError, WebsocketTransport};
