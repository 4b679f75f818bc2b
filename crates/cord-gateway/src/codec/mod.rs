//! Wire codec seam
//!
//! The controller is encoding-agnostic: it hands envelopes to an injected
//! codec and receives envelopes back. The default driver speaks JSON; tests
//! may substitute their own.

use crate::protocol::Envelope;
use thiserror::Error;

/// Codec errors
#[derive(Debug, Error)]
pub enum CodecError {
    /// Failed to encode an envelope for the wire
    #[error("failed to encode envelope: {0}")]
    Encode(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// Failed to decode an inbound frame
    #[error("failed to decode envelope: {0}")]
    Decode(#[source] Box<dyn std::error::Error + Send + Sync>),
}

/// Encodes and decodes gateway envelopes.
pub trait Codec: Send + Sync + 'static {
    /// Encode an envelope into wire bytes.
    fn encode(&self, envelope: &Envelope) -> Result<Vec<u8>, CodecError>;

    /// Decode wire bytes into an envelope.
    fn decode(&self, raw: &[u8]) -> Result<Envelope, CodecError>;
}

/// The default JSON driver.
#[derive(Debug, Clone, Copy, Default)]
pub struct Json;

impl Codec for Json {
    fn encode(&self, envelope: &Envelope) -> Result<Vec<u8>, CodecError> {
        serde_json::to_vec(envelope).map_err(|err| CodecError::Encode(Box::new(err)))
    }

    fn decode(&self, raw: &[u8]) -> Result<Envelope, CodecError> {
        serde_json::from_slice(raw).map_err(|err| CodecError::Decode(Box::new(err)))
    }
}
