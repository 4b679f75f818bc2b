//! Session authentication state.

use crate::protocol::{Identify, IdentifyProperties, Resume};
use serde_json::Value;

/// Holds the credential and the static Identify fields; produces the
/// Identify and Resume payloads for the handshake.
#[derive(Debug, Clone)]
pub struct Identifier {
    token: String,
    properties: IdentifyProperties,
    intents: Option<u64>,
    presence: Option<Value>,
}

impl Identifier {
    /// Identifier with default properties for this platform.
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            properties: IdentifyProperties::default(),
            intents: None,
            presence: None,
        }
    }

    /// Override the connection properties.
    #[must_use]
    pub fn with_properties(mut self, properties: IdentifyProperties) -> Self {
        self.properties = properties;
        self
    }

    /// Set the gateway intents bitmask.
    #[must_use]
    pub fn with_intents(mut self, intents: u64) -> Self {
        self.intents = Some(intents);
        self
    }

    /// Set the initial presence, sent verbatim with Identify.
    #[must_use]
    pub fn with_presence(mut self, presence: Value) -> Self {
        self.presence = Some(presence);
        self
    }

    /// The bot token.
    #[must_use]
    pub fn token(&self) -> &str {
        &self.token
    }

    /// Build the Identify payload for a fresh login.
    #[must_use]
    pub fn identify(&self) -> Identify {
        Identify {
            token: self.token.clone(),
            properties: self.properties.clone(),
            compress: None,
            large_threshold: None,
            presence: self.presence.clone(),
            intents: self.intents,
        }
    }

    /// Build the Resume payload for session recovery.
    #[must_use]
    pub fn resume(&self, session_id: String, seq: u64) -> Resume {
        Resume {
            token: self.token.clone(),
            session_id,
            seq,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_identify_carries_token_and_intents() {
        let identifier = Identifier::new("Bot abc").with_intents(513);

        let identify = identifier.identify();
        assert_eq!(identify.token, "Bot abc");
        assert_eq!(identify.intents, Some(513));
        assert!(identify.presence.is_none());
    }

    #[test]
    fn test_identify_carries_presence() {
        let identifier =
            Identifier::new("Bot abc").with_presence(json!({"status": "idle"}));

        let identify = identifier.identify();
        assert_eq!(identify.presence, Some(json!({"status": "idle"})));
    }

    #[test]
    fn test_resume_payload() {
        let identifier = Identifier::new("Bot abc");

        let resume = identifier.resume("S1".to_string(), 12);
        assert_eq!(resume.token, "Bot abc");
        assert_eq!(resume.session_id, "S1");
        assert_eq!(resume.seq, 12);
    }
}
