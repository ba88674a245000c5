//! Session gate. Admits inbound messages that belong to this session.

use openpeer_types::{PeerId, SessionId};
use openpeer_wire::Envelope;
use serde_json::Value;

/// Why a message was not admitted.
#[derive(Debug, Clone, PartialEq)]
pub enum Rejection {
    /// Not an envelope at all.
    Malformed(String),
    /// Envelope from another session.
    ForeignSession(SessionId),
    /// Our own application event coming back to us.
    OwnEvent,
}

/// Gate verdict for one inbound message.
#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    Admit(Envelope),
    Reject(Rejection),
}

/// Validates inbound messages for one channel.
#[derive(Debug, Clone)]
pub struct SessionGate {
    local: PeerId,
    session_id: SessionId,
}

impl SessionGate {
    /// Gate for the channel `local` in `session_id`.
    pub fn new(local: PeerId, session_id: SessionId) -> Self {
        Self { local, session_id }
    }

    /// Decide whether a raw message enters protocol processing.
    ///
    /// Internal envelopes are admitted whatever their sender; the self check
    /// only applies to application events.
    pub fn check(&self, message: Value) -> Verdict {
        let envelope = match Envelope::from_value(message) {
            Ok(envelope) => envelope,
            Err(e) => return Verdict::Reject(Rejection::Malformed(e.to_string())),
        };
        if envelope.session_id != self.session_id {
            return Verdict::Reject(Rejection::ForeignSession(envelope.session_id));
        }
        if !envelope.internal && envelope.sender == self.local {
            return Verdict::Reject(Rejection::OwnEvent);
        }
        Verdict::Admit(envelope)
    }
}
