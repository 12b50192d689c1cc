use serde::{Deserialize, Serialize};

use crate::domain::SenderId;

/// Opaque credential blob owned by the transport (token, session keys, ...).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Credentials(pub serde_json::Value);

/// Connection state as reported by the transport.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LinkState {
    Connecting,
    Open,
    Closed,
}

/// Why the transport closed the connection.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CloseReason {
    /// The account was unlinked / the credentials were revoked. Never retried.
    LoggedOut,
    Other(String),
}

/// One inbound chat message, already stripped of transport-specific shapes.
#[derive(Clone, Debug)]
pub struct IncomingMessage {
    pub sender: SenderId,
    /// `None` for non-text content (stickers, media, ...).
    pub text: Option<String>,
    /// Addressed to a multi-party conversation.
    pub is_group: bool,
    /// Authored by the account we are connected as.
    pub from_self: bool,
}

impl IncomingMessage {
    pub fn text(sender: SenderId, text: impl Into<String>) -> Self {
        Self {
            sender,
            text: Some(text.into()),
            is_group: false,
            from_self: false,
        }
    }
}

/// Tagged union of everything a live connection can emit.
#[derive(Clone, Debug)]
pub enum TransportEvent {
    CredentialsUpdated(Credentials),
    ConnectionStateChanged {
        state: LinkState,
        reason: Option<CloseReason>,
    },
    MessageReceived(IncomingMessage),
}

impl TransportEvent {
    pub fn opened() -> Self {
        TransportEvent::ConnectionStateChanged {
            state: LinkState::Open,
            reason: None,
        }
    }

    pub fn closed(reason: CloseReason) -> Self {
        TransportEvent::ConnectionStateChanged {
            state: LinkState::Closed,
            reason: Some(reason),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AudioClip {
    pub bytes: Vec<u8>,
    pub mime_type: String,
    pub is_voice_note: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum OutgoingPayload {
    Text(String),
    Audio(AudioClip),
}

/// Capabilities / feature flags of a transport implementation.
#[derive(Clone, Copy, Debug)]
pub struct MessagingCapabilities {
    pub supports_voice_notes: bool,
    pub max_message_len: usize,
}
