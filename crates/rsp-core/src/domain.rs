use std::fmt;

use serde::{Deserialize, Serialize};

/// Opaque transport-level address of a conversation partner.
///
/// The transport decides the format (a chat id, a phone JID, ...); the core only
/// compares and displays it.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SenderId(pub String);

impl SenderId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SenderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// How an outgoing reply is delivered.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Modality {
    Text,
    Speech,
}

impl Modality {
    pub fn from_audio_flag(audio_reply_mode: bool) -> Self {
        if audio_reply_mode {
            Modality::Speech
        } else {
            Modality::Text
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Modality::Text => "Text",
            Modality::Speech => "Audio",
        }
    }
}

/// Canonical key form used by the knowledge base and the registry.
pub fn normalize(text: &str) -> String {
    text.trim().to_lowercase()
}
