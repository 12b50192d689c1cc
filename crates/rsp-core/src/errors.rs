/// Core error type for the responder.
///
/// Adapter crates map their specific errors into this type so the turn runner and
/// the connection supervisor can apply one policy (fall back, surface, or retry).
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("speech synthesis failed: {0}")]
    Synthesis(String),

    #[error("delivery failed: {0}")]
    Delivery(String),

    #[error("transport reported the session as logged out")]
    LoggedOut,

    #[error("gave up reconnecting after {attempts} attempts")]
    RetriesExhausted { attempts: u32 },

    #[error("external error: {0}")]
    External(String),
}

impl Error {
    /// Terminal errors end the connection lifecycle; everything else is per-turn.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Error::LoggedOut | Error::RetriesExhausted { .. })
    }
}

pub type Result<T> = std::result::Result<T, Error>;
