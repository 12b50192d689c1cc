use tokio::sync::RwLock;

use crate::config::Config;

pub const DEFAULT_AWAY_MESSAGE: &str = "Oi! No momento estou ocupado, mas estarei disponível a partir das 20:00. Assim que puder, te respondo. Desde já, agradeço a compreensão!";
pub const DEFAULT_MIN_SIMILARITY: f64 = 0.6;

/// Per-turn view of the process-wide reply settings.
#[derive(Clone, Debug, PartialEq)]
pub struct SessionConfig {
    pub away_mode: bool,
    pub audio_reply_mode: bool,
    /// Always within `[0, 1]`.
    pub min_similarity: f64,
    pub away_message: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            away_mode: false,
            audio_reply_mode: false,
            min_similarity: DEFAULT_MIN_SIMILARITY,
            away_message: DEFAULT_AWAY_MESSAGE.to_string(),
        }
    }
}

impl SessionConfig {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            away_mode: cfg.away_mode,
            audio_reply_mode: cfg.audio_reply_mode,
            min_similarity: cfg.min_similarity.clamp(0.0, 1.0),
            away_message: cfg.away_message.clone(),
        }
    }
}

/// Shared, administratively mutable settings.
///
/// Turns never hold the lock: they take a [`SessionConfig`] snapshot once and work
/// from that, so a toggle lands on whichever turns start after it.
#[derive(Debug, Default)]
pub struct SessionSettings {
    inner: RwLock<SessionConfig>,
}

impl SessionSettings {
    pub fn new(cfg: SessionConfig) -> Self {
        Self {
            inner: RwLock::new(cfg),
        }
    }

    pub async fn snapshot(&self) -> SessionConfig {
        self.inner.read().await.clone()
    }

    pub async fn set_away_mode(&self, on: bool) {
        self.inner.write().await.away_mode = on;
    }

    pub async fn set_audio_reply_mode(&self, on: bool) {
        self.inner.write().await.audio_reply_mode = on;
    }

    pub async fn set_away_message(&self, message: impl Into<String>) {
        self.inner.write().await.away_message = message.into();
    }
}
