use std::{
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::{
    errors::Error,
    settings::{DEFAULT_AWAY_MESSAGE, DEFAULT_MIN_SIMILARITY},
    Result,
};

/// Typed process configuration, read from the environment (and `.env`).
#[derive(Clone, Debug)]
pub struct Config {
    // Transport
    pub telegram_bot_token: Option<String>,
    pub auth_dir: PathBuf,
    pub poll_timeout: Duration,
    pub ask_relink: bool,

    // Reply behavior
    pub away_mode: bool,
    pub audio_reply_mode: bool,
    pub away_message: String,
    pub min_similarity: f64,
    pub knowledge_base_path: Option<PathBuf>,
    pub extra_responses_path: Option<PathBuf>,

    // Speech
    pub tts_language: String,
    pub tts_host: String,
    pub tts_slow: bool,

    // Interaction log
    pub interaction_log_path: Option<PathBuf>,
    pub interaction_log_json: bool,

    // Reconnect policy
    pub reconnect_max_attempts: u32,
    pub reconnect_base_delay: Duration,
    pub reconnect_max_delay: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            telegram_bot_token: None,
            auth_dir: PathBuf::from("./auth"),
            poll_timeout: Duration::from_secs(30),
            ask_relink: true,
            away_mode: true,
            audio_reply_mode: true,
            away_message: DEFAULT_AWAY_MESSAGE.to_string(),
            min_similarity: DEFAULT_MIN_SIMILARITY,
            knowledge_base_path: None,
            extra_responses_path: None,
            tts_language: "pt".to_string(),
            tts_host: "https://translate.google.com".to_string(),
            tts_slow: false,
            interaction_log_path: None,
            interaction_log_json: false,
            reconnect_max_attempts: 10,
            reconnect_base_delay: Duration::from_millis(1000),
            reconnect_max_delay: Duration::from_millis(60_000),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        load_dotenv_if_present(Path::new(".env"));
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from an arbitrary key lookup; `load()` passes the process environment.
    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let d = Self::default();

        let min_similarity = match get("MIN_SIMILARITY").and_then(non_empty) {
            Some(raw) => parse_similarity(&raw)?,
            None => d.min_similarity,
        };

        let reconnect_base_delay = get_u64(&get, "RECONNECT_BASE_DELAY_MS")
            .map(Duration::from_millis)
            .unwrap_or(d.reconnect_base_delay);
        let reconnect_max_delay = get_u64(&get, "RECONNECT_MAX_DELAY_MS")
            .map(Duration::from_millis)
            .unwrap_or(d.reconnect_max_delay)
            .max(reconnect_base_delay);

        Ok(Self {
            telegram_bot_token: get("TELEGRAM_BOT_TOKEN").and_then(non_empty),
            auth_dir: get("AUTH_DIR")
                .and_then(non_empty)
                .map(PathBuf::from)
                .unwrap_or(d.auth_dir),
            poll_timeout: get_u64(&get, "POLL_TIMEOUT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(d.poll_timeout),
            ask_relink: get_bool(&get, "ASK_RELINK").unwrap_or(d.ask_relink),
            away_mode: get_bool(&get, "AWAY_MODE").unwrap_or(d.away_mode),
            audio_reply_mode: get_bool(&get, "AUDIO_REPLY_MODE").unwrap_or(d.audio_reply_mode),
            away_message: get("AWAY_MESSAGE")
                .and_then(non_empty)
                .unwrap_or(d.away_message),
            min_similarity,
            knowledge_base_path: get("KNOWLEDGE_BASE_PATH")
                .and_then(non_empty)
                .map(PathBuf::from),
            extra_responses_path: get("EXTRA_RESPONSES_PATH")
                .and_then(non_empty)
                .map(PathBuf::from),
            tts_language: get("TTS_LANGUAGE")
                .and_then(non_empty)
                .unwrap_or(d.tts_language),
            tts_host: get("TTS_HOST")
                .and_then(non_empty)
                .map(|h| h.trim_end_matches('/').to_string())
                .unwrap_or(d.tts_host),
            tts_slow: get_bool(&get, "TTS_SLOW").unwrap_or(d.tts_slow),
            interaction_log_path: get("INTERACTION_LOG_PATH")
                .and_then(non_empty)
                .map(PathBuf::from),
            interaction_log_json: get_bool(&get, "INTERACTION_LOG_JSON")
                .unwrap_or(d.interaction_log_json),
            reconnect_max_attempts: get_u64(&get, "RECONNECT_MAX_ATTEMPTS")
                .map(|n| n.min(u32::MAX as u64) as u32)
                .unwrap_or(d.reconnect_max_attempts),
            reconnect_base_delay,
            reconnect_max_delay,
        })
    }
}

fn parse_similarity(raw: &str) -> Result<f64> {
    let v: f64 = raw
        .trim()
        .parse()
        .map_err(|_| Error::Config(format!("MIN_SIMILARITY is not a number: {raw}")))?;
    if !v.is_finite() {
        return Err(Error::Config(format!(
            "MIN_SIMILARITY must be finite, got {raw}"
        )));
    }
    Ok(v.clamp(0.0, 1.0))
}

/// Seeds the process environment from a `.env` file, if there is one.
///
/// Accepts `KEY=value` and shell-style `export KEY=value` lines; `#` starts a
/// comment line. Variables already set in the environment are left alone.
fn load_dotenv_if_present(path: &Path) {
    let Ok(contents) = fs::read_to_string(path) else {
        return;
    };

    for (key, val) in parse_dotenv(&contents) {
        if env::var_os(&key).is_none() {
            env::set_var(key, val);
        }
    }
}

fn parse_dotenv(contents: &str) -> Vec<(String, String)> {
    contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| {
            let line = line.strip_prefix("export ").unwrap_or(line);
            let (k, v) = line.split_once('=')?;
            let key = k.trim();
            if key.is_empty() {
                return None;
            }
            Some((key.to_string(), unquote(v.trim()).to_string()))
        })
        .collect()
}

fn unquote(val: &str) -> &str {
    for q in ['"', '\''] {
        if let Some(inner) = val.strip_prefix(q).and_then(|v| v.strip_suffix(q)) {
            return inner;
        }
    }
    val
}

fn get_bool(get: &impl Fn(&str) -> Option<String>, key: &str) -> Option<bool> {
    get(key).map(|s| {
        matches!(
            s.trim().to_lowercase().as_str(),
            "1" | "true" | "yes" | "on" | "s" | "sim"
        )
    })
}

fn get_u64(get: &impl Fn(&str) -> Option<String>, key: &str) -> Option<u64> {
    get(key).and_then(|s| s.trim().parse::<u64>().ok())
}

fn non_empty(s: String) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s)
    }
}
