//! Telegram adapter (teloxide).
//!
//! Implements the `rsp-core` transport and messaging ports over the Bot API with
//! long polling. The bot token is the credential blob: `{"token": "..."}`.

use std::{
    sync::{
        atomic::{AtomicI32, Ordering},
        Arc,
    },
    time::Duration,
};

use async_trait::async_trait;

use teloxide::{
    prelude::*,
    types::{InputFile, Update, UpdateKind, UserId},
    ApiError, RequestError,
};

use tokio::{sync::mpsc, task::JoinHandle, time::sleep};
use tokio_util::sync::CancellationToken;

use rsp_core::{
    domain::SenderId,
    errors::Error,
    messaging::{
        port::{MessagingPort, Transport, TransportConnection},
        types::{
            CloseReason, Credentials, IncomingMessage, LinkState, MessagingCapabilities,
            OutgoingPayload, TransportEvent,
        },
    },
    Result,
};

const EVENT_BUFFER: usize = 64;

#[derive(Clone)]
pub struct TelegramMessenger {
    bot: Bot,
}

impl TelegramMessenger {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }

    fn tg_chat(to: &SenderId) -> Result<teloxide::types::ChatId> {
        to.as_str()
            .parse::<i64>()
            .map(teloxide::types::ChatId)
            .map_err(|_| Error::Delivery(format!("not a telegram chat id: {to}")))
    }

    fn map_err(e: RequestError) -> Error {
        Error::Delivery(format!("telegram error: {e}"))
    }

    /// Runs one Bot API call, honoring a single 429 `RetryAfter` before giving up.
    /// Every other failure surfaces as a delivery error for the turn to log.
    async fn with_retry<T, Fut>(&self, mut op: impl FnMut() -> Fut) -> Result<T>
    where
        Fut: std::future::IntoFuture<Output = std::result::Result<T, RequestError>>,
        Fut::IntoFuture: Send,
    {
        const MAX_RETRIES: usize = 1;
        let mut attempts = 0usize;
        loop {
            match op().await {
                Ok(v) => return Ok(v),
                Err(e) => match e {
                    RequestError::RetryAfter(d) if attempts < MAX_RETRIES => {
                        attempts += 1;
                        tracing::debug!(wait = ?d, "telegram rate limit; retrying send");
                        sleep(d).await;
                        continue;
                    }
                    other => return Err(Self::map_err(other)),
                },
            }
        }
    }
}

#[async_trait]
impl MessagingPort for TelegramMessenger {
    fn capabilities(&self) -> MessagingCapabilities {
        MessagingCapabilities {
            supports_voice_notes: true,
            max_message_len: 4096,
        }
    }

    async fn send(&self, to: &SenderId, payload: OutgoingPayload) -> Result<()> {
        let chat = Self::tg_chat(to)?;
        match payload {
            OutgoingPayload::Text(text) => {
                self.with_retry(|| self.bot.send_message(chat, text.clone()))
                    .await?;
            }
            OutgoingPayload::Audio(clip) => {
                let file = InputFile::memory(clip.bytes).file_name("reply.mp3");
                if clip.is_voice_note {
                    self.with_retry(|| self.bot.send_voice(chat, file.clone()))
                        .await?;
                } else {
                    self.with_retry(|| self.bot.send_audio(chat, file.clone()))
                        .await?;
                }
            }
        }
        Ok(())
    }
}

/// Opens long-polling connections to the Bot API.
///
/// The `getUpdates` offset lives here rather than in a connection, so a reconnect
/// resumes after the last update already handed to the supervisor.
#[derive(Clone, Debug)]
pub struct TelegramTransport {
    configured_token: Option<String>,
    poll_timeout: Duration,
    offset: Arc<AtomicI32>,
}

/// Where the token for a connection attempt came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TokenSource {
    Configured,
    Stored,
}

impl TelegramTransport {
    /// `configured_token` (environment or prompt) takes precedence over stored
    /// credentials.
    pub fn new(configured_token: Option<String>, poll_timeout: Duration) -> Self {
        Self {
            configured_token,
            poll_timeout,
            offset: Arc::new(AtomicI32::new(0)),
        }
    }

    /// Offset the next poller starts from.
    pub fn resume_offset(&self) -> i32 {
        self.offset.load(Ordering::SeqCst)
    }

    fn pick_token(&self, credentials: Option<&Credentials>) -> Option<(String, TokenSource)> {
        if let Some(token) = self.configured_token.as_deref().map(str::trim) {
            if !token.is_empty() {
                return Some((token.to_string(), TokenSource::Configured));
            }
        }
        credentials
            .and_then(token_from)
            .map(|t| (t, TokenSource::Stored))
    }

    fn bot(&self, token: String) -> Result<Bot> {
        // The HTTP timeout must outlast a full long poll.
        let client = teloxide::net::default_reqwest_settings()
            .timeout(self.poll_timeout + Duration::from_secs(10))
            .build()
            .map_err(|e| Error::External(format!("telegram http client: {e}")))?;
        Ok(Bot::with_client(token, client))
    }
}

pub fn credentials_for(token: &str) -> Credentials {
    Credentials(serde_json::json!({ "token": token }))
}

pub fn token_from(credentials: &Credentials) -> Option<String> {
    credentials
        .0
        .get("token")
        .and_then(|t| t.as_str())
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
}

#[async_trait]
impl Transport for TelegramTransport {
    async fn connect(
        &self,
        credentials: Option<Credentials>,
    ) -> Result<Box<dyn TransportConnection>> {
        // Nothing to authenticate with: the operator has to re-link.
        let (token, source) = self
            .pick_token(credentials.as_ref())
            .ok_or(Error::LoggedOut)?;
        tracing::info!(
            ?source,
            offset = self.resume_offset(),
            "connecting to telegram"
        );

        let bot = self.bot(token.clone())?;
        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        let cancel = CancellationToken::new();

        let poller = tokio::spawn(poll_updates(
            bot.clone(),
            token,
            self.poll_timeout,
            self.offset.clone(),
            tx,
            cancel.clone(),
        ));

        Ok(Box::new(TelegramConnection {
            events: rx,
            messenger: Arc::new(TelegramMessenger::new(bot)),
            cancel,
            poller: Some(poller),
        }))
    }
}

struct TelegramConnection {
    events: mpsc::Receiver<TransportEvent>,
    messenger: Arc<TelegramMessenger>,
    cancel: CancellationToken,
    poller: Option<JoinHandle<()>>,
}

#[async_trait]
impl TransportConnection for TelegramConnection {
    async fn next_event(&mut self) -> Option<TransportEvent> {
        self.events.recv().await
    }

    fn messenger(&self) -> Arc<dyn MessagingPort> {
        self.messenger.clone()
    }

    async fn close(&mut self) {
        self.cancel.cancel();
        if let Some(poller) = self.poller.take() {
            let _ = poller.await;
        }
    }
}

impl Drop for TelegramConnection {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn poll_updates(
    bot: Bot,
    token: String,
    poll_timeout: Duration,
    offset: Arc<AtomicI32>,
    tx: mpsc::Sender<TransportEvent>,
    cancel: CancellationToken,
) {
    let connecting = TransportEvent::ConnectionStateChanged {
        state: LinkState::Connecting,
        reason: None,
    };
    if tx.send(connecting).await.is_err() {
        return;
    }

    let me = tokio::select! {
        _ = cancel.cancelled() => return,
        r = bot.get_me().send() => r,
    };
    let me = match me {
        Ok(me) => me,
        Err(e) => {
            let _ = tx.send(TransportEvent::closed(close_reason(&e))).await;
            return;
        }
    };
    tracing::info!(username = %me.username(), "telegram session authenticated");

    for event in [
        TransportEvent::opened(),
        TransportEvent::CredentialsUpdated(credentials_for(&token)),
    ] {
        if tx.send(event).await.is_err() {
            return;
        }
    }

    let bot_id = me.id;
    let timeout_secs = poll_timeout.as_secs().min(u32::MAX as u64) as u32;

    loop {
        let request = bot
            .get_updates()
            .offset(offset.load(Ordering::SeqCst))
            .timeout(timeout_secs);
        let updates = tokio::select! {
            _ = cancel.cancelled() => return,
            r = request.send() => r,
        };

        let updates = match updates {
            Ok(updates) => updates,
            Err(e) => {
                tracing::warn!(error = %e, "telegram polling failed");
                let _ = tx.send(TransportEvent::closed(close_reason(&e))).await;
                return;
            }
        };

        for update in updates {
            let id = update.id;
            if let Some(event) = map_update(update, bot_id) {
                // Undelivered updates stay unconfirmed for the next connection.
                if tx.send(event).await.is_err() {
                    return;
                }
            }
            mark_delivered(&offset, id);
        }
    }
}

/// Confirms `update_id` so neither this poller nor a later one fetches it again.
fn mark_delivered(offset: &AtomicI32, update_id: i32) {
    offset.fetch_max(update_id.saturating_add(1), Ordering::SeqCst);
}

/// An invalid or revoked token means the session is gone for good.
pub fn close_reason(e: &RequestError) -> CloseReason {
    match e {
        RequestError::Api(ApiError::NotFound) => CloseReason::LoggedOut,
        other => CloseReason::Other(other.to_string()),
    }
}

/// Only plain messages become events; edits, callbacks and the rest are skipped.
pub fn map_update(update: Update, bot_id: UserId) -> Option<TransportEvent> {
    let UpdateKind::Message(msg) = update.kind else {
        return None;
    };

    Some(TransportEvent::MessageReceived(IncomingMessage {
        sender: SenderId::new(msg.chat.id.0.to_string()),
        text: msg.text().map(str::to_string),
        is_group: !msg.chat.is_private(),
        from_self: msg.from().is_some_and(|u| u.id == bot_id),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn update(value: serde_json::Value) -> Update {
        serde_json::from_str(&value.to_string()).unwrap()
    }

    fn private_text(from_id: u64, text: &str) -> Update {
        update(json!({
            "update_id": 10,
            "message": {
                "message_id": 5,
                "date": 1_700_000_000,
                "chat": {"id": 42, "type": "private", "first_name": "Ana"},
                "from": {"id": from_id, "is_bot": false, "first_name": "Ana"},
                "text": text
            }
        }))
    }

    #[test]
    fn private_text_message_maps_to_incoming() {
        let ev = map_update(private_text(42, "Oi"), UserId(999)).unwrap();
        let TransportEvent::MessageReceived(msg) = ev else {
            panic!("expected a message event");
        };
        assert_eq!(msg.sender, SenderId::new("42"));
        assert_eq!(msg.text.as_deref(), Some("Oi"));
        assert!(!msg.is_group);
        assert!(!msg.from_self);
    }

    #[test]
    fn own_messages_are_flagged() {
        let ev = map_update(private_text(999, "echo"), UserId(999)).unwrap();
        let TransportEvent::MessageReceived(msg) = ev else {
            panic!("expected a message event");
        };
        assert!(msg.from_self);
    }

    #[test]
    fn group_messages_are_flagged() {
        let u = update(json!({
            "update_id": 11,
            "message": {
                "message_id": 6,
                "date": 1_700_000_000,
                "chat": {"id": -100, "type": "group", "title": "familia"},
                "from": {"id": 42, "is_bot": false, "first_name": "Ana"},
                "text": "oi"
            }
        }));
        let TransportEvent::MessageReceived(msg) = map_update(u, UserId(999)).unwrap() else {
            panic!("expected a message event");
        };
        assert!(msg.is_group);
        assert_eq!(msg.sender, SenderId::new("-100"));
    }

    #[test]
    fn invalid_token_is_a_logout() {
        assert_eq!(
            close_reason(&RequestError::Api(ApiError::NotFound)),
            CloseReason::LoggedOut
        );
        assert!(matches!(
            close_reason(&RequestError::Api(ApiError::BotBlocked)),
            CloseReason::Other(_)
        ));
    }

    #[test]
    fn token_round_trips_through_credentials() {
        assert_eq!(
            token_from(&credentials_for("123:abc")).as_deref(),
            Some("123:abc")
        );
        assert_eq!(token_from(&Credentials(json!({"token": "  "}))), None);
        assert_eq!(token_from(&Credentials(json!({}))), None);
    }

    #[tokio::test]
    async fn connect_without_any_token_is_a_logout() {
        let transport = TelegramTransport::new(None, Duration::from_secs(1));
        assert!(matches!(
            transport.connect(None).await,
            Err(Error::LoggedOut)
        ));
    }

    #[test]
    fn malformed_chat_id_is_a_delivery_error() {
        assert!(matches!(
            TelegramMessenger::tg_chat(&SenderId::new("abc")),
            Err(Error::Delivery(_))
        ));
        assert_eq!(
            TelegramMessenger::tg_chat(&SenderId::new("-5")).unwrap(),
            teloxide::types::ChatId(-5)
        );
    }

    #[test]
    fn offset_carries_over_to_the_next_connection() {
        let transport =
            TelegramTransport::new(Some("1:abc".to_string()), Duration::from_secs(1));
        assert_eq!(transport.resume_offset(), 0);

        // The poller of the first connection hands out updates 5..=7, then dies.
        let poller_offset = transport.offset.clone();
        for id in 5..=7 {
            mark_delivered(&poller_offset, id);
        }
        drop(poller_offset);

        assert_eq!(transport.resume_offset(), 8);
        assert_eq!(transport.clone().resume_offset(), 8);
    }

    #[test]
    fn offset_never_moves_backwards() {
        let offset = AtomicI32::new(0);
        mark_delivered(&offset, 9);
        mark_delivered(&offset, 3);
        assert_eq!(offset.load(Ordering::SeqCst), 10);
    }

    #[test]
    fn configured_token_wins_over_stored_one() {
        let stored = credentials_for("old:revoked");

        let transport =
            TelegramTransport::new(Some("new:rotated".to_string()), Duration::from_secs(1));
        assert_eq!(
            transport.pick_token(Some(&stored)),
            Some(("new:rotated".to_string(), TokenSource::Configured))
        );

        let transport = TelegramTransport::new(None, Duration::from_secs(1));
        assert_eq!(
            transport.pick_token(Some(&stored)),
            Some(("old:revoked".to_string(), TokenSource::Stored))
        );
        assert_eq!(transport.pick_token(None), None);

        let blank = TelegramTransport::new(Some("  ".to_string()), Duration::from_secs(1));
        assert_eq!(
            blank.pick_token(Some(&stored)).map(|(_, s)| s),
            Some(TokenSource::Stored)
        );
    }
}
