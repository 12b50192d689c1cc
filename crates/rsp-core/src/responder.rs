//! One turn: filter, select, deliver (speech or text), log.

use std::sync::Arc;

use crate::{
    domain::Modality,
    errors::Error,
    interaction::{InteractionLog, InteractionRecord},
    messaging::{
        port::MessagingPort,
        types::{IncomingMessage, OutgoingPayload},
    },
    selector::{ResponseSelector, Selection},
    settings::SessionSettings,
    speech::SpeechSynthesizer,
    Result,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IgnoreReason {
    Group,
    FromSelf,
    NoText,
}

#[derive(Clone, Debug, PartialEq)]
pub enum TurnOutcome {
    Ignored(IgnoreReason),
    ConsumedByCommand,
    Replied(InteractionRecord),
}

pub struct Responder {
    settings: Arc<SessionSettings>,
    selector: ResponseSelector,
    speech: Arc<dyn SpeechSynthesizer>,
    log: Arc<dyn InteractionLog>,
    language: String,
}

impl Responder {
    pub fn new(
        settings: Arc<SessionSettings>,
        selector: ResponseSelector,
        speech: Arc<dyn SpeechSynthesizer>,
        log: Arc<dyn InteractionLog>,
        language: impl Into<String>,
    ) -> Self {
        Self {
            settings,
            selector,
            speech,
            log,
            language: language.into(),
        }
    }

    pub fn settings(&self) -> &Arc<SessionSettings> {
        &self.settings
    }

    /// Process one inbound message to completion.
    ///
    /// Delivery failures are logged as failed interactions and returned; speech
    /// failures fall back to text and do not fail the turn.
    pub async fn handle(
        &self,
        messenger: Arc<dyn MessagingPort>,
        msg: IncomingMessage,
    ) -> Result<TurnOutcome> {
        if msg.is_group {
            return Ok(TurnOutcome::Ignored(IgnoreReason::Group));
        }
        if msg.from_self {
            return Ok(TurnOutcome::Ignored(IgnoreReason::FromSelf));
        }
        let Some(text) = msg.text.filter(|t| !t.is_empty()) else {
            return Ok(TurnOutcome::Ignored(IgnoreReason::NoText));
        };

        let cfg = self.settings.snapshot().await;
        let selection = self
            .selector
            .select(&text, &msg.sender, &cfg, messenger.clone())
            .await?;

        let (reply, modality, source) = match selection {
            Selection::ConsumedByCommand => {
                tracing::debug!(sender = %msg.sender, "turn consumed by command");
                return Ok(TurnOutcome::ConsumedByCommand);
            }
            Selection::Reply {
                text,
                modality,
                source,
            } => (text, modality, source),
        };
        tracing::debug!(sender = %msg.sender, ?source, ?modality, "reply selected");

        let caps = messenger.capabilities();
        let mut notes = Vec::new();

        let reply = match fit_message(&reply, caps.max_message_len) {
            Some(cut) => {
                notes.push(format!("truncated to {} characters", caps.max_message_len));
                cut
            }
            None => reply,
        };

        let modality = if modality == Modality::Speech && !caps.supports_voice_notes {
            notes.push("transport has no voice notes; sent as text".to_string());
            Modality::Text
        } else {
            modality
        };

        let (payload, delivered_as, note) = self.render(&reply, modality).await;
        notes.extend(note);

        let record = InteractionRecord::new(msg.sender.as_str(), &text, &reply, delivered_as);
        let record = if notes.is_empty() {
            record
        } else {
            record.with_note(notes.join("; "))
        };

        if let Err(e) = messenger.send(&msg.sender, payload).await {
            let reason = match e {
                Error::Delivery(reason) => reason,
                other => other.to_string(),
            };
            self.log.record(record.failed(reason.clone()));
            tracing::warn!(sender = %msg.sender, error = %reason, "reply delivery failed");
            return Err(Error::Delivery(reason));
        }

        self.log.record(record.clone());
        Ok(TurnOutcome::Replied(record))
    }

    /// Build the payload for the chosen modality, downgrading to text when
    /// synthesis fails.
    async fn render(
        &self,
        text: &str,
        modality: Modality,
    ) -> (OutgoingPayload, Modality, Option<String>) {
        if modality == Modality::Text {
            return (OutgoingPayload::Text(text.to_string()), Modality::Text, None);
        }

        match self.speech.synthesize(text, &self.language).await {
            Ok(payload) => (payload, Modality::Speech, None),
            Err(e) => {
                tracing::warn!(error = %e, "speech synthesis failed; sending text instead");
                (
                    OutgoingPayload::Text(text.to_string()),
                    Modality::Text,
                    Some(format!("sent as text: {e}")),
                )
            }
        }
    }
}

/// `Some(prefix)` when `text` exceeds `max_chars` characters.
fn fit_message(text: &str, max_chars: usize) -> Option<String> {
    if text.chars().count() <= max_chars {
        return None;
    }
    Some(text.chars().take(max_chars).collect())
}
