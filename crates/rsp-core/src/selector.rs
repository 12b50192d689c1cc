//! Reply policy: away gate, then commands, then extra responses, then fuzzy lookup.

use std::sync::Arc;

use crate::{
    domain::{normalize, Modality, SenderId},
    knowledge::KnowledgeBase,
    messaging::port::MessagingPort,
    registry::{CommandContext, ResponseRegistry},
    settings::SessionConfig,
    Result,
};

/// Label quoted by the clarification wrapper when nothing matched at all.
pub const NO_CANDIDATE_LABEL: &str = "I didn't understand";

/// Which tier produced the outgoing text.
#[derive(Clone, Debug, PartialEq)]
pub enum ReplySource {
    Away,
    ExtraResponse,
    Knowledge { score: f64 },
    Clarification { score: f64 },
}

#[derive(Clone, Debug, PartialEq)]
pub enum Selection {
    /// A registered command took the turn; nothing else is sent or logged.
    ConsumedByCommand,
    Reply {
        text: String,
        modality: Modality,
        source: ReplySource,
    },
}

impl Selection {
    pub fn text(&self) -> Option<&str> {
        match self {
            Selection::ConsumedByCommand => None,
            Selection::Reply { text, .. } => Some(text),
        }
    }
}

/// `Did you mean: "<candidate>"?`
pub fn clarification(candidate: Option<&str>) -> String {
    format!(
        "Did you mean: \"{}\"?",
        candidate.unwrap_or(NO_CANDIDATE_LABEL)
    )
}

#[derive(Clone, Debug)]
pub struct ResponseSelector {
    registry: Arc<ResponseRegistry>,
    knowledge: Arc<KnowledgeBase>,
}

impl ResponseSelector {
    pub fn new(registry: Arc<ResponseRegistry>, knowledge: Arc<KnowledgeBase>) -> Self {
        Self {
            registry,
            knowledge,
        }
    }

    pub fn registry(&self) -> &ResponseRegistry {
        &self.registry
    }

    /// Decide the reply for one turn.
    ///
    /// `cfg` is the turn's snapshot; it is not re-read. Modality comes from
    /// `audio_reply_mode` alone, whichever tier produced the text.
    pub async fn select(
        &self,
        raw_text: &str,
        sender: &SenderId,
        cfg: &SessionConfig,
        messenger: Arc<dyn MessagingPort>,
    ) -> Result<Selection> {
        let modality = Modality::from_audio_flag(cfg.audio_reply_mode);

        if cfg.away_mode {
            return Ok(Selection::Reply {
                text: cfg.away_message.clone(),
                modality,
                source: ReplySource::Away,
            });
        }

        let normalized = normalize(raw_text);

        let ctx = CommandContext {
            messenger,
            sender: sender.clone(),
            raw_text: raw_text.to_string(),
            settings: cfg.clone(),
        };
        if self.registry.try_execute_command(&normalized, &ctx).await? {
            return Ok(Selection::ConsumedByCommand);
        }

        if let Some(text) = self.registry.try_get_response(&normalized) {
            return Ok(Selection::Reply {
                text: text.to_string(),
                modality,
                source: ReplySource::ExtraResponse,
            });
        }

        let best = self.knowledge.best_match(&normalized);
        let (text, source) = if best.score >= cfg.min_similarity && best.response.is_some() {
            (
                best.response.unwrap_or_default(),
                ReplySource::Knowledge { score: best.score },
            )
        } else {
            (
                clarification(best.response.as_deref()),
                ReplySource::Clarification { score: best.score },
            )
        };

        Ok(Selection::Reply {
            text,
            modality,
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        knowledge::KnowledgeEntry,
        messaging::types::OutgoingPayload,
        registry::{tests::RecordingMessenger, ReplyCommand},
        settings::DEFAULT_AWAY_MESSAGE,
    };

    fn selector(registry: ResponseRegistry) -> ResponseSelector {
        ResponseSelector::new(Arc::new(registry), Arc::new(KnowledgeBase::builtin()))
    }

    fn text_cfg() -> SessionConfig {
        SessionConfig {
            away_mode: false,
            audio_reply_mode: false,
            ..SessionConfig::default()
        }
    }

    async fn select(sel: &ResponseSelector, text: &str, cfg: &SessionConfig) -> Selection {
        let messenger = Arc::new(RecordingMessenger::default());
        sel.select(text, &SenderId::new("5511"), cfg, messenger)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn greeting_matches_exactly() {
        let sel = selector(ResponseRegistry::new());
        let out = select(&sel, "oi", &text_cfg()).await;
        assert_eq!(
            out,
            Selection::Reply {
                text: "Oi! Como posso te ajudar?".to_string(),
                modality: Modality::Text,
                source: ReplySource::Knowledge { score: 1.0 },
            }
        );
    }

    #[tokio::test]
    async fn raw_text_is_normalized_before_lookup() {
        let sel = selector(ResponseRegistry::new());
        let out = select(&sel, "  Boa Tarde ", &text_cfg()).await;
        assert_eq!(out.text(), Some("Boa tarde! Em que posso ajudar?"));
    }

    #[tokio::test]
    async fn near_miss_above_threshold_still_answers() {
        let sel = selector(ResponseRegistry::new());
        let out = select(&sel, "boa tardee", &text_cfg()).await;
        assert_eq!(out.text(), Some("Boa tarde! Em que posso ajudar?"));
    }

    #[tokio::test]
    async fn gibberish_gets_clarification_wrapper() {
        let sel = selector(ResponseRegistry::new());
        let out = select(&sel, "xzqv", &text_cfg()).await;
        let Selection::Reply { text, source, .. } = out else {
            panic!("expected a reply");
        };
        let ReplySource::Clarification { score } = source else {
            panic!("expected clarification, got {source:?}");
        };
        assert!(score < 0.6);
        assert!(text.starts_with("Did you mean: \""), "{text}");
        assert!(text.ends_with("\"?"), "{text}");
    }

    #[tokio::test]
    async fn empty_knowledge_base_uses_fallback_label() {
        let sel = ResponseSelector::new(
            Arc::new(ResponseRegistry::new()),
            Arc::new(KnowledgeBase::default()),
        );
        let out = select(&sel, "oi", &text_cfg()).await;
        assert_eq!(out.text(), Some("Did you mean: \"I didn't understand\"?"));
    }

    #[tokio::test]
    async fn threshold_of_one_requires_exact_trigger() {
        let sel = ResponseSelector::new(
            Arc::new(ResponseRegistry::new()),
            Arc::new(KnowledgeBase::new(vec![KnowledgeEntry::new(
                ["abcd"],
                "letters",
            )])),
        );
        let cfg = SessionConfig {
            min_similarity: 1.0,
            ..text_cfg()
        };
        assert_eq!(select(&sel, "abcd", &cfg).await.text(), Some("letters"));
        assert_eq!(
            select(&sel, "abce", &cfg).await.text(),
            Some("Did you mean: \"letters\"?")
        );
    }

    #[tokio::test]
    async fn away_mode_overrides_every_tier() {
        let mut reg = ResponseRegistry::new();
        reg.register_command("oi", ReplyCommand("command".to_string()));
        reg.register_response("menu", "extra");
        let sel = selector(reg);
        let cfg = SessionConfig {
            away_mode: true,
            ..text_cfg()
        };

        for input in ["oi", "menu", "boa tarde", "xzqv", ""] {
            let messenger = Arc::new(RecordingMessenger::default());
            let out = sel
                .select(input, &SenderId::new("1"), &cfg, messenger.clone())
                .await
                .unwrap();
            assert_eq!(
                out,
                Selection::Reply {
                    text: DEFAULT_AWAY_MESSAGE.to_string(),
                    modality: Modality::Text,
                    source: ReplySource::Away,
                }
            );
            assert!(messenger.sent().is_empty(), "command must not run");
        }
    }

    #[tokio::test]
    async fn command_beats_knowledge_base() {
        let mut reg = ResponseRegistry::new();
        reg.register_command("ping", ReplyCommand("custom pong".to_string()));
        let sel = selector(reg);

        let messenger = Arc::new(RecordingMessenger::default());
        let out = sel
            .select("ping", &SenderId::new("1"), &text_cfg(), messenger.clone())
            .await
            .unwrap();

        assert_eq!(out, Selection::ConsumedByCommand);
        assert_eq!(out.text(), None);
        assert_eq!(
            messenger.sent(),
            vec![(
                SenderId::new("1"),
                OutgoingPayload::Text("custom pong".to_string())
            )]
        );
    }

    #[tokio::test]
    async fn extra_response_beats_knowledge_base() {
        let mut reg = ResponseRegistry::new();
        reg.register_response("Bom Dia", "Bom dia, equipe!");
        let sel = selector(reg);
        let out = select(&sel, "bom dia", &text_cfg()).await;
        assert_eq!(
            out,
            Selection::Reply {
                text: "Bom dia, equipe!".to_string(),
                modality: Modality::Text,
                source: ReplySource::ExtraResponse,
            }
        );
    }

    #[tokio::test]
    async fn audio_mode_applies_to_every_tier() {
        let mut reg = ResponseRegistry::new();
        reg.register_response("menu", "extra");
        let sel = selector(reg);
        let audio = SessionConfig {
            audio_reply_mode: true,
            ..text_cfg()
        };

        for input in ["menu", "oi", "xzqv"] {
            let Selection::Reply { modality, .. } = select(&sel, input, &audio).await else {
                panic!("expected a reply");
            };
            assert_eq!(modality, Modality::Speech);
        }

        let away = SessionConfig {
            away_mode: true,
            ..audio
        };
        let Selection::Reply { modality, .. } = select(&sel, "oi", &away).await else {
            panic!("expected a reply");
        };
        assert_eq!(modality, Modality::Speech);
    }

    #[tokio::test]
    async fn selection_is_deterministic() {
        let sel = selector(ResponseRegistry::new());
        for input in ["oi", "xzqv", "obrigadu", "bom"] {
            let a = select(&sel, input, &text_cfg()).await;
            let b = select(&sel, input, &text_cfg()).await;
            assert_eq!(a, b);
        }
    }

    #[test]
    fn clarification_format() {
        assert_eq!(clarification(Some("pong")), "Did you mean: \"pong\"?");
        assert_eq!(clarification(None), "Did you mean: \"I didn't understand\"?");
    }
}
