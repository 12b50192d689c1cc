//! Static trigger → response table queried by fuzzy similarity.

use std::{fs, path::Path};

use serde::Deserialize;

use crate::{domain::normalize, errors::Error, similarity::similarity, Result};

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct KnowledgeEntry {
    pub triggers: Vec<String>,
    pub response: String,
}

impl KnowledgeEntry {
    pub fn new<I, S>(triggers: I, response: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            triggers: triggers.into_iter().map(|t| normalize(t.as_ref())).collect(),
            response: response.into(),
        }
    }
}

/// Result of scanning the knowledge base.
#[derive(Clone, Debug, PartialEq)]
pub struct BestMatch {
    pub score: f64,
    pub response: Option<String>,
}

/// Immutable once built; iteration order is the tie-break order.
#[derive(Clone, Debug, Default)]
pub struct KnowledgeBase {
    entries: Vec<KnowledgeEntry>,
}

impl KnowledgeBase {
    pub fn new(entries: Vec<KnowledgeEntry>) -> Self {
        let entries = entries
            .into_iter()
            .map(|e| KnowledgeEntry::new(e.triggers, e.response))
            .collect();
        Self { entries }
    }

    /// Load a JSON array of `{"triggers": [...], "response": "..."}` objects.
    pub fn load_json(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)?;
        let entries: Vec<KnowledgeEntry> = serde_json::from_str(&raw)?;
        if entries.iter().any(|e| e.triggers.is_empty()) {
            return Err(Error::Config(format!(
                "knowledge base {} has an entry without triggers",
                path.display()
            )));
        }
        Ok(Self::new(entries))
    }

    pub fn entries(&self) -> &[KnowledgeEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Highest-scoring trigger across all entries.
    ///
    /// Only a strictly greater score replaces the current best, so on ties the
    /// earliest entry wins. A base with no positive score yields `{0, None}`.
    pub fn best_match(&self, normalized_text: &str) -> BestMatch {
        let mut best = BestMatch {
            score: 0.0,
            response: None,
        };

        for entry in &self.entries {
            for trigger in &entry.triggers {
                let score = similarity(normalized_text, trigger);
                if score > best.score {
                    best = BestMatch {
                        score,
                        response: Some(entry.response.clone()),
                    };
                }
            }
        }

        best
    }

    /// The stock Portuguese small-talk table.
    pub fn builtin() -> Self {
        const TABLE: &[(&[&str], &str)] = &[
            (&["oi", "olá", "ola", "eae", "fala"], "Oi! Como posso te ajudar?"),
            (&["bom dia"], "Bom dia! Que seu dia seja incrível ☀️"),
            (&["boa tarde"], "Boa tarde! Em que posso ajudar?"),
            (&["boa noite"], "Boa noite! Precisa de algo?"),
            (&["tudo bem", "como vai", "ta tudo bem"], "Estou bem! E você?"),
            (
                &["quem é você", "seu nome"],
                "Sou um chatbot inteligente do WhatsApp criado por Braga-devs.",
            ),
            (
                &["ajuda", "socorro", "o que você faz"],
                "Posso responder suas perguntas automaticamente e te ajudar com informações básicas.",
            ),
            (&["obrigado", "valeu", "brigado"], "De nada! 😊 Sempre à disposição."),
            (&["teste", "teste bot"], "Teste recebido com sucesso ✅"),
            (&["ping"], "pong 🏓"),
            (&["legal", "muito bom", "ótimo", "otimo"], "Fico feliz que você gostou 😄"),
            (&["ruim", "triste"], "Poxa 😕 espero melhorar sua experiência."),
            (&["kkk", "haha", "rs"], "😂😂😂"),
            (
                &["preço", "quanto custa"],
                "Para informações sobre preços, entre em contato com o administrador.",
            ),
            (&["horário", "horario"], "Meu horário de atendimento é de 09:00 às 18:00."),
            (&["bom trabalho"], "Obrigado! Estamos sempre buscando melhorar."),
            (
                &["problema", "erro", "bug"],
                "Sinto muito pelo inconveniente. Pode detalhar melhor o problema?",
            ),
            (&["oii", "olaa"], "Oi! Tudo bem? 😄"),
            (&["ajuda me", "me ajuda"], "Claro! Me diga como posso te ajudar."),
            (&["obrigada", "valeu demais"], "De nada! 😉"),
            (&["oi bot"], "Oi! Eu sou seu assistente virtual 🤖"),
            (&["bom", "ótimo"], "Que bom! 😄"),
            (&["não sei", "nao sei"], "Tudo bem, posso tentar te ajudar a descobrir 😄"),
            (&["eae tudo bem"], "Tudo certo! E você? 😎"),
            (&["quero saber"], "Me diga exatamente o que você quer saber 😉"),
            (&["ok", "certo"], "Perfeito! 👍"),
            (&["opa"], "Opa! 👋"),
            (&["fala ai"], "Fala aí! 😎"),
            (&["boa"], "Que bom! 😄"),
            (&["ruim mesmo"], "Que pena 😕 Espero melhorar sua experiência."),
            (&["testando"], "Recebi sua mensagem de teste ✅"),
            (&["bom diaaa"], "Bom dia! Espero que seu dia seja incrível ☀️"),
            (&["boa tardeaa"], "Boa tarde! Em que posso ajudar?"),
            (&["boa noiteee"], "Boa noite! Precisa de algo?"),
        ];

        Self::new(
            TABLE
                .iter()
                .map(|(triggers, response)| KnowledgeEntry::new(triggers.iter(), *response))
                .collect(),
        )
    }
}
