//! Hand-registered commands and literal replies, matched by exact normalized key.

use std::{collections::HashMap, fmt, fs, future::Future, path::Path, pin::Pin, sync::Arc};

use async_trait::async_trait;

use crate::{
    domain::{normalize, SenderId},
    messaging::port::MessagingPort,
    settings::SessionConfig,
    Result,
};

/// Everything a command may need to act on a turn.
#[derive(Clone)]
pub struct CommandContext {
    pub messenger: Arc<dyn MessagingPort>,
    pub sender: SenderId,
    pub raw_text: String,
    pub settings: SessionConfig,
}

impl fmt::Debug for CommandContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandContext")
            .field("sender", &self.sender)
            .field("raw_text", &self.raw_text)
            .finish_non_exhaustive()
    }
}

/// A behavior that takes over a turn. It is solely responsible for any reply.
#[async_trait]
pub trait Command: Send + Sync {
    async fn execute(&self, ctx: &CommandContext) -> Result<()>;
}

type BoxFuture = Pin<Box<dyn Future<Output = Result<()>> + Send>>;

/// Adapter so plain async closures can be registered as commands.
pub struct FnCommand {
    f: Box<dyn Fn(CommandContext) -> BoxFuture + Send + Sync>,
}

impl FnCommand {
    pub fn new<F, Fut>(f: F) -> Self
    where
        F: Fn(CommandContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        Self {
            f: Box::new(move |ctx| Box::pin(f(ctx))),
        }
    }
}

#[async_trait]
impl Command for FnCommand {
    async fn execute(&self, ctx: &CommandContext) -> Result<()> {
        (self.f)(ctx.clone()).await
    }
}

/// Command that answers with a fixed text message.
pub struct ReplyCommand(pub String);

#[async_trait]
impl Command for ReplyCommand {
    async fn execute(&self, ctx: &CommandContext) -> Result<()> {
        ctx.messenger.send_text(&ctx.sender, &self.0).await
    }
}

/// Command and extra-response tables.
///
/// Populated at startup, then shared read-only behind an `Arc`.
#[derive(Default)]
pub struct ResponseRegistry {
    commands: HashMap<String, Arc<dyn Command>>,
    responses: HashMap<String, String>,
}

impl fmt::Debug for ResponseRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut commands: Vec<&String> = self.commands.keys().collect();
        commands.sort();
        f.debug_struct("ResponseRegistry")
            .field("commands", &commands)
            .field("responses", &self.responses)
            .finish()
    }
}

impl ResponseRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Last registration for a key wins.
    pub fn register_command(&mut self, key: &str, command: impl Command + 'static) {
        self.commands.insert(normalize(key), Arc::new(command));
    }

    /// Last registration for a key wins.
    pub fn register_response(&mut self, key: &str, response: impl Into<String>) {
        self.responses.insert(normalize(key), response.into());
    }

    /// Merge a JSON object of `{"key": "response"}` pairs into the response table.
    pub fn load_responses_json(&mut self, path: &Path) -> Result<usize> {
        let raw = fs::read_to_string(path)?;
        let pairs: HashMap<String, String> = serde_json::from_str(&raw)?;
        let n = pairs.len();
        for (k, v) in pairs {
            self.register_response(&k, v);
        }
        Ok(n)
    }

    pub fn has_command(&self, normalized_text: &str) -> bool {
        self.commands.contains_key(normalized_text)
    }

    /// Run the command registered under exactly `normalized_text`.
    ///
    /// `Ok(true)` means the turn was consumed (even if the command chose not to
    /// reply). A failing command still consumes the turn; its error is returned.
    pub async fn try_execute_command(
        &self,
        normalized_text: &str,
        ctx: &CommandContext,
    ) -> Result<bool> {
        let Some(cmd) = self.commands.get(normalized_text).cloned() else {
            return Ok(false);
        };
        cmd.execute(ctx).await?;
        Ok(true)
    }

    pub fn try_get_response(&self, normalized_text: &str) -> Option<&str> {
        self.responses.get(normalized_text).map(String::as_str)
    }

    pub fn command_count(&self) -> usize {
        self.commands.len()
    }

    pub fn response_count(&self) -> usize {
        self.responses.len()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::messaging::types::{MessagingCapabilities, OutgoingPayload};
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Mutex,
    };

    #[derive(Default)]
    pub(crate) struct RecordingMessenger {
        pub sent: Mutex<Vec<(SenderId, OutgoingPayload)>>,
        pub fail: bool,
        pub caps: Option<MessagingCapabilities>,
    }

    impl RecordingMessenger {
        pub(crate) fn failing() -> Self {
            Self {
                fail: true,
                ..Self::default()
            }
        }

        pub(crate) fn with_capabilities(caps: MessagingCapabilities) -> Self {
            Self {
                caps: Some(caps),
                ..Self::default()
            }
        }

        pub(crate) fn sent(&self) -> Vec<(SenderId, OutgoingPayload)> {
            self.sent.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl MessagingPort for RecordingMessenger {
        fn capabilities(&self) -> MessagingCapabilities {
            self.caps.unwrap_or(MessagingCapabilities {
                supports_voice_notes: true,
                max_message_len: 4096,
            })
        }

        async fn send(&self, to: &SenderId, payload: OutgoingPayload) -> Result<()> {
            if self.fail {
                return Err(crate::Error::Delivery("network down".to_string()));
            }
            self.sent.lock().unwrap().push((to.clone(), payload));
            Ok(())
        }
    }

    fn ctx(messenger: Arc<RecordingMessenger>, text: &str) -> CommandContext {
        CommandContext {
            messenger,
            sender: SenderId::new("42"),
            raw_text: text.to_string(),
            settings: SessionConfig::default(),
        }
    }

    #[tokio::test]
    async fn command_keys_are_case_insensitive_and_trimmed() {
        let mut reg = ResponseRegistry::new();
        reg.register_command("  PING ", ReplyCommand("pong".to_string()));

        let messenger = Arc::new(RecordingMessenger::default());
        let consumed = reg
            .try_execute_command("ping", &ctx(messenger.clone(), "Ping"))
            .await
            .unwrap();

        assert!(consumed);
        assert_eq!(
            messenger.sent(),
            vec![(
                SenderId::new("42"),
                OutgoingPayload::Text("pong".to_string())
            )]
        );
    }

    #[tokio::test]
    async fn commands_never_match_fuzzily() {
        let mut reg = ResponseRegistry::new();
        reg.register_command("ping", ReplyCommand("pong".to_string()));

        let messenger = Arc::new(RecordingMessenger::default());
        for text in ["pin", "pingg", "ping now"] {
            assert!(!reg
                .try_execute_command(text, &ctx(messenger.clone(), text))
                .await
                .unwrap());
        }
        assert!(messenger.sent().is_empty());
    }

    #[tokio::test]
    async fn last_command_registration_wins() {
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));

        let mut reg = ResponseRegistry::new();
        let f = first.clone();
        reg.register_command(
            "go",
            FnCommand::new(move |_ctx| {
                let f = f.clone();
                async move {
                    f.fetch_add(1, Ordering::SeqCst);
                    Ok::<(), crate::Error>(())
                }
            }),
        );
        let s = second.clone();
        reg.register_command(
            "GO",
            FnCommand::new(move |_ctx| {
                let s = s.clone();
                async move {
                    s.fetch_add(1, Ordering::SeqCst);
                    Ok::<(), crate::Error>(())
                }
            }),
        );

        assert_eq!(reg.command_count(), 1);
        let messenger = Arc::new(RecordingMessenger::default());
        assert!(reg.try_execute_command("go", &ctx(messenger, "go")).await.unwrap());
        assert_eq!(first.load(Ordering::SeqCst), 0);
        assert_eq!(second.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failing_command_still_reports_its_error() {
        let mut reg = ResponseRegistry::new();
        reg.register_command("boom", ReplyCommand("x".to_string()));

        let messenger = Arc::new(RecordingMessenger::failing());
        let err = reg
            .try_execute_command("boom", &ctx(messenger, "boom"))
            .await
            .unwrap_err();
        assert!(matches!(err, crate::Error::Delivery(_)));
    }

    #[test]
    fn extra_responses_overwrite_and_match_exactly() {
        let mut reg = ResponseRegistry::new();
        reg.register_response("Menu", "first");
        reg.register_response("menu ", "second");

        assert_eq!(reg.response_count(), 1);
        assert_eq!(reg.try_get_response("menu"), Some("second"));
        assert_eq!(reg.try_get_response("menus"), None);
    }

    #[test]
    fn loads_extra_responses_from_json() {
        let path = std::env::temp_dir().join(format!("rsp-extra-{}.json", std::process::id()));
        std::fs::write(&path, r#"{"Site": "https://example.com", "pix": "chave@example.com"}"#)
            .unwrap();

        let mut reg = ResponseRegistry::new();
        assert_eq!(reg.load_responses_json(&path).unwrap(), 2);
        assert_eq!(reg.try_get_response("site"), Some("https://example.com"));

        let _ = std::fs::remove_file(&path);
    }
}
