//! Console startup and wiring helpers for the binary.

use std::{io::Write, sync::Arc};

use anyhow::Context;

use rsp_core::{
    config::Config,
    interaction::{ConsoleTableLog, FanoutLog, FileInteractionLog, InteractionLog},
    knowledge::KnowledgeBase,
    registry::{FnCommand, ResponseRegistry},
    settings::SessionConfig,
};

pub fn print_banner() {
    println!("🤖 rsp auto-responder v{}", env!("CARGO_PKG_VERSION"));
    println!("---------------------------------------------");
}

/// Blocking stdin read, run off the async runtime.
pub async fn ask(prompt: &str) -> anyhow::Result<String> {
    let prompt = prompt.to_string();
    tokio::task::spawn_blocking(move || -> anyhow::Result<String> {
        print!("{prompt}");
        std::io::stdout().flush().context("flush stdout")?;
        let mut line = String::new();
        std::io::stdin()
            .read_line(&mut line)
            .context("read answer from stdin")?;
        Ok(line.trim().to_string())
    })
    .await
    .context("prompt task panicked")?
}

pub async fn ask_yes_no(prompt: &str) -> anyhow::Result<bool> {
    Ok(is_yes(&ask(prompt).await?))
}

/// Accepts English and Portuguese affirmatives.
pub fn is_yes(answer: &str) -> bool {
    matches!(
        answer.trim().to_lowercase().as_str(),
        "y" | "yes" | "s" | "sim"
    )
}

pub fn load_knowledge(cfg: &Config) -> anyhow::Result<KnowledgeBase> {
    match &cfg.knowledge_base_path {
        Some(path) => KnowledgeBase::load_json(path)
            .with_context(|| format!("load knowledge base from {}", path.display())),
        None => Ok(KnowledgeBase::builtin()),
    }
}

pub fn build_registry(cfg: &Config) -> anyhow::Result<ResponseRegistry> {
    let mut registry = ResponseRegistry::new();

    if let Some(path) = &cfg.extra_responses_path {
        let n = registry
            .load_responses_json(path)
            .with_context(|| format!("load extra responses from {}", path.display()))?;
        tracing::info!(count = n, path = %path.display(), "loaded extra responses");
    }

    registry.register_command(
        "status",
        FnCommand::new(|ctx| async move {
            ctx.messenger
                .send_text(&ctx.sender, &status_text(&ctx.settings))
                .await
        }),
    );

    Ok(registry)
}

pub fn status_text(cfg: &SessionConfig) -> String {
    let on_off = |b: bool| if b { "on" } else { "off" };
    format!(
        "away mode: {}\naudio replies: {}\nmatch threshold: {:.2}",
        on_off(cfg.away_mode),
        on_off(cfg.audio_reply_mode),
        cfg.min_similarity
    )
}

pub fn build_interaction_log(cfg: &Config) -> Arc<dyn InteractionLog> {
    let mut sinks: Vec<Arc<dyn InteractionLog>> = vec![Arc::new(ConsoleTableLog)];
    if let Some(path) = &cfg.interaction_log_path {
        sinks.push(Arc::new(FileInteractionLog::new(
            path,
            cfg.interaction_log_json,
        )));
    }
    Arc::new(FanoutLog::new(sinks))
}
