use std::sync::Arc;

use rsp_core::{
    config::Config,
    credentials::{CredentialStore, FileCredentialStore},
    errors::Error,
    lifecycle::RetryPolicy,
    responder::Responder,
    selector::ResponseSelector,
    settings::{SessionConfig, SessionSettings},
    supervisor::Supervisor,
};
use rsp_telegram::TelegramTransport;
use rsp_tts::GoogleTts;

mod startup;

fn startup_err(e: anyhow::Error) -> Error {
    Error::External(format!("startup failed: {e:#}"))
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    rsp_core::logging::init("rsp")?;

    let cfg = Config::load()?;
    startup::print_banner();

    let credentials = Arc::new(FileCredentialStore::new(&cfg.auth_dir));
    if cfg.ask_relink
        && startup::ask_yes_no("Link a different account? (y/n): ")
            .await
            .map_err(startup_err)?
    {
        credentials.clear().await?;
        println!("🔄 Stored credentials cleared; linking a new account...");
    }

    let mut token = cfg.telegram_bot_token.clone();
    if token.is_none() && credentials.load().await?.is_none() {
        let answer = startup::ask("Bot token: ").await.map_err(startup_err)?;
        token = Some(answer).filter(|t| !t.is_empty());
    }

    let knowledge = startup::load_knowledge(&cfg).map_err(startup_err)?;
    let registry = startup::build_registry(&cfg).map_err(startup_err)?;
    tracing::info!(
        entries = knowledge.len(),
        commands = registry.command_count(),
        responses = registry.response_count(),
        "reply tables ready"
    );

    let settings = Arc::new(SessionSettings::new(SessionConfig::from_config(&cfg)));
    let responder = Arc::new(Responder::new(
        settings,
        ResponseSelector::new(Arc::new(registry), Arc::new(knowledge)),
        Arc::new(GoogleTts::new(cfg.tts_host.clone(), cfg.tts_slow)?),
        startup::build_interaction_log(&cfg),
        cfg.tts_language.clone(),
    ));

    let supervisor = Supervisor::new(
        Arc::new(TelegramTransport::new(token, cfg.poll_timeout)),
        credentials,
        responder,
        RetryPolicy::from_config(&cfg),
    );

    tokio::select! {
        res = supervisor.run() => {
            if let Err(e) = &res {
                eprintln!("❌ {e}");
            }
            res
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("interrupted; shutting down");
            Ok(())
        }
    }
}
