//! Owns the connection loop: connect, pump events, reconnect with backoff.

use std::sync::Arc;

use tokio::task::JoinSet;

use crate::{
    credentials::CredentialStore,
    errors::Error,
    lifecycle::{ConnectionLifecycle, ConnectionState, Directive, RetryPolicy},
    messaging::{
        port::{Transport, TransportConnection},
        types::{CloseReason, LinkState, TransportEvent},
    },
    responder::{Responder, TurnOutcome},
    Result,
};

pub struct Supervisor {
    transport: Arc<dyn Transport>,
    credentials: Arc<dyn CredentialStore>,
    responder: Arc<Responder>,
    policy: RetryPolicy,
}

impl Supervisor {
    pub fn new(
        transport: Arc<dyn Transport>,
        credentials: Arc<dyn CredentialStore>,
        responder: Arc<Responder>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            transport,
            credentials,
            responder,
            policy,
        }
    }

    /// Run until the lifecycle terminates.
    ///
    /// Only returns on a terminal condition: [`Error::LoggedOut`] or
    /// [`Error::RetriesExhausted`]. Transient disconnects are retried here.
    pub async fn run(&self) -> Result<()> {
        let mut lifecycle = ConnectionLifecycle::new(self.policy);

        loop {
            debug_assert_eq!(lifecycle.state(), ConnectionState::Connecting);
            let reason = self.run_connection(&mut lifecycle).await;

            match lifecycle.disconnected(&reason) {
                Directive::Reconnect { attempt, delay } => {
                    tracing::warn!(
                        ?reason,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "connection closed; reconnecting"
                    );
                    tokio::time::sleep(delay).await;
                    lifecycle.reconnecting();
                }
                Directive::LoggedOut => {
                    tracing::error!("transport logged out; not reconnecting");
                    return Err(Error::LoggedOut);
                }
                Directive::GiveUp { attempts } => {
                    tracing::error!(attempts, ?reason, "giving up on reconnecting");
                    return Err(Error::RetriesExhausted { attempts });
                }
            }
        }
    }

    /// One connection from attempt to close. Always tears the connection down.
    async fn run_connection(&self, lifecycle: &mut ConnectionLifecycle) -> CloseReason {
        let credentials = match self.credentials.load().await {
            Ok(c) => c,
            Err(e) => {
                tracing::warn!(error = %e, "failed to load stored credentials");
                None
            }
        };

        let mut conn = match self.transport.connect(credentials).await {
            Ok(conn) => conn,
            Err(Error::LoggedOut) => return CloseReason::LoggedOut,
            Err(e) => return CloseReason::Other(e.to_string()),
        };

        let mut turns = JoinSet::new();
        let reason = self.pump(conn.as_mut(), lifecycle, &mut turns).await;

        // Turns are never cancelled: each one finishes and logs its own outcome.
        while turns.join_next().await.is_some() {}

        conn.close().await;
        reason
    }

    async fn pump(
        &self,
        conn: &mut dyn TransportConnection,
        lifecycle: &mut ConnectionLifecycle,
        turns: &mut JoinSet<()>,
    ) -> CloseReason {
        let messenger = conn.messenger();

        loop {
            let Some(event) = conn.next_event().await else {
                return CloseReason::Other("event stream ended".to_string());
            };

            match event {
                TransportEvent::CredentialsUpdated(creds) => {
                    if let Err(e) = self.credentials.save(&creds).await {
                        tracing::warn!(error = %e, "failed to persist credentials");
                    }
                }
                TransportEvent::ConnectionStateChanged {
                    state: LinkState::Open,
                    ..
                } => {
                    lifecycle.opened();
                    tracing::info!("connected and ready");
                }
                TransportEvent::ConnectionStateChanged {
                    state: LinkState::Connecting,
                    ..
                } => {}
                TransportEvent::ConnectionStateChanged {
                    state: LinkState::Closed,
                    reason,
                } => {
                    return reason.unwrap_or_else(|| CloseReason::Other("closed".to_string()));
                }
                TransportEvent::MessageReceived(msg) => {
                    if !lifecycle.is_open() {
                        tracing::debug!(sender = %msg.sender, "connection not open; dropping message");
                        continue;
                    }
                    let responder = self.responder.clone();
                    let messenger = messenger.clone();
                    turns.spawn(async move {
                        let sender = msg.sender.clone();
                        match responder.handle(messenger, msg).await {
                            Ok(TurnOutcome::Ignored(why)) => {
                                tracing::debug!(%sender, ?why, "message ignored");
                            }
                            Ok(_) => {}
                            Err(e) => tracing::warn!(%sender, error = %e, "turn failed"),
                        }
                    });
                }
            }

            // Reap finished turns so the set does not grow for the connection's lifetime.
            while turns.try_join_next().is_some() {}
        }
    }
}
