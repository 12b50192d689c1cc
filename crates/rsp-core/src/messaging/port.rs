use std::sync::Arc;

use async_trait::async_trait;

use crate::{
    domain::SenderId,
    messaging::types::{Credentials, MessagingCapabilities, OutgoingPayload, TransportEvent},
    Result,
};

/// Outbound half of a transport: deliver one payload to one conversation.
#[async_trait]
pub trait MessagingPort: Send + Sync {
    fn capabilities(&self) -> MessagingCapabilities;

    async fn send(&self, to: &SenderId, payload: OutgoingPayload) -> Result<()>;

    async fn send_text(&self, to: &SenderId, text: &str) -> Result<()> {
        self.send(to, OutgoingPayload::Text(text.to_string())).await
    }
}

/// A single live connection. Owned by the supervisor and replaced on reconnect.
#[async_trait]
pub trait TransportConnection: Send {
    /// Next event, or `None` once the connection has fully shut down.
    async fn next_event(&mut self) -> Option<TransportEvent>;

    /// Send port bound to this connection.
    fn messenger(&self) -> Arc<dyn MessagingPort>;

    /// Tear down background tasks and listeners. Idempotent.
    async fn close(&mut self);
}

/// Factory for connections.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn connect(&self, credentials: Option<Credentials>)
        -> Result<Box<dyn TransportConnection>>;
}
