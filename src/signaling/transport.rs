use async_trait::async_trait;
use tokio::sync::mpsc;

use super::messages::SignalEnvelope;
use crate::error::SessionResult;

/// Items delivered by a connected signaling transport
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    Message(SignalEnvelope),
    /// The transport recovered its connection on its own; events sent
    /// while it was down may have been lost
    Resumed,
}

/// Persistent bidirectional event connection.
///
/// The receiver returned by `connect` closing means the connection is gone.
#[async_trait]
pub trait SignalingTransport: Send + Sync {
    async fn connect(&self, room: &str, credential: &str) -> SessionResult<mpsc::Receiver<Inbound>>;

    async fn send(&self, room: &str, envelope: &SignalEnvelope) -> SessionResult<()>;

    async fn disconnect(&self);

    /// Transport name for logging
    fn name(&self) -> &str;
}
