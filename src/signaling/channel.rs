use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::messages::{SignalEnvelope, SignalMessage};
use super::transport::{Inbound, SignalingTransport};
use crate::config::SignalingConfig;
use crate::error::{SessionError, SessionResult};
use crate::model::Participant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalingStatus {
    Disconnected,
    Connected,
    Reconnecting,
    /// Reconnect budget exhausted; the session runs media-only
    Failed,
}

/// What the channel reports to its owner
#[derive(Debug, Clone, PartialEq)]
pub enum SignalingEvent {
    Message(SignalEnvelope),
    Disconnected,
    /// Connection is back and the join was re-announced; the owner must do a
    /// full roster and chat resync
    Reconnected,
    Failed,
}

/// Everything needed to (re)connect and announce, shareable with the
/// supervisor task
#[derive(Clone)]
struct Link {
    transport: Arc<dyn SignalingTransport>,
    config: SignalingConfig,
    room: String,
    credential: String,
    me: Participant,
    status: Arc<Mutex<SignalingStatus>>,
}

impl Link {
    fn set_status(&self, status: SignalingStatus) {
        *self.status.lock() = status;
    }

    async fn send(&self, message: SignalMessage) -> SessionResult<()> {
        let envelope = SignalEnvelope::new(&self.room, &self.me.user_id, message);
        self.transport.send(&self.room, &envelope).await
    }

    async fn announce(&self) -> SessionResult<()> {
        self.send(SignalMessage::JoinRoom {
            participant: self.me.clone(),
        })
        .await
    }

    async fn attempt(&self) -> SessionResult<mpsc::Receiver<Inbound>> {
        let rx = self.transport.connect(&self.room, &self.credential).await?;
        self.announce().await?;
        Ok(rx)
    }

    /// One connect and announce, bounded by the connect timeout
    async fn establish_once(&self) -> SessionResult<mpsc::Receiver<Inbound>> {
        match tokio::time::timeout(self.config.connect_timeout(), self.attempt()).await {
            Ok(result) => result,
            Err(_) => Err(SessionError::TransportUnavailable(format!(
                "signaling did not connect within {:?}",
                self.config.connect_timeout()
            ))),
        }
    }

    /// Connect and announce, under the fixed-delay policy and overall timeout
    async fn establish(&self) -> SessionResult<mpsc::Receiver<Inbound>> {
        let policy = self.config.reconnect_policy();
        let attempt = policy.run("signaling connect", |n| async move {
            if n > 1 {
                debug!("Signaling connect attempt {}", n);
            }
            self.attempt().await
        });

        match tokio::time::timeout(self.config.reconnect_timeout(), attempt).await {
            Ok(result) => result,
            Err(_) => Err(SessionError::TransportUnavailable(format!(
                "signaling did not reconnect within {:?}",
                self.config.reconnect_timeout()
            ))),
        }
    }
}

/// Presence/chat/moderation channel with its own reconnect lifecycle
pub struct SignalingChannel {
    transport: Arc<dyn SignalingTransport>,
    config: SignalingConfig,
    status: Arc<Mutex<SignalingStatus>>,
    link: Option<Link>,
    supervisor: Option<JoinHandle<()>>,
    cancel: CancellationToken,
}

impl SignalingChannel {
    pub fn new(transport: Arc<dyn SignalingTransport>, config: SignalingConfig) -> Self {
        Self {
            transport,
            config,
            status: Arc::new(Mutex::new(SignalingStatus::Disconnected)),
            link: None,
            supervisor: None,
            cancel: CancellationToken::new(),
        }
    }

    pub fn status(&self) -> SignalingStatus {
        *self.status.lock()
    }

    pub fn is_available(&self) -> bool {
        !matches!(self.status(), SignalingStatus::Failed | SignalingStatus::Disconnected)
    }

    /// Connect, announce `join-room`, and start supervising the connection.
    ///
    /// Only one attempt is made inline. When it fails with a retryable
    /// error the channel comes up `Reconnecting` and the supervisor keeps
    /// trying under the reconnect policy, reporting `Reconnected` or
    /// `Failed` on `sink`. Events are delivered until `disconnect` or until
    /// `cancel` fires.
    pub async fn connect(
        &mut self,
        room: &str,
        credential: &str,
        me: Participant,
        sink: mpsc::UnboundedSender<SignalingEvent>,
        cancel: CancellationToken,
    ) -> SessionResult<SignalingStatus> {
        let link = Link {
            transport: Arc::clone(&self.transport),
            config: self.config.clone(),
            room: room.to_string(),
            credential: credential.to_string(),
            me,
            status: Arc::clone(&self.status),
        };

        info!("Connecting signaling for room {} via {}", room, self.transport.name());
        let rx = match link.establish_once().await {
            Ok(rx) => {
                link.set_status(SignalingStatus::Connected);
                info!("Signaling connected for room {}", room);
                Some(rx)
            }
            Err(e) if e.is_retryable() => {
                warn!("Signaling for room {} not reachable yet, retrying in background: {}", room, e);
                link.set_status(SignalingStatus::Reconnecting);
                None
            }
            Err(e) => {
                error!("Signaling unavailable for room {}: {}", room, e);
                link.set_status(SignalingStatus::Failed);
                return Err(e);
            }
        };

        self.cancel = cancel;
        self.supervisor = Some(tokio::spawn(supervise(
            link.clone(),
            rx,
            sink,
            self.cancel.clone(),
        )));
        self.link = Some(link);
        Ok(self.status())
    }

    /// Fire-and-forget send. Transport errors are logged, not returned; the
    /// caller's optimistic state is reconciled by the next broadcast/resync.
    pub async fn send(&self, message: SignalMessage) -> SessionResult<()> {
        let link = match (&self.link, self.status()) {
            (Some(link), SignalingStatus::Connected | SignalingStatus::Reconnecting) => link,
            _ => return Err(SessionError::SignalingUnavailable),
        };

        let family = message.family();
        if let Err(e) = link.send(message).await {
            warn!("Dropped {:?} signaling event: {}", family, e);
        }
        Ok(())
    }

    /// Announce departure and close the connection
    pub async fn disconnect(&mut self) {
        if let Some(link) = self.link.take() {
            if self.is_available() {
                let leave = SignalMessage::LeaveRoom {
                    user_id: link.me.user_id.clone(),
                };
                if let Err(e) = link.send(leave).await {
                    debug!("Failed to announce leave: {}", e);
                }
            }
        }

        self.cancel.cancel();
        if let Some(handle) = self.supervisor.take() {
            let _ = handle.await;
        }
        self.transport.disconnect().await;
        *self.status.lock() = SignalingStatus::Disconnected;
        info!("Signaling disconnected");
    }
}

async fn supervise(
    link: Link,
    rx: Option<mpsc::Receiver<Inbound>>,
    sink: mpsc::UnboundedSender<SignalingEvent>,
    cancel: CancellationToken,
) {
    let mut rx = match rx {
        Some(rx) => rx,
        None => match reconnect(&link, &sink, &cancel).await {
            Some(rx) => rx,
            None => return,
        },
    };

    loop {
        let inbound = tokio::select! {
            _ = cancel.cancelled() => break,
            inbound = rx.recv() => inbound,
        };

        match inbound {
            Some(Inbound::Message(envelope)) => {
                if sink.send(SignalingEvent::Message(envelope)).is_err() {
                    break;
                }
            }
            Some(Inbound::Resumed) => {
                if let Err(e) = link.announce().await {
                    warn!("Failed to re-announce after resume: {}", e);
                }
                let _ = sink.send(SignalingEvent::Reconnected);
            }
            None => {
                warn!("Signaling connection lost for room {}", link.room);
                link.set_status(SignalingStatus::Reconnecting);
                let _ = sink.send(SignalingEvent::Disconnected);

                match reconnect(&link, &sink, &cancel).await {
                    Some(new_rx) => rx = new_rx,
                    None => break,
                }
            }
        }
    }
    debug!("Signaling supervisor for room {} stopped", link.room);
}

/// Run the reconnect policy. `None` when cancelled or out of budget.
async fn reconnect(
    link: &Link,
    sink: &mpsc::UnboundedSender<SignalingEvent>,
    cancel: &CancellationToken,
) -> Option<mpsc::Receiver<Inbound>> {
    let result = tokio::select! {
        _ = cancel.cancelled() => return None,
        result = link.establish() => result,
    };

    match result {
        Ok(rx) => {
            link.set_status(SignalingStatus::Connected);
            info!("Signaling reconnected for room {}", link.room);
            let _ = sink.send(SignalingEvent::Reconnected);
            Some(rx)
        }
        Err(e) => {
            error!("Signaling permanently unavailable for room {}: {}", link.room, e);
            link.set_status(SignalingStatus::Failed);
            let _ = sink.send(SignalingEvent::Failed);
            None
        }
    }
}
