use async_nats::{Client, ConnectOptions, Event};
use async_trait::async_trait;
use futures::stream::StreamExt;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::messages::SignalEnvelope;
use super::transport::{Inbound, SignalingTransport};
use crate::error::{SessionError, SessionResult};
use crate::retry::transport_error;

/// Signaling over NATS: one subject per room, JSON envelopes
pub struct NatsSignalingTransport {
    url: String,
    subject_prefix: String,
    client: Mutex<Option<Client>>,
    forwarder: Mutex<Option<JoinHandle<()>>>,
}

impl NatsSignalingTransport {
    pub fn new(url: impl Into<String>, subject_prefix: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            subject_prefix: subject_prefix.into(),
            client: Mutex::new(None),
            forwarder: Mutex::new(None),
        }
    }

    pub fn subject(&self, room: &str) -> String {
        format!("{}.{}.events", self.subject_prefix, room)
    }
}

#[async_trait]
impl SignalingTransport for NatsSignalingTransport {
    async fn connect(&self, room: &str, credential: &str) -> SessionResult<mpsc::Receiver<Inbound>> {
        info!("Connecting to NATS at {}", self.url);

        let (tx, rx) = mpsc::channel(256);

        // async-nats reconnects the socket by itself; surface the recovery
        // so the channel can resync whatever was missed while down
        let lost = Arc::new(AtomicBool::new(false));
        let events_tx = tx.clone();
        let options = ConnectOptions::with_token(credential.to_string()).event_callback(move |event| {
            let lost = Arc::clone(&lost);
            let events_tx = events_tx.clone();
            async move {
                match event {
                    Event::Disconnected => {
                        warn!("NATS connection lost");
                        lost.store(true, Ordering::SeqCst);
                    }
                    Event::Connected => {
                        if lost.swap(false, Ordering::SeqCst) {
                            info!("NATS connection restored");
                            let _ = events_tx.send(Inbound::Resumed).await;
                        }
                    }
                    other => debug!("NATS event: {:?}", other),
                }
            }
        });

        let client = options.connect(&self.url).await.map_err(|e| {
            let msg = e.to_string();
            if msg.to_lowercase().contains("authorization") {
                SessionError::AuthExpired
            } else {
                transport_error(msg)
            }
        })?;

        let subject = self.subject(room);
        let mut subscriber = client
            .subscribe(subject.clone())
            .await
            .map_err(transport_error)?;
        info!("Subscribed to {}", subject);

        let forwarder = tokio::spawn(async move {
            while let Some(msg) = subscriber.next().await {
                match serde_json::from_slice::<SignalEnvelope>(&msg.payload) {
                    Ok(envelope) => {
                        if tx.send(Inbound::Message(envelope)).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => warn!("Failed to parse signaling message: {}", e),
                }
            }
            debug!("Signaling subscription closed");
        });

        if let Some(old) = self.forwarder.lock().replace(forwarder) {
            old.abort();
        }
        *self.client.lock() = Some(client);

        Ok(rx)
    }

    async fn send(&self, room: &str, envelope: &SignalEnvelope) -> SessionResult<()> {
        let client = self
            .client
            .lock()
            .clone()
            .ok_or(SessionError::SignalingUnavailable)?;

        let subject = self.subject(room);
        let payload = serde_json::to_vec(envelope)?;
        client
            .publish(subject.clone(), payload.into())
            .await
            .map_err(transport_error)?;

        debug!("Published {:?} to {}", envelope.event.family(), subject);
        Ok(())
    }

    async fn disconnect(&self) {
        info!("Closing NATS connection");
        if let Some(forwarder) = self.forwarder.lock().take() {
            forwarder.abort();
        }
        let client = self.client.lock().take();
        if let Some(client) = client {
            if let Err(e) = client.flush().await {
                debug!("NATS flush on close failed: {}", e);
            }
        }
    }

    fn name(&self) -> &str {
        "nats"
    }
}
