use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use super::transport::{ConnectionState, JoinParams, MediaTransport, RemoteTrack, TransportEvent};
use crate::config::MediaConfig;
use crate::device::{LocalTrack, TrackKind, TrackPublisher};
use crate::error::{SessionError, SessionResult};
use crate::model::Identity;

/// What the UI should show for the media connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionIndicator {
    Connected,
    Reconnecting,
    Disconnected,
}

#[derive(Debug)]
struct ClientState {
    connection: ConnectionState,
    /// Set once the first `connected` is reached; gates the reconnect indicator
    has_connected: bool,
    local_transport_id: Option<u32>,
    published: BTreeMap<TrackKind, LocalTrack>,
}

/// Connection state machine and publication bookkeeping over a `MediaTransport`
pub struct MediaSessionClient {
    transport: Arc<dyn MediaTransport>,
    config: MediaConfig,
    state: Mutex<ClientState>,
}

impl MediaSessionClient {
    pub fn new(transport: Arc<dyn MediaTransport>, config: MediaConfig) -> Self {
        Self {
            transport,
            config,
            state: Mutex::new(ClientState {
                connection: ConnectionState::Disconnected,
                has_connected: false,
                local_transport_id: None,
                published: BTreeMap::new(),
            }),
        }
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.state.lock().connection
    }

    pub fn has_connected(&self) -> bool {
        self.state.lock().has_connected
    }

    pub fn local_transport_id(&self) -> Option<u32> {
        self.state.lock().local_transport_id
    }

    pub fn published_tracks(&self) -> Vec<LocalTrack> {
        self.state.lock().published.values().cloned().collect()
    }

    /// Join the media channel, retrying transient network failures.
    ///
    /// `AuthExpired` is returned immediately.
    pub async fn join(
        &self,
        channel: &str,
        token: &str,
        identity: &Identity,
        events: mpsc::UnboundedSender<TransportEvent>,
    ) -> SessionResult<u32> {
        self.state.lock().connection = ConnectionState::Connecting;
        let params = JoinParams {
            channel: channel.to_string(),
            token: token.to_string(),
            identity: identity.clone(),
        };

        info!("Joining media channel {} via {}", channel, self.transport.name());
        let result = self
            .config
            .join_policy()
            .run("media join", |_| {
                let events = events.clone();
                let params = &params;
                async move { self.transport.join(params, events).await }
            })
            .await;

        let mut state = self.state.lock();
        match result {
            Ok(transport_id) => {
                state.connection = ConnectionState::Connected;
                state.has_connected = true;
                state.local_transport_id = Some(transport_id);
                info!("Joined media channel {} as transport id {}", channel, transport_id);
                Ok(transport_id)
            }
            Err(e) => {
                state.connection = ConnectionState::Disconnected;
                error!("Failed to join media channel {}: {}", channel, e);
                Err(e)
            }
        }
    }

    /// Apply a transport-reported state change and return what the UI
    /// should surface, if anything.
    ///
    /// `connecting` before the first successful connection is startup noise
    /// and surfaces nothing.
    pub fn on_connection_state(&self, next: ConnectionState) -> Option<ConnectionIndicator> {
        let mut state = self.state.lock();
        let previous = state.connection;
        state.connection = next;
        debug!("Media connection {:?} -> {:?}", previous, next);

        match next {
            ConnectionState::Connected => {
                state.has_connected = true;
                Some(ConnectionIndicator::Connected)
            }
            ConnectionState::Connecting if state.has_connected => Some(ConnectionIndicator::Reconnecting),
            ConnectionState::Connecting => None,
            ConnectionState::Disconnected => Some(ConnectionIndicator::Disconnected),
        }
    }

    /// Publish local tracks. Already-published tracks are skipped; a new
    /// track of an already-published kind replaces the old one in place.
    pub async fn publish(&self, tracks: &[LocalTrack]) -> SessionResult<()> {
        for track in tracks {
            let existing = self.state.lock().published.get(&track.kind).cloned();
            match existing {
                Some(current) if current.id == track.id => {
                    debug!("{:?} track {} already published", track.kind, track.id);
                }
                Some(current) => self.replace_track(Some(&current), track).await?,
                None => {
                    self.transport.publish(std::slice::from_ref(track)).await?;
                    self.state.lock().published.insert(track.kind, track.clone());
                    info!("Published {:?} track '{}'", track.kind, track.label);
                }
            }
        }
        Ok(())
    }

    /// Unpublish the given tracks; unknown tracks are ignored
    pub async fn unpublish(&self, tracks: &[LocalTrack]) -> SessionResult<()> {
        let ids: Vec<String> = {
            let state = self.state.lock();
            tracks
                .iter()
                .filter(|t| state.published.get(&t.kind).map(|p| p.id == t.id).unwrap_or(false))
                .map(|t| t.id.clone())
                .collect()
        };
        if ids.is_empty() {
            return Ok(());
        }

        self.transport.unpublish(&ids).await?;
        let mut state = self.state.lock();
        state.published.retain(|_, t| !ids.contains(&t.id));
        Ok(())
    }

    /// Subscribe to a remote track, retrying once after a delay if the
    /// stream was announced before it became subscribable. A stream that is
    /// still missing after the retry yields `None`.
    pub async fn subscribe(&self, transport_id: u32, kind: TrackKind) -> SessionResult<Option<RemoteTrack>> {
        let result = self
            .config
            .subscribe_policy()
            .run("remote subscribe", |_| self.transport.subscribe(transport_id, kind))
            .await;

        match result {
            Ok(track) => {
                debug!("Subscribed {:?} from transport id {}", kind, transport_id);
                Ok(Some(track))
            }
            Err(SessionError::StreamNotYetAvailable(_)) => {
                debug!(
                    "Dropping {:?} subscription for transport id {}: stream never became available",
                    kind, transport_id
                );
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Hand the transport a fresh token. Failure is logged only; media keeps
    /// flowing until the transport actually rejects the session.
    pub async fn renew_token(&self, token: &str) -> SessionResult<()> {
        match self.transport.renew_token(token).await {
            Ok(()) => {
                info!("Media access token renewed");
                Ok(())
            }
            Err(e) => {
                warn!("Failed to renew media access token: {}", e);
                Err(e)
            }
        }
    }

    /// Server-side mute where supported. Returns false if unsupported.
    pub async fn mute_remote(&self, transport_id: u32) -> SessionResult<bool> {
        if !self.transport.supports_remote_mute() {
            return Ok(false);
        }
        self.transport.mute_remote(transport_id).await?;
        Ok(true)
    }

    /// Unpublish everything and leave the channel
    pub async fn leave(&self) -> SessionResult<()> {
        let published = self.published_tracks();
        if let Err(e) = self.unpublish(&published).await {
            warn!("Failed to unpublish local tracks on leave: {}", e);
        }
        let result = self.transport.leave().await;

        let mut state = self.state.lock();
        state.connection = ConnectionState::Disconnected;
        state.published.clear();
        state.local_transport_id = None;
        info!("Left media channel");
        result
    }
}

#[async_trait]
impl TrackPublisher for MediaSessionClient {
    /// Publish the new track first, then unpublish the old one
    async fn replace_track(&self, old: Option<&LocalTrack>, new: &LocalTrack) -> SessionResult<()> {
        self.transport.publish(std::slice::from_ref(new)).await?;
        self.state.lock().published.insert(new.kind, new.clone());

        if let Some(old) = old.filter(|o| o.id != new.id) {
            if let Err(e) = self.transport.unpublish(std::slice::from_ref(&old.id)).await {
                warn!("Failed to unpublish replaced track {}: {}", old.id, e);
            }
        }
        info!("Replaced published {:?} track with '{}'", new.kind, new.label);
        Ok(())
    }
}
