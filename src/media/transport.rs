use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::device::{LocalTrack, TrackKind};
use crate::error::SessionResult;
use crate::model::Identity;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionChangeReason {
    Joining,
    Network,
    Recovered,
    Left,
    /// Server refused or dropped the session (token rejected, banned);
    /// not recoverable by waiting
    Rejected,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinParams {
    pub channel: String,
    pub token: String,
    pub identity: Identity,
}

/// A subscribed remote track
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteTrack {
    pub transport_id: u32,
    pub kind: TrackKind,
    pub track_id: String,
}

/// Events pushed by the transport after `join`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    ConnectionStateChanged {
        state: ConnectionState,
        reason: ConnectionChangeReason,
    },
    /// May arrive before the media is actually subscribable
    RemoteTrackAvailable { transport_id: u32, kind: TrackKind },
    RemoteTrackRemoved { transport_id: u32, kind: TrackKind },
    RemoteUserLeft { transport_id: u32 },
    TokenWillExpire,
}

/// Real-time media network capability
#[async_trait]
pub trait MediaTransport: Send + Sync {
    /// Join the channel; returns the local transport id. Events for the
    /// lifetime of the join are delivered on `events`.
    ///
    /// Fails with `AuthExpired` on a rejected token and
    /// `TransportUnavailable` on network failure.
    async fn join(
        &self,
        params: &JoinParams,
        events: mpsc::UnboundedSender<TransportEvent>,
    ) -> SessionResult<u32>;

    async fn leave(&self) -> SessionResult<()>;

    /// Publishing a kind that is already published replaces it in place
    async fn publish(&self, tracks: &[LocalTrack]) -> SessionResult<()>;

    async fn unpublish(&self, track_ids: &[String]) -> SessionResult<()>;

    /// Fails with `StreamNotYetAvailable` if the stream was announced but
    /// cannot be consumed yet
    async fn subscribe(&self, transport_id: u32, kind: TrackKind) -> SessionResult<RemoteTrack>;

    async fn renew_token(&self, token: &str) -> SessionResult<()>;

    /// Whether the media server can mute a remote participant
    fn supports_remote_mute(&self) -> bool {
        false
    }

    async fn mute_remote(&self, _transport_id: u32) -> SessionResult<()> {
        Ok(())
    }

    /// Transport name for logging
    fn name(&self) -> &str;
}
