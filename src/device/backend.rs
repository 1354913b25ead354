use async_trait::async_trait;

use super::track::{DeviceInfo, LocalTrack, TrackConstraints, TrackKind};
use crate::error::SessionResult;

/// Platform capture capability
#[async_trait]
pub trait CaptureDevices: Send + Sync {
    /// List capture devices of every kind
    async fn enumerate(&self) -> SessionResult<Vec<DeviceInfo>>;

    /// Open a live track.
    ///
    /// Fails with `DeviceUnavailable` when permission is denied or no
    /// matching device exists.
    async fn open(&self, kind: TrackKind, constraints: &TrackConstraints) -> SessionResult<LocalTrack>;

    /// Toggle capture without releasing the device (audio mutes via gain)
    async fn set_enabled(&self, track: &LocalTrack, enabled: bool) -> SessionResult<()>;

    /// Release the underlying device handle
    async fn release(&self, track: &LocalTrack);

    /// Backend name for logging
    fn name(&self) -> &str;
}

/// Publishes a replacement track in place of an existing one
#[async_trait]
pub trait TrackPublisher: Send + Sync {
    /// Must not leave the kind unpublished between old and new
    async fn replace_track(&self, old: Option<&LocalTrack>, new: &LocalTrack) -> SessionResult<()>;
}
