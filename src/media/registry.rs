use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::transport::RemoteTrack;
use crate::device::TrackKind;

/// Opaque rendering handle supplied by the UI layer
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RenderTarget(pub String);

/// Id-indexed map of render targets and subscribed remote tracks
#[derive(Debug, Default)]
pub struct TrackRegistry {
    targets: HashMap<String, RenderTarget>,
    remote: HashMap<(u32, TrackKind), RemoteTrack>,
}

impl TrackRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_target(&mut self, participant_id: &str, target: RenderTarget) {
        self.targets.insert(participant_id.to_string(), target);
    }

    pub fn unregister_target(&mut self, participant_id: &str) -> Option<RenderTarget> {
        self.targets.remove(participant_id)
    }

    pub fn target_for(&self, participant_id: &str) -> Option<&RenderTarget> {
        self.targets.get(participant_id)
    }

    pub fn insert_remote(&mut self, track: RemoteTrack) {
        self.remote.insert((track.transport_id, track.kind), track);
    }

    pub fn remove_remote(&mut self, transport_id: u32, kind: TrackKind) -> Option<RemoteTrack> {
        self.remote.remove(&(transport_id, kind))
    }

    /// Drop every track published under `transport_id`
    pub fn remove_transport(&mut self, transport_id: u32) -> Vec<RemoteTrack> {
        let keys: Vec<_> = self
            .remote
            .keys()
            .filter(|(id, _)| *id == transport_id)
            .copied()
            .collect();
        keys.into_iter().filter_map(|k| self.remote.remove(&k)).collect()
    }

    pub fn has_track(&self, transport_id: u32, kind: TrackKind) -> bool {
        self.remote.contains_key(&(transport_id, kind))
    }

    pub fn remote_track(&self, transport_id: u32, kind: TrackKind) -> Option<&RemoteTrack> {
        self.remote.get(&(transport_id, kind))
    }

    pub fn clear(&mut self) {
        self.targets.clear();
        self.remote.clear();
    }
}
