use serde::Serialize;

use super::events::CoordinatorPhase;
use crate::device::TrackKind;
use crate::media::{ConnectionIndicator, TrackRegistry};
use crate::model::{ChatMessage, Identity, Participant, RecordingStatus, Role, SessionStatus};
use crate::signaling::SignalingStatus;

/// One tile in the participant grid
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParticipantView {
    pub user_id: String,
    pub display_name: String,
    pub role: Role,
    pub is_local: bool,
    pub is_muted: bool,
    pub is_video_enabled: bool,
    pub has_raised_hand: bool,
    /// A subscribed remote track (or a held local one) exists for this kind
    pub has_audio: bool,
    pub has_video: bool,
}

impl ParticipantView {
    pub(crate) fn remote(participant: &Participant, registry: &TrackRegistry, raised: bool) -> Self {
        let has = |kind| {
            participant
                .transport_id
                .map(|id| registry.has_track(id, kind))
                .unwrap_or(false)
        };
        Self {
            user_id: participant.user_id.clone(),
            display_name: participant.display_name.clone(),
            role: participant.role,
            is_local: false,
            is_muted: participant.is_muted,
            is_video_enabled: participant.is_video_enabled,
            has_raised_hand: raised,
            has_audio: has(TrackKind::Audio),
            has_video: has(TrackKind::Video),
        }
    }
}

/// Everything the classroom screen renders
#[derive(Debug, Clone, Serialize)]
pub struct ClassroomView {
    pub session_id: String,
    pub phase: CoordinatorPhase,
    pub status: Option<SessionStatus>,
    pub me: Option<Identity>,
    /// Active participants in join order; empty while in the error phase
    pub participants: Vec<ParticipantView>,
    pub raised_hands: Vec<String>,
    pub chat: Vec<ChatMessage>,
    pub unread: usize,
    pub recording: RecordingStatus,
    pub recording_duration_secs: f64,
    pub connection: Option<ConnectionIndicator>,
    pub signaling: SignalingStatus,
    pub chrome_visible: bool,
    pub last_error: Option<String>,
}

impl ClassroomView {
    pub fn participant(&self, user_id: &str) -> Option<&ParticipantView> {
        self.participants.iter().find(|p| p.user_id == user_id)
    }

    pub fn roster_ids(&self) -> Vec<&str> {
        self.participants.iter().map(|p| p.user_id.as_str()).collect()
    }
}
