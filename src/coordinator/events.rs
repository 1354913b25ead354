use serde::Serialize;

use crate::device::TrackKind;
use crate::media::{ConnectionIndicator, RenderTarget};
use crate::model::RecordingStatus;
use crate::signaling::SignalingStatus;

/// Coordinator lifecycle.
///
/// `initializing → joining → active → ending → ended`, with `active → error`
/// on unrecoverable media failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CoordinatorPhase {
    Initializing,
    Joining,
    Active,
    Ending,
    Ended,
    /// The user chooses between `retry_join` and `leave`
    Error,
}

/// Pushed to every UI subscriber
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ClassroomEvent {
    PhaseChanged(CoordinatorPhase),
    ConnectionChanged(ConnectionIndicator),
    SignalingChanged(SignalingStatus),
    RosterChanged { active: usize },
    ChatChanged { unread: usize },
    HandsChanged { raised: Vec<String> },
    RecordingChanged(RecordingStatus),
    TrackAttached {
        participant_id: String,
        kind: TrackKind,
        target: RenderTarget,
        mirror: bool,
    },
    TrackDetached {
        participant_id: String,
        kind: TrackKind,
    },
    /// Capture failed for one kind; the session continues without it
    DeviceUnavailable { kind: TrackKind, reason: String },
    Notice(String),
    Kicked,
    ChromeVisibility(bool),
    Error(String),
}
