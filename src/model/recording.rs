use serde::{Deserialize, Serialize};

/// Recording lifecycle.
///
/// `idle → recording ⇄ paused → uploading → {completed | failed}`; a failed
/// upload may be retried, which re-enters `uploading`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordingStatus {
    #[default]
    Idle,
    Recording,
    Paused,
    Uploading,
    Completed,
    Failed,
}

impl RecordingStatus {
    /// Capture is in progress or resumable
    pub fn is_active(self) -> bool {
        matches!(self, RecordingStatus::Recording | RecordingStatus::Paused)
    }
}

/// Recording state as last acknowledged by the session backend
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RecordingSnapshot {
    pub status: RecordingStatus,
    #[serde(default)]
    pub accumulated_duration_seconds: f64,
}
