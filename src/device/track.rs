use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackKind {
    Audio,
    Video,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FacingMode {
    Front,
    Rear,
}

/// A capture device as reported by enumeration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub device_id: String,
    pub label: String,
    pub kind: TrackKind,
    /// Orientation metadata, when the platform reports it
    pub facing: Option<FacingMode>,
}

/// Live local capture track
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalTrack {
    pub id: String,
    pub kind: TrackKind,
    pub device_id: String,
    pub label: String,
    pub facing: Option<FacingMode>,
    pub enabled: bool,
}

impl LocalTrack {
    pub fn new(kind: TrackKind, device: &DeviceInfo) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            kind,
            device_id: device.device_id.clone(),
            label: device.label.clone(),
            facing: device.facing,
            enabled: true,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackConstraints {
    /// Pin a specific device; `None` lets the platform pick its default
    pub device_id: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub frame_rate: Option<u32>,
    pub echo_cancellation: bool,
}

impl TrackConstraints {
    pub fn video() -> Self {
        Self {
            width: Some(1280),
            height: Some(720),
            frame_rate: Some(30),
            ..Self::default()
        }
    }

    pub fn audio() -> Self {
        Self {
            echo_cancellation: true,
            ..Self::default()
        }
    }

    pub fn for_kind(kind: TrackKind) -> Self {
        match kind {
            TrackKind::Audio => Self::audio(),
            TrackKind::Video => Self::video(),
        }
    }

    pub fn with_device(mut self, device_id: impl Into<String>) -> Self {
        self.device_id = Some(device_id.into());
        self
    }
}
