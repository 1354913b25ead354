use std::sync::Arc;
use tracing::{info, warn};

use super::backend::{CaptureDevices, TrackPublisher};
use super::track::{DeviceInfo, FacingMode, LocalTrack, TrackConstraints, TrackKind};
use crate::error::{SessionError, SessionResult};

/// Label fragments that identify software/loopback cameras
const VIRTUAL_CAMERA_MARKERS: &[&str] = &[
    "virtual",
    "snap camera",
    "manycam",
    "xsplit",
    "loopback",
    "dummy",
    "screen capture",
];

/// Whole-word markers (substring matching would hit e.g. "Jobs Cam")
const VIRTUAL_CAMERA_WORDS: &[&str] = &["obs", "ndi", "v4l2loopback"];

const REAR_KEYWORDS: &[&str] = &["back", "rear", "environment"];
const FRONT_KEYWORDS: &[&str] = &["front", "user", "facetime"];

/// A camera switch whose previous device is still open
#[derive(Debug)]
pub struct CameraSwitch {
    pub previous: LocalTrack,
    pub current: LocalTrack,
}

/// Owns the local audio and video tracks for one session
pub struct DeviceTrackManager {
    devices: Arc<dyn CaptureDevices>,
    audio: Option<LocalTrack>,
    video: Option<LocalTrack>,
}

impl DeviceTrackManager {
    pub fn new(devices: Arc<dyn CaptureDevices>) -> Self {
        Self {
            devices,
            audio: None,
            video: None,
        }
    }

    /// Acquire a live track of `kind`. An already-held track is returned as is.
    pub async fn acquire(
        &mut self,
        kind: TrackKind,
        constraints: &TrackConstraints,
    ) -> SessionResult<LocalTrack> {
        if let Some(existing) = self.track(kind) {
            return Ok(existing.clone());
        }

        let track = self.devices.open(kind, constraints).await.map_err(|e| match e {
            SessionError::DeviceUnavailable(_) => e,
            other => SessionError::DeviceUnavailable(other.to_string()),
        })?;

        info!(
            "Acquired {:?} track '{}' via {}",
            kind,
            track.label,
            self.devices.name()
        );
        self.slot(kind).replace(track.clone());
        Ok(track)
    }

    pub fn track(&self, kind: TrackKind) -> Option<&LocalTrack> {
        match kind {
            TrackKind::Audio => self.audio.as_ref(),
            TrackKind::Video => self.video.as_ref(),
        }
    }

    fn slot(&mut self, kind: TrackKind) -> &mut Option<LocalTrack> {
        match kind {
            TrackKind::Audio => &mut self.audio,
            TrackKind::Video => &mut self.video,
        }
    }

    pub fn tracks(&self) -> Vec<LocalTrack> {
        self.audio.iter().chain(self.video.iter()).cloned().collect()
    }

    pub fn has_audio_and_video(&self) -> bool {
        self.audio.is_some() && self.video.is_some()
    }

    /// Toggle capture of `kind` without releasing the device.
    ///
    /// Returns false when no track of that kind is held.
    pub async fn set_enabled(&mut self, kind: TrackKind, enabled: bool) -> SessionResult<bool> {
        let devices = Arc::clone(&self.devices);
        let Some(track) = self.slot(kind).as_mut() else {
            return Ok(false);
        };
        if track.enabled == enabled {
            return Ok(true);
        }

        devices.set_enabled(track, enabled).await?;
        track.enabled = enabled;
        info!("{:?} capture {}", kind, if enabled { "enabled" } else { "disabled" });
        Ok(true)
    }

    pub fn is_enabled(&self, kind: TrackKind) -> bool {
        self.track(kind).map(|t| t.enabled).unwrap_or(false)
    }

    /// Move to the next physical camera.
    ///
    /// The new track is opened and published before the old device is
    /// released, so published video never goes through an unpublished gap.
    /// Returns `None` when no other physical camera exists.
    pub async fn switch_camera(
        &mut self,
        publisher: &dyn TrackPublisher,
    ) -> SessionResult<Option<LocalTrack>> {
        let Some(switch) = self.begin_camera_switch(publisher).await? else {
            return Ok(None);
        };
        let current = switch.current.clone();
        self.complete_camera_switch(switch).await;
        Ok(Some(current))
    }

    /// Open and publish the next physical camera, keeping the old device open.
    ///
    /// Anything still consuming the previous track (a recording capture) can
    /// move over before `complete_camera_switch` releases it.
    pub async fn begin_camera_switch(
        &mut self,
        publisher: &dyn TrackPublisher,
    ) -> SessionResult<Option<CameraSwitch>> {
        let current = self
            .video
            .clone()
            .ok_or_else(|| SessionError::DeviceUnavailable("no active camera".to_string()))?;

        let cameras: Vec<DeviceInfo> = self
            .devices
            .enumerate()
            .await?
            .into_iter()
            .filter(|d| d.kind == TrackKind::Video && is_physical_camera(&d.label))
            .collect();

        let Some(next) = next_camera(&cameras, &current.device_id) else {
            info!("No other physical camera available, keeping '{}'", current.label);
            return Ok(None);
        };

        let constraints = TrackConstraints::video().with_device(next.device_id.clone());
        let mut new_track = self.devices.open(TrackKind::Video, &constraints).await?;
        if !current.enabled {
            self.devices.set_enabled(&new_track, false).await?;
            new_track.enabled = false;
        }

        if let Err(e) = publisher.replace_track(Some(&current), &new_track).await {
            warn!("Failed to publish camera '{}': {}", new_track.label, e);
            self.devices.release(&new_track).await;
            return Err(e);
        }

        self.video = Some(new_track.clone());
        Ok(Some(CameraSwitch {
            previous: current,
            current: new_track,
        }))
    }

    /// Release the camera a switch moved away from
    pub async fn complete_camera_switch(&mut self, switch: CameraSwitch) {
        self.devices.release(&switch.previous).await;
        info!(
            "Switched camera '{}' -> '{}'",
            switch.previous.label, switch.current.label
        );
    }

    /// Release every held device
    pub async fn release_all(&mut self) {
        for track in [self.audio.take(), self.video.take()].into_iter().flatten() {
            self.devices.release(&track).await;
        }
    }

    /// Orientation metadata first, then label keywords; unknown cameras are
    /// treated as front-facing.
    pub fn detect_facing(track: &LocalTrack) -> FacingMode {
        if let Some(facing) = track.facing {
            return facing;
        }
        let label = track.label.to_lowercase();
        let front = FRONT_KEYWORDS.iter().any(|k| label.contains(k));
        let rear = REAR_KEYWORDS.iter().any(|k| label.contains(k));
        match (front, rear) {
            (false, true) => FacingMode::Rear,
            _ => FacingMode::Front,
        }
    }

    /// Front-facing video is mirrored for display, rear-facing is not
    pub fn should_mirror(track: &LocalTrack) -> bool {
        Self::detect_facing(track) == FacingMode::Front
    }
}

pub(crate) fn is_physical_camera(label: &str) -> bool {
    let label = label.to_lowercase();
    if VIRTUAL_CAMERA_MARKERS.iter().any(|m| label.contains(m)) {
        return false;
    }
    !label
        .split(|c: char| !c.is_ascii_alphanumeric())
        .any(|word| VIRTUAL_CAMERA_WORDS.contains(&word))
}

fn next_camera<'a>(cameras: &'a [DeviceInfo], current_id: &str) -> Option<&'a DeviceInfo> {
    let start = cameras
        .iter()
        .position(|d| d.device_id == current_id)
        .map(|i| i + 1)
        .unwrap_or(0);

    (0..cameras.len())
        .map(|offset| &cameras[(start + offset) % cameras.len()])
        .find(|d| d.device_id != current_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn track(label: &str, facing: Option<FacingMode>) -> LocalTrack {
        LocalTrack {
            id: "t".to_string(),
            kind: TrackKind::Video,
            device_id: "d".to_string(),
            label: label.to_string(),
            facing,
            enabled: true,
        }
    }

    #[test]
    fn test_virtual_cameras_filtered() {
        assert!(!is_physical_camera("OBS Virtual Camera"));
        assert!(!is_physical_camera("OBS Cam"));
        assert!(!is_physical_camera("Snap Camera"));
        assert!(!is_physical_camera("v4l2loopback device"));
        assert!(is_physical_camera("FaceTime HD Camera"));
        assert!(is_physical_camera("Logitech BRIO"));
        assert!(is_physical_camera("Jobs Cam"));
    }

    #[test]
    fn test_facing_prefers_metadata() {
        assert_eq!(
            DeviceTrackManager::detect_facing(&track("Back Camera", Some(FacingMode::Front))),
            FacingMode::Front
        );
    }

    #[test]
    fn test_facing_from_label() {
        assert_eq!(DeviceTrackManager::detect_facing(&track("Back Camera", None)), FacingMode::Rear);
        assert_eq!(
            DeviceTrackManager::detect_facing(&track("camera2 1, facing environment", None)),
            FacingMode::Rear
        );
        assert_eq!(DeviceTrackManager::detect_facing(&track("Front Camera", None)), FacingMode::Front);
        assert!(DeviceTrackManager::should_mirror(&track("USB Webcam", None)));
        assert!(!DeviceTrackManager::should_mirror(&track("Rear Camera", None)));
    }

    #[test]
    fn test_next_camera_wraps() {
        let cams: Vec<DeviceInfo> = ["a", "b", "c"]
            .iter()
            .map(|id| DeviceInfo {
                device_id: id.to_string(),
                label: id.to_string(),
                kind: TrackKind::Video,
                facing: None,
            })
            .collect();

        assert_eq!(next_camera(&cams, "a").unwrap().device_id, "b");
        assert_eq!(next_camera(&cams, "c").unwrap().device_id, "a");
        assert_eq!(next_camera(&cams[..1], "a"), None);
    }
}
