mod common;

use classroom_engine::device::{DeviceTrackManager, FacingMode, TrackConstraints, TrackKind};
use classroom_engine::error::SessionError;
use classroom_engine::media::MediaSessionClient;
use common::{test_config, FakeDevices, FakeMedia, Timeline};
use std::sync::Arc;

struct Rig {
    timeline: Timeline,
    devices: Arc<FakeDevices>,
    media: MediaSessionClient,
}

impl Rig {
    fn new() -> Self {
        let timeline = Timeline::default();
        Self {
            devices: Arc::new(FakeDevices::new(timeline.clone())),
            media: MediaSessionClient::new(
                Arc::new(FakeMedia::new(timeline.clone())),
                test_config().media,
            ),
            timeline,
        }
    }

    fn manager(&self) -> DeviceTrackManager {
        DeviceTrackManager::new(self.devices.clone())
    }
}

#[tokio::test]
async fn test_camera_switch_publishes_before_releasing() {
    let rig = Rig::new();
    let mut manager = rig.manager();
    let front = manager.acquire(TrackKind::Video, &TrackConstraints::video()).await.unwrap();
    rig.media.publish(&manager.tracks()).await.unwrap();

    let switched = manager.switch_camera(&rig.media).await.unwrap().unwrap();

    // The OBS virtual camera sits between the two physical ones and is skipped
    assert_eq!(switched.device_id, "cam-usb");
    assert_eq!(manager.track(TrackKind::Video), Some(&switched));

    let publish_new = rig.timeline.position("publish:cam-usb").unwrap();
    let unpublish_old = rig.timeline.position(&format!("unpublish:{}", front.id)).unwrap();
    let release_old = rig.timeline.position("release:cam-front").unwrap();
    assert!(publish_new < unpublish_old);
    assert!(publish_new < release_old);
    assert!(rig.timeline.position("open:cam-obs").is_none());
    assert_eq!(rig.media.published_tracks(), vec![switched]);
}

#[tokio::test]
async fn test_camera_switch_wraps_and_keeps_disabled_state() {
    let rig = Rig::new();
    let mut manager = rig.manager();
    manager.acquire(TrackKind::Video, &TrackConstraints::video()).await.unwrap();
    manager.set_enabled(TrackKind::Video, false).await.unwrap();

    let usb = manager.switch_camera(&rig.media).await.unwrap().unwrap();
    assert!(!usb.enabled);
    assert!(rig.timeline.entries().contains(&"enabled:cam-usb:false".to_string()));

    let back = manager.switch_camera(&rig.media).await.unwrap().unwrap();
    assert_eq!(back.device_id, "cam-front");
    assert!(!manager.is_enabled(TrackKind::Video));
}

#[tokio::test]
async fn test_single_physical_camera_does_not_switch() {
    let rig = Rig::new();
    rig.devices.devices.lock().retain(|d| d.device_id != "cam-usb");
    let mut manager = rig.manager();
    let front = manager.acquire(TrackKind::Video, &TrackConstraints::video()).await.unwrap();

    assert_eq!(manager.switch_camera(&rig.media).await.unwrap(), None);
    assert_eq!(manager.track(TrackKind::Video), Some(&front));
    assert!(rig.timeline.position("release:cam-front").is_none());
}

#[tokio::test]
async fn test_switch_without_camera_is_device_error() {
    let rig = Rig::new();
    let mut manager = rig.manager();

    let err = manager.switch_camera(&rig.media).await.unwrap_err();
    assert!(matches!(err, SessionError::DeviceUnavailable(_)));
}

#[tokio::test]
async fn test_denied_permission_surfaces_as_device_unavailable() {
    let rig = Rig::new();
    rig.devices.deny.lock().push(TrackKind::Audio);
    let mut manager = rig.manager();

    let err = manager.acquire(TrackKind::Audio, &TrackConstraints::audio()).await.unwrap_err();
    assert!(matches!(err, SessionError::DeviceUnavailable(_)));
    assert!(manager.track(TrackKind::Audio).is_none());

    // Video is unaffected
    manager.acquire(TrackKind::Video, &TrackConstraints::video()).await.unwrap();
    assert!(!manager.has_audio_and_video());
    assert!(!manager.set_enabled(TrackKind::Audio, false).await.unwrap());
}

#[tokio::test]
async fn test_acquire_twice_returns_held_track() {
    let rig = Rig::new();
    let mut manager = rig.manager();
    let first = manager.acquire(TrackKind::Audio, &TrackConstraints::audio()).await.unwrap();
    let second = manager.acquire(TrackKind::Audio, &TrackConstraints::audio()).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(rig.timeline.entries(), vec!["open:mic-1"]);

    manager.release_all().await;
    assert!(manager.tracks().is_empty());
    assert_eq!(rig.timeline.entries(), vec!["open:mic-1", "release:mic-1"]);
}

#[tokio::test]
async fn test_mirroring_follows_facing() {
    let rig = Rig::new();
    let mut manager = rig.manager();
    let front = manager.acquire(TrackKind::Video, &TrackConstraints::video()).await.unwrap();
    assert_eq!(DeviceTrackManager::detect_facing(&front), FacingMode::Front);
    assert!(DeviceTrackManager::should_mirror(&front));

    let usb = manager.switch_camera(&rig.media).await.unwrap().unwrap();
    // Orientation metadata wins over a label with no keywords
    assert_eq!(DeviceTrackManager::detect_facing(&usb), FacingMode::Rear);
    assert!(!DeviceTrackManager::should_mirror(&usb));
}
