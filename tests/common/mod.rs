//! In-memory collaborators shared by the integration tests
#![allow(dead_code)]

use async_trait::async_trait;
use classroom_engine::backend::{
    CredentialProvider, JoinGrant, SessionBackend, SessionSnapshot, StaticCredentials, UploadReceipt,
};
use classroom_engine::config::Config;
use classroom_engine::coordinator::{Collaborators, SessionCoordinator};
use classroom_engine::device::{CaptureDevices, DeviceInfo, FacingMode, LocalTrack, TrackConstraints, TrackKind};
use classroom_engine::error::{SessionError, SessionResult};
use classroom_engine::media::{JoinParams, MediaTransport, RemoteTrack, TransportEvent};
use classroom_engine::model::{
    ChatMessage, Identity, Participant, RecordingSnapshot, Role, SessionInfo, SessionStatus,
};
use classroom_engine::recording::{CaptureFactory, SegmentCapture};
use classroom_engine::signaling::{Inbound, SignalEnvelope, SignalMessage, SignalingTransport};
use classroom_engine::storage::{MemorySegmentStore, Segment, SegmentStore};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

pub const SESSION: &str = "s-100";

/// Ordered record of device and publication side effects
#[derive(Debug, Clone, Default)]
pub struct Timeline(Arc<Mutex<Vec<String>>>);

impl Timeline {
    pub fn push(&self, entry: impl Into<String>) {
        self.0.lock().push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().clone()
    }

    pub fn position(&self, entry: &str) -> Option<usize> {
        self.0.lock().iter().position(|e| e == entry)
    }
}

// ----------------------------------------------------------------------------
// Devices
// ----------------------------------------------------------------------------

pub struct FakeDevices {
    pub devices: Mutex<Vec<DeviceInfo>>,
    pub deny: Mutex<Vec<TrackKind>>,
    pub timeline: Timeline,
}

pub fn device(id: &str, label: &str, kind: TrackKind, facing: Option<FacingMode>) -> DeviceInfo {
    DeviceInfo {
        device_id: id.to_string(),
        label: label.to_string(),
        kind,
        facing,
    }
}

impl FakeDevices {
    pub fn new(timeline: Timeline) -> Self {
        Self {
            devices: Mutex::new(vec![
                device("mic-1", "Built-in Microphone", TrackKind::Audio, None),
                device("cam-front", "FaceTime HD Camera (front)", TrackKind::Video, None),
                device("cam-obs", "OBS Virtual Camera", TrackKind::Video, None),
                device("cam-usb", "Logitech BRIO", TrackKind::Video, Some(FacingMode::Rear)),
            ]),
            deny: Mutex::new(Vec::new()),
            timeline,
        }
    }
}

#[async_trait]
impl CaptureDevices for FakeDevices {
    async fn enumerate(&self) -> SessionResult<Vec<DeviceInfo>> {
        Ok(self.devices.lock().clone())
    }

    async fn open(&self, kind: TrackKind, constraints: &TrackConstraints) -> SessionResult<LocalTrack> {
        if self.deny.lock().contains(&kind) {
            return Err(SessionError::DeviceUnavailable(format!("{:?} permission denied", kind)));
        }
        let devices = self.devices.lock();
        let device = devices
            .iter()
            .filter(|d| d.kind == kind)
            .find(|d| constraints.device_id.as_deref().map(|id| id == d.device_id).unwrap_or(true))
            .ok_or_else(|| SessionError::DeviceUnavailable(format!("no {:?} device", kind)))?;
        self.timeline.push(format!("open:{}", device.device_id));
        Ok(LocalTrack::new(kind, device))
    }

    async fn set_enabled(&self, track: &LocalTrack, enabled: bool) -> SessionResult<()> {
        self.timeline.push(format!("enabled:{}:{}", track.device_id, enabled));
        Ok(())
    }

    async fn release(&self, track: &LocalTrack) {
        self.timeline.push(format!("release:{}", track.device_id));
    }

    fn name(&self) -> &str {
        "fake-devices"
    }
}

// ----------------------------------------------------------------------------
// Media transport
// ----------------------------------------------------------------------------

pub struct FakeMedia {
    pub timeline: Timeline,
    pub local_id: u32,
    pub join_failures: Mutex<u32>,
    pub reject_join: Mutex<bool>,
    /// Remaining `StreamNotYetAvailable` answers per (transport id, kind)
    pub not_ready: Mutex<HashMap<(u32, TrackKind), u32>>,
    pub remote_mute: bool,
    pub muted: Mutex<Vec<u32>>,
    pub tokens: Mutex<Vec<String>>,
    pub events: Mutex<Option<mpsc::UnboundedSender<TransportEvent>>>,
    pub subscribe_calls: Mutex<u32>,
}

impl FakeMedia {
    pub fn new(timeline: Timeline) -> Self {
        Self {
            timeline,
            local_id: 1,
            join_failures: Mutex::new(0),
            reject_join: Mutex::new(false),
            not_ready: Mutex::new(HashMap::new()),
            remote_mute: true,
            muted: Mutex::new(Vec::new()),
            tokens: Mutex::new(Vec::new()),
            events: Mutex::new(None),
            subscribe_calls: Mutex::new(0),
        }
    }

    /// Push an event as the transport would
    pub fn emit(&self, event: TransportEvent) {
        if let Some(tx) = self.events.lock().as_ref() {
            let _ = tx.send(event);
        }
    }
}

#[async_trait]
impl MediaTransport for FakeMedia {
    async fn join(
        &self,
        params: &JoinParams,
        events: mpsc::UnboundedSender<TransportEvent>,
    ) -> SessionResult<u32> {
        if *self.reject_join.lock() {
            return Err(SessionError::AuthExpired);
        }
        {
            let mut failures = self.join_failures.lock();
            if *failures > 0 {
                *failures -= 1;
                return Err(SessionError::TransportUnavailable("network down".to_string()));
            }
        }
        self.timeline.push(format!("join:{}", params.channel));
        *self.events.lock() = Some(events);
        Ok(self.local_id)
    }

    async fn leave(&self) -> SessionResult<()> {
        self.timeline.push("leave");
        Ok(())
    }

    async fn publish(&self, tracks: &[LocalTrack]) -> SessionResult<()> {
        for track in tracks {
            self.timeline.push(format!("publish:{}", track.device_id));
        }
        Ok(())
    }

    async fn unpublish(&self, track_ids: &[String]) -> SessionResult<()> {
        for id in track_ids {
            self.timeline.push(format!("unpublish:{}", id));
        }
        Ok(())
    }

    async fn subscribe(&self, transport_id: u32, kind: TrackKind) -> SessionResult<RemoteTrack> {
        *self.subscribe_calls.lock() += 1;
        let mut not_ready = self.not_ready.lock();
        if let Some(remaining) = not_ready.get_mut(&(transport_id, kind)) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(SessionError::StreamNotYetAvailable(transport_id));
            }
        }
        Ok(RemoteTrack {
            transport_id,
            kind,
            track_id: format!("remote-{}-{:?}", transport_id, kind),
        })
    }

    async fn renew_token(&self, token: &str) -> SessionResult<()> {
        self.tokens.lock().push(token.to_string());
        Ok(())
    }

    fn supports_remote_mute(&self) -> bool {
        self.remote_mute
    }

    async fn mute_remote(&self, transport_id: u32) -> SessionResult<()> {
        self.muted.lock().push(transport_id);
        Ok(())
    }

    fn name(&self) -> &str {
        "fake-media"
    }
}

// ----------------------------------------------------------------------------
// Signaling transport
// ----------------------------------------------------------------------------

/// Loopback signaling: everything sent is recorded and, like a NATS
/// subscription on the same subject, echoed back to the sender
pub struct FakeSignaling {
    pub sent: Mutex<Vec<SignalEnvelope>>,
    pub inbound: Mutex<Option<mpsc::Sender<Inbound>>>,
    pub connects: Mutex<u32>,
    pub fail_connect: Mutex<bool>,
}

impl FakeSignaling {
    pub fn new() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            inbound: Mutex::new(None),
            connects: Mutex::new(0),
            fail_connect: Mutex::new(false),
        }
    }

    /// Deliver a message from another participant
    pub fn deliver(&self, sender_id: &str, event: SignalMessage) {
        let envelope = SignalEnvelope::new(SESSION, sender_id, event);
        if let Some(tx) = self.inbound.lock().as_ref() {
            let _ = tx.try_send(Inbound::Message(envelope));
        }
    }

    /// Close the current connection as if the socket died
    pub fn drop_connection(&self) {
        self.inbound.lock().take();
    }

    pub fn sent_events(&self) -> Vec<SignalMessage> {
        self.sent.lock().iter().map(|e| e.event.clone()).collect()
    }
}

#[async_trait]
impl SignalingTransport for FakeSignaling {
    async fn connect(&self, _room: &str, _credential: &str) -> SessionResult<mpsc::Receiver<Inbound>> {
        if *self.fail_connect.lock() {
            return Err(SessionError::TransportUnavailable("signaling down".to_string()));
        }
        *self.connects.lock() += 1;
        let (tx, rx) = mpsc::channel(256);
        *self.inbound.lock() = Some(tx);
        Ok(rx)
    }

    async fn send(&self, _room: &str, envelope: &SignalEnvelope) -> SessionResult<()> {
        let inbound = self.inbound.lock().clone().ok_or(SessionError::SignalingUnavailable)?;
        self.sent.lock().push(envelope.clone());
        let _ = inbound.try_send(Inbound::Message(envelope.clone()));
        Ok(())
    }

    async fn disconnect(&self) {
        self.inbound.lock().take();
    }

    fn name(&self) -> &str {
        "fake-signaling"
    }
}

// ----------------------------------------------------------------------------
// Session backend
// ----------------------------------------------------------------------------

pub struct FakeBackend {
    pub grant: Mutex<JoinGrant>,
    pub snapshot: Mutex<SessionSnapshot>,
    pub calls: Mutex<Vec<String>>,
    pub upload_failures: Mutex<u32>,
    pub uploads: Mutex<Vec<(Vec<u8>, f64)>>,
}

impl FakeBackend {
    pub fn new(grant: JoinGrant) -> Self {
        Self {
            grant: Mutex::new(grant),
            snapshot: Mutex::new(SessionSnapshot::default()),
            calls: Mutex::new(Vec::new()),
            upload_failures: Mutex::new(0),
            uploads: Mutex::new(Vec::new()),
        }
    }

    fn record(&self, call: &str) {
        self.calls.lock().push(call.to_string());
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    pub fn called(&self, call: &str) -> bool {
        self.calls.lock().iter().any(|c| c == call)
    }
}

#[async_trait]
impl SessionBackend for FakeBackend {
    async fn join_session(&self, _session_id: &str) -> SessionResult<JoinGrant> {
        self.record("join");
        Ok(self.grant.lock().clone())
    }

    async fn start_session(&self, _session_id: &str) -> SessionResult<()> {
        self.record("start");
        Ok(())
    }

    async fn end_session(&self, _session_id: &str) -> SessionResult<()> {
        self.record("end");
        Ok(())
    }

    async fn mark_chat_read(&self, _session_id: &str) -> SessionResult<()> {
        self.record("chat_read");
        Ok(())
    }

    async fn fetch_snapshot(&self, _session_id: &str) -> SessionResult<SessionSnapshot> {
        self.record("snapshot");
        Ok(self.snapshot.lock().clone())
    }

    async fn renew_media_token(&self, _session_id: &str) -> SessionResult<String> {
        self.record("media_token");
        Ok("fresh-token".to_string())
    }

    async fn start_recording(&self, _session_id: &str) -> SessionResult<()> {
        self.record("recording_start");
        Ok(())
    }

    async fn pause_recording(&self, _session_id: &str) -> SessionResult<()> {
        self.record("recording_pause");
        Ok(())
    }

    async fn resume_recording(&self, _session_id: &str) -> SessionResult<()> {
        self.record("recording_resume");
        Ok(())
    }

    async fn upload_recording(
        &self,
        _session_id: &str,
        artifact: Vec<u8>,
        duration_seconds: f64,
    ) -> SessionResult<UploadReceipt> {
        self.record("upload");
        {
            let mut failures = self.upload_failures.lock();
            if *failures > 0 {
                *failures -= 1;
                return Err(SessionError::UploadFailed("503 from storage".to_string()));
            }
        }
        self.uploads.lock().push((artifact, duration_seconds));
        Ok(UploadReceipt {
            recording_url: format!("https://recordings.example/{}.webm", SESSION),
        })
    }
}

// ----------------------------------------------------------------------------
// Capture
// ----------------------------------------------------------------------------

/// Capture pipes whose segments are pushed by the test
#[derive(Clone, Default)]
pub struct ManualCapture {
    feed: Arc<Mutex<Option<mpsc::Sender<Vec<u8>>>>>,
    pub opened: Arc<Mutex<u32>>,
    /// Video device behind each pipe, in opening order
    pub bound_video: Arc<Mutex<Vec<String>>>,
    timeline: Timeline,
}

impl ManualCapture {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeline(timeline: Timeline) -> Self {
        Self {
            timeline,
            ..Self::default()
        }
    }

    /// Produce one segment on the open pipe
    pub async fn push(&self, data: &[u8]) {
        let tx = self.feed.lock().clone();
        if let Some(tx) = tx {
            let _ = tx.send(data.to_vec()).await;
        }
    }

    pub fn is_open(&self) -> bool {
        self.feed.lock().is_some()
    }

    pub fn pipes_opened(&self) -> u32 {
        *self.opened.lock()
    }
}

struct ManualPipe {
    feed: Arc<Mutex<Option<mpsc::Sender<Vec<u8>>>>>,
}

#[async_trait]
impl SegmentCapture for ManualPipe {
    async fn start(&mut self, _slice: Duration) -> SessionResult<mpsc::Receiver<Vec<u8>>> {
        let (tx, rx) = mpsc::channel(64);
        *self.feed.lock() = Some(tx);
        Ok(rx)
    }

    async fn stop(&mut self) -> SessionResult<()> {
        self.feed.lock().take();
        Ok(())
    }

    fn name(&self) -> &str {
        "manual"
    }
}

impl CaptureFactory for ManualCapture {
    fn create(&self, _audio: &LocalTrack, video: &LocalTrack) -> SessionResult<Box<dyn SegmentCapture>> {
        *self.opened.lock() += 1;
        self.bound_video.lock().push(video.device_id.clone());
        self.timeline.push(format!("capture:{}", video.device_id));
        Ok(Box::new(ManualPipe {
            feed: Arc::clone(&self.feed),
        }))
    }
}

// ----------------------------------------------------------------------------
// Storage
// ----------------------------------------------------------------------------

/// Memory store whose operations can be made to fail a set number of times
#[derive(Clone, Default)]
pub struct FlakyStore {
    pub inner: MemorySegmentStore,
    pub append_failures: Arc<Mutex<u32>>,
    pub duration_failures: Arc<Mutex<u32>>,
    pub clear_failures: Arc<Mutex<u32>>,
}

impl FlakyStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn trip(counter: &Mutex<u32>) -> SessionResult<()> {
        let mut remaining = counter.lock();
        if *remaining > 0 {
            *remaining -= 1;
            return Err(SessionError::Storage(std::io::Error::new(
                std::io::ErrorKind::Other,
                "disk full",
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl SegmentStore for FlakyStore {
    async fn append(&self, session_id: &str, segment: &Segment) -> SessionResult<()> {
        Self::trip(&self.append_failures)?;
        self.inner.append(session_id, segment).await
    }

    async fn list_in_order(&self, session_id: &str) -> SessionResult<Vec<Segment>> {
        self.inner.list_in_order(session_id).await
    }

    async fn clear(&self, session_id: &str) -> SessionResult<()> {
        Self::trip(&self.clear_failures)?;
        self.inner.clear(session_id).await
    }

    async fn get_duration(&self, session_id: &str) -> SessionResult<f64> {
        self.inner.get_duration(session_id).await
    }

    async fn set_duration(&self, session_id: &str, seconds: f64) -> SessionResult<()> {
        Self::trip(&self.duration_failures)?;
        self.inner.set_duration(session_id, seconds).await
    }

    async fn pending_sessions(&self) -> SessionResult<Vec<String>> {
        self.inner.pending_sessions().await
    }
}

// ----------------------------------------------------------------------------
// Fixtures
// ----------------------------------------------------------------------------

pub fn participant(id: &str, role: Role, transport_id: u32) -> Participant {
    Participant::new(id, id.to_uppercase(), role).with_transport_id(transport_id)
}

pub fn grant_for(user_id: &str, role: Role, roster: Vec<Participant>) -> JoinGrant {
    JoinGrant {
        access_token: "media-token".to_string(),
        channel_name: format!("channel-{}", SESSION),
        participant_identity: Identity {
            user_id: user_id.to_string(),
            display_name: user_id.to_uppercase(),
            role,
        },
        session: SessionInfo {
            id: SESSION.to_string(),
            status: SessionStatus::Scheduled,
            scheduled_start_time: None,
            actual_start_time: None,
            end_time: None,
        },
        initial_roster: roster,
        initial_chat_history: Vec::<ChatMessage>::new(),
        recording: RecordingSnapshot::default(),
    }
}

pub fn test_config() -> Config {
    let mut config = Config::default();
    config.signaling.retry_delay_ms = 50;
    config.signaling.max_attempts = 3;
    config.signaling.timeout_secs = 5;
    config.media.join_backoff_ms = 10;
    config.media.subscribe_retry_delay_ms = 100;
    config.recording.upload_retry_delay_ms = 10;
    config
}

/// Every fake behind one coordinator
pub struct Harness {
    pub timeline: Timeline,
    pub backend: Arc<FakeBackend>,
    pub media: Arc<FakeMedia>,
    pub signaling: Arc<FakeSignaling>,
    pub devices: Arc<FakeDevices>,
    pub store: MemorySegmentStore,
    pub capture: ManualCapture,
}

impl Harness {
    pub fn new(grant: JoinGrant) -> Self {
        let timeline = Timeline::default();
        Self {
            backend: Arc::new(FakeBackend::new(grant)),
            media: Arc::new(FakeMedia::new(timeline.clone())),
            signaling: Arc::new(FakeSignaling::new()),
            devices: Arc::new(FakeDevices::new(timeline.clone())),
            store: MemorySegmentStore::new(),
            capture: ManualCapture::with_timeline(timeline.clone()),
            timeline,
        }
    }

    pub fn presenter() -> Self {
        Self::new(grant_for("p1", Role::Presenter, Vec::new()))
    }

    pub fn collaborators(&self) -> Collaborators {
        let credentials: Arc<dyn CredentialProvider> = Arc::new(StaticCredentials::new("bearer"));
        Collaborators {
            backend: self.backend.clone(),
            credentials,
            media: self.media.clone(),
            signaling: self.signaling.clone(),
            devices: self.devices.clone(),
            store: Arc::new(self.store.clone()),
            capture: Arc::new(self.capture.clone()),
        }
    }

    pub fn coordinator(&self) -> SessionCoordinator {
        SessionCoordinator::create(SESSION, test_config(), self.collaborators())
    }
}
