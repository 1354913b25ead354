use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{error, info, warn};

use super::capture::{CaptureFactory, SegmentCapture};
use super::clock::DurationClock;
use crate::backend::{SessionBackend, UploadReceipt};
use crate::config::RecordingConfig;
use crate::device::{LocalTrack, TrackKind};
use crate::error::{SessionError, SessionResult};
use crate::model::{RecordingSnapshot, RecordingStatus};
use crate::retry::RetryPolicy;
use crate::storage::{Segment, SegmentStore};

/// Recording state machine for one session.
///
/// `idle → recording ⇄ paused → uploading → {completed | failed}`
pub struct RecordingPipeline {
    session_id: String,
    config: RecordingConfig,
    store: Arc<dyn SegmentStore>,
    backend: Arc<dyn SessionBackend>,
    factory: Arc<dyn CaptureFactory>,
    status: RecordingStatus,
    clock: Arc<Mutex<DurationClock>>,
    next_sequence: Arc<AtomicU64>,
    committed: Arc<AtomicU64>,
    lost: Arc<AtomicU64>,
    capture: Option<Box<dyn SegmentCapture>>,
    writer: Option<JoinHandle<()>>,
    /// Cleared on the unmount path so nothing is uploaded behind the user's back
    upload_enabled: bool,
    receipt: Option<UploadReceipt>,
}

impl RecordingPipeline {
    pub fn new(
        session_id: impl Into<String>,
        config: RecordingConfig,
        store: Arc<dyn SegmentStore>,
        backend: Arc<dyn SessionBackend>,
        factory: Arc<dyn CaptureFactory>,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            config,
            store,
            backend,
            factory,
            status: RecordingStatus::Idle,
            clock: Arc::new(Mutex::new(DurationClock::new())),
            next_sequence: Arc::new(AtomicU64::new(0)),
            committed: Arc::new(AtomicU64::new(0)),
            lost: Arc::new(AtomicU64::new(0)),
            capture: None,
            writer: None,
            upload_enabled: true,
            receipt: None,
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn status(&self) -> RecordingStatus {
        self.status
    }

    /// Recorded time so far, including the open span
    pub fn duration_secs(&self) -> f64 {
        self.clock.lock().total(Instant::now()).as_secs_f64()
    }

    /// Segments persisted by this pipeline instance
    pub fn segments_committed(&self) -> u64 {
        self.committed.load(Ordering::SeqCst)
    }

    /// Segments produced by capture that could not be persisted
    pub fn segments_lost(&self) -> u64 {
        self.lost.load(Ordering::SeqCst)
    }

    pub fn receipt(&self) -> Option<&UploadReceipt> {
        self.receipt.as_ref()
    }

    /// Begin recording. A second start while recording or paused is a no-op
    /// that reports the existing state.
    pub async fn start(&mut self, tracks: &[LocalTrack]) -> SessionResult<RecordingStatus> {
        match self.status {
            RecordingStatus::Recording | RecordingStatus::Paused => {
                info!(
                    "Recording for {} already {:?}, not starting another capture",
                    self.session_id, self.status
                );
                return Ok(self.status);
            }
            RecordingStatus::Uploading => {
                return Err(SessionError::invalid_state("recording upload in progress"));
            }
            RecordingStatus::Failed => {
                return Err(SessionError::invalid_state(
                    "previous recording is awaiting upload; retry stop to upload it",
                ));
            }
            RecordingStatus::Idle | RecordingStatus::Completed => {}
        }
        let (audio, video) = require_tracks(tracks)?;

        let existing = self.store.list_in_order(&self.session_id).await?;
        self.next_sequence
            .store(existing.last().map(|s| s.sequence + 1).unwrap_or(0), Ordering::SeqCst);
        let duration = self.store.get_duration(&self.session_id).await?;
        *self.clock.lock() = DurationClock::restored(duration);
        self.receipt = None;
        self.upload_enabled = true;
        self.lost.store(0, Ordering::SeqCst);

        self.open_capture(audio, video).await?;
        self.status = RecordingStatus::Recording;
        info!("Recording started for {}", self.session_id);

        if let Err(e) = self.backend.start_recording(&self.session_id).await {
            warn!("Backend did not acknowledge recording start: {}", e);
        }
        Ok(self.status)
    }

    /// Stop producing segments and snapshot the elapsed duration
    pub async fn pause(&mut self) -> SessionResult<RecordingStatus> {
        match self.status {
            RecordingStatus::Paused => return Ok(self.status),
            RecordingStatus::Recording => {}
            other => {
                return Err(SessionError::invalid_state(format!(
                    "cannot pause recording while {:?}",
                    other
                )))
            }
        }

        self.close_capture().await;
        self.status = RecordingStatus::Paused;
        info!(
            "Recording paused for {} at {:.1}s",
            self.session_id,
            self.duration_secs()
        );

        if let Err(e) = self.backend.pause_recording(&self.session_id).await {
            warn!("Backend did not acknowledge recording pause: {}", e);
        }
        Ok(self.status)
    }

    /// Continue into the same segment sequence with a new capture pipe
    pub async fn resume(&mut self, tracks: &[LocalTrack]) -> SessionResult<RecordingStatus> {
        match self.status {
            RecordingStatus::Recording => return Ok(self.status),
            RecordingStatus::Paused => {}
            other => {
                return Err(SessionError::invalid_state(format!(
                    "cannot resume recording while {:?}",
                    other
                )))
            }
        }
        let (audio, video) = require_tracks(tracks)?;

        self.open_capture(audio, video).await?;
        self.status = RecordingStatus::Recording;
        info!(
            "Recording resumed for {} at sequence {}",
            self.session_id,
            self.next_sequence.load(Ordering::SeqCst)
        );

        if let Err(e) = self.backend.resume_recording(&self.session_id).await {
            warn!("Backend did not acknowledge recording resume: {}", e);
        }
        Ok(self.status)
    }

    /// Move an active capture onto replacement tracks, e.g. after a camera
    /// switch. The new pipe writes into the same segment sequence.
    pub async fn rebind(&mut self, tracks: &[LocalTrack]) -> SessionResult<RecordingStatus> {
        if self.status != RecordingStatus::Recording {
            return Ok(self.status);
        }
        let (audio, video) = require_tracks(tracks)?;

        self.close_capture().await;
        if let Err(e) = self.open_capture(audio, video).await {
            self.status = RecordingStatus::Paused;
            error!("Could not rebind capture for {}, recording paused: {}", self.session_id, e);
            return Err(e);
        }
        info!(
            "Capture for {} rebound to '{}' at sequence {}",
            self.session_id,
            video.label,
            self.next_sequence.load(Ordering::SeqCst)
        );
        Ok(self.status)
    }

    /// Finish capture, assemble every persisted segment and upload.
    ///
    /// On success durable segments are purged; on failure they are kept and
    /// `stop` may be called again to retry.
    pub async fn stop(&mut self) -> SessionResult<UploadReceipt> {
        match self.status {
            RecordingStatus::Recording => self.close_capture().await,
            RecordingStatus::Paused | RecordingStatus::Failed => {}
            other => {
                return Err(SessionError::invalid_state(format!(
                    "cannot stop recording while {:?}",
                    other
                )))
            }
        }
        if !self.upload_enabled {
            return Err(SessionError::invalid_state("recording was detached from this session view"));
        }

        let duration = self.duration_secs();
        if let Err(e) = self.store.set_duration(&self.session_id, duration).await {
            warn!(
                "Failed to persist final duration for {}, uploading with {:.1}s: {}",
                self.session_id, duration, e
            );
        }
        self.status = RecordingStatus::Uploading;

        match upload_persisted(
            self.store.as_ref(),
            self.backend.as_ref(),
            &self.session_id,
            duration,
            &self.config.upload_policy(),
        )
        .await
        {
            Ok(receipt) => {
                self.status = RecordingStatus::Completed;
                *self.clock.lock() = DurationClock::new();
                self.next_sequence.store(0, Ordering::SeqCst);
                self.receipt = Some(receipt.clone());
                info!("Recording for {} uploaded to {}", self.session_id, receipt.recording_url);
                Ok(receipt)
            }
            Err(e) => {
                self.status = RecordingStatus::Failed;
                error!(
                    "Recording upload for {} failed, segments retained: {}",
                    self.session_id, e
                );
                Err(e)
            }
        }
    }

    /// Unmount path: flush in-flight segments and disable uploading. Durable
    /// segments and the backend's recording state are left as they are so a
    /// later visit can resume or stop.
    pub async fn detach(&mut self) -> RecordingStatus {
        if self.status == RecordingStatus::Recording {
            self.close_capture().await;
        }
        self.upload_enabled = false;
        info!(
            "Recording for {} detached while {:?}; {} segments left in storage",
            self.session_id,
            self.status,
            self.next_sequence.load(Ordering::SeqCst)
        );
        self.status
    }

    /// Re-enter a session whose authoritative recording state is recording
    /// or paused.
    ///
    /// With local segments, capture continues into the same sequence (or
    /// stays paused). Without any, continuity cannot be guaranteed, so the
    /// pipeline comes up paused and waits for an explicit resume.
    pub async fn restore(
        &mut self,
        snapshot: &RecordingSnapshot,
        tracks: &[LocalTrack],
    ) -> SessionResult<RecordingStatus> {
        if self.status != RecordingStatus::Idle || !snapshot.status.is_active() {
            return Ok(self.status);
        }

        let segments = self.store.list_in_order(&self.session_id).await?;
        let duration = self.store.get_duration(&self.session_id).await?;
        self.next_sequence
            .store(segments.last().map(|s| s.sequence + 1).unwrap_or(0), Ordering::SeqCst);
        *self.clock.lock() = DurationClock::restored(duration);

        if segments.is_empty() {
            warn!(
                "Recording for {} is {:?} upstream but no local segments exist; waiting for explicit resume",
                self.session_id, snapshot.status
            );
            self.status = RecordingStatus::Paused;
            return Ok(self.status);
        }

        info!(
            "Restored {} segments ({:.1}s) for {}",
            segments.len(),
            duration,
            self.session_id
        );

        self.status = RecordingStatus::Paused;
        if snapshot.status == RecordingStatus::Recording {
            match require_tracks(tracks) {
                Ok((audio, video)) => {
                    self.open_capture(audio, video).await?;
                    self.status = RecordingStatus::Recording;
                    info!("Recording capture resumed for {}", self.session_id);
                }
                Err(e) => warn!("Cannot resume capture for {}: {}", self.session_id, e),
            }
        }
        Ok(self.status)
    }

    async fn open_capture(&mut self, audio: &LocalTrack, video: &LocalTrack) -> SessionResult<()> {
        let mut capture = self.factory.create(audio, video)?;
        let rx = capture.start(self.config.segment_duration()).await?;
        info!("Capture pipe '{}' opened for {}", capture.name(), self.session_id);

        self.clock.lock().open(Instant::now());
        self.writer = Some(tokio::spawn(write_segments(
            self.session_id.clone(),
            rx,
            Arc::clone(&self.store),
            Arc::clone(&self.next_sequence),
            Arc::clone(&self.committed),
            Arc::clone(&self.lost),
            Arc::clone(&self.clock),
        )));
        self.capture = Some(capture);
        Ok(())
    }

    /// Close the open span, stop the pipe and wait until every produced
    /// segment is persisted
    async fn close_capture(&mut self) {
        self.clock.lock().close(Instant::now());

        if let Some(mut capture) = self.capture.take() {
            if let Err(e) = capture.stop().await {
                error!("Failed to stop capture '{}': {}", capture.name(), e);
            }
        }

        if let Some(writer) = self.writer.take() {
            if let Err(e) = writer.await {
                error!("Segment writer for {} panicked: {}", self.session_id, e);
            }
        }

        let total = self.duration_secs();
        if let Err(e) = self.store.set_duration(&self.session_id, total).await {
            error!("Failed to persist recording duration for {}: {}", self.session_id, e);
        }
    }
}

fn require_tracks(tracks: &[LocalTrack]) -> SessionResult<(&LocalTrack, &LocalTrack)> {
    let audio = tracks.iter().find(|t| t.kind == TrackKind::Audio);
    let video = tracks.iter().find(|t| t.kind == TrackKind::Video);
    match (audio, video) {
        (Some(audio), Some(video)) => Ok((audio, video)),
        _ => Err(SessionError::MissingTracks),
    }
}

/// Persist each produced segment before counting it.
///
/// A failed write loses that one segment; the pipe keeps draining so later
/// segments still reach storage.
async fn write_segments(
    session_id: String,
    mut rx: mpsc::Receiver<Vec<u8>>,
    store: Arc<dyn SegmentStore>,
    next_sequence: Arc<AtomicU64>,
    committed: Arc<AtomicU64>,
    lost: Arc<AtomicU64>,
    clock: Arc<Mutex<DurationClock>>,
) {
    while let Some(data) = rx.recv().await {
        let sequence = next_sequence.fetch_add(1, Ordering::SeqCst);
        if let Err(e) = store.append(&session_id, &Segment::new(sequence, data)).await {
            lost.fetch_add(1, Ordering::SeqCst);
            error!("Lost segment {} for {}: {}", sequence, session_id, e);
            continue;
        }
        committed.fetch_add(1, Ordering::SeqCst);

        let total = clock.lock().total(Instant::now()).as_secs_f64();
        if let Err(e) = store.set_duration(&session_id, total).await {
            warn!("Failed to persist duration for {}: {}", session_id, e);
        }
    }
}

/// Assemble a session's persisted segments in order, upload them and purge
/// the store on success.
///
/// Shared by `RecordingPipeline::stop` and the recovery CLI.
pub async fn upload_persisted(
    store: &dyn SegmentStore,
    backend: &dyn SessionBackend,
    session_id: &str,
    duration_secs: f64,
    policy: &RetryPolicy,
) -> SessionResult<UploadReceipt> {
    let segments = store.list_in_order(session_id).await?;
    if segments.is_empty() {
        return Err(SessionError::UploadFailed(format!(
            "no recorded segments for {}",
            session_id
        )));
    }

    let artifact: Vec<u8> = segments.iter().flat_map(|s| s.data.iter().copied()).collect();
    info!(
        "Assembled {} segments ({} bytes, {:.1}s) for {}",
        segments.len(),
        artifact.len(),
        duration_secs,
        session_id
    );

    let receipt = policy
        .run("recording upload", |_| {
            backend.upload_recording(session_id, artifact.clone(), duration_secs)
        })
        .await?;

    // The artifact is already uploaded; leftovers show up in `pending`
    if let Err(e) = store.clear(session_id).await {
        warn!("Uploaded {} but could not purge its segments: {}", session_id, e);
    }
    Ok(receipt)
}
