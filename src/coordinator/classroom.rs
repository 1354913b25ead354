use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::events::{ClassroomEvent, CoordinatorPhase};
use super::hands::HandRaiseSet;
use super::view::{ClassroomView, ParticipantView};
use crate::backend::{CredentialProvider, SessionBackend, UploadReceipt};
use crate::config::Config;
use crate::device::{CaptureDevices, DeviceTrackManager, LocalTrack, TrackConstraints, TrackKind};
use crate::error::{SessionError, SessionResult};
use crate::media::{
    ConnectionChangeReason, ConnectionIndicator, ConnectionState, MediaSessionClient, MediaTransport,
    RemoteTrack, RenderTarget, TrackRegistry, TransportEvent,
};
use crate::model::{
    ChatMessage, Identity, MergeOutcome, Participant, RecordingStatus, Role, Session, SessionStatus,
};
use crate::recording::{CaptureFactory, RecordingPipeline};
use crate::signaling::{SignalEnvelope, SignalMessage, SignalingChannel, SignalingEvent, SignalingStatus, SignalingTransport};
use crate::storage::SegmentStore;

const EVENT_CAPACITY: usize = 256;

/// External capabilities a coordinator runs against
#[derive(Clone)]
pub struct Collaborators {
    pub backend: Arc<dyn SessionBackend>,
    pub credentials: Arc<dyn CredentialProvider>,
    pub media: Arc<dyn MediaTransport>,
    pub signaling: Arc<dyn SignalingTransport>,
    pub devices: Arc<dyn CaptureDevices>,
    pub store: Arc<dyn SegmentStore>,
    pub capture: Arc<dyn CaptureFactory>,
}

/// Work produced by tasks the coordinator spawned
#[derive(Debug)]
pub(crate) enum Internal {
    Subscribed {
        transport_id: u32,
        kind: TrackKind,
        result: SessionResult<Option<RemoteTrack>>,
    },
    HideChrome {
        generation: u64,
    },
}

/// Everything the event loop reacts to besides commands
#[derive(Debug)]
pub(crate) enum Input {
    Transport(TransportEvent),
    Signaling(SignalingEvent),
    Internal(Internal),
}

/// Session-scoped state container for one classroom.
///
/// Owns the device tracks, media session, signaling channel and recording
/// pipeline; merges their events into one view model. Every field lives and
/// dies with this instance, so several coordinators can coexist.
pub struct SessionCoordinator {
    session_id: String,
    config: Config,
    deps: Collaborators,
    phase: CoordinatorPhase,
    me: Option<Identity>,
    session: Option<Session>,
    devices: DeviceTrackManager,
    media: Arc<MediaSessionClient>,
    signaling: SignalingChannel,
    registry: TrackRegistry,
    hands: HandRaiseSet,
    recording: Option<RecordingPipeline>,
    indicator: Option<ConnectionIndicator>,
    last_error: Option<String>,
    chrome_visible: bool,
    chrome_generation: u64,
    cancel: CancellationToken,
    events: broadcast::Sender<ClassroomEvent>,
    transport_tx: mpsc::UnboundedSender<TransportEvent>,
    transport_rx: mpsc::UnboundedReceiver<TransportEvent>,
    signaling_tx: mpsc::UnboundedSender<SignalingEvent>,
    signaling_rx: mpsc::UnboundedReceiver<SignalingEvent>,
    internal_tx: mpsc::UnboundedSender<Internal>,
    internal_rx: mpsc::UnboundedReceiver<Internal>,
}

impl SessionCoordinator {
    pub fn create(session_id: impl Into<String>, config: Config, deps: Collaborators) -> Self {
        let session_id = session_id.into();
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let (transport_tx, transport_rx) = mpsc::unbounded_channel();
        let (signaling_tx, signaling_rx) = mpsc::unbounded_channel();
        let (internal_tx, internal_rx) = mpsc::unbounded_channel();

        info!("Creating classroom coordinator for session {}", session_id);
        Self {
            devices: DeviceTrackManager::new(Arc::clone(&deps.devices)),
            media: Arc::new(MediaSessionClient::new(Arc::clone(&deps.media), config.media.clone())),
            signaling: SignalingChannel::new(Arc::clone(&deps.signaling), config.signaling.clone()),
            session_id,
            config,
            deps,
            phase: CoordinatorPhase::Initializing,
            me: None,
            session: None,
            registry: TrackRegistry::new(),
            hands: HandRaiseSet::new(),
            recording: None,
            indicator: None,
            last_error: None,
            chrome_visible: true,
            chrome_generation: 0,
            cancel: CancellationToken::new(),
            events,
            transport_tx,
            transport_rx,
            signaling_tx,
            signaling_rx,
            internal_tx,
            internal_rx,
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn phase(&self) -> CoordinatorPhase {
        self.phase
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ClassroomEvent> {
        self.events.subscribe()
    }

    pub(crate) fn event_sender(&self) -> broadcast::Sender<ClassroomEvent> {
        self.events.clone()
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    pub fn local_tracks(&self) -> Vec<LocalTrack> {
        self.devices.tracks()
    }

    pub fn recording_status(&self) -> RecordingStatus {
        self.recording
            .as_ref()
            .map(|r| r.status())
            .unwrap_or_default()
    }

    fn emit(&self, event: ClassroomEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    fn set_phase(&mut self, phase: CoordinatorPhase) {
        if self.phase != phase {
            info!("Classroom {} phase {:?} -> {:?}", self.session_id, self.phase, phase);
            self.phase = phase;
            self.emit(ClassroomEvent::PhaseChanged(phase));
        }
    }

    fn fail(&mut self, err: &SessionError) {
        error!("Classroom {} failed: {}", self.session_id, err);
        self.last_error = Some(err.to_string());
        self.set_phase(CoordinatorPhase::Error);
        self.emit(ClassroomEvent::Error(err.to_string()));
    }

    fn require_active(&self) -> SessionResult<()> {
        match self.phase {
            CoordinatorPhase::Active => Ok(()),
            phase => Err(SessionError::invalid_state(format!(
                "classroom is {:?}, not active",
                phase
            ))),
        }
    }

    fn identity(&self) -> SessionResult<&Identity> {
        self.me
            .as_ref()
            .ok_or_else(|| SessionError::invalid_state("classroom not joined"))
    }

    fn require_presenter(&self) -> SessionResult<&Identity> {
        let me = self.identity()?;
        if me.role != Role::Presenter {
            return Err(SessionError::invalid_state("only the presenter can do this"));
        }
        Ok(me)
    }

    fn session_mut(&mut self) -> SessionResult<&mut Session> {
        self.session
            .as_mut()
            .ok_or_else(|| SessionError::invalid_state("classroom not joined"))
    }

    fn is_me(&self, user_id: &str) -> bool {
        self.me.as_ref().map(|m| m.user_id == user_id).unwrap_or(false)
    }

    /// Join the classroom: backend grant, local capture, media join and
    /// publish, then signaling. Local tracks are published before the
    /// connected indicator is surfaced.
    ///
    /// Device and signaling failures degrade the session; media join failure
    /// puts the coordinator in the error phase.
    pub async fn join(&mut self) -> SessionResult<ClassroomView> {
        match self.phase {
            CoordinatorPhase::Initializing | CoordinatorPhase::Error => {}
            phase => {
                return Err(SessionError::invalid_state(format!(
                    "cannot join while {:?}",
                    phase
                )))
            }
        }
        self.cancel = CancellationToken::new();
        self.last_error = None;
        self.set_phase(CoordinatorPhase::Joining);

        match self.establish().await {
            Ok(()) => {
                self.set_phase(CoordinatorPhase::Active);
                self.show_chrome();
                Ok(self.view())
            }
            Err(e) => {
                self.fail(&e);
                Err(e)
            }
        }
    }

    /// Re-run the join flow from the error phase
    pub async fn retry_join(&mut self) -> SessionResult<ClassroomView> {
        if self.phase != CoordinatorPhase::Error {
            return Err(SessionError::invalid_state("retry is only offered after a failure"));
        }
        info!("Retrying join for {}", self.session_id);
        self.cancel.cancel();
        self.signaling.disconnect().await;
        if let Err(e) = self.media.leave().await {
            debug!("Leaving half-joined media channel: {}", e);
        }
        self.registry.clear();
        self.join().await
    }

    async fn establish(&mut self) -> SessionResult<()> {
        let grant = self.deps.backend.join_session(&self.session_id).await?;
        let me = grant.participant_identity.clone();
        info!(
            "Joining {} as {} ({:?})",
            self.session_id, me.display_name, me.role
        );

        let mut session = Session::new(grant.session.clone(), self.config.chat.dedupe_window());
        for participant in grant.initial_roster.iter().cloned() {
            session.participants.join(participant);
        }
        for message in grant.initial_chat_history.iter().cloned() {
            session.chat_messages.merge(message);
        }
        if me.role == Role::Presenter && session.status == SessionStatus::Scheduled {
            self.deps.backend.start_session(&self.session_id).await?;
            session.transition_to(SessionStatus::Live, Utc::now())?;
            info!("Session {} is live", self.session_id);
        }
        self.hands = HandRaiseSet::new();
        for participant in session.participants.active().filter(|p| p.has_raised_hand) {
            self.hands.raise(&participant.user_id);
        }
        self.me = Some(me.clone());
        self.session = Some(session);

        self.acquire_local_tracks().await;

        let transport_id = self
            .media
            .join(&grant.channel_name, &grant.access_token, &me, self.transport_tx.clone())
            .await?;
        if let Err(e) = self.media.publish(&self.devices.tracks()).await {
            warn!("Publishing local tracks failed, continuing receive-only: {}", e);
            self.emit(ClassroomEvent::Notice(format!("Could not share camera/microphone: {}", e)));
        }

        let mut local = Participant::new(&me.user_id, &me.display_name, me.role).with_transport_id(transport_id);
        local.is_muted = !self.devices.is_enabled(TrackKind::Audio);
        local.is_video_enabled = self.devices.is_enabled(TrackKind::Video);
        self.session_mut()?.participants.join(local.clone());

        self.indicator = Some(ConnectionIndicator::Connected);
        self.emit(ClassroomEvent::ConnectionChanged(ConnectionIndicator::Connected));

        self.connect_signaling(local).await;

        if me.role == Role::Presenter && grant.recording.status.is_active() {
            self.restore_recording(&grant.recording).await;
        }

        self.emit_roster();
        self.emit_chat();
        Ok(())
    }

    async fn acquire_local_tracks(&mut self) {
        for kind in [TrackKind::Audio, TrackKind::Video] {
            if let Err(e) = self.devices.acquire(kind, &TrackConstraints::for_kind(kind)).await {
                warn!("Continuing without {:?}: {}", kind, e);
                self.emit(ClassroomEvent::DeviceUnavailable {
                    kind,
                    reason: e.to_string(),
                });
            }
        }
    }

    async fn connect_signaling(&mut self, local: Participant) {
        let credential = match self.deps.credentials.bearer_token().await {
            Ok(token) => token,
            Err(e) => {
                warn!("No credential for signaling, running media-only: {}", e);
                self.emit(ClassroomEvent::SignalingChanged(SignalingStatus::Failed));
                return;
            }
        };

        match self
            .signaling
            .connect(
                &self.session_id,
                &credential,
                local,
                self.signaling_tx.clone(),
                self.cancel.child_token(),
            )
            .await
        {
            Ok(status) => {
                self.emit(ClassroomEvent::SignalingChanged(status));
                if status == SignalingStatus::Reconnecting {
                    self.emit(ClassroomEvent::Notice(
                        "Chat is connecting; messages will appear shortly".to_string(),
                    ));
                }
            }
            Err(e) => {
                warn!("Signaling unavailable, running media-only: {}", e);
                self.emit(ClassroomEvent::SignalingChanged(SignalingStatus::Failed));
                self.emit(ClassroomEvent::Notice(
                    "Chat and participant controls are unavailable".to_string(),
                ));
            }
        }
    }

    async fn restore_recording(&mut self, snapshot: &crate::model::RecordingSnapshot) {
        let tracks = self.devices.tracks();
        let pipeline = self.recording_pipeline();
        match pipeline.restore(snapshot, &tracks).await {
            Ok(status) => {
                info!("Recording restored as {:?}", status);
                if let Ok(session) = self.session_mut() {
                    session.recording = status;
                }
                self.emit(ClassroomEvent::RecordingChanged(status));
                if status == RecordingStatus::Paused && snapshot.status == RecordingStatus::Recording {
                    self.emit(ClassroomEvent::Notice(
                        "Recording is paused on this device; resume to continue".to_string(),
                    ));
                }
            }
            Err(e) => {
                error!("Failed to restore recording: {}", e);
                self.emit(ClassroomEvent::Notice(format!("Recording could not be restored: {}", e)));
            }
        }
    }

    /// Wait for the next transport, signaling or internal input
    pub(crate) async fn next_input(&mut self) -> Option<Input> {
        tokio::select! {
            Some(event) = self.transport_rx.recv() => Some(Input::Transport(event)),
            Some(event) = self.signaling_rx.recv() => Some(Input::Signaling(event)),
            Some(internal) = self.internal_rx.recv() => Some(Input::Internal(internal)),
            else => None,
        }
    }

    fn try_next_input(&mut self) -> Option<Input> {
        if let Ok(event) = self.transport_rx.try_recv() {
            return Some(Input::Transport(event));
        }
        if let Ok(event) = self.signaling_rx.try_recv() {
            return Some(Input::Signaling(event));
        }
        self.internal_rx.try_recv().ok().map(Input::Internal)
    }

    pub(crate) async fn handle_input(&mut self, input: Input) {
        if matches!(self.phase, CoordinatorPhase::Ended) {
            debug!("Dropping input after session end: {:?}", input);
            return;
        }
        match input {
            Input::Transport(event) => self.handle_transport_event(event),
            Input::Signaling(event) => self.handle_signaling_event(event).await,
            Input::Internal(internal) => self.handle_internal(internal),
        }
    }

    /// Wait for one input and apply it
    pub async fn step(&mut self) {
        if let Some(input) = self.next_input().await {
            self.handle_input(input).await;
        }
    }

    /// Apply every input that is ready, letting spawned tasks run in between.
    /// Returns how many were applied.
    pub async fn pump(&mut self) -> usize {
        let mut applied = 0;
        let mut idle = 0;
        while idle < 8 {
            tokio::task::yield_now().await;
            match self.try_next_input() {
                Some(input) => {
                    self.handle_input(input).await;
                    applied += 1;
                    idle = 0;
                }
                None => idle += 1,
            }
        }
        applied
    }

    pub fn handle_transport_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::ConnectionStateChanged { state, reason } => {
                if let Some(indicator) = self.media.on_connection_state(state) {
                    if self.indicator != Some(indicator) {
                        self.indicator = Some(indicator);
                        self.emit(ClassroomEvent::ConnectionChanged(indicator));
                    }
                }
                let unrecoverable = state == ConnectionState::Disconnected
                    && matches!(reason, ConnectionChangeReason::Network | ConnectionChangeReason::Rejected);
                if unrecoverable && self.phase == CoordinatorPhase::Active {
                    let err = if reason == ConnectionChangeReason::Rejected {
                        SessionError::AuthExpired
                    } else {
                        SessionError::TransportUnavailable("media connection lost".to_string())
                    };
                    self.fail(&err);
                }
            }
            TransportEvent::RemoteTrackAvailable { transport_id, kind } => {
                self.spawn_subscribe(transport_id, kind);
            }
            TransportEvent::RemoteTrackRemoved { transport_id, kind } => {
                if self.registry.remove_remote(transport_id, kind).is_some() {
                    if let Some(p) = self.participant_for_transport(transport_id) {
                        self.emit(ClassroomEvent::TrackDetached {
                            participant_id: p,
                            kind,
                        });
                    }
                }
            }
            TransportEvent::RemoteUserLeft { transport_id } => {
                self.registry.remove_transport(transport_id);
                // Without signaling the media transport is the only presence source
                if !self.signaling.is_available() {
                    if let Some(user_id) = self.participant_for_transport(transport_id) {
                        self.depart(&user_id);
                    }
                }
            }
            TransportEvent::TokenWillExpire => self.spawn_token_renewal(),
        }
    }

    fn participant_for_transport(&self, transport_id: u32) -> Option<String> {
        self.session
            .as_ref()?
            .participants
            .find_by_transport_id(transport_id)
            .map(|p| p.user_id.clone())
    }

    fn spawn_subscribe(&self, transport_id: u32, kind: TrackKind) {
        let media = Arc::clone(&self.media);
        let tx = self.internal_tx.clone();
        let cancel = self.cancel.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("Subscribe to {:?} from {} cancelled", kind, transport_id);
                }
                result = media.subscribe(transport_id, kind) => {
                    let _ = tx.send(Internal::Subscribed { transport_id, kind, result });
                }
            }
        });
    }

    fn spawn_token_renewal(&self) {
        let backend = Arc::clone(&self.deps.backend);
        let media = Arc::clone(&self.media);
        let session_id = self.session_id.clone();
        let cancel = self.cancel.clone();
        info!("Media token about to expire, renewing");
        tokio::spawn(async move {
            let renew = async {
                match backend.renew_media_token(&session_id).await {
                    // Failure is logged inside; media keeps flowing until rejected
                    Ok(token) => {
                        let _ = media.renew_token(&token).await;
                    }
                    Err(e) => warn!("Could not obtain a fresh media token: {}", e),
                }
            };
            tokio::select! {
                _ = cancel.cancelled() => debug!("Token renewal cancelled"),
                _ = renew => {}
            }
        });
    }

    fn handle_internal(&mut self, internal: Internal) {
        match internal {
            Internal::Subscribed {
                transport_id,
                kind,
                result,
            } => match result {
                Ok(Some(track)) => {
                    self.registry.insert_remote(track);
                    if let Some(user_id) = self.participant_for_transport(transport_id) {
                        self.attach_remote(&user_id);
                    }
                    self.emit_roster();
                }
                Ok(None) => {}
                Err(e) => warn!(
                    "Subscribing to {:?} from transport id {} failed: {}",
                    kind, transport_id, e
                ),
            },
            Internal::HideChrome { generation } => {
                if generation == self.chrome_generation && self.chrome_visible {
                    self.chrome_visible = false;
                    self.emit(ClassroomEvent::ChromeVisibility(false));
                }
            }
        }
    }

    /// Emit attachments for every subscribed track of `user_id` that has a
    /// render target
    fn attach_remote(&self, user_id: &str) {
        let Some(target) = self.registry.target_for(user_id) else {
            return;
        };
        let Some(transport_id) = self
            .session
            .as_ref()
            .and_then(|s| s.participants.get(user_id))
            .and_then(|p| p.transport_id)
        else {
            return;
        };
        for kind in [TrackKind::Audio, TrackKind::Video] {
            if self.registry.has_track(transport_id, kind) {
                self.emit(ClassroomEvent::TrackAttached {
                    participant_id: user_id.to_string(),
                    kind,
                    target: target.clone(),
                    mirror: false,
                });
            }
        }
    }

    fn attach_local_video(&self) {
        let Some(me) = &self.me else {
            return;
        };
        if let (Some(target), Some(track)) = (
            self.registry.target_for(&me.user_id),
            self.devices.track(TrackKind::Video),
        ) {
            self.emit(ClassroomEvent::TrackAttached {
                participant_id: me.user_id.clone(),
                kind: TrackKind::Video,
                target: target.clone(),
                mirror: DeviceTrackManager::should_mirror(track),
            });
        }
    }

    /// The UI supplies where a participant's video renders
    pub fn register_render_target(&mut self, participant_id: &str, target: RenderTarget) {
        self.registry.register_target(participant_id, target);
        if self.is_me(participant_id) {
            self.attach_local_video();
        } else {
            self.attach_remote(participant_id);
        }
    }

    pub fn unregister_render_target(&mut self, participant_id: &str) {
        self.registry.unregister_target(participant_id);
    }

    pub async fn handle_signaling_event(&mut self, event: SignalingEvent) {
        match event {
            SignalingEvent::Message(envelope) => {
                if envelope.session_id != self.session_id {
                    debug!("Ignoring signaling for other session {}", envelope.session_id);
                    return;
                }
                self.apply_signal(envelope).await;
            }
            SignalingEvent::Disconnected => {
                self.emit(ClassroomEvent::SignalingChanged(SignalingStatus::Reconnecting));
            }
            SignalingEvent::Reconnected => {
                self.emit(ClassroomEvent::SignalingChanged(SignalingStatus::Connected));
                self.resync().await;
            }
            SignalingEvent::Failed => {
                self.emit(ClassroomEvent::SignalingChanged(SignalingStatus::Failed));
                self.emit(ClassroomEvent::Notice(
                    "Chat and participant controls are unavailable".to_string(),
                ));
            }
        }
    }

    /// Full roster and chat reload from the backend after signaling recovers
    pub async fn resync(&mut self) {
        let snapshot = match self.deps.backend.fetch_snapshot(&self.session_id).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!("Resync after reconnect failed: {}", e);
                return;
            }
        };
        let Some(session) = self.session.as_mut() else {
            return;
        };

        let me = self.me.as_ref().and_then(|me| session.participants.get(&me.user_id).cloned());
        let mut roster = snapshot.roster;
        // The snapshot may predate our own re-announce
        if let Some(me) = me.filter(|me| !roster.iter().any(|p| p.user_id == me.user_id)) {
            roster.push(me);
        }
        session.participants.apply_snapshot(roster, Utc::now());
        for message in snapshot.chat {
            session.chat_messages.merge(message);
        }

        self.rebuild_hands();
        info!(
            "Resynced {}: {} active participants, {} messages",
            self.session_id,
            self.session.as_ref().map(|s| s.participants.active_count()).unwrap_or(0),
            self.session.as_ref().map(|s| s.chat_messages.len()).unwrap_or(0)
        );
        self.emit_roster();
        self.emit_chat();
    }

    fn rebuild_hands(&mut self) {
        let Some(session) = &self.session else {
            return;
        };
        let raised: Vec<String> = session
            .participants
            .active()
            .filter(|p| p.has_raised_hand)
            .map(|p| p.user_id.clone())
            .collect();
        let changed = self.hands.retain(|u| raised.iter().any(|r| r == u));
        let added = raised.iter().fold(false, |acc, u| self.hands.raise(u) || acc);
        if changed || added {
            self.emit_hands();
        }
    }

    async fn apply_signal(&mut self, envelope: SignalEnvelope) {
        let sender = envelope.sender_id;
        match envelope.event {
            SignalMessage::JoinRoom { participant } => {
                let user_id = participant.user_id.clone();
                let changed = match self.session.as_mut() {
                    Some(session) => session.participants.join(participant),
                    None => return,
                };
                if changed {
                    debug!("{} joined {}", user_id, self.session_id);
                    self.emit_roster();
                }
                self.attach_remote(&user_id);
            }
            SignalMessage::LeaveRoom { user_id } => self.depart(&user_id),
            SignalMessage::RosterSnapshot { participants } => {
                if let Some(session) = self.session.as_mut() {
                    session.participants.apply_snapshot(participants, Utc::now());
                }
                self.rebuild_hands();
                self.emit_roster();
            }
            SignalMessage::Chat { mut message } => {
                // The broadcast is authoritative; its client ref identifies it
                if message.id.is_none() {
                    message.id = message.client_ref.clone();
                }
                let Some(session) = self.session.as_mut() else {
                    return;
                };
                if session.chat_messages.merge(message) != MergeOutcome::Duplicate {
                    self.emit_chat();
                }
            }
            SignalMessage::Status {
                user_id,
                is_muted,
                is_video_enabled,
            } => {
                if let Some(p) = self.session.as_mut().and_then(|s| s.participants.get_mut(&user_id)) {
                    p.is_muted = is_muted;
                    p.is_video_enabled = is_video_enabled;
                    self.emit_roster();
                }
            }
            SignalMessage::ForceMute { target_user_id } => {
                if !self.sent_by_presenter(&sender) {
                    warn!("Ignoring force-mute from non-presenter {}", sender);
                    return;
                }
                if self.is_me(&target_user_id) {
                    info!("Muted by presenter {}", sender);
                    if let Err(e) = self.set_audio_enabled(false).await {
                        warn!("Failed to mute local audio: {}", e);
                    }
                    self.emit(ClassroomEvent::Notice("You were muted by the presenter".to_string()));
                } else if let Some(p) = self
                    .session
                    .as_mut()
                    .and_then(|s| s.participants.get_mut(&target_user_id))
                {
                    p.is_muted = true;
                    self.emit_roster();
                }
            }
            SignalMessage::Kick { target_user_id } => {
                if !self.sent_by_presenter(&sender) {
                    warn!("Ignoring kick from non-presenter {}", sender);
                    return;
                }
                if self.is_me(&target_user_id) {
                    info!("Removed from {} by presenter {}", self.session_id, sender);
                    self.emit(ClassroomEvent::Kicked);
                    self.leave().await;
                } else {
                    self.depart(&target_user_id);
                }
            }
            SignalMessage::HandRaise { user_id, raised } => {
                let active = self
                    .session
                    .as_ref()
                    .and_then(|s| s.participants.get(&user_id))
                    .map(|p| p.is_active())
                    .unwrap_or(false);
                if raised && !active {
                    debug!("Ignoring hand raise from inactive {}", user_id);
                    return;
                }
                self.apply_hand(&user_id, raised);
            }
        }
    }

    fn sent_by_presenter(&self, sender: &str) -> bool {
        self.session
            .as_ref()
            .and_then(|s| s.participants.get(sender))
            .map(|p| p.role == Role::Presenter)
            .unwrap_or(false)
    }

    fn apply_hand(&mut self, user_id: &str, raised: bool) {
        if let Some(p) = self.session.as_mut().and_then(|s| s.participants.get_mut(user_id)) {
            p.has_raised_hand = raised;
        }
        if self.hands.set(user_id, raised) {
            self.emit_hands();
        }
    }

    /// Mark a participant departed and drop everything keyed on them
    fn depart(&mut self, user_id: &str) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        let transport_id = session.participants.get(user_id).and_then(|p| p.transport_id);
        if !session.participants.leave(user_id, Utc::now()) {
            return;
        }
        info!("{} left {}", user_id, self.session_id);

        if let Some(transport_id) = transport_id {
            for track in self.registry.remove_transport(transport_id) {
                self.emit(ClassroomEvent::TrackDetached {
                    participant_id: user_id.to_string(),
                    kind: track.kind,
                });
            }
        }
        if self.hands.lower(user_id) {
            self.emit_hands();
        }
        self.emit_roster();
    }

    fn emit_roster(&self) {
        let active = self
            .session
            .as_ref()
            .map(|s| s.participants.active_count())
            .unwrap_or(0);
        self.emit(ClassroomEvent::RosterChanged { active });
    }

    fn emit_chat(&self) {
        self.emit(ClassroomEvent::ChatChanged {
            unread: self.unread_count(),
        });
    }

    fn emit_hands(&self) {
        self.emit(ClassroomEvent::HandsChanged {
            raised: self.hands.to_vec(),
        });
    }

    /// Send a chat message with an optimistic local echo
    pub async fn send_message(&mut self, text: &str) -> SessionResult<ChatMessage> {
        self.require_active()?;
        let text = text.trim();
        if text.is_empty() {
            return Err(SessionError::invalid_state("empty chat message"));
        }
        if !self.signaling.is_available() {
            return Err(SessionError::SignalingUnavailable);
        }
        let me = self.identity()?.clone();
        let message = ChatMessage::local(&me.user_id, &me.display_name, text);

        self.session_mut()?.chat_messages.push_local(message.clone());
        self.emit_chat();
        self.signaling
            .send(SignalMessage::Chat {
                message: message.clone(),
            })
            .await?;
        Ok(message)
    }

    /// Mark every message read for the local user, locally and upstream
    pub async fn mark_chat_read(&mut self) -> SessionResult<usize> {
        let me = self.identity()?.user_id.clone();
        let marked = self.session_mut()?.chat_messages.mark_read(&me, Utc::now());
        self.emit_chat();
        self.deps.backend.mark_chat_read(&self.session_id).await?;
        Ok(marked)
    }

    pub fn unread_count(&self) -> usize {
        match (&self.session, &self.me) {
            (Some(session), Some(me)) => session.chat_messages.unread_count(&me.user_id),
            _ => 0,
        }
    }

    fn active_participant(&self, user_id: &str) -> SessionResult<&Participant> {
        self.session
            .as_ref()
            .and_then(|s| s.participants.get(user_id))
            .filter(|p| p.is_active())
            .ok_or_else(|| SessionError::UnknownParticipant(user_id.to_string()))
    }

    /// Force-mute a participant. The command goes out on signaling and, where
    /// the transport supports it, server-side at the same time.
    pub async fn mute(&mut self, participant_id: &str) -> SessionResult<()> {
        self.require_active()?;
        self.require_presenter()?;
        if self.is_me(participant_id) {
            self.set_audio_enabled(false).await?;
            return Ok(());
        }
        let transport_id = self.active_participant(participant_id)?.transport_id;

        let signaled = self
            .signaling
            .send(SignalMessage::ForceMute {
                target_user_id: participant_id.to_string(),
            })
            .await;
        let server_side = match transport_id {
            Some(id) => match self.media.mute_remote(id).await {
                Ok(done) => done,
                Err(e) => {
                    warn!("Server-side mute of {} failed: {}", participant_id, e);
                    false
                }
            },
            None => false,
        };
        if signaled.is_err() && !server_side {
            return Err(SessionError::SignalingUnavailable);
        }

        if let Some(p) = self.session_mut()?.participants.get_mut(participant_id) {
            p.is_muted = true;
        }
        info!("Muted {} (server-side: {})", participant_id, server_side);
        self.emit_roster();
        Ok(())
    }

    pub async fn kick(&mut self, participant_id: &str) -> SessionResult<()> {
        self.require_active()?;
        self.require_presenter()?;
        if self.is_me(participant_id) {
            return Err(SessionError::invalid_state("the presenter cannot remove themselves"));
        }
        self.active_participant(participant_id)?;

        self.signaling
            .send(SignalMessage::Kick {
                target_user_id: participant_id.to_string(),
            })
            .await?;
        self.depart(participant_id);
        Ok(())
    }

    /// Raise or lower the local hand
    pub async fn raise_hand(&mut self, raised: bool) -> SessionResult<()> {
        self.require_active()?;
        let me = self.identity()?.user_id.clone();
        self.signaling
            .send(SignalMessage::HandRaise {
                user_id: me.clone(),
                raised,
            })
            .await?;
        self.apply_hand(&me, raised);
        Ok(())
    }

    pub async fn set_audio_enabled(&mut self, enabled: bool) -> SessionResult<bool> {
        self.set_local_enabled(TrackKind::Audio, enabled).await
    }

    pub async fn set_video_enabled(&mut self, enabled: bool) -> SessionResult<bool> {
        self.set_local_enabled(TrackKind::Video, enabled).await
    }

    async fn set_local_enabled(&mut self, kind: TrackKind, enabled: bool) -> SessionResult<bool> {
        if !self.devices.set_enabled(kind, enabled).await? {
            return Ok(false);
        }
        let me = self.identity()?.user_id.clone();
        let is_muted = !self.devices.is_enabled(TrackKind::Audio);
        let is_video_enabled = self.devices.is_enabled(TrackKind::Video);
        if let Some(p) = self.session_mut()?.participants.get_mut(&me) {
            p.is_muted = is_muted;
            p.is_video_enabled = is_video_enabled;
        }
        self.emit_roster();

        let status = SignalMessage::Status {
            user_id: me,
            is_muted,
            is_video_enabled,
        };
        if let Err(e) = self.signaling.send(status).await {
            debug!("Local status not broadcast: {}", e);
        }
        Ok(true)
    }

    /// Move to the next physical camera without a publication gap
    pub async fn switch_camera(&mut self) -> SessionResult<Option<LocalTrack>> {
        self.require_active()?;
        let Some(switch) = self.devices.begin_camera_switch(self.media.as_ref()).await? else {
            return Ok(None);
        };

        // A running capture moves to the new camera before the old one is released
        let tracks = self.devices.tracks();
        if let Some(pipeline) = self.recording.as_mut() {
            if let Err(e) = pipeline.rebind(&tracks).await {
                let status = pipeline.status();
                self.recording_changed(status);
                self.emit(ClassroomEvent::Notice(format!(
                    "Recording paused after camera switch: {}",
                    e
                )));
            }
        }

        let current = switch.current.clone();
        self.devices.complete_camera_switch(switch).await;
        self.attach_local_video();
        Ok(Some(current))
    }

    fn recording_pipeline(&mut self) -> &mut RecordingPipeline {
        let session_id = self.session_id.clone();
        let config = self.config.recording.clone();
        let store = Arc::clone(&self.deps.store);
        let backend = Arc::clone(&self.deps.backend);
        let factory = Arc::clone(&self.deps.capture);
        self.recording
            .get_or_insert_with(|| RecordingPipeline::new(session_id, config, store, backend, factory))
    }

    fn recording_changed(&mut self, status: RecordingStatus) {
        if let Some(session) = self.session.as_mut() {
            session.recording = status;
        }
        self.emit(ClassroomEvent::RecordingChanged(status));
    }

    pub async fn start_recording(&mut self) -> SessionResult<RecordingStatus> {
        self.require_active()?;
        self.require_presenter()?;
        let tracks = self.devices.tracks();
        let status = self.recording_pipeline().start(&tracks).await?;
        self.recording_changed(status);
        Ok(status)
    }

    pub async fn pause_recording(&mut self) -> SessionResult<RecordingStatus> {
        self.require_presenter()?;
        let status = self.recording_pipeline().pause().await?;
        self.recording_changed(status);
        Ok(status)
    }

    pub async fn resume_recording(&mut self) -> SessionResult<RecordingStatus> {
        self.require_active()?;
        self.require_presenter()?;
        let tracks = self.devices.tracks();
        let status = self.recording_pipeline().resume(&tracks).await?;
        self.recording_changed(status);
        Ok(status)
    }

    /// Stop and upload. Failure leaves the recording `failed` with its
    /// segments kept; calling again retries the upload.
    pub async fn stop_recording(&mut self) -> SessionResult<UploadReceipt> {
        self.require_presenter()?;
        if matches!(
            self.recording_status(),
            RecordingStatus::Recording | RecordingStatus::Paused | RecordingStatus::Failed
        ) {
            self.recording_changed(RecordingStatus::Uploading);
        }
        let pipeline = self.recording_pipeline();
        let result = pipeline.stop().await;
        let status = pipeline.status();
        let lost = pipeline.segments_lost();
        self.recording_changed(status);
        if lost > 0 {
            self.emit(ClassroomEvent::Notice(format!(
                "{} recording segments could not be saved and are missing",
                lost
            )));
        }
        if let Err(e) = &result {
            self.emit(ClassroomEvent::Notice(format!("Recording upload failed: {}", e)));
        }
        result
    }

    /// Show the overlay controls and schedule them to hide again; a newer
    /// call supersedes any pending hide
    pub fn show_chrome(&mut self) {
        self.chrome_generation += 1;
        if !self.chrome_visible {
            self.chrome_visible = true;
            self.emit(ClassroomEvent::ChromeVisibility(true));
        }

        let generation = self.chrome_generation;
        let delay = Duration::from_millis(self.config.ui.chrome_hide_after_ms);
        let tx = self.internal_tx.clone();
        let cancel = self.cancel.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => {}
                _ = tokio::time::sleep(delay) => {
                    let _ = tx.send(Internal::HideChrome { generation });
                }
            }
        });
    }

    /// Presenter's authoritative teardown.
    ///
    /// An active recording is stopped and uploaded before the backend end
    /// call; then media and signaling are torn down and devices released.
    pub async fn end_session(&mut self) -> SessionResult<()> {
        self.require_presenter()?;
        match self.phase {
            CoordinatorPhase::Active | CoordinatorPhase::Error => {}
            phase => {
                return Err(SessionError::invalid_state(format!(
                    "cannot end session while {:?}",
                    phase
                )))
            }
        }
        self.set_phase(CoordinatorPhase::Ending);

        let recording = self.recording_status();
        if matches!(
            recording,
            RecordingStatus::Recording | RecordingStatus::Paused | RecordingStatus::Failed
        ) {
            info!("Stopping {:?} recording before ending {}", recording, self.session_id);
            if let Err(e) = self.stop_recording().await {
                error!("Recording upload failed during end; segments retained: {}", e);
            }
        }

        let ended = self.deps.backend.end_session(&self.session_id).await;
        match &ended {
            Ok(()) => {
                if let Some(session) = self.session.as_mut() {
                    if let Err(e) = session.transition_to(SessionStatus::Ended, Utc::now()) {
                        warn!("{}", e);
                    }
                }
                info!("Session {} ended", self.session_id);
            }
            Err(e) => error!("Backend did not confirm end of {}: {}", self.session_id, e),
        }

        self.teardown().await;
        ended
    }

    /// Leave the classroom without ending it. An unfinished recording is
    /// detached: its segments stay in durable storage and nothing is uploaded.
    pub async fn leave(&mut self) {
        if self.phase == CoordinatorPhase::Ended {
            return;
        }
        self.set_phase(CoordinatorPhase::Ending);
        if let Some(pipeline) = self.recording.as_mut() {
            let status = pipeline.detach().await;
            debug!("Recording left {:?} on leave", status);
        }
        self.teardown().await;
    }

    async fn teardown(&mut self) {
        // Pending subscribe retries, token renewals and chrome timers
        self.cancel.cancel();

        self.signaling.disconnect().await;
        if let Err(e) = self.media.leave().await {
            warn!("Leaving media channel failed: {}", e);
        }
        self.devices.release_all().await;
        self.registry.clear();
        self.hands.clear();
        self.indicator = Some(ConnectionIndicator::Disconnected);
        self.set_phase(CoordinatorPhase::Ended);
        info!("Classroom {} torn down", self.session_id);
    }

    pub fn view(&self) -> ClassroomView {
        let participants = match (&self.session, self.phase) {
            (_, CoordinatorPhase::Error) | (None, _) => Vec::new(),
            (Some(session), _) => session
                .participants
                .active()
                .map(|p| {
                    if self.is_me(&p.user_id) {
                        let mut view = ParticipantView::remote(p, &self.registry, self.hands.contains(&p.user_id));
                        view.is_local = true;
                        view.has_audio = self.devices.track(TrackKind::Audio).is_some();
                        view.has_video = self.devices.track(TrackKind::Video).is_some();
                        view
                    } else {
                        ParticipantView::remote(p, &self.registry, self.hands.contains(&p.user_id))
                    }
                })
                .collect(),
        };

        ClassroomView {
            session_id: self.session_id.clone(),
            phase: self.phase,
            status: self.session.as_ref().map(|s| s.status),
            me: self.me.clone(),
            participants,
            raised_hands: self.hands.to_vec(),
            chat: self
                .session
                .as_ref()
                .map(|s| s.chat_messages.messages().to_vec())
                .unwrap_or_default(),
            unread: self.unread_count(),
            recording: self.recording_status(),
            recording_duration_secs: self.recording.as_ref().map(|r| r.duration_secs()).unwrap_or(0.0),
            connection: self.indicator,
            signaling: self.signaling.status(),
            chrome_visible: self.chrome_visible,
            last_error: self.last_error.clone(),
        }
    }
}
