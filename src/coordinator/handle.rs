use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::classroom::SessionCoordinator;
use super::events::ClassroomEvent;
use super::view::ClassroomView;
use crate::backend::UploadReceipt;
use crate::device::LocalTrack;
use crate::error::{SessionError, SessionResult};
use crate::media::RenderTarget;
use crate::model::{ChatMessage, RecordingStatus};

const COMMAND_CAPACITY: usize = 64;

type Reply<T> = oneshot::Sender<SessionResult<T>>;

enum Command {
    Join(Reply<ClassroomView>),
    RetryJoin(Reply<ClassroomView>),
    View(oneshot::Sender<ClassroomView>),
    SendMessage(String, Reply<ChatMessage>),
    MarkChatRead(Reply<usize>),
    Mute(String, Reply<()>),
    Kick(String, Reply<()>),
    RaiseHand(bool, Reply<()>),
    SetAudio(bool, Reply<bool>),
    SetVideo(bool, Reply<bool>),
    SwitchCamera(Reply<Option<LocalTrack>>),
    RegisterTarget(String, RenderTarget, oneshot::Sender<()>),
    StartRecording(Reply<RecordingStatus>),
    PauseRecording(Reply<RecordingStatus>),
    ResumeRecording(Reply<RecordingStatus>),
    StopRecording(Reply<UploadReceipt>),
    ShowChrome(oneshot::Sender<()>),
    EndSession(Reply<()>),
    Leave(oneshot::Sender<()>),
}

/// Cloneable front door to a coordinator running on its own task
#[derive(Clone)]
pub struct SessionHandle {
    session_id: String,
    commands: mpsc::Sender<Command>,
    events: broadcast::Sender<ClassroomEvent>,
}

impl SessionCoordinator {
    /// Move the coordinator onto a single task that interleaves commands
    /// with transport, signaling and timer inputs. The task ends once every
    /// handle is dropped.
    pub fn spawn(self) -> (SessionHandle, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(COMMAND_CAPACITY);
        let handle = SessionHandle {
            session_id: self.session_id().to_string(),
            commands: tx,
            events: self.event_sender(),
        };
        let task = tokio::spawn(run(self, rx));
        (handle, task)
    }
}

async fn run(mut coordinator: SessionCoordinator, mut commands: mpsc::Receiver<Command>) {
    info!("Classroom loop started for {}", coordinator.session_id());
    loop {
        tokio::select! {
            command = commands.recv() => match command {
                Some(command) => dispatch(&mut coordinator, command).await,
                None => break,
            },
            Some(input) = coordinator.next_input() => coordinator.handle_input(input).await,
        }
    }

    // Every handle is gone; nobody can end the session any more
    coordinator.leave().await;
    info!("Classroom loop stopped for {}", coordinator.session_id());
}

async fn dispatch(c: &mut SessionCoordinator, command: Command) {
    // A dropped reply receiver only means the caller stopped waiting
    match command {
        Command::Join(reply) => {
            let _ = reply.send(c.join().await);
        }
        Command::RetryJoin(reply) => {
            let _ = reply.send(c.retry_join().await);
        }
        Command::View(reply) => {
            let _ = reply.send(c.view());
        }
        Command::SendMessage(text, reply) => {
            let _ = reply.send(c.send_message(&text).await);
        }
        Command::MarkChatRead(reply) => {
            let _ = reply.send(c.mark_chat_read().await);
        }
        Command::Mute(id, reply) => {
            let _ = reply.send(c.mute(&id).await);
        }
        Command::Kick(id, reply) => {
            let _ = reply.send(c.kick(&id).await);
        }
        Command::RaiseHand(raised, reply) => {
            let _ = reply.send(c.raise_hand(raised).await);
        }
        Command::SetAudio(enabled, reply) => {
            let _ = reply.send(c.set_audio_enabled(enabled).await);
        }
        Command::SetVideo(enabled, reply) => {
            let _ = reply.send(c.set_video_enabled(enabled).await);
        }
        Command::SwitchCamera(reply) => {
            let _ = reply.send(c.switch_camera().await);
        }
        Command::RegisterTarget(id, target, reply) => {
            c.register_render_target(&id, target);
            let _ = reply.send(());
        }
        Command::StartRecording(reply) => {
            let _ = reply.send(c.start_recording().await);
        }
        Command::PauseRecording(reply) => {
            let _ = reply.send(c.pause_recording().await);
        }
        Command::ResumeRecording(reply) => {
            let _ = reply.send(c.resume_recording().await);
        }
        Command::StopRecording(reply) => {
            let _ = reply.send(c.stop_recording().await);
        }
        Command::ShowChrome(reply) => {
            c.show_chrome();
            let _ = reply.send(());
        }
        Command::EndSession(reply) => {
            let _ = reply.send(c.end_session().await);
        }
        Command::Leave(reply) => {
            c.leave().await;
            let _ = reply.send(());
        }
    }
}

fn loop_gone() -> SessionError {
    SessionError::invalid_state("classroom loop has stopped")
}

impl SessionHandle {
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ClassroomEvent> {
        self.events.subscribe()
    }

    async fn request<T>(&self, make: impl FnOnce(Reply<T>) -> Command) -> SessionResult<T> {
        let (tx, rx) = oneshot::channel();
        self.commands.send(make(tx)).await.map_err(|_| loop_gone())?;
        rx.await.map_err(|_| loop_gone())?
    }

    async fn notify(&self, make: impl FnOnce(oneshot::Sender<()>) -> Command) -> SessionResult<()> {
        let (tx, rx) = oneshot::channel();
        self.commands.send(make(tx)).await.map_err(|_| loop_gone())?;
        rx.await.map_err(|_| loop_gone())
    }

    pub async fn join(&self) -> SessionResult<ClassroomView> {
        self.request(Command::Join).await
    }

    pub async fn retry_join(&self) -> SessionResult<ClassroomView> {
        self.request(Command::RetryJoin).await
    }

    pub async fn view(&self) -> SessionResult<ClassroomView> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(Command::View(tx))
            .await
            .map_err(|_| loop_gone())?;
        rx.await.map_err(|_| loop_gone())
    }

    pub async fn send_message(&self, text: impl Into<String>) -> SessionResult<ChatMessage> {
        let text = text.into();
        self.request(|reply| Command::SendMessage(text, reply)).await
    }

    pub async fn mark_chat_read(&self) -> SessionResult<usize> {
        self.request(Command::MarkChatRead).await
    }

    pub async fn mute(&self, participant_id: impl Into<String>) -> SessionResult<()> {
        let id = participant_id.into();
        self.request(|reply| Command::Mute(id, reply)).await
    }

    pub async fn kick(&self, participant_id: impl Into<String>) -> SessionResult<()> {
        let id = participant_id.into();
        self.request(|reply| Command::Kick(id, reply)).await
    }

    pub async fn raise_hand(&self, raised: bool) -> SessionResult<()> {
        self.request(|reply| Command::RaiseHand(raised, reply)).await
    }

    pub async fn set_audio_enabled(&self, enabled: bool) -> SessionResult<bool> {
        self.request(|reply| Command::SetAudio(enabled, reply)).await
    }

    pub async fn set_video_enabled(&self, enabled: bool) -> SessionResult<bool> {
        self.request(|reply| Command::SetVideo(enabled, reply)).await
    }

    pub async fn switch_camera(&self) -> SessionResult<Option<LocalTrack>> {
        self.request(Command::SwitchCamera).await
    }

    pub async fn register_render_target(
        &self,
        participant_id: impl Into<String>,
        target: RenderTarget,
    ) -> SessionResult<()> {
        let id = participant_id.into();
        self.notify(|reply| Command::RegisterTarget(id, target, reply)).await
    }

    pub async fn start_recording(&self) -> SessionResult<RecordingStatus> {
        self.request(Command::StartRecording).await
    }

    pub async fn pause_recording(&self) -> SessionResult<RecordingStatus> {
        self.request(Command::PauseRecording).await
    }

    pub async fn resume_recording(&self) -> SessionResult<RecordingStatus> {
        self.request(Command::ResumeRecording).await
    }

    pub async fn stop_recording(&self) -> SessionResult<UploadReceipt> {
        self.request(Command::StopRecording).await
    }

    pub async fn show_chrome(&self) -> SessionResult<()> {
        self.notify(Command::ShowChrome).await
    }

    pub async fn end_session(&self) -> SessionResult<()> {
        self.request(Command::EndSession).await
    }

    pub async fn leave(&self) -> SessionResult<()> {
        debug!("Leave requested for {}", self.session_id);
        self.notify(Command::Leave).await
    }
}
