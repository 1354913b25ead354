pub mod backend;
pub mod config;
pub mod coordinator;
pub mod device;
pub mod error;
pub mod http;
pub mod media;
pub mod model;
pub mod recording;
pub mod retry;
pub mod signaling;
pub mod storage;

pub use backend::{
    CredentialProvider, HttpSessionBackend, JoinGrant, SessionBackend, SessionSnapshot,
    StaticCredentials, UploadReceipt,
};
pub use config::Config;
pub use coordinator::{
    ClassroomEvent, ClassroomView, Collaborators, CoordinatorPhase, ParticipantView,
    SessionCoordinator, SessionHandle,
};
pub use device::{CaptureDevices, DeviceTrackManager, LocalTrack, TrackKind};
pub use error::{SessionError, SessionResult};
pub use http::{create_router, AppState};
pub use media::{MediaSessionClient, MediaTransport, TrackRegistry};
pub use model::{ChatMessage, Participant, RecordingStatus, Role, Session, SessionStatus};
pub use recording::{CaptureFactory, RecordingPipeline, SegmentCapture};
pub use retry::RetryPolicy;
pub use signaling::{NatsSignalingTransport, SignalingChannel, SignalingTransport};
pub use storage::{FileSegmentStore, MemorySegmentStore, Segment, SegmentStore};
