//! Session error taxonomy
//!
//! Device and transport failures degrade in place; only an unrecoverable
//! media failure puts the coordinator into its error phase. Recording
//! failures never abort the live session.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SessionError {
    /// Permission denied or no capture device present
    #[error("Device unavailable: {0}")]
    DeviceUnavailable(String),

    #[error("Access token expired or rejected")]
    AuthExpired,

    /// Network failure talking to the media transport, signaling or backend
    #[error("Transport unavailable: {0}")]
    TransportUnavailable(String),

    /// Remote track announced before its media is subscribable
    #[error("Stream not yet available for transport id {0}")]
    StreamNotYetAvailable(u32),

    #[error("Recording upload failed: {0}")]
    UploadFailed(String),

    #[error("Signaling channel unavailable")]
    SignalingUnavailable,

    #[error("Recording requires both audio and video tracks")]
    MissingTracks,

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Unknown participant: {0}")]
    UnknownParticipant(String),

    #[error("Backend error: {0}")]
    Backend(String),

    #[error("Storage error: {0}")]
    Storage(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl SessionError {
    /// Whether a bounded retry may repeat the failed operation
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SessionError::TransportUnavailable(_)
                | SessionError::StreamNotYetAvailable(_)
                | SessionError::UploadFailed(_)
        )
    }

    pub fn invalid_state(msg: impl Into<String>) -> Self {
        SessionError::InvalidState(msg.into())
    }
}

pub type SessionResult<T> = Result<T, SessionError>;
