use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::SessionResult;
use crate::model::{ChatMessage, Identity, Participant, RecordingSnapshot, SessionInfo};

/// Everything needed to enter a classroom
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JoinGrant {
    pub access_token: String,
    pub channel_name: String,
    pub participant_identity: Identity,
    pub session: SessionInfo,
    #[serde(default)]
    pub initial_roster: Vec<Participant>,
    #[serde(default)]
    pub initial_chat_history: Vec<ChatMessage>,
    #[serde(default)]
    pub recording: RecordingSnapshot,
}

/// Authoritative roster and chat, fetched for a full resync
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionSnapshot {
    #[serde(default)]
    pub roster: Vec<Participant>,
    #[serde(default)]
    pub chat: Vec<ChatMessage>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadReceipt {
    pub recording_url: String,
}

#[async_trait]
pub trait SessionBackend: Send + Sync {
    async fn join_session(&self, session_id: &str) -> SessionResult<JoinGrant>;

    async fn start_session(&self, session_id: &str) -> SessionResult<()>;

    async fn end_session(&self, session_id: &str) -> SessionResult<()>;

    async fn mark_chat_read(&self, session_id: &str) -> SessionResult<()>;

    async fn fetch_snapshot(&self, session_id: &str) -> SessionResult<SessionSnapshot>;

    /// Fresh media access token ahead of expiry
    async fn renew_media_token(&self, session_id: &str) -> SessionResult<String>;

    async fn start_recording(&self, session_id: &str) -> SessionResult<()>;

    async fn pause_recording(&self, session_id: &str) -> SessionResult<()>;

    async fn resume_recording(&self, session_id: &str) -> SessionResult<()>;

    async fn upload_recording(
        &self,
        session_id: &str,
        artifact: Vec<u8>,
        duration_seconds: f64,
    ) -> SessionResult<UploadReceipt>;
}
