use super::state::AppState;
use crate::backend::UploadReceipt;
use crate::coordinator::ClassroomView;
use crate::error::SessionError;
use crate::model::{ChatMessage, RecordingStatus};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    pub text: String,
}

#[derive(Debug, Deserialize)]
pub struct HandRequest {
    /// Defaults to raising the hand
    #[serde(default = "default_true")]
    pub raised: bool,
}

#[derive(Debug, Deserialize)]
pub struct ToggleRequest {
    pub enabled: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Serialize)]
pub struct MarkReadResponse {
    pub marked: usize,
}

#[derive(Debug, Serialize)]
pub struct ToggleResponse {
    /// False when no local track of that kind is held
    pub applied: bool,
    pub enabled: bool,
}

#[derive(Debug, Serialize)]
pub struct CameraResponse {
    pub switched: bool,
    pub label: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RecordingResponse {
    pub status: RecordingStatus,
}

#[derive(Debug, Serialize)]
pub struct StopRecordingResponse {
    pub status: RecordingStatus,
    pub recording_url: String,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub status: String,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// A `SessionError` rendered as an HTTP error
#[derive(Debug)]
pub struct ApiError(pub SessionError);

impl From<SessionError> for ApiError {
    fn from(err: SessionError) -> Self {
        Self(err)
    }
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match &self.0 {
            SessionError::InvalidState(_) => StatusCode::CONFLICT,
            SessionError::MissingTracks => StatusCode::UNPROCESSABLE_ENTITY,
            SessionError::UnknownParticipant(_) => StatusCode::NOT_FOUND,
            SessionError::AuthExpired => StatusCode::UNAUTHORIZED,
            SessionError::SignalingUnavailable
            | SessionError::TransportUnavailable(_)
            | SessionError::StreamNotYetAvailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            SessionError::UploadFailed(_) | SessionError::Backend(_) => StatusCode::BAD_GATEWAY,
            SessionError::DeviceUnavailable(_) => StatusCode::FAILED_DEPENDENCY,
            SessionError::Storage(_) | SessionError::Serialization(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            warn!("Request failed: {}", self.0);
        }
        (
            status,
            Json(ErrorResponse {
                error: self.0.to_string(),
            }),
        )
            .into_response()
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

// ============================================================================
// Handlers
// ============================================================================

/// GET /health
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

/// GET /classroom/status
/// Current view model
pub async fn get_status(State(state): State<AppState>) -> ApiResult<ClassroomView> {
    Ok(Json(state.classroom.view().await?))
}

/// POST /classroom/join
pub async fn join(State(state): State<AppState>) -> ApiResult<ClassroomView> {
    info!("Joining classroom {}", state.classroom.session_id());
    Ok(Json(state.classroom.join().await?))
}

/// POST /classroom/retry
/// Retry after an unrecoverable media failure
pub async fn retry_join(State(state): State<AppState>) -> ApiResult<ClassroomView> {
    Ok(Json(state.classroom.retry_join().await?))
}

/// POST /classroom/chat
pub async fn send_message(
    State(state): State<AppState>,
    Json(req): Json<SendMessageRequest>,
) -> ApiResult<ChatMessage> {
    Ok(Json(state.classroom.send_message(req.text).await?))
}

/// POST /classroom/chat/read
pub async fn mark_chat_read(State(state): State<AppState>) -> ApiResult<MarkReadResponse> {
    let marked = state.classroom.mark_chat_read().await?;
    Ok(Json(MarkReadResponse { marked }))
}

/// POST /classroom/hand
pub async fn raise_hand(
    State(state): State<AppState>,
    Json(req): Json<HandRequest>,
) -> ApiResult<StatusResponse> {
    state.classroom.raise_hand(req.raised).await?;
    Ok(Json(StatusResponse {
        status: if req.raised { "raised" } else { "lowered" }.to_string(),
        message: "Hand state updated".to_string(),
    }))
}

/// POST /classroom/participants/:participant_id/mute
pub async fn mute_participant(
    State(state): State<AppState>,
    Path(participant_id): Path<String>,
) -> ApiResult<StatusResponse> {
    state.classroom.mute(participant_id.clone()).await?;
    Ok(Json(StatusResponse {
        status: "muted".to_string(),
        message: format!("Participant {} muted", participant_id),
    }))
}

/// POST /classroom/participants/:participant_id/kick
pub async fn kick_participant(
    State(state): State<AppState>,
    Path(participant_id): Path<String>,
) -> ApiResult<StatusResponse> {
    state.classroom.kick(participant_id.clone()).await?;
    Ok(Json(StatusResponse {
        status: "removed".to_string(),
        message: format!("Participant {} removed", participant_id),
    }))
}

/// POST /classroom/audio
pub async fn set_audio(
    State(state): State<AppState>,
    Json(req): Json<ToggleRequest>,
) -> ApiResult<ToggleResponse> {
    let applied = state.classroom.set_audio_enabled(req.enabled).await?;
    Ok(Json(ToggleResponse {
        applied,
        enabled: req.enabled,
    }))
}

/// POST /classroom/video
pub async fn set_video(
    State(state): State<AppState>,
    Json(req): Json<ToggleRequest>,
) -> ApiResult<ToggleResponse> {
    let applied = state.classroom.set_video_enabled(req.enabled).await?;
    Ok(Json(ToggleResponse {
        applied,
        enabled: req.enabled,
    }))
}

/// POST /classroom/camera/switch
pub async fn switch_camera(State(state): State<AppState>) -> ApiResult<CameraResponse> {
    let track = state.classroom.switch_camera().await?;
    Ok(Json(CameraResponse {
        switched: track.is_some(),
        label: track.map(|t| t.label),
    }))
}

/// POST /classroom/recording/start
pub async fn start_recording(State(state): State<AppState>) -> ApiResult<RecordingResponse> {
    let status = state.classroom.start_recording().await?;
    Ok(Json(RecordingResponse { status }))
}

/// POST /classroom/recording/pause
pub async fn pause_recording(State(state): State<AppState>) -> ApiResult<RecordingResponse> {
    let status = state.classroom.pause_recording().await?;
    Ok(Json(RecordingResponse { status }))
}

/// POST /classroom/recording/resume
pub async fn resume_recording(State(state): State<AppState>) -> ApiResult<RecordingResponse> {
    let status = state.classroom.resume_recording().await?;
    Ok(Json(RecordingResponse { status }))
}

/// POST /classroom/recording/stop
/// Stop and upload; on failure the segments are kept and this can be retried
pub async fn stop_recording(State(state): State<AppState>) -> ApiResult<StopRecordingResponse> {
    let UploadReceipt { recording_url } = state.classroom.stop_recording().await?;
    Ok(Json(StopRecordingResponse {
        status: RecordingStatus::Completed,
        recording_url,
    }))
}

/// POST /classroom/end
/// Presenter ends the session for everyone
pub async fn end_session(State(state): State<AppState>) -> ApiResult<StatusResponse> {
    state.classroom.end_session().await?;
    Ok(Json(StatusResponse {
        status: "ended".to_string(),
        message: format!("Session {} ended", state.classroom.session_id()),
    }))
}

/// POST /classroom/leave
pub async fn leave(State(state): State<AppState>) -> ApiResult<StatusResponse> {
    state.classroom.leave().await?;
    Ok(Json(StatusResponse {
        status: "left".to_string(),
        message: "Left the classroom".to_string(),
    }))
}
