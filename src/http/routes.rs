use super::handlers;
use super::state::AppState;
use crate::config::HttpConfig;
use anyhow::{Context, Result};
use axum::{
    routing::{get, post},
    Router,
};
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

/// Create the HTTP router with all routes
pub fn create_router(state: AppState) -> Router {
    // The UI shell talks to us from a local origin
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Health check
        .route("/health", get(handlers::health_check))
        // Lifecycle
        .route("/classroom/status", get(handlers::get_status))
        .route("/classroom/join", post(handlers::join))
        .route("/classroom/retry", post(handlers::retry_join))
        .route("/classroom/end", post(handlers::end_session))
        .route("/classroom/leave", post(handlers::leave))
        // Chat and hand raise
        .route("/classroom/chat", post(handlers::send_message))
        .route("/classroom/chat/read", post(handlers::mark_chat_read))
        .route("/classroom/hand", post(handlers::raise_hand))
        // Moderation
        .route(
            "/classroom/participants/:participant_id/mute",
            post(handlers::mute_participant),
        )
        .route(
            "/classroom/participants/:participant_id/kick",
            post(handlers::kick_participant),
        )
        // Local media
        .route("/classroom/audio", post(handlers::set_audio))
        .route("/classroom/video", post(handlers::set_video))
        .route("/classroom/camera/switch", post(handlers::switch_camera))
        // Recording control
        .route("/classroom/recording/start", post(handlers::start_recording))
        .route("/classroom/recording/pause", post(handlers::pause_recording))
        .route("/classroom/recording/resume", post(handlers::resume_recording))
        .route("/classroom/recording/stop", post(handlers::stop_recording))
        // Add tracing middleware for request logging
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Bind the control API listener from config
pub async fn bind(config: &HttpConfig) -> Result<TcpListener> {
    let addr = format!("{}:{}", config.bind, config.port);
    TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind control API to {}", addr))
}

/// Serve the control API on `listener` until it fails
pub async fn serve(listener: TcpListener, state: AppState) -> Result<()> {
    let addr = listener.local_addr().context("Control API listener has no address")?;
    info!("Control API for {} listening on {}", state.classroom.session_id(), addr);

    axum::serve(listener, create_router(state))
        .await
        .context("Control API server failed")
}
