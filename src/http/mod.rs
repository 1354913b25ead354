//! HTTP API for driving the classroom from a local UI shell
//!
//! - GET /health - Health check
//! - GET /classroom/status - Current view model
//! - POST /classroom/{join,retry,end,leave} - Lifecycle
//! - POST /classroom/chat, /classroom/chat/read, /classroom/hand
//! - POST /classroom/participants/:id/{mute,kick} - Moderation
//! - POST /classroom/{audio,video,camera/switch} - Local media
//! - POST /classroom/recording/{start,pause,resume,stop} - Recording control

mod handlers;
mod routes;
mod state;

pub use handlers::ApiError;
pub use routes::{bind, create_router, serve};
pub use state::AppState;
