use crate::coordinator::SessionHandle;

/// Shared application state for HTTP handlers
#[derive(Clone)]
pub struct AppState {
    /// The classroom this process is attached to
    pub classroom: SessionHandle,
}

impl AppState {
    pub fn new(classroom: SessionHandle) -> Self {
        Self { classroom }
    }
}
