use async_trait::async_trait;

use crate::error::{SessionError, SessionResult};

/// Supplies the bearer credential for backend calls and the signaling
/// channel. Refreshing it is the provider's business; callers only react to
/// `AuthExpired`.
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    async fn bearer_token(&self) -> SessionResult<String>;
}

/// Fixed token, e.g. from the environment or a CLI flag
#[derive(Debug, Clone)]
pub struct StaticCredentials {
    token: Option<String>,
}

impl StaticCredentials {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: Some(token.into()),
        }
    }

    pub fn from_env(var: &str) -> Self {
        Self {
            token: std::env::var(var).ok().filter(|t| !t.is_empty()),
        }
    }
}

#[async_trait]
impl CredentialProvider for StaticCredentials {
    async fn bearer_token(&self) -> SessionResult<String> {
        self.token.clone().ok_or(SessionError::AuthExpired)
    }
}
