use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use super::credentials::CredentialProvider;
use super::session::{JoinGrant, SessionBackend, SessionSnapshot, UploadReceipt};
use crate::config::BackendConfig;
use crate::error::{SessionError, SessionResult};

#[derive(Debug, Deserialize)]
struct MediaTokenResponse {
    access_token: String,
}

/// REST client for the classroom backend
pub struct HttpSessionBackend {
    client: Client,
    base_url: String,
    credentials: Arc<dyn CredentialProvider>,
}

impl HttpSessionBackend {
    pub fn new(config: &BackendConfig, credentials: Arc<dyn CredentialProvider>) -> SessionResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| SessionError::Backend(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            credentials,
        })
    }

    fn url(&self, session_id: &str, path: &str) -> String {
        format!(
            "{}/sessions/{}/{}",
            self.base_url,
            urlencoding::encode(session_id),
            path
        )
    }

    async fn send(&self, request: RequestBuilder) -> SessionResult<Response> {
        let token = self.credentials.bearer_token().await?;
        let response = request
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| SessionError::TransportUnavailable(e.to_string()))?;

        match response.status() {
            status if status.is_success() => Ok(response),
            StatusCode::UNAUTHORIZED => Err(SessionError::AuthExpired),
            status if status.is_server_error() => Err(SessionError::TransportUnavailable(format!(
                "backend returned {}",
                status
            ))),
            status => {
                let body = response.text().await.unwrap_or_default();
                Err(SessionError::Backend(format!("backend returned {}: {}", status, body)))
            }
        }
    }

    async fn post(&self, session_id: &str, path: &str) -> SessionResult<()> {
        debug!("POST {} for {}", path, session_id);
        self.send(self.client.post(self.url(session_id, path))).await?;
        Ok(())
    }

    async fn json<T: DeserializeOwned>(&self, request: RequestBuilder) -> SessionResult<T> {
        let response = self.send(request).await?;
        response
            .json::<T>()
            .await
            .map_err(|e| SessionError::Backend(format!("invalid backend response: {}", e)))
    }
}

#[async_trait]
impl SessionBackend for HttpSessionBackend {
    async fn join_session(&self, session_id: &str) -> SessionResult<JoinGrant> {
        info!("Requesting join grant for {}", session_id);
        self.json(self.client.post(self.url(session_id, "join"))).await
    }

    async fn start_session(&self, session_id: &str) -> SessionResult<()> {
        self.post(session_id, "start").await
    }

    async fn end_session(&self, session_id: &str) -> SessionResult<()> {
        self.post(session_id, "end").await
    }

    async fn mark_chat_read(&self, session_id: &str) -> SessionResult<()> {
        self.post(session_id, "chat/read").await
    }

    async fn fetch_snapshot(&self, session_id: &str) -> SessionResult<SessionSnapshot> {
        self.json(self.client.get(self.url(session_id, "snapshot"))).await
    }

    async fn renew_media_token(&self, session_id: &str) -> SessionResult<String> {
        let response: MediaTokenResponse = self
            .json(self.client.post(self.url(session_id, "media-token")))
            .await?;
        Ok(response.access_token)
    }

    async fn start_recording(&self, session_id: &str) -> SessionResult<()> {
        self.post(session_id, "recording/start").await
    }

    async fn pause_recording(&self, session_id: &str) -> SessionResult<()> {
        self.post(session_id, "recording/pause").await
    }

    async fn resume_recording(&self, session_id: &str) -> SessionResult<()> {
        self.post(session_id, "recording/resume").await
    }

    async fn upload_recording(
        &self,
        session_id: &str,
        artifact: Vec<u8>,
        duration_seconds: f64,
    ) -> SessionResult<UploadReceipt> {
        info!(
            "Uploading recording for {} ({} bytes, {:.1}s)",
            session_id,
            artifact.len(),
            duration_seconds
        );

        let part = reqwest::multipart::Part::bytes(artifact)
            .file_name(format!("{}.webm", session_id))
            .mime_str("video/webm")
            .map_err(|e| SessionError::UploadFailed(e.to_string()))?;
        let form = reqwest::multipart::Form::new()
            .part("recording", part)
            .text("duration_seconds", format!("{:.3}", duration_seconds));

        let request = self
            .client
            .post(self.url(session_id, "recording/upload"))
            .multipart(form);

        self.json(request).await.map_err(|e| match e {
            SessionError::AuthExpired => SessionError::AuthExpired,
            other => SessionError::UploadFailed(other.to_string()),
        })
    }
}
