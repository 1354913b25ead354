use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

use crate::retry::RetryPolicy;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub service: ServiceConfig,
    pub backend: BackendConfig,
    pub signaling: SignalingConfig,
    pub media: MediaConfig,
    pub recording: RecordingConfig,
    pub chat: ChatConfig,
    pub ui: UiConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub name: String,
    pub http: HttpConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: "classroom-engine".to_string(),
            http: HttpConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub bind: String,
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1".to_string(),
            port: 7410,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    pub base_url: String,
    pub request_timeout_secs: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080/api".to_string(),
            request_timeout_secs: 30,
        }
    }
}

/// Signaling reconnect policy: fixed delay, generous attempt count and
/// overall budget, since presence and chat tolerate longer stalls than media.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SignalingConfig {
    pub nats_url: String,
    pub subject_prefix: String,
    pub retry_delay_ms: u64,
    pub max_attempts: u32,
    pub timeout_secs: u64,
    /// Bound on the first connect during join; later attempts run in the
    /// background
    pub connect_timeout_secs: u64,
}

impl Default for SignalingConfig {
    fn default() -> Self {
        Self {
            nats_url: "nats://localhost:4222".to_string(),
            subject_prefix: "classroom".to_string(),
            retry_delay_ms: 2000,
            max_attempts: 30,
            timeout_secs: 120,
            connect_timeout_secs: 5,
        }
    }
}

impl SignalingConfig {
    pub fn reconnect_policy(&self) -> RetryPolicy {
        RetryPolicy::fixed(self.max_attempts, Duration::from_millis(self.retry_delay_ms))
    }

    pub fn reconnect_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MediaConfig {
    pub join_attempts: u32,
    pub join_backoff_ms: u64,
    pub subscribe_retry_delay_ms: u64,
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            join_attempts: 3,
            join_backoff_ms: 500,
            subscribe_retry_delay_ms: 1000,
        }
    }
}

impl MediaConfig {
    pub fn join_policy(&self) -> RetryPolicy {
        RetryPolicy::exponential(self.join_attempts, Duration::from_millis(self.join_backoff_ms))
    }

    /// One delayed retry for streams reported before they are subscribable
    pub fn subscribe_policy(&self) -> RetryPolicy {
        RetryPolicy::fixed(2, Duration::from_millis(self.subscribe_retry_delay_ms))
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RecordingConfig {
    pub segments_path: String,
    pub segment_duration_ms: u64,
    pub upload_attempts: u32,
    pub upload_retry_delay_ms: u64,
}

impl Default for RecordingConfig {
    fn default() -> Self {
        Self {
            segments_path: "~/.classroom-engine/segments".to_string(),
            segment_duration_ms: 1000,
            upload_attempts: 3,
            upload_retry_delay_ms: 2000,
        }
    }
}

impl RecordingConfig {
    pub fn segment_duration(&self) -> Duration {
        Duration::from_millis(self.segment_duration_ms)
    }

    pub fn upload_policy(&self) -> RetryPolicy {
        RetryPolicy::exponential(
            self.upload_attempts,
            Duration::from_millis(self.upload_retry_delay_ms),
        )
    }

    /// Segment directory with `~` and env vars expanded
    pub fn segments_dir(&self) -> Result<PathBuf> {
        let expanded = shellexpand::full(&self.segments_path)
            .with_context(|| format!("Failed to expand segments_path: {}", self.segments_path))?;
        Ok(PathBuf::from(expanded.as_ref()))
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    pub dedupe_window_ms: u64,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            dedupe_window_ms: 5000,
        }
    }
}

impl ChatConfig {
    pub fn dedupe_window(&self) -> chrono::Duration {
        chrono::Duration::milliseconds(self.dedupe_window_ms as i64)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct UiConfig {
    pub chrome_hide_after_ms: u64,
}

impl Default for UiConfig {
    fn default() -> Self {
        Self {
            chrome_hide_after_ms: 4000,
        }
    }
}

impl Config {
    /// Load from a TOML file, overlaid with `CLASSROOM__SECTION__KEY` env vars
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path).required(false))
            .add_source(config::Environment::with_prefix("CLASSROOM").separator("__"))
            .build()
            .context("Failed to build configuration")?;

        Ok(settings.try_deserialize()?)
    }
}
