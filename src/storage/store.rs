use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::SessionResult;

/// One durably persisted slice of captured media
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Segment {
    pub sequence: u64,
    pub data: Vec<u8>,
}

impl Segment {
    pub fn new(sequence: u64, data: Vec<u8>) -> Self {
        Self { sequence, data }
    }
}

/// Per-session segment store
#[async_trait]
pub trait SegmentStore: Send + Sync {
    /// Persist a segment. Must not return before the bytes are durable.
    async fn append(&self, session_id: &str, segment: &Segment) -> SessionResult<()>;

    /// All persisted segments for the session in sequence order
    async fn list_in_order(&self, session_id: &str) -> SessionResult<Vec<Segment>>;

    /// Drop all segments and duration metadata for the session
    async fn clear(&self, session_id: &str) -> SessionResult<()>;

    /// Accumulated recording duration in seconds (0 when unknown)
    async fn get_duration(&self, session_id: &str) -> SessionResult<f64>;

    async fn set_duration(&self, session_id: &str, seconds: f64) -> SessionResult<()>;

    /// Sessions that currently hold persisted segments
    async fn pending_sessions(&self) -> SessionResult<Vec<String>>;

    /// Number of persisted segments; the next sequence number to write
    async fn segment_count(&self, session_id: &str) -> SessionResult<u64> {
        Ok(self.list_in_order(session_id).await?.len() as u64)
    }
}
