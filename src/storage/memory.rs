use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use super::store::{Segment, SegmentStore};
use crate::error::SessionResult;

#[derive(Debug, Default)]
struct SessionSegments {
    segments: BTreeMap<u64, Vec<u8>>,
    duration_secs: f64,
}

/// In-process segment store.
///
/// Clones share the same backing map, so a clone handed to a fresh pipeline
/// behaves like the same durable medium seen after a restart.
#[derive(Debug, Clone, Default)]
pub struct MemorySegmentStore {
    inner: Arc<Mutex<HashMap<String, SessionSegments>>>,
}

impl MemorySegmentStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SegmentStore for MemorySegmentStore {
    async fn append(&self, session_id: &str, segment: &Segment) -> SessionResult<()> {
        let mut inner = self.inner.lock();
        inner
            .entry(session_id.to_string())
            .or_default()
            .segments
            .insert(segment.sequence, segment.data.clone());
        Ok(())
    }

    async fn list_in_order(&self, session_id: &str) -> SessionResult<Vec<Segment>> {
        let inner = self.inner.lock();
        Ok(inner
            .get(session_id)
            .map(|s| {
                s.segments
                    .iter()
                    .map(|(seq, data)| Segment::new(*seq, data.clone()))
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn clear(&self, session_id: &str) -> SessionResult<()> {
        self.inner.lock().remove(session_id);
        Ok(())
    }

    async fn get_duration(&self, session_id: &str) -> SessionResult<f64> {
        Ok(self
            .inner
            .lock()
            .get(session_id)
            .map(|s| s.duration_secs)
            .unwrap_or(0.0))
    }

    async fn set_duration(&self, session_id: &str, seconds: f64) -> SessionResult<()> {
        self.inner
            .lock()
            .entry(session_id.to_string())
            .or_default()
            .duration_secs = seconds;
        Ok(())
    }

    async fn pending_sessions(&self) -> SessionResult<Vec<String>> {
        let inner = self.inner.lock();
        let mut ids: Vec<String> = inner
            .iter()
            .filter(|(_, s)| !s.segments.is_empty())
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort();
        Ok(ids)
    }

    async fn segment_count(&self, session_id: &str) -> SessionResult<u64> {
        Ok(self
            .inner
            .lock()
            .get(session_id)
            .map(|s| s.segments.len() as u64)
            .unwrap_or(0))
    }
}
