use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use super::store::{Segment, SegmentStore};
use crate::error::SessionResult;

const SEGMENT_PREFIX: &str = "seg-";
const SEGMENT_EXT: &str = "seg";
const DURATION_FILE: &str = "duration.json";

#[derive(Debug, Serialize, Deserialize)]
struct DurationRecord {
    accumulated_seconds: f64,
}

/// Filesystem segment store: one directory per session, one file per segment.
///
/// Each segment is written to a temp file, fsynced, then renamed into place,
/// so a crash leaves either the whole segment or nothing.
#[derive(Debug, Clone)]
pub struct FileSegmentStore {
    root: PathBuf,
}

impl FileSegmentStore {
    pub async fn open(root: impl Into<PathBuf>) -> SessionResult<Self> {
        let root = root.into();
        fs::create_dir_all(&root).await?;
        info!("Segment store at {}", root.display());
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Percent-encoded so distinct ids never share a directory
    fn session_dir(&self, session_id: &str) -> PathBuf {
        let encoded = urlencoding::encode(session_id);
        // `.` and `..` survive encoding unchanged
        let name = if encoded.chars().all(|c| c == '.') {
            encoded.replace('.', "%2E")
        } else {
            encoded.into_owned()
        };
        self.root.join(name)
    }

    fn session_id_of(dir: &Path) -> Option<String> {
        let name = dir.file_name()?.to_str()?;
        urlencoding::decode(name).ok().map(|id| id.into_owned())
    }

    fn segment_path(dir: &Path, sequence: u64) -> PathBuf {
        dir.join(format!("{}{:08}.{}", SEGMENT_PREFIX, sequence, SEGMENT_EXT))
    }

    fn parse_sequence(path: &Path) -> Option<u64> {
        if path.extension()?.to_str()? != SEGMENT_EXT {
            return None;
        }
        path.file_stem()?
            .to_str()?
            .strip_prefix(SEGMENT_PREFIX)?
            .parse()
            .ok()
    }

    async fn write_durably(path: &Path, bytes: &[u8]) -> SessionResult<()> {
        let tmp = path.with_extension("tmp");
        let mut file = fs::File::create(&tmp).await?;
        file.write_all(bytes).await?;
        file.sync_all().await?;
        drop(file);
        fs::rename(&tmp, path).await?;
        Ok(())
    }

    async fn sequences(&self, dir: &Path) -> SessionResult<Vec<(u64, PathBuf)>> {
        let mut entries = match fs::read_dir(dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut found = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if let Some(seq) = Self::parse_sequence(&path) {
                found.push((seq, path));
            }
        }
        found.sort_by_key(|(seq, _)| *seq);
        Ok(found)
    }
}

#[async_trait]
impl SegmentStore for FileSegmentStore {
    async fn append(&self, session_id: &str, segment: &Segment) -> SessionResult<()> {
        let dir = self.session_dir(session_id);
        fs::create_dir_all(&dir).await?;
        let path = Self::segment_path(&dir, segment.sequence);
        Self::write_durably(&path, &segment.data).await?;
        debug!(
            "Persisted segment {} for {} ({} bytes)",
            segment.sequence,
            session_id,
            segment.data.len()
        );
        Ok(())
    }

    async fn list_in_order(&self, session_id: &str) -> SessionResult<Vec<Segment>> {
        let dir = self.session_dir(session_id);
        let mut segments = Vec::new();
        for (seq, path) in self.sequences(&dir).await? {
            let data = fs::read(&path).await?;
            segments.push(Segment::new(seq, data));
        }
        Ok(segments)
    }

    async fn clear(&self, session_id: &str) -> SessionResult<()> {
        let dir = self.session_dir(session_id);
        match fs::remove_dir_all(&dir).await {
            Ok(()) => {
                info!("Cleared persisted segments for {}", session_id);
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn get_duration(&self, session_id: &str) -> SessionResult<f64> {
        let path = self.session_dir(session_id).join(DURATION_FILE);
        match fs::read(&path).await {
            Ok(bytes) => match serde_json::from_slice::<DurationRecord>(&bytes) {
                Ok(record) => Ok(record.accumulated_seconds),
                Err(e) => {
                    warn!("Ignoring unreadable duration record {}: {}", path.display(), e);
                    Ok(0.0)
                }
            },
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(0.0),
            Err(e) => Err(e.into()),
        }
    }

    async fn set_duration(&self, session_id: &str, seconds: f64) -> SessionResult<()> {
        let dir = self.session_dir(session_id);
        fs::create_dir_all(&dir).await?;
        let bytes = serde_json::to_vec(&DurationRecord {
            accumulated_seconds: seconds,
        })?;
        Self::write_durably(&dir.join(DURATION_FILE), &bytes).await
    }

    async fn pending_sessions(&self) -> SessionResult<Vec<String>> {
        let mut entries = fs::read_dir(&self.root).await?;
        let mut ids = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if !entry.file_type().await?.is_dir() {
                continue;
            }
            if self.sequences(&path).await?.is_empty() {
                continue;
            }
            match Self::session_id_of(&path) {
                Some(id) => ids.push(id),
                None => warn!("Skipping unrecognised segment directory {}", path.display()),
            }
        }
        ids.sort();
        Ok(ids)
    }

    async fn segment_count(&self, session_id: &str) -> SessionResult<u64> {
        Ok(self.sequences(&self.session_dir(session_id)).await?.len() as u64)
    }
}
