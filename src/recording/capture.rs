use async_trait::async_trait;
use std::time::Duration;
use tokio::sync::mpsc;

use crate::device::LocalTrack;
use crate::error::SessionResult;

/// One capture pipe over the local stream.
///
/// Platform-specific encoders implement this; the pipeline only sees
/// encoded segments.
#[async_trait]
pub trait SegmentCapture: Send {
    /// Start producing one encoded segment per `slice`.
    ///
    /// The receiver closes after `stop` once every produced segment has
    /// been delivered.
    async fn start(&mut self, slice: Duration) -> SessionResult<mpsc::Receiver<Vec<u8>>>;

    async fn stop(&mut self) -> SessionResult<()>;

    /// Capture name for logging
    fn name(&self) -> &str;
}

/// Creates a fresh capture pipe; resuming after a pause always uses a new one
pub trait CaptureFactory: Send + Sync {
    fn create(&self, audio: &LocalTrack, video: &LocalTrack) -> SessionResult<Box<dyn SegmentCapture>>;
}
