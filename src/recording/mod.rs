//! Local recording pipeline
//!
//! Captures the local audio+video stream into fixed time slices, persists
//! every slice before counting it, and uploads the concatenated artifact on
//! stop. Persisted segments survive a crash and are replayed on re-entry.

mod capture;
mod clock;
mod pipeline;

pub use capture::{CaptureFactory, SegmentCapture};
pub use clock::DurationClock;
pub use pipeline::{upload_persisted, RecordingPipeline};
