//! Camera and microphone capture
//!
//! `CaptureDevices` is the platform capture capability (permissions, device
//! enumeration, opening tracks). `DeviceTrackManager` owns the live local
//! tracks on top of it: enable/disable, gap-free camera switching and
//! facing/mirroring detection.

mod backend;
mod manager;
mod track;

pub use backend::{CaptureDevices, TrackPublisher};
pub use manager::{CameraSwitch, DeviceTrackManager};
pub use track::{DeviceInfo, FacingMode, LocalTrack, TrackConstraints, TrackKind};
