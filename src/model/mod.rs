//! Classroom data model
//!
//! - `Session`: one scheduled/live/ended classroom with its monotonic status
//! - `Participant` / `Roster`: join-ordered presence, departed entries kept
//!   for attendance
//! - `ChatMessage` / `ChatLog`: ordered chat with optimistic-echo dedupe
//! - `RecordingStatus` / `RecordingSnapshot`: recording lifecycle

mod chat;
mod participant;
mod recording;
mod session;

pub use chat::{ChatLog, ChatMessage, MergeOutcome};
pub use participant::{Identity, Participant, Role, Roster};
pub use recording::{RecordingSnapshot, RecordingStatus};
pub use session::{Session, SessionInfo, SessionStatus};
