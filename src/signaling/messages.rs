use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{ChatMessage, Participant};

/// Signaling event payloads
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
#[serde(rename_all = "snake_case")]
pub enum SignalMessage {
    /// Announced on every (re)connect
    JoinRoom { participant: Participant },
    LeaveRoom { user_id: String },
    RosterSnapshot { participants: Vec<Participant> },
    Chat { message: ChatMessage },
    Status {
        user_id: String,
        is_muted: bool,
        is_video_enabled: bool,
    },
    ForceMute { target_user_id: String },
    Kick { target_user_id: String },
    HandRaise { user_id: String, raised: bool },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventFamily {
    Presence,
    Chat,
    Status,
    Moderation,
}

impl SignalMessage {
    pub fn family(&self) -> EventFamily {
        match self {
            SignalMessage::JoinRoom { .. }
            | SignalMessage::LeaveRoom { .. }
            | SignalMessage::RosterSnapshot { .. } => EventFamily::Presence,
            SignalMessage::Chat { .. } => EventFamily::Chat,
            SignalMessage::Status { .. } => EventFamily::Status,
            SignalMessage::ForceMute { .. }
            | SignalMessage::Kick { .. }
            | SignalMessage::HandRaise { .. } => EventFamily::Moderation,
        }
    }
}

/// Wire envelope published on the room subject
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalEnvelope {
    pub session_id: String,
    pub sender_id: String,
    pub sent_at: DateTime<Utc>,
    pub event: SignalMessage,
}

impl SignalEnvelope {
    pub fn new(session_id: &str, sender_id: &str, event: SignalMessage) -> Self {
        Self {
            session_id: session_id.to_string(),
            sender_id: sender_id.to_string(),
            sent_at: Utc::now(),
            event,
        }
    }
}
