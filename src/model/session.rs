use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::chat::ChatLog;
use super::participant::Roster;
use super::recording::RecordingStatus;
use crate::error::{SessionError, SessionResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Scheduled,
    Live,
    Ended,
    Cancelled,
}

impl SessionStatus {
    /// Transitions are monotonic: scheduled→live→ended, or
    /// scheduled/live→cancelled. Nothing leaves ended or cancelled.
    pub fn can_transition_to(self, next: SessionStatus) -> bool {
        use SessionStatus::*;
        matches!(
            (self, next),
            (Scheduled, Live) | (Live, Ended) | (Scheduled, Cancelled) | (Live, Cancelled)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, SessionStatus::Ended | SessionStatus::Cancelled)
    }
}

/// Session metadata as reported by the backend
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionInfo {
    pub id: String,
    pub status: SessionStatus,
    pub scheduled_start_time: Option<DateTime<Utc>>,
    pub actual_start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
}

/// One classroom instance owned by the coordinator for its lifetime
#[derive(Debug, Clone, Serialize)]
pub struct Session {
    pub id: String,
    pub status: SessionStatus,
    pub scheduled_start_time: Option<DateTime<Utc>>,
    pub actual_start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub participants: Roster,
    pub chat_messages: ChatLog,
    pub recording: RecordingStatus,
}

impl Session {
    pub fn new(info: SessionInfo, chat_window: chrono::Duration) -> Self {
        Self {
            id: info.id,
            status: info.status,
            scheduled_start_time: info.scheduled_start_time,
            actual_start_time: info.actual_start_time,
            end_time: info.end_time,
            participants: Roster::default(),
            chat_messages: ChatLog::new(chat_window),
            recording: RecordingStatus::Idle,
        }
    }

    /// Apply a status transition, stamping start/end times.
    ///
    /// Re-applying the current status is a no-op so that repeated
    /// backend confirmations stay idempotent.
    pub fn transition_to(&mut self, next: SessionStatus, at: DateTime<Utc>) -> SessionResult<()> {
        if self.status == next {
            return Ok(());
        }
        if !self.status.can_transition_to(next) {
            return Err(SessionError::invalid_state(format!(
                "session {} cannot go from {:?} to {:?}",
                self.id, self.status, next
            )));
        }

        match next {
            SessionStatus::Live => self.actual_start_time = Some(at),
            SessionStatus::Ended | SessionStatus::Cancelled => self.end_time = Some(at),
            SessionStatus::Scheduled => {}
        }
        self.status = next;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scheduled() -> Session {
        Session::new(
            SessionInfo {
                id: "s1".to_string(),
                status: SessionStatus::Scheduled,
                scheduled_start_time: None,
                actual_start_time: None,
                end_time: None,
            },
            chrono::Duration::seconds(5),
        )
    }

    #[test]
    fn test_forward_transitions() {
        let mut session = scheduled();
        let now = Utc::now();

        session.transition_to(SessionStatus::Live, now).unwrap();
        assert_eq!(session.actual_start_time, Some(now));

        session.transition_to(SessionStatus::Ended, now).unwrap();
        assert_eq!(session.end_time, Some(now));
        assert!(session.status.is_terminal());
    }

    #[test]
    fn test_transitions_are_irreversible() {
        let mut session = scheduled();
        let now = Utc::now();
        session.transition_to(SessionStatus::Live, now).unwrap();
        session.transition_to(SessionStatus::Ended, now).unwrap();

        assert!(session.transition_to(SessionStatus::Live, now).is_err());
        assert!(session.transition_to(SessionStatus::Cancelled, now).is_err());
        assert_eq!(session.status, SessionStatus::Ended);
    }

    #[test]
    fn test_scheduled_cannot_skip_to_ended() {
        let mut session = scheduled();
        assert!(session.transition_to(SessionStatus::Ended, Utc::now()).is_err());
        assert!(session.transition_to(SessionStatus::Cancelled, Utc::now()).is_ok());
    }
}
