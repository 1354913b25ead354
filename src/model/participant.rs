use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Presenter,
    Viewer,
}

/// Authenticated identity shared by the media session and signaling channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub user_id: String,
    pub display_name: String,
    pub role: Role,
}

/// One connected presenter or viewer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Participant {
    pub user_id: String,
    pub display_name: String,
    pub role: Role,
    #[serde(default)]
    pub is_muted: bool,
    #[serde(default = "default_true")]
    pub is_video_enabled: bool,
    #[serde(default)]
    pub has_raised_hand: bool,
    pub joined_at: DateTime<Utc>,
    #[serde(default)]
    pub left_at: Option<DateTime<Utc>>,
    /// Media transport id of this participant's published tracks (lookup only)
    #[serde(default)]
    pub transport_id: Option<u32>,
}

fn default_true() -> bool {
    true
}

impl Participant {
    pub fn new(user_id: impl Into<String>, display_name: impl Into<String>, role: Role) -> Self {
        Self {
            user_id: user_id.into(),
            display_name: display_name.into(),
            role,
            is_muted: false,
            is_video_enabled: true,
            has_raised_hand: false,
            joined_at: Utc::now(),
            left_at: None,
            transport_id: None,
        }
    }

    pub fn with_transport_id(mut self, transport_id: u32) -> Self {
        self.transport_id = Some(transport_id);
        self
    }

    pub fn is_active(&self) -> bool {
        self.left_at.is_none()
    }
}

/// Join-ordered participant list.
///
/// Departed participants keep their entry (with `left_at` set) for
/// attendance; every roster view filters them out.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Roster {
    entries: Vec<Participant>,
}

impl Roster {
    /// Add or reactivate a participant. Returns true if the active roster changed.
    pub fn join(&mut self, participant: Participant) -> bool {
        match self.entries.iter_mut().find(|p| p.user_id == participant.user_id) {
            Some(existing) => {
                let was_active = existing.is_active();
                existing.display_name = participant.display_name;
                existing.role = participant.role;
                existing.left_at = None;
                if participant.transport_id.is_some() {
                    existing.transport_id = participant.transport_id;
                }
                if !was_active {
                    existing.is_muted = participant.is_muted;
                    existing.is_video_enabled = participant.is_video_enabled;
                    existing.has_raised_hand = false;
                }
                !was_active
            }
            None => {
                self.entries.push(participant);
                true
            }
        }
    }

    /// Mark a participant as departed. Returns false if unknown or already gone.
    pub fn leave(&mut self, user_id: &str, at: DateTime<Utc>) -> bool {
        match self.entries.iter_mut().find(|p| p.user_id == user_id) {
            Some(p) if p.is_active() => {
                p.left_at = Some(at);
                p.has_raised_hand = false;
                true
            }
            _ => false,
        }
    }

    /// Reconcile against an authoritative snapshot: snapshot entries are
    /// upserted, active entries missing from it are marked departed.
    pub fn apply_snapshot(&mut self, snapshot: Vec<Participant>, at: DateTime<Utc>) {
        let present: Vec<String> = snapshot
            .iter()
            .filter(|p| p.is_active())
            .map(|p| p.user_id.clone())
            .collect();

        for entry in self.entries.iter_mut() {
            if entry.is_active() && !present.contains(&entry.user_id) {
                entry.left_at = Some(at);
                entry.has_raised_hand = false;
            }
        }

        for incoming in snapshot {
            match self.entries.iter_mut().find(|p| p.user_id == incoming.user_id) {
                Some(existing) => {
                    let joined_at = existing.joined_at;
                    let transport_id = incoming.transport_id.or(existing.transport_id);
                    *existing = incoming;
                    existing.joined_at = joined_at;
                    existing.transport_id = transport_id;
                }
                None => self.entries.push(incoming),
            }
        }
    }

    pub fn get(&self, user_id: &str) -> Option<&Participant> {
        self.entries.iter().find(|p| p.user_id == user_id)
    }

    pub fn get_mut(&mut self, user_id: &str) -> Option<&mut Participant> {
        self.entries.iter_mut().find(|p| p.user_id == user_id)
    }

    pub fn find_by_transport_id(&self, transport_id: u32) -> Option<&Participant> {
        self.entries
            .iter()
            .find(|p| p.is_active() && p.transport_id == Some(transport_id))
    }

    /// Active participants in join order
    pub fn active(&self) -> impl Iterator<Item = &Participant> {
        self.entries.iter().filter(|p| p.is_active())
    }

    /// Everyone who ever joined, for attendance
    pub fn history(&self) -> &[Participant] {
        &self.entries
    }

    pub fn active_count(&self) -> usize {
        self.active().count()
    }
}
