use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A chat message. Content is immutable once created; only `read_by` grows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Authoritative id, assigned by the broadcast. `None` for a local echo.
    #[serde(default)]
    pub id: Option<String>,
    /// Client-generated reference carried on the wire so the broadcast can
    /// be matched back to its optimistic echo
    #[serde(default)]
    pub client_ref: Option<String>,
    pub sender_id: String,
    pub sender_display_name: String,
    pub text: String,
    pub sent_at: DateTime<Utc>,
    #[serde(default)]
    pub read_by: BTreeMap<String, DateTime<Utc>>,
}

impl ChatMessage {
    /// Optimistic local echo for a message about to be sent
    pub fn local(sender_id: &str, sender_display_name: &str, text: &str) -> Self {
        Self {
            id: None,
            client_ref: Some(uuid::Uuid::new_v4().to_string()),
            sender_id: sender_id.to_string(),
            sender_display_name: sender_display_name.to_string(),
            text: text.to_string(),
            sent_at: Utc::now(),
            read_by: BTreeMap::new(),
        }
    }

    pub fn is_pending(&self) -> bool {
        self.id.is_none()
    }

    pub fn is_read_by(&self, user_id: &str) -> bool {
        self.sender_id == user_id || self.read_by.contains_key(user_id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    Inserted,
    /// An optimistic echo was replaced by its authoritative counterpart
    Replaced,
    Duplicate,
}

/// Chat history ordered by `sent_at`
#[derive(Debug, Clone, Serialize)]
pub struct ChatLog {
    messages: Vec<ChatMessage>,
    #[serde(skip)]
    window: chrono::Duration,
}

impl ChatLog {
    pub fn new(window: chrono::Duration) -> Self {
        Self {
            messages: Vec::new(),
            window,
        }
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Append an optimistic local echo
    pub fn push_local(&mut self, message: ChatMessage) {
        self.insert_sorted(message);
    }

    /// Merge an authoritative message.
    ///
    /// Match order: authoritative id, then client ref (pending or already
    /// confirmed), then a pending echo with the same sender and text within
    /// the dedupe window, then an identical (sender, text, sent_at) copy
    /// under another id.
    pub fn merge(&mut self, incoming: ChatMessage) -> MergeOutcome {
        if let Some(id) = &incoming.id {
            if let Some(existing) = self.messages.iter_mut().find(|m| m.id.as_ref() == Some(id)) {
                merge_readers(&mut existing.read_by, &incoming.read_by);
                return MergeOutcome::Duplicate;
            }
        }

        if let Some(pos) = self.find_by_client_ref(&incoming) {
            let existing = self.messages.remove(pos);
            let was_pending = existing.is_pending();
            let previous_id = existing.id.clone();
            let merged = confirm(existing, incoming);
            let upgraded = merged.id != previous_id;
            self.insert_sorted(merged);
            return if was_pending || upgraded {
                MergeOutcome::Replaced
            } else {
                MergeOutcome::Duplicate
            };
        }

        if let Some(pos) = self.find_pending_echo(&incoming) {
            let echo = self.messages.remove(pos);
            let merged = confirm(echo, incoming);
            self.insert_sorted(merged);
            return MergeOutcome::Replaced;
        }

        if let Some(existing) = self.messages.iter_mut().find(|m| same_content(m, &incoming)) {
            merge_readers(&mut existing.read_by, &incoming.read_by);
            return MergeOutcome::Duplicate;
        }

        self.insert_sorted(incoming);
        MergeOutcome::Inserted
    }

    fn find_by_client_ref(&self, incoming: &ChatMessage) -> Option<usize> {
        let client_ref = incoming.client_ref.as_ref()?;
        self.messages
            .iter()
            .position(|m| m.client_ref.as_ref() == Some(client_ref))
    }

    fn find_pending_echo(&self, incoming: &ChatMessage) -> Option<usize> {
        self.messages.iter().position(|m| {
            m.is_pending()
                && m.sender_id == incoming.sender_id
                && m.text == incoming.text
                && (m.sent_at - incoming.sent_at).abs() <= self.window
        })
    }

    fn insert_sorted(&mut self, message: ChatMessage) {
        let pos = self.messages.partition_point(|m| m.sent_at <= message.sent_at);
        self.messages.insert(pos, message);
    }

    /// Record `reader` on every message it has not read. Returns how many changed.
    pub fn mark_read(&mut self, reader: &str, at: DateTime<Utc>) -> usize {
        let mut marked = 0;
        for message in self.messages.iter_mut() {
            if !message.is_read_by(reader) {
                message.read_by.insert(reader.to_string(), at);
                marked += 1;
            }
        }
        marked
    }

    pub fn unread_count(&self, user_id: &str) -> usize {
        self.messages.iter().filter(|m| !m.is_read_by(user_id)).count()
    }
}

fn merge_readers(into: &mut BTreeMap<String, DateTime<Utc>>, from: &BTreeMap<String, DateTime<Utc>>) {
    for (reader, at) in from {
        into.entry(reader.clone()).or_insert(*at);
    }
}

/// Replace a local copy with its authoritative counterpart.
///
/// An id that only mirrors the client ref never overrides a backend id.
fn confirm(existing: ChatMessage, incoming: ChatMessage) -> ChatMessage {
    let provisional = incoming.id.is_some() && incoming.id == incoming.client_ref;
    let mut merged = incoming;
    if provisional && existing.id.is_some() {
        merged.id = existing.id;
    }
    if merged.client_ref.is_none() {
        merged.client_ref = existing.client_ref;
    }
    merge_readers(&mut merged.read_by, &existing.read_by);
    merged
}

/// Same message seen under a different id. Distinct client refs always mean
/// distinct messages.
fn same_content(existing: &ChatMessage, incoming: &ChatMessage) -> bool {
    let refs_conflict = matches!(
        (&existing.client_ref, &incoming.client_ref),
        (Some(a), Some(b)) if a != b
    );
    !refs_conflict
        && existing.sender_id == incoming.sender_id
        && existing.text == incoming.text
        && existing.sent_at == incoming.sent_at
}
