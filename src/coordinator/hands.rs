use serde::Serialize;

/// Distinct raised hands in the order they went up
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct HandRaiseSet {
    raised: Vec<String>,
}

impl HandRaiseSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if the set changed
    pub fn raise(&mut self, user_id: &str) -> bool {
        if self.contains(user_id) {
            return false;
        }
        self.raised.push(user_id.to_string());
        true
    }

    /// Returns true if the set changed; lowering a hand that is not up is a no-op
    pub fn lower(&mut self, user_id: &str) -> bool {
        let before = self.raised.len();
        self.raised.retain(|u| u != user_id);
        self.raised.len() != before
    }

    pub fn set(&mut self, user_id: &str, raised: bool) -> bool {
        if raised {
            self.raise(user_id)
        } else {
            self.lower(user_id)
        }
    }

    /// Keep only hands for which `keep` holds
    pub fn retain(&mut self, mut keep: impl FnMut(&str) -> bool) -> bool {
        let before = self.raised.len();
        self.raised.retain(|u| keep(u.as_str()));
        self.raised.len() != before
    }

    pub fn contains(&self, user_id: &str) -> bool {
        self.raised.iter().any(|u| u == user_id)
    }

    pub fn len(&self) -> usize {
        self.raised.len()
    }

    pub fn is_empty(&self) -> bool {
        self.raised.is_empty()
    }

    pub fn to_vec(&self) -> Vec<String> {
        self.raised.clone()
    }

    pub fn clear(&mut self) {
        self.raised.clear();
    }
}
