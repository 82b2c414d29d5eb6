use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::customer::{CustomerId, CustomerProfile};

pub const DEFAULT_HISTORY_CAP: usize = 20;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

impl Turn {
    pub fn user(text: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self { role: Role::User, text: text.into(), timestamp }
    }

    pub fn assistant(text: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self { role: Role::Assistant, text: text.into(), timestamp }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationContext {
    pub customer_id: CustomerId,
    pub profile: CustomerProfile,
    pub history: Vec<Turn>,
    pub last_activity: DateTime<Utc>,
}

impl ConversationContext {
    pub fn new(customer_id: CustomerId, now: DateTime<Utc>) -> Self {
        Self {
            customer_id,
            profile: CustomerProfile::fresh(now),
            history: Vec::new(),
            last_activity: now,
        }
    }

    /// Appends turns in order and evicts the oldest entries beyond `cap`.
    pub fn append_turns<I>(&mut self, turns: I, cap: usize, now: DateTime<Utc>)
    where
        I: IntoIterator<Item = Turn>,
    {
        self.history.extend(turns);
        if self.history.len() > cap {
            let overflow = self.history.len() - cap;
            self.history.drain(..overflow);
        }
        self.last_activity = now;
    }

    pub fn recent(&self, limit: usize) -> &[Turn] {
        let start = self.history.len().saturating_sub(limit);
        &self.history[start..]
    }

    pub fn user_turns(&self) -> impl Iterator<Item = &Turn> {
        self.history.iter().filter(|turn| turn.role == Role::User)
    }
}
