//! Chat list entries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One-to-one chat between `user1` and `user2`.
///
/// The pairing is symmetric; which side is "the other party" depends on who is
/// asking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chat {
    /// Chat id
    pub id: String,
    /// First participant
    pub user1: String,
    /// Second participant
    pub user2: String,
    /// Last activity
    pub updated_at: DateTime<Utc>,
    /// Preview of the latest message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_message: Option<String>,
    /// Author of the latest message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_sender_id: Option<String>,
    /// Messages not yet seen by the current user
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unread_count: Option<u32>,
}

impl Chat {
    /// The participant that is not `me`.
    ///
    /// Returns `user1` when `me` is not a participant at all.
    pub fn other_party(&self, me: &str) -> &str {
        if self.user1 == me { &self.user2 } else { &self.user1 }
    }

    /// True if `user_id` is one of the two participants.
    pub fn involves(&self, user_id: &str) -> bool {
        self.user1 == user_id || self.user2 == user_id
    }

    /// Unread counter, zero when absent.
    pub fn unread(&self) -> u32 {
        self.unread_count.unwrap_or(0)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn chat() -> Chat {
        Chat {
            id: "c1".to_string(),
            user1: "alice".to_string(),
            user2: "bob".to_string(),
            updated_at: "2024-01-01T00:00:00Z".parse().unwrap(),
            last_message: None,
            last_sender_id: None,
            unread_count: None,
        }
    }

    #[test]
    fn other_party_is_symmetric() {
        let chat = chat();
        assert_eq!(chat.other_party("alice"), "bob");
        assert_eq!(chat.other_party("bob"), "alice");
    }

    #[test]
    fn involvement() {
        let chat = chat();
        assert!(chat.involves("alice"));
        assert!(!chat.involves("eve"));
        assert_eq!(chat.unread(), 0);
    }
}
