//! Conversations a client already knows about.
//!
//! Shared by the monitor and every session of one client. The caller creates
//! the store and hands clones around.

use parking_lot::RwLock;
use pchat_common::{ConversationId, ConversationSummary, Timestamp};
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KnownChat {
    pub summary: ConversationSummary,
    /// Newest server timestamp observed for the conversation
    pub last_seen_timestamp: Timestamp,
}

#[derive(Debug, Clone, Default)]
pub struct KnownChats {
    inner: Arc<RwLock<HashMap<ConversationId, KnownChat>>>,
}

impl KnownChats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert with `last_seen_timestamp = 0`; false if already known.
    pub fn insert_if_absent(&self, summary: ConversationSummary) -> bool {
        let mut chats = self.inner.write();
        if chats.contains_key(&summary.conversation_id) {
            return false;
        }
        chats.insert(
            summary.conversation_id.clone(),
            KnownChat {
                summary,
                last_seen_timestamp: 0,
            },
        );
        true
    }

    /// Raise the stored timestamp. Returns the updated entry only when the
    /// value actually increased.
    pub fn advance(&self, conversation_id: &str, timestamp: Timestamp) -> Option<KnownChat> {
        let mut chats = self.inner.write();
        let chat = chats.get_mut(conversation_id)?;
        if timestamp <= chat.last_seen_timestamp {
            return None;
        }
        chat.last_seen_timestamp = timestamp;
        Some(chat.clone())
    }

    pub fn get(&self, conversation_id: &str) -> Option<KnownChat> {
        self.inner.read().get(conversation_id).cloned()
    }

    pub fn contains(&self, conversation_id: &str) -> bool {
        self.inner.read().contains_key(conversation_id)
    }

    pub fn ids(&self) -> Vec<ConversationId> {
        self.inner.read().keys().cloned().collect()
    }

    pub fn forget(&self, conversation_id: &str) -> bool {
        self.inner.write().remove(conversation_id).is_some()
    }

    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pchat_common::ChatKind;

    fn summary(id: &str) -> ConversationSummary {
        ConversationSummary {
            conversation_id: id.to_string(),
            kind: ChatKind::Room,
            title: id.to_string(),
            partner_id: None,
            checkpoint: 0,
        }
    }

    #[test]
    fn test_insert_once() {
        let known = KnownChats::new();
        assert!(known.insert_if_absent(summary("c1")));
        assert!(!known.insert_if_absent(summary("c1")));
        assert_eq!(known.get("c1").unwrap().last_seen_timestamp, 0);
    }

    #[test]
    fn test_advance_is_monotonic() {
        let known = KnownChats::new();
        known.insert_if_absent(summary("c1"));

        assert!(known.advance("c1", 50).is_some());
        assert!(known.advance("c1", 50).is_none());
        assert!(known.advance("c1", 20).is_none());
        assert_eq!(known.get("c1").unwrap().last_seen_timestamp, 50);
        assert!(known.advance("missing", 10).is_none());
    }

    #[test]
    fn test_clones_share_state() {
        let known = KnownChats::new();
        let other = known.clone();
        known.insert_if_absent(summary("c1"));
        assert!(other.contains("c1"));
        assert!(other.forget("c1"));
        assert!(known.is_empty());
    }
}
