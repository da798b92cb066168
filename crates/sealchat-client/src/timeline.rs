//! In-memory ordered timeline of one chat.
//!
//! Items stay sorted ascending by creation time; items with equal timestamps
//! keep arrival order. Ids are unique.
//!
//! Full loads are tagged with a [`LoadTicket`]. A load that resolves after a
//! newer one has been applied is discarded, so an out-of-order response can
//! never roll the view back to older data.
//!
//! A load replaces everything that was present when it began. Live items that
//! arrived after that point and are missing from the loaded snapshot survive
//! it; for ids present in both, the load wins.

use std::collections::{HashMap, HashSet};

use sealchat_proto::{ChatItem, Message, MessageStatus};

/// Monotonic sequence number of a full load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LoadTicket(u64);

impl LoadTicket {
    /// Sequence number of the load.
    pub fn sequence(self) -> u64 {
        self.0
    }
}

/// Ordered, deduplicated items of one chat.
#[derive(Debug, Clone, Default)]
pub struct ChatTimeline {
    items: Vec<ChatItem>,
    ids: HashSet<String>,
    /// Live item id -> load sequence issued when it arrived
    live: HashMap<String, u64>,
    issued: u64,
    applied: Option<LoadTicket>,
}

impl ChatTimeline {
    /// Empty timeline.
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a full load; the returned ticket must accompany its results.
    pub fn begin_load(&mut self) -> LoadTicket {
        self.issued += 1;
        LoadTicket(self.issued)
    }

    /// Replace the timeline with the result of a full load.
    ///
    /// Live items inserted after `ticket` was issued are kept unless the load
    /// carries the same id. Returns false, leaving the timeline untouched, if
    /// a newer load has already been applied or the ticket was never issued.
    pub fn apply_load(&mut self, ticket: LoadTicket, mut items: Vec<ChatItem>) -> bool {
        if ticket.0 > self.issued || self.applied.is_some_and(|applied| ticket <= applied) {
            return false;
        }

        let mut ids = HashSet::with_capacity(items.len());
        items.retain(|item| ids.insert(item.id().to_string()));

        let live = std::mem::take(&mut self.live);
        for item in std::mem::take(&mut self.items) {
            let id = item.id();
            let Some(&arrived) = live.get(id) else { continue };
            if arrived >= ticket.0 && ids.insert(id.to_string()) {
                self.live.insert(id.to_string(), arrived);
                items.push(item);
            }
        }
        items.sort_by_key(ChatItem::created_at);

        self.items = items;
        self.ids = ids;
        self.applied = Some(ticket);
        true
    }

    /// Ticket of the most recently applied load.
    pub fn applied_ticket(&self) -> Option<LoadTicket> {
        self.applied
    }

    /// Insert a single live item.
    ///
    /// Returns false if an item with the same id is already present. The item
    /// goes after every item with an equal or earlier timestamp.
    pub fn insert_live(&mut self, item: ChatItem) -> bool {
        if !self.ids.insert(item.id().to_string()) {
            return false;
        }

        self.live.insert(item.id().to_string(), self.issued);
        let created_at = item.created_at();
        let at = self.items.partition_point(|existing| existing.created_at() <= created_at);
        self.items.insert(at, item);
        true
    }

    /// Replace the message with the same id, keeping its position.
    ///
    /// Returns false if no such message exists.
    pub fn replace_message(&mut self, message: Message) -> bool {
        let Some(slot) = self.items.iter_mut().find(|item| item.id() == message.id) else {
            return false;
        };
        *slot = ChatItem::Message(message);
        true
    }

    /// Remove an item by id. Returns the removed item.
    pub fn remove(&mut self, id: &str) -> Option<ChatItem> {
        if !self.ids.remove(id) {
            return None;
        }
        self.live.remove(id);
        let at = self.items.iter().position(|item| item.id() == id)?;
        Some(self.items.remove(at))
    }

    /// Set the delivery status of a message.
    ///
    /// Returns the updated message, or `None` if the id is unknown, refers to
    /// media, or already has that status.
    pub fn update_status(&mut self, id: &str, status: MessageStatus) -> Option<&Message> {
        let message = self.items.iter_mut().find_map(|item| match item {
            ChatItem::Message(m) if m.id == id => Some(m),
            _ => None,
        })?;
        if message.status == Some(status) {
            return None;
        }
        message.status = Some(status);
        Some(&*message)
    }

    /// Message by the same author whose nonce, id or ciphertext matches
    /// `incoming`.
    pub fn find_own_echo(&self, incoming: &Message) -> Option<&Message> {
        self.items.iter().filter_map(ChatItem::as_message).find(|m| {
            let same_nonce = m.nonce.is_some() && m.nonce == incoming.nonce;
            m.sender_id == incoming.sender_id
                && (same_nonce
                    || m.matches_server_id(&incoming.id)
                    || m.ciphertext == incoming.ciphertext)
        })
    }

    /// True if an item with this id is present.
    pub fn contains(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    /// Items in display order.
    pub fn items(&self) -> &[ChatItem] {
        &self.items
    }

    /// Most recent item.
    pub fn last(&self) -> Option<&ChatItem> {
        self.items.last()
    }

    /// Number of items.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// True if the timeline has no items.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::DateTime;
    use sealchat_proto::MediaFile;

    use super::*;

    fn text(id: &str, secs: i64) -> ChatItem {
        ChatItem::Message(Message {
            id: id.to_string(),
            chat_id: "c".to_string(),
            sender_id: "alice".to_string(),
            receiver_id: "bob".to_string(),
            ciphertext: format!("ct-{id}"),
            plaintext: None,
            created_at: DateTime::from_timestamp(secs, 0).unwrap(),
            status: None,
            nonce: None,
            server_id: None,
        })
    }

    fn media(id: &str, secs: i64) -> ChatItem {
        ChatItem::Media(MediaFile {
            id: id.to_string(),
            chat_id: "c".to_string(),
            sender_id: "bob".to_string(),
            receiver_id: "alice".to_string(),
            file_name: "cat.png".to_string(),
            file_type: "image/png".to_string(),
            file_size: 3,
            url: "/media/cat.png".to_string(),
            created_at: DateTime::from_timestamp(secs, 0).unwrap(),
        })
    }

    fn ids(timeline: &ChatTimeline) -> Vec<&str> {
        timeline.items().iter().map(ChatItem::id).collect()
    }

    #[test]
    fn stale_load_is_discarded() {
        let mut timeline = ChatTimeline::new();
        let older = timeline.begin_load();
        let newer = timeline.begin_load();

        assert!(timeline.apply_load(newer, vec![text("new", 2)]));
        assert!(!timeline.apply_load(older, vec![text("old", 1)]));
        assert_eq!(ids(&timeline), ["new"]);
        assert_eq!(timeline.applied_ticket(), Some(newer));
    }

    #[test]
    fn in_order_loads_both_apply() {
        let mut timeline = ChatTimeline::new();
        let first = timeline.begin_load();
        let second = timeline.begin_load();

        assert!(timeline.apply_load(first, vec![text("a", 1)]));
        assert!(timeline.apply_load(second, vec![text("a", 1), text("b", 2)]));
        assert_eq!(ids(&timeline), ["a", "b"]);
    }

    #[test]
    fn unissued_ticket_is_rejected() {
        let mut timeline = ChatTimeline::new();
        assert!(!timeline.apply_load(LoadTicket(5), vec![text("a", 1)]));
        assert!(timeline.is_empty());
    }

    #[test]
    fn live_insert_deduplicates_by_id() {
        let mut timeline = ChatTimeline::new();
        assert!(timeline.insert_live(text("a", 1)));
        assert!(!timeline.insert_live(text("a", 1)));
        assert_eq!(timeline.len(), 1);
    }

    #[test]
    fn live_insert_goes_after_equal_timestamps() {
        let mut timeline = ChatTimeline::new();
        timeline.insert_live(text("a", 1));
        timeline.insert_live(text("c", 3));
        timeline.insert_live(media("b", 1));
        timeline.insert_live(text("z", 0));

        assert_eq!(ids(&timeline), ["z", "a", "b", "c"]);
    }

    #[test]
    fn full_load_supersedes_items_present_when_it_began() {
        let mut timeline = ChatTimeline::new();
        timeline.insert_live(text("before", 5));
        let ticket = timeline.begin_load();

        assert!(timeline.apply_load(ticket, vec![text("a", 1)]));
        assert_eq!(ids(&timeline), ["a"]);
        assert!(!timeline.contains("before"));
    }

    #[test]
    fn live_item_arriving_during_load_survives_it() {
        let mut timeline = ChatTimeline::new();
        let ticket = timeline.begin_load();
        timeline.insert_live(text("live", 5));

        assert!(timeline.apply_load(ticket, vec![text("a", 1), text("b", 9)]));
        assert_eq!(ids(&timeline), ["a", "live", "b"]);

        let next = timeline.begin_load();
        assert!(timeline.apply_load(next, vec![text("a", 1)]));
        assert_eq!(ids(&timeline), ["a"]);
    }

    #[test]
    fn load_wins_for_ids_present_in_both() {
        let mut timeline = ChatTimeline::new();
        let ticket = timeline.begin_load();
        timeline.insert_live(text("m", 5));

        let ChatItem::Message(mut loaded) = text("m", 5) else { unreachable!() };
        loaded.status = Some(MessageStatus::Seen);
        assert!(timeline.apply_load(ticket, vec![ChatItem::Message(loaded)]));

        assert_eq!(timeline.len(), 1);
        assert_eq!(timeline.items()[0].as_message().unwrap().status, Some(MessageStatus::Seen));
    }

    #[test]
    fn removed_id_can_be_inserted_again() {
        let mut timeline = ChatTimeline::new();
        timeline.insert_live(text("a", 1));

        assert!(timeline.remove("a").is_some());
        assert!(timeline.remove("a").is_none());
        assert!(timeline.insert_live(text("a", 1)));
    }

    #[test]
    fn update_status_reports_changes_only() {
        let mut timeline = ChatTimeline::new();
        timeline.insert_live(text("a", 1));
        timeline.insert_live(media("m", 2));

        assert!(timeline.update_status("a", MessageStatus::Seen).is_some());
        assert!(timeline.update_status("a", MessageStatus::Seen).is_none());
        assert!(timeline.update_status("m", MessageStatus::Seen).is_none());
        assert!(timeline.update_status("missing", MessageStatus::Seen).is_none());
    }

    #[test]
    fn replace_keeps_position() {
        let mut timeline = ChatTimeline::new();
        timeline.insert_live(text("a", 1));
        timeline.insert_live(text("b", 2));

        let ChatItem::Message(mut a) = text("a", 1) else { unreachable!() };
        a.plaintext = Some("hola".to_string());
        assert!(timeline.replace_message(a));

        assert_eq!(ids(&timeline), ["a", "b"]);
        assert_eq!(timeline.items()[0].preview(), Some("hola"));
    }
}
