//! Client-side reconciliation cache.
//!
//! Renders optimistic sends immediately and merges them with what the
//! server confirms, keyed by a client-generated correlation id. Confirmed
//! history is kept in server order (creation time, then insertion
//! sequence, newest first) and is only ever merged by id, so a message can
//! never appear twice or shift position once confirmed.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::models::{Message, MessagePage};
use crate::websocket::events::ChannelEvent;

/// Lifecycle of a locally-originated message that the server has not
/// confirmed yet. `Sending → Failed` keeps the entry around for an explicit
/// user retry; resolution removes it in favor of the server's message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PendingState {
    Sending,
    Failed,
}

#[derive(Debug, Clone)]
pub struct PendingMessage {
    pub correlation_id: Uuid,
    pub conversation_id: Uuid,
    pub content: Option<String>,
    pub image_url: Option<String>,
    pub state: PendingState,
    pub started_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct Timeline {
    /// Server-confirmed messages, newest first.
    confirmed: Vec<Message>,
    /// Locally-originated entries awaiting resolution, oldest first.
    pending: Vec<PendingMessage>,
    next_cursor: Option<Uuid>,
    has_more: bool,
}

/// One renderable row: either a confirmed message or an optimistic local one.
#[derive(Debug)]
pub enum Entry<'a> {
    Pending(&'a PendingMessage),
    Confirmed(&'a Message),
}

#[derive(Debug, Default)]
pub struct ChatCache {
    timelines: HashMap<Uuid, Timeline>,
    unread: HashMap<Uuid, i64>,
}

impl ChatCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an optimistic send. The returned correlation id ties the
    /// rendered entry to the eventual server response, regardless of which
    /// view is active when it arrives.
    pub fn begin_send(
        &mut self,
        conversation_id: Uuid,
        content: Option<String>,
        image_url: Option<String>,
    ) -> Uuid {
        let correlation_id = Uuid::new_v4();
        self.timeline_mut(conversation_id).pending.push(PendingMessage {
            correlation_id,
            conversation_id,
            content,
            image_url,
            state: PendingState::Sending,
            started_at: Utc::now(),
        });
        correlation_id
    }

    /// Resolve a pending entry with the server's message: the temp entry is
    /// replaced, never kept alongside its confirmed counterpart. Safe to
    /// call after the push event already delivered the same message.
    pub fn confirm_send(&mut self, correlation_id: Uuid, message: Message) {
        if let Some(timeline) = self.find_pending_timeline(correlation_id) {
            timeline.pending.retain(|p| p.correlation_id != correlation_id);
        }
        self.insert_confirmed(message);
    }

    /// Mark a pending entry failed. The entry is kept so the user can retry.
    pub fn fail_send(&mut self, correlation_id: Uuid) -> bool {
        match self.find_pending_mut(correlation_id) {
            Some(pending) => {
                pending.state = PendingState::Failed;
                true
            }
            None => false,
        }
    }

    /// Flip a failed entry back to `Sending` and hand the original payload
    /// back for resubmission. Retry is always user-triggered.
    pub fn retry(&mut self, correlation_id: Uuid) -> Option<(Uuid, Option<String>, Option<String>)> {
        let pending = self.find_pending_mut(correlation_id)?;
        if pending.state != PendingState::Failed {
            return None;
        }
        pending.state = PendingState::Sending;
        Some((
            pending.conversation_id,
            pending.content.clone(),
            pending.image_url.clone(),
        ))
    }

    /// Merge a pushed channel event into the cache.
    pub fn apply_event(&mut self, event: &ChannelEvent) {
        match event {
            ChannelEvent::MessageNew { message, .. } => {
                self.insert_confirmed(message.clone());
            }
            ChannelEvent::MessageSeen {
                conversation_id,
                message_ids,
                seen_by,
            } => {
                if let Some(timeline) = self.timelines.get_mut(conversation_id) {
                    for message in timeline.confirmed.iter_mut() {
                        if message_ids.contains(&message.id)
                            && message.sender_id != Some(*seen_by)
                            && !message.seen_by.contains(seen_by)
                        {
                            message.seen_by.push(*seen_by);
                        }
                    }
                }
            }
            ChannelEvent::ConversationUpdated {
                conversation_id,
                unread_count,
                ..
            } => {
                // The server count is authoritative; overwrite, never delta.
                self.unread.insert(*conversation_id, *unread_count);
            }
            // Typing indicators are view state, not cache state.
            ChannelEvent::TypingStart { .. } | ChannelEvent::TypingStop { .. } => {}
        }
    }

    /// Merge a fetched history page. Messages already present (from a push
    /// or an earlier fetch) are skipped by id.
    pub fn merge_page(&mut self, conversation_id: Uuid, page: &MessagePage) {
        for message in &page.messages {
            self.insert_confirmed(message.clone());
        }
        let timeline = self.timeline_mut(conversation_id);
        timeline.next_cursor = page.next_cursor;
        timeline.has_more = page.has_more;
    }

    /// The user opened this conversation and a mark-seen call is on its
    /// way: zero the badge optimistically. The next server value overwrites
    /// it either way.
    pub fn open_conversation(&mut self, conversation_id: Uuid) {
        self.unread.insert(conversation_id, 0);
    }

    pub fn set_unread(&mut self, conversation_id: Uuid, count: i64) {
        self.unread.insert(conversation_id, count);
    }

    pub fn unread(&self, conversation_id: Uuid) -> i64 {
        self.unread.get(&conversation_id).copied().unwrap_or(0)
    }

    pub fn total_unread(&self) -> i64 {
        self.unread.values().sum()
    }

    pub fn next_cursor(&self, conversation_id: Uuid) -> Option<Uuid> {
        self.timelines.get(&conversation_id)?.next_cursor
    }

    pub fn has_more(&self, conversation_id: Uuid) -> bool {
        self.timelines
            .get(&conversation_id)
            .map(|t| t.has_more)
            .unwrap_or(false)
    }

    /// Rendered rows, newest first: unresolved local entries above the
    /// confirmed history.
    pub fn entries(&self, conversation_id: Uuid) -> Vec<Entry<'_>> {
        match self.timelines.get(&conversation_id) {
            None => Vec::new(),
            Some(timeline) => timeline
                .pending
                .iter()
                .rev()
                .map(Entry::Pending)
                .chain(timeline.confirmed.iter().map(Entry::Confirmed))
                .collect(),
        }
    }

    fn timeline_mut(&mut self, conversation_id: Uuid) -> &mut Timeline {
        self.timelines.entry(conversation_id).or_default()
    }

    fn find_pending_mut(&mut self, correlation_id: Uuid) -> Option<&mut PendingMessage> {
        self.timelines
            .values_mut()
            .flat_map(|t| t.pending.iter_mut())
            .find(|p| p.correlation_id == correlation_id)
    }

    fn find_pending_timeline(&mut self, correlation_id: Uuid) -> Option<&mut Timeline> {
        self.timelines
            .values_mut()
            .find(|t| t.pending.iter().any(|p| p.correlation_id == correlation_id))
    }

    /// Insert keeping descending server order; a message that is already
    /// present is dropped, and confirmed entries never move relative to
    /// each other.
    fn insert_confirmed(&mut self, message: Message) {
        let timeline = self.timeline_mut(message.conversation_id);
        if timeline.confirmed.iter().any(|m| m.id == message.id) {
            return;
        }
        let position = timeline
            .confirmed
            .iter()
            .position(|m| m.sort_key() < message.sort_key())
            .unwrap_or(timeline.confirmed.len());
        timeline.confirmed.insert(position, message);
    }
}
