use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    /// Server-assigned insertion sequence. Creation time is the ordering key;
    /// `seq` breaks same-millisecond ties and is what cursors resolve to.
    pub seq: i64,
    pub conversation_id: Uuid,
    /// None for system-generated messages.
    pub sender_id: Option<Uuid>,
    pub content: Option<String>,
    pub image_url: Option<String>,
    pub created_at: DateTime<Utc>,
    /// Users who have observed this message. Never contains the sender.
    pub seen_by: Vec<Uuid>,
}

impl Message {
    /// Total order used everywhere a message list is rendered or merged:
    /// creation time first, insertion sequence as the tie-break.
    pub fn sort_key(&self) -> (DateTime<Utc>, i64) {
        (self.created_at, self.seq)
    }
}

/// One page of cursor-paginated history, newest first.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessagePage {
    pub messages: Vec<Message>,
    /// Id of the oldest message in this page; pass back to fetch older ones.
    pub next_cursor: Option<Uuid>,
    pub has_more: bool,
}
