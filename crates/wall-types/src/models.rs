use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Event metadata. Messages reference an event by `code`, but the row is
/// optional: a channel with history and no metadata is still a valid channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub code: String,
    pub title: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A single post on an event wall.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub channel_id: String,
    pub text: String,
    pub sender_name: Option<String>,
    /// Object-storage keys of attached images, in upload order.
    pub images: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub pinned: bool,
}

/// Derived ordering rank: pinned messages sort above everything else.
pub fn pin_rank(pinned: bool) -> u8 {
    if pinned { 1 } else { 0 }
}

/// Which slice of a channel's history a page is drawn from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Partition {
    Pinned,
    Unpinned,
    /// Both partitions folded into one ordering (moderation views).
    #[default]
    All,
}

impl Partition {
    /// The partition a message with the given pin state lives in.
    pub fn of(pinned: bool) -> Self {
        if pinned { Self::Pinned } else { Self::Unpinned }
    }
}
