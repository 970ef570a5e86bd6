use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{Event, Message};

// -- JWT Claims --

/// Moderator token claims. Tokens are minted elsewhere; this server only
/// verifies them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub username: String,
    pub exp: usize,
}

// -- Events --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateEventRequest {
    pub code: String,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
}

/// Partial update; absent fields are left unchanged. An empty description
/// clears it.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateEventRequest {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

/// Public wall view. Pinned and recent messages are paged independently so
/// a long pinned list never crowds out live chatter.
#[derive(Debug, Serialize, Deserialize)]
pub struct EventWallResponse {
    pub event: Event,
    pub event_url: String,
    pub pinned: MessagePage,
    pub recent: MessagePage,
}

// -- Messages --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PostMessageRequest {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub sender_name: Option<String>,
    #[serde(default)]
    pub image_keys: Vec<String>,
}

/// One page of history, newest first.
#[derive(Debug, Serialize, Deserialize)]
pub struct MessagePage {
    pub messages: Vec<Message>,
    /// Cursor for the next (older) page: the id of the last message returned.
    pub next_before_id: Option<Uuid>,
    pub has_older: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct OlderProbeResponse {
    pub has_older: bool,
    pub before_id: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PinResponse {
    pub id: Uuid,
    pub pinned: bool,
}

// -- Health --

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub channels: usize,
    pub subscribers: usize,
}
