//! Write path: persist a new message, then fan it out to live viewers.

use chrono::Utc;
use tracing::debug;
use uuid::Uuid;

use wall_db::NewMessage;
use wall_gateway::FanoutBroker;
use wall_types::Message;
use wall_types::api::PostMessageRequest;

use crate::error::ApiError;
use crate::events::validate_code;
use crate::messages::to_message;
use crate::render;
use crate::state::{AppState, with_db};

pub const MAX_TEXT_CHARS: usize = 2000;
pub const MAX_SENDER_CHARS: usize = 64;
pub const MAX_IMAGES: usize = 10;

/// A validated, normalized post.
#[derive(Debug, PartialEq)]
pub struct Draft {
    pub text: String,
    pub sender_name: Option<String>,
    pub image_keys: Vec<String>,
}

pub fn validate(req: PostMessageRequest) -> Result<Draft, ApiError> {
    let image_keys: Vec<String> = req
        .image_keys
        .into_iter()
        .map(|k| k.trim().to_string())
        .collect();

    if image_keys.iter().any(|k| k.is_empty()) {
        return Err(ApiError::BadRequest("image keys must not be empty".into()));
    }
    if image_keys.len() > MAX_IMAGES {
        return Err(ApiError::BadRequest(format!("at most {MAX_IMAGES} images per message")));
    }
    if req.text.trim().is_empty() && image_keys.is_empty() {
        return Err(ApiError::BadRequest("message needs text or an image".into()));
    }
    if req.text.chars().count() > MAX_TEXT_CHARS {
        return Err(ApiError::BadRequest(format!("text exceeds {MAX_TEXT_CHARS} characters")));
    }

    let sender_name = req
        .sender_name
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty());
    if sender_name.as_ref().is_some_and(|s| s.chars().count() > MAX_SENDER_CHARS) {
        return Err(ApiError::BadRequest(format!("sender name exceeds {MAX_SENDER_CHARS} characters")));
    }

    Ok(Draft {
        text: req.text,
        sender_name,
        image_keys,
    })
}

/// Persist, render and publish. The message is stored before anything is
/// published, and fanout never affects the result: a stored message is a
/// successful post even if no viewer receives it live.
pub async fn create_message(
    state: &AppState,
    channel_id: &str,
    req: PostMessageRequest,
) -> Result<Message, ApiError> {
    validate_code(channel_id)?;
    let draft = validate(req)?;

    let id = Uuid::new_v4().to_string();
    let channel = channel_id.to_string();
    let row = with_db(state, move |db| {
        db.insert_message(&NewMessage {
            id: &id,
            channel_id: &channel,
            text: &draft.text,
            sender_name: draft.sender_name.as_deref(),
            image_keys: &draft.image_keys,
            created_at: Utc::now(),
        })
    })
    .await?;

    let message = to_message(row);
    let delivered = on_message_created(&state.broker, channel_id, &render::live_payload(&message));
    debug!("Message {} on {} offered to {} viewers", message.id, channel_id, delivered);

    Ok(message)
}

/// Hand a rendered payload to the broker. The payload is opaque here.
pub fn on_message_created(broker: &FanoutBroker, channel_id: &str, rendered_payload: &str) -> usize {
    broker.publish_message(channel_id, rendered_payload)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn req(text: &str, sender: Option<&str>, images: &[&str]) -> PostMessageRequest {
        PostMessageRequest {
            text: text.into(),
            sender_name: sender.map(str::to_string),
            image_keys: images.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn blank_sender_becomes_anonymous() {
        let draft = validate(req("hi", Some("   "), &[])).unwrap();
        assert_eq!(draft.sender_name, None);
    }

    #[test]
    fn image_only_posts_are_allowed() {
        let draft = validate(req("", Some("Ada"), &[" uploads/a.png "])).unwrap();
        assert_eq!(draft.image_keys, vec!["uploads/a.png".to_string()]);
    }

    #[test]
    fn empty_posts_are_rejected() {
        assert!(matches!(validate(req("  ", None, &[])), Err(ApiError::BadRequest(_))));
        assert!(matches!(validate(req("x", None, &[""])), Err(ApiError::BadRequest(_))));
    }

    #[test]
    fn limits_are_enforced() {
        let long = "x".repeat(MAX_TEXT_CHARS + 1);
        assert!(validate(req(&long, None, &[])).is_err());
        let many: Vec<&str> = vec!["k"; MAX_IMAGES + 1];
        assert!(validate(req("x", None, &many)).is_err());
    }
}
