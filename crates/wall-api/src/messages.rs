use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use tracing::{info, warn};
use uuid::Uuid;

use wall_db::MessageRow;
use wall_db::models::parse_timestamp;
use wall_types::api::{Claims, MessagePage, OlderProbeResponse, PinResponse, PostMessageRequest};
use wall_types::{Message, Partition};

use crate::error::ApiError;
use crate::events::validate_code;
use crate::pipeline;
use crate::state::{AppState, with_db};

#[derive(Debug, Deserialize)]
pub struct PageQuery {
    pub limit: Option<u32>,
    /// Keyset cursor: id of the oldest message from the previous page.
    pub before_id: Option<String>,
    #[serde(default)]
    pub partition: Partition,
}

#[derive(Debug, Deserialize)]
pub struct OlderQuery {
    pub before_id: String,
    /// Defaults to the cursor message's own partition.
    pub partition: Option<Partition>,
}

pub fn to_message(row: MessageRow) -> Message {
    Message {
        id: row.id.parse().unwrap_or_else(|e| {
            warn!("Corrupt message id '{}': {}", row.id, e);
            Uuid::default()
        }),
        created_at: parse_timestamp(&row.created_at).unwrap_or_else(|| {
            warn!("Corrupt created_at '{}' on message '{}'", row.created_at, row.id);
            chrono::DateTime::default()
        }),
        channel_id: row.channel_id,
        text: row.text,
        sender_name: row.sender_name,
        images: row.images,
        pinned: row.pinned,
    }
}

/// POST /events/{code}/messages
pub async fn post_message(
    State(state): State<AppState>,
    Path(code): Path<String>,
    Json(req): Json<PostMessageRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let message = pipeline::create_message(&state, &code, req).await?;
    Ok((StatusCode::CREATED, Json(message)))
}

/// GET /events/{code}/messages: one page of history, pinned first, newest first.
pub async fn get_messages(
    State(state): State<AppState>,
    Path(code): Path<String>,
    Query(query): Query<PageQuery>,
) -> Result<Json<MessagePage>, ApiError> {
    validate_code(&code)?;
    let limit = state.settings.clamp_limit(query.limit);
    Ok(Json(load_page(&state, code, query.partition, query.before_id, limit).await?))
}

pub(crate) async fn load_page(
    state: &AppState,
    code: String,
    partition: Partition,
    before_id: Option<String>,
    limit: u32,
) -> Result<MessagePage, ApiError> {
    let (rows, has_older) = with_db(state, move |db| {
        db.page_with_probe(&code, partition, before_id.as_deref(), limit)
    })
    .await?;

    let messages: Vec<Message> = rows.into_iter().map(to_message).collect();
    let next_before_id = messages.last().map(|m| m.id);

    Ok(MessagePage {
        messages,
        next_before_id,
        has_older,
    })
}

/// GET /events/{code}/messages/older: cheap "load more?" probe.
/// 200 with the cursor when older messages exist, 204 otherwise.
pub async fn check_older(
    State(state): State<AppState>,
    Path(code): Path<String>,
    Query(query): Query<OlderQuery>,
) -> Result<Response, ApiError> {
    validate_code(&code)?;
    let before_id = query.before_id.clone();
    let has_older = with_db(&state, move |db| match query.partition {
        Some(partition) => db.has_older_in(&code, partition, &query.before_id),
        None => db.has_older(&code, &query.before_id),
    })
    .await?;

    if !has_older {
        return Ok(StatusCode::NO_CONTENT.into_response());
    }

    Ok(Json(OlderProbeResponse {
        has_older,
        before_id,
    })
    .into_response())
}

/// POST /messages/{message_id}/pin: moderator toggle.
pub async fn toggle_pin(
    State(state): State<AppState>,
    Path(message_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<PinResponse>, ApiError> {
    let id = message_id.to_string();
    let pinned = with_db(&state, move |db| db.toggle_pin(&id))
        .await?
        .ok_or(ApiError::NotFound)?;

    info!(
        "{} ({}) {} message {}",
        claims.username,
        claims.sub,
        if pinned { "pinned" } else { "unpinned" },
        message_id
    );

    Ok(Json(PinResponse {
        id: message_id,
        pinned,
    }))
}
