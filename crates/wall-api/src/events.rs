use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use tracing::{info, warn};

use wall_db::EventRow;
use wall_db::models::parse_timestamp;
use wall_types::api::{Claims, CreateEventRequest, EventWallResponse, UpdateEventRequest};
use wall_types::{Event, Partition};

use crate::error::ApiError;
use crate::messages::load_page;
use crate::state::{AppState, with_db};

pub const MAX_CODE_LEN: usize = 64;
pub const MAX_TITLE_CHARS: usize = 200;

#[derive(Debug, Deserialize)]
pub struct WallQuery {
    pub limit: Option<u32>,
}

/// Event codes double as channel ids and URL segments.
pub fn validate_code(code: &str) -> Result<(), ApiError> {
    let valid = !code.is_empty()
        && code.len() <= MAX_CODE_LEN
        && code
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if valid {
        Ok(())
    } else {
        Err(ApiError::BadRequest(format!("invalid event code '{code}'")))
    }
}

fn clean_title(raw: &str) -> Result<String, ApiError> {
    let title = raw.trim();
    if title.is_empty() || title.chars().count() > MAX_TITLE_CHARS {
        return Err(ApiError::BadRequest(format!(
            "title must be 1-{MAX_TITLE_CHARS} characters"
        )));
    }
    Ok(title.to_string())
}

fn clean_description(raw: &str) -> Option<String> {
    Some(raw.trim().to_string()).filter(|d| !d.is_empty())
}

fn to_event(row: EventRow) -> Event {
    Event {
        created_at: parse_timestamp(&row.created_at).unwrap_or_else(|| {
            warn!("Corrupt created_at '{}' on event '{}'", row.created_at, row.code);
            chrono::DateTime::default()
        }),
        code: row.code,
        title: row.title,
        description: row.description,
    }
}

/// POST /events: moderator only.
pub async fn create_event(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreateEventRequest>,
) -> Result<impl IntoResponse, ApiError> {
    validate_code(&req.code)?;
    let title = clean_title(&req.title)?;
    let description = req.description.as_deref().and_then(clean_description);

    let code = req.code.clone();
    let event = with_db(&state, move |db| {
        if !db.create_event(&code, &title, description.as_deref())? {
            return Ok(None);
        }
        db.get_event(&code)
    })
    .await?
    .ok_or_else(|| ApiError::Conflict(format!("event '{}' already exists", req.code)))?;

    info!("{} ({}) created event {}", claims.username, claims.sub, event.code);
    Ok((StatusCode::CREATED, Json(to_event(event))))
}

/// GET /events: moderator only.
pub async fn list_events(State(state): State<AppState>) -> Result<Json<Vec<Event>>, ApiError> {
    let rows = with_db(&state, |db| db.list_events()).await?;
    Ok(Json(rows.into_iter().map(to_event).collect()))
}

/// PATCH /events/{code}: moderator only.
pub async fn update_event(
    State(state): State<AppState>,
    Path(code): Path<String>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<UpdateEventRequest>,
) -> Result<Json<Event>, ApiError> {
    validate_code(&code)?;
    if req.title.is_none() && req.description.is_none() {
        return Err(ApiError::BadRequest("nothing to update".into()));
    }
    let title = req.title.as_deref().map(clean_title).transpose()?;
    let description = req.description.as_deref().map(clean_description);

    let lookup = code.clone();
    let event = with_db(&state, move |db| {
        db.update_event(&lookup, title.as_deref(), description.as_ref().map(|d| d.as_deref()))
    })
    .await?
    .ok_or(ApiError::NotFound)?;

    info!("{} ({}) updated event {}", claims.username, claims.sub, code);
    Ok(Json(to_event(event)))
}

/// GET /events/{code}: event details plus the first pinned and recent pages.
pub async fn get_wall(
    State(state): State<AppState>,
    Path(code): Path<String>,
    Query(query): Query<WallQuery>,
) -> Result<Json<EventWallResponse>, ApiError> {
    validate_code(&code)?;

    let lookup = code.clone();
    let event = with_db(&state, move |db| db.get_event(&lookup))
        .await?
        .ok_or(ApiError::NotFound)?;

    let limit = state.settings.clamp_limit(query.limit);
    let pinned = load_page(&state, code.clone(), Partition::Pinned, None, limit).await?;
    let recent = load_page(&state, code.clone(), Partition::Unpinned, None, limit).await?;

    Ok(Json(EventWallResponse {
        event: to_event(event),
        event_url: format!("{}/events/{}", state.settings.public_url.trim_end_matches('/'), code),
        pinned,
        recent,
    }))
}
