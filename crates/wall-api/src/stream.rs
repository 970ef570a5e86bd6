use std::convert::Infallible;

use axum::{
    body::Body,
    extract::{Path, State},
    http::{HeaderName, header},
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use tokio::sync::mpsc;

use wall_gateway::StreamSession;

use crate::error::ApiError;
use crate::events::validate_code;
use crate::state::AppState;

/// Frames in flight between the session task and the HTTP body. The
/// subscriber queue does the real buffering, so a slow client sheds its
/// oldest frames there instead of stalling here.
const STREAM_BUFFER: usize = 1;

/// GET /events/{code}/stream: live text event stream of new messages.
///
/// The session runs in its own task and writes into a channel the response
/// body drains. When the client goes away the body (and the receiver) is
/// dropped, which ends the session and unsubscribes it.
pub async fn event_stream(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> Result<Response, ApiError> {
    validate_code(&code)?;

    let session = StreamSession::open(&state.broker, &code, state.settings.heartbeat)?;
    let (tx, mut rx) = mpsc::channel::<Bytes>(STREAM_BUFFER);
    tokio::spawn(session.run(tx));

    let body = Body::from_stream(async_stream::stream! {
        while let Some(frame) = rx.recv().await {
            yield Ok::<_, Infallible>(frame);
        }
    });

    Ok((
        [
            (header::CONTENT_TYPE, "text/event-stream"),
            (header::CACHE_CONTROL, "no-cache, no-transform"),
            (header::CONNECTION, "keep-alive"),
            (HeaderName::from_static("x-accel-buffering"), "no"),
        ],
        body,
    )
        .into_response())
}
