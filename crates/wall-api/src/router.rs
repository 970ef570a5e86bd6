use axum::{
    Json, Router,
    extract::State,
    middleware,
    routing::{get, patch, post},
};

use wall_types::api::HealthResponse;

use crate::middleware::require_auth;
use crate::state::AppState;
use crate::{events, messages, stream};

pub fn router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/health", get(health))
        .route("/events/{code}", get(events::get_wall))
        .route(
            "/events/{code}/messages",
            get(messages::get_messages).post(messages::post_message),
        )
        .route("/events/{code}/messages/older", get(messages::check_older))
        .route("/events/{code}/stream", get(stream::event_stream));

    let moderator_routes = Router::new()
        .route("/events", get(events::list_events).post(events::create_event))
        .route("/events/{code}", patch(events::update_event))
        .route("/messages/{message_id}/pin", post(messages::toggle_pin))
        .layer(middleware::from_fn_with_state(state.clone(), require_auth));

    Router::new()
        .merge(public_routes)
        .merge(moderator_routes)
        .with_state(state)
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".into(),
        channels: state.broker.channel_count(),
        subscribers: state.broker.total_subscribers(),
    })
}
