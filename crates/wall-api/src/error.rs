use axum::{
    Json,
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use tracing::{error, warn};

use wall_gateway::BrokerError;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error("unauthorized")]
    Unauthorized,
    #[error("not found")]
    NotFound,
    #[error("{0}")]
    Conflict(String),
    #[error("live stream unavailable: {0}")]
    Stream(#[from] BrokerError),
    #[error("store unavailable")]
    StoreUnavailable(anyhow::Error),
    #[error("internal error")]
    Internal,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Stream(_) | Self::StoreUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = Json(serde_json::json!({ "error": self.to_string() }));

        match &self {
            Self::StoreUnavailable(e) => {
                error!("Store error: {:#}", e);
                // Tell the caller this is worth retrying.
                (status, [(header::RETRY_AFTER, "1")], body).into_response()
            }
            Self::Stream(e) => {
                warn!("Rejected stream: {}", e);
                (status, body).into_response()
            }
            _ => (status, body).into_response(),
        }
    }
}
