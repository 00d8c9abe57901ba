//! HTTP request handlers

use super::types::{ErrorResponse, SuccessResponse};
use super::{AppState, SECRET_HEADER};
use crate::telegram::Update;
use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Telegram pushes updates here
        .route("/telegram/webhook", post(receive_update))
        // Version
        .route("/version", get(get_version))
        .with_state(state)
}

/// Accept one update. Anything Telegram sends that we cannot read is still
/// acknowledged, or it would be redelivered forever.
async fn receive_update(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<SuccessResponse>, AppError> {
    if let Some(expected) = state.secret.as_deref() {
        let provided = headers
            .get(SECRET_HEADER)
            .and_then(|value| value.to_str().ok());
        if provided != Some(expected) {
            tracing::warn!("Webhook request with a bad secret token");
            return Err(AppError::Unauthorized);
        }
    }

    let update: Update = match serde_json::from_slice(&body) {
        Ok(update) => update,
        Err(e) => {
            tracing::warn!(error = %e, "Ignoring unreadable update");
            return Ok(Json(SuccessResponse { success: false }));
        }
    };

    state
        .updates
        .send(update)
        .await
        .map_err(|_| AppError::Unavailable("Bot runtime is shutting down".to_string()))?;

    Ok(Json(SuccessResponse { success: true }))
}

async fn get_version() -> &'static str {
    concat!("santa-bot ", env!("CARGO_PKG_VERSION"))
}

// ============================================================
// Error Handling
// ============================================================

#[derive(Debug)]
enum AppError {
    Unauthorized,
    Unavailable(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::Unauthorized => (StatusCode::UNAUTHORIZED, "Bad secret token".to_string()),
            AppError::Unavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg),
        };

        let body = Json(ErrorResponse::new(message));
        (status, body).into_response()
    }
}
