//! `Authorization: <token>` check, applied to every route except the four
//! always-public ones (the three GETs plus `/metrics`). Disabled entirely
//! when `API_TOKEN` is unset or empty.

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::Response;

use crate::error::ApiError;
use crate::state::AppState;

pub async fn require_token(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let Some(expected) = state.api_token.as_deref() else {
        return Ok(next.run(request).await);
    };

    match request.headers().get(axum::http::header::AUTHORIZATION) {
        None => Err(ApiError::unauthorized("Missing API token")),
        Some(value) => {
            let Ok(provided) = value.to_str() else {
                return Err(ApiError::unauthorized("Invalid API token"));
            };
            if provided == expected {
                Ok(next.run(request).await)
            } else {
                Err(ApiError::unauthorized("Invalid API token"))
            }
        }
    }
}
