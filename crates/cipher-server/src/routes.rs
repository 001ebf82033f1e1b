//! Thin JSON/HTTP adapters over `cipher_core::handlers`. Every POST route
//! validates its body into a typed request struct (serde's own rejection
//! already yields 400 on malformed JSON or a missing required field) and a
//! manual host/shape check on `player_url` happens inside `cipher-core`
//! itself via `normalize_player_url`.

use axum::extract::State;
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;

use cipher_core::handlers::{
    self, DecryptSignatureRequest, GetStsRequest, ResolveUrlRequest,
};

use crate::error::ApiError;
use crate::state::AppState;

const INDEX_HTML: &str = include_str!("../static/index.html");
const SWAGGER_YAML: &str = include_str!("../static/swagger.yaml");

pub fn public_router() -> Router<AppState> {
    Router::new()
        .route("/", axum::routing::get(index))
        .route("/swagger.yaml", axum::routing::get(swagger))
}

pub fn protected_router() -> Router<AppState> {
    Router::new()
        .route("/decrypt_signature", axum::routing::post(decrypt_signature))
        .route("/get_sts", axum::routing::post(get_sts))
        .route("/resolve_url", axum::routing::post(resolve_url))
}

async fn index() -> axum::response::Html<&'static str> {
    axum::response::Html(INDEX_HTML)
}

async fn swagger() -> ([(axum::http::HeaderName, &'static str); 1], &'static str) {
    ([(axum::http::header::CONTENT_TYPE, "application/yaml")], SWAGGER_YAML)
}

/// `player_url` is required on every POST body; this is checked up front so
/// a missing field always surfaces as a validation error with a stable
/// message rather than whatever serde's own error text happens to say.
#[derive(Debug, Deserialize)]
struct PlayerUrlOnly {
    #[serde(default)]
    player_url: Option<String>,
}

fn require_player_url(raw: &[u8]) -> Result<(), ApiError> {
    let parsed: PlayerUrlOnly =
        serde_json::from_slice(raw).map_err(|e| ApiError::validation(format!("invalid JSON body: {e}")))?;
    match parsed.player_url {
        Some(url) if !url.is_empty() => Ok(()),
        _ => Err(ApiError::validation("missing required field: player_url")),
    }
}

async fn decrypt_signature(
    State(state): State<AppState>,
    body: axum::body::Bytes,
) -> Result<Response, ApiError> {
    require_player_url(&body)?;
    let request: DecryptSignatureRequest =
        serde_json::from_slice(&body).map_err(|e| ApiError::validation(e.to_string()))?;

    let response = handlers::decrypt_signature(&state.orchestrator, request).await?;
    Ok(Json(response).into_response())
}

async fn get_sts(State(state): State<AppState>, body: axum::body::Bytes) -> Result<Response, ApiError> {
    require_player_url(&body)?;
    let request: GetStsRequest = serde_json::from_slice(&body).map_err(|e| ApiError::validation(e.to_string()))?;

    let response = handlers::get_sts(&state.orchestrator, request).await?;
    let cache_hit = response.cache_hit;
    let mut http_response = Json(response).into_response();
    let header_value = if cache_hit { "true" } else { "false" };
    http_response
        .headers_mut()
        .insert("X-Cache-Hit", HeaderValue::from_static(header_value));
    Ok(http_response)
}

async fn resolve_url(State(state): State<AppState>, body: axum::body::Bytes) -> Result<Response, ApiError> {
    require_player_url(&body)?;
    let parsed: serde_json::Value =
        serde_json::from_slice(&body).map_err(|e| ApiError::validation(e.to_string()))?;
    if !parsed.get("stream_url").and_then(|v| v.as_str()).is_some() {
        return Err(ApiError::validation("missing required field: stream_url"));
    }
    let request: ResolveUrlRequest =
        serde_json::from_slice(&body).map_err(|e| ApiError::validation(e.to_string()))?;

    let response = handlers::resolve_url(&state.orchestrator, request).await?;
    Ok(Json(response).into_response())
}

pub async fn not_found() -> Response {
    (StatusCode::NOT_FOUND, Json(json!({"error": "not found"}))).into_response()
}
