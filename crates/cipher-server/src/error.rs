//! Maps `cipher-core`'s error taxonomy onto the HTTP status taxonomy:
//! 400 validation, 401 auth, 404 not-found, 500 everything else internal.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use cipher_core::handlers::HandlerError;
use cipher_core::orchestrator::OrchestratorError;
use cipher_core::player_cache::CacheError;
use cipher_core::pool::PoolError;

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::UNAUTHORIZED,
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(ErrorBody { error: self.message });
        (self.status, body).into_response()
    }
}

impl From<HandlerError> for ApiError {
    fn from(err: HandlerError) -> Self {
        match err {
            HandlerError::Orchestrator(orchestrator_err) => orchestrator_err.into(),
            HandlerError::NoSigSolver | HandlerError::NParamMissing => ApiError {
                status: StatusCode::BAD_REQUEST,
                message: err.to_string(),
            },
            HandlerError::StsNotFound => ApiError {
                status: StatusCode::NOT_FOUND,
                message: err.to_string(),
            },
            HandlerError::InvalidStreamUrl(_) => ApiError {
                status: StatusCode::BAD_REQUEST,
                message: err.to_string(),
            },
        }
    }
}

impl From<OrchestratorError> for ApiError {
    fn from(err: OrchestratorError) -> Self {
        match &err {
            OrchestratorError::Cache(CacheError::InvalidPlayerUrl(_)) => ApiError {
                status: StatusCode::BAD_REQUEST,
                message: err.to_string(),
            },
            OrchestratorError::Cache(CacheError::PlayerFetchFailed(_) | CacheError::Io(_)) => ApiError {
                status: StatusCode::INTERNAL_SERVER_ERROR,
                message: err.to_string(),
            },
            OrchestratorError::Pool(pool_err) => pool_err.clone().into(),
            OrchestratorError::PlayerFileRead(_) => ApiError {
                status: StatusCode::INTERNAL_SERVER_ERROR,
                message: err.to_string(),
            },
        }
    }
}

impl From<PoolError> for ApiError {
    fn from(err: PoolError) -> Self {
        // Every pool error is an internal failure:
        // DispatchFailed / WorkerCrashed / WorkerTimeout / WorkerProtocolError
        // / WorkerReportedError / QueueAgeExceeded / PoolFatal all surface
        // as 500 to the client — none of them indicate a malformed request.
        ApiError {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: err.to_string(),
        }
    }
}
