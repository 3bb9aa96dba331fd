// Error types for the OAO stats backend

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

/// Failure while retrieving one page of a remote collection.
#[derive(thiserror::Error, Debug)]
pub enum FetchError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("page request timed out")]
    Timeout,

    #[error("unexpected status {0}")]
    Status(u16),

    #[error("query error: {0}")]
    Query(String),

    #[error("malformed response: {0}")]
    Malformed(String),
}

impl FetchError {
    pub fn from_reqwest(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            FetchError::Timeout
        } else if let Some(status) = err.status() {
            FetchError::Status(status.as_u16())
        } else if err.is_decode() {
            FetchError::Malformed(err.to_string())
        } else {
            FetchError::Http(err)
        }
    }
}

/// Failure while fetching the spot price.
#[derive(thiserror::Error, Debug)]
pub enum PriceError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("asset {0} not found in price response")]
    MissingAsset(String),

    #[error("invalid price: {0}")]
    InvalidPrice(String),
}

/// Invalid configuration value.
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("invalid value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

/// Errors surfaced by the HTTP API.
#[derive(thiserror::Error, Debug)]
pub enum ApiError {
    #[error("stats are not available yet")]
    NotReady,

    #[error("invalid query: {0}")]
    BadRequest(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self {
            ApiError::NotReady => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
        };
        let body = Json(json!({
            "error": self.to_string(),
        }));
        (status, body).into_response()
    }
}
