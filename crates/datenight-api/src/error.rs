//! API error type and [`axum::response::IntoResponse`] implementation.

use axum::{
  Json,
  http::StatusCode,
  response::{IntoResponse, Response},
};
use datenight_store_sqlite::Error as StoreError;
use serde_json::json;
use thiserror::Error;

/// An error returned by an API handler.
#[derive(Debug, Error)]
pub enum ApiError {
  #[error("not found: {0}")]
  NotFound(String),

  #[error("bad request: {0}")]
  BadRequest(String),

  /// The signature on a photo link does not match.
  #[error("forbidden: {0}")]
  Forbidden(String),

  /// The photo link was valid once but has expired.
  #[error("gone: {0}")]
  Gone(String),

  #[error("store error: {0}")]
  Store(#[source] StoreError),
}

impl From<StoreError> for ApiError {
  fn from(e: StoreError) -> Self {
    match e {
      StoreError::InvalidMagicLink | StoreError::NotFound(_) => ApiError::NotFound(e.to_string()),
      StoreError::InvalidSignature => ApiError::Forbidden(e.to_string()),
      StoreError::SignatureExpired => ApiError::Gone(e.to_string()),
      StoreError::Url(_) => ApiError::BadRequest(e.to_string()),
      other => ApiError::Store(other),
    }
  }
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let (status, message) = match &self {
      ApiError::NotFound(m) => (StatusCode::NOT_FOUND, m.clone()),
      ApiError::BadRequest(m) => (StatusCode::BAD_REQUEST, m.clone()),
      ApiError::Forbidden(m) => (StatusCode::FORBIDDEN, m.clone()),
      ApiError::Gone(m) => (StatusCode::GONE, m.clone()),
      ApiError::Store(e) => {
        tracing::error!(error = %e, "store failure");
        (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
      }
    };
    (status, Json(json!({ "error": message }))).into_response()
  }
}
