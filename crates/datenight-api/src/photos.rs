//! `GET /photos/{*path}?expires=…&sig=…`

use std::sync::Arc;

use axum::{
  extract::{Path, Query, State},
  http::header,
  response::{IntoResponse, Response},
};
use datenight_store_sqlite::SqliteStore;
use serde::Deserialize;

use crate::error::ApiError;

#[derive(Debug, Deserialize)]
pub struct SignedParams {
  pub expires: i64,
  pub sig:     String,
}

pub async fn handler(
  State(store): State<Arc<SqliteStore>>,
  Path(path): Path<String>,
  Query(params): Query<SignedParams>,
) -> Result<Response, ApiError> {
  let photo = store.read_signed_photo(&path, params.expires, &params.sig).await?;
  tracing::debug!(%path, bytes = photo.bytes.len(), "photo served");
  Ok(
    (
      [
        (header::CONTENT_TYPE, photo.content_type),
        (header::CACHE_CONTROL, "private, max-age=3600".to_owned()),
      ],
      photo.bytes,
    )
      .into_response(),
  )
}
