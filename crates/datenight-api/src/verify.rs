//! `GET /auth/verify?token=…`
//!
//! The magic link points here. The token is consumed and the browser is
//! sent on to the app's callback page with a one-time `code`.

use std::sync::Arc;

use axum::{
  extract::{Query, State},
  response::Redirect,
};
use datenight_store_sqlite::SqliteStore;
use serde::Deserialize;

use crate::error::ApiError;

#[derive(Debug, Deserialize)]
pub struct VerifyParams {
  pub token: String,
}

pub async fn handler(
  State(store): State<Arc<SqliteStore>>,
  Query(params): Query<VerifyParams>,
) -> Result<Redirect, ApiError> {
  if params.token.is_empty() {
    return Err(ApiError::BadRequest("token is required".into()));
  }
  let callback = store.verify_magic_link(&params.token).await?;
  Ok(Redirect::to(&callback))
}
