//! Browser-facing HTTP endpoints of the local backend.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/auth/verify?token=` | 303 to the app callback with `?code=` |
//! | `GET`  | `/photos/{*path}?expires=&sig=` | 403 on a bad signature, 410 once expired |
//!
//! # Mounting
//!
//! ```rust,ignore
//! axum::serve(listener, datenight_api::router(store.clone())).await?;
//! ```

pub mod error;
pub mod photos;
pub mod verify;

use std::sync::Arc;

use axum::{Router, routing::get};
use datenight_store_sqlite::SqliteStore;
use tower_http::trace::TraceLayer;

pub use error::ApiError;

/// Build the router for `store`.
pub fn router(store: Arc<SqliteStore>) -> Router<()> {
  Router::new()
    .route("/auth/verify", get(verify::handler))
    .route("/photos/{*path}", get(photos::handler))
    .layer(TraceLayer::new_for_http())
    .with_state(store)
}
