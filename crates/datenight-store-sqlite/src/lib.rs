//! SQLite backend for the date-night timeline.
//!
//! Implements all three collaborators from `datenight-core` against one
//! database file: the relational store ([`SqliteStore`]), a per-context
//! identity provider ([`LocalAuth`]) and the photo store. Wraps
//! [`tokio_rusqlite`] so all database access runs on a dedicated thread
//! without blocking the async runtime.

mod auth;
mod encode;
mod photos;
mod schema;
mod store;

pub mod error;
pub mod signing;

pub use auth::{LocalAuth, MAGIC_LINK_TTL, SESSION_TTL};
pub use error::{Error, Result};
pub use photos::StoredPhoto;
pub use schema::COUPLE_FULL_MESSAGE;
pub use signing::UrlSigner;
pub use store::SqliteStore;
