//! Collaborator traits: identity provider, relational store, photo store.
//!
//! The flows in `datenight-client` depend on these abstractions only. The
//! local backend in `datenight-store-sqlite` implements all three; tests
//! substitute scripted fakes.

use std::{future::Future, time::Duration};

use tokio::sync::broadcast;
use uuid::Uuid;

use crate::{
  couple::{Couple, Membership},
  entry::{Entry, NewEntry},
  identity::{Session, SessionEvent},
};

// ─── Errors ──────────────────────────────────────────────────────────────────

/// Structured code for a unique-constraint violation (PostgreSQL SQLSTATE).
pub const UNIQUE_VIOLATION: &str = "23505";

/// Structured code for a row-level authorization rejection.
pub const INSUFFICIENT_PRIVILEGE: &str = "42501";

/// Structured code for an error raised from a trigger or procedure.
pub const RAISE_EXCEPTION: &str = "P0001";

/// An error returned by a backend collaborator.
///
/// Backends surface constraint failures as text. Where they also expose a
/// structured code, [`code`](BackendError::code) returns it so classification
/// does not have to rely on message wording alone.
pub trait BackendError: std::error::Error + Send + Sync + 'static {
  fn code(&self) -> Option<&str> { None }
}

impl BackendError for std::convert::Infallible {}

// ─── Identity provider ───────────────────────────────────────────────────────

/// The identity provider, as seen from one browsing context.
///
/// Session reads are not guaranteed to observe a session immediately after
/// it has been established by [`exchange_code_for_session`].
///
/// [`exchange_code_for_session`]: IdentityProvider::exchange_code_for_session
pub trait IdentityProvider: Send + Sync {
  type Error: BackendError;

  /// Email a sign-in link that lands on `redirect_to` once verified.
  fn send_magic_link<'a>(
    &'a self,
    email: &'a str,
    redirect_to: &'a str,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;

  /// Exchange a one-time authorization code for a session.
  fn exchange_code_for_session<'a>(
    &'a self,
    code: &'a str,
  ) -> impl Future<Output = Result<Session, Self::Error>> + Send + 'a;

  /// Read the session currently held by this browsing context.
  fn get_session(&self) -> impl Future<Output = Result<Option<Session>, Self::Error>> + Send + '_;

  fn sign_out(&self) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// Subscribe to session changes. Dropping the receiver unsubscribes.
  fn subscribe(&self) -> broadcast::Receiver<SessionEvent>;
}

// ─── Relational store ────────────────────────────────────────────────────────

/// The relational store. Every call is made on behalf of an acting identity
/// and is subject to the store's row-level authorization.
pub trait TimelineStore: Send + Sync {
  type Error: BackendError;

  /// Look up the membership of `user_id` in `couple_id`.
  fn find_membership(
    &self,
    couple_id: Uuid,
    user_id: Uuid,
  ) -> impl Future<Output = Result<Option<Membership>, Self::Error>> + Send + '_;

  /// Insert a membership for `user_id`, who is also the actor.
  ///
  /// Fails with a duplicate error when the row already exists, and with a
  /// "two members" error when the couple is full.
  fn insert_membership(
    &self,
    couple_id: Uuid,
    user_id: Uuid,
  ) -> impl Future<Output = Result<Membership, Self::Error>> + Send + '_;

  /// Insert a bare couple row.
  fn insert_couple(&self, actor: Uuid) -> impl Future<Output = Result<Couple, Self::Error>> + Send + '_;

  /// Create a couple and its founding membership in one transaction.
  fn create_couple_and_join(
    &self,
    actor: Uuid,
  ) -> impl Future<Output = Result<Couple, Self::Error>> + Send + '_;

  /// Entries of `couple_id` visible to `actor`, newest first.
  fn list_entries(
    &self,
    actor: Uuid,
    couple_id: Uuid,
  ) -> impl Future<Output = Result<Vec<Entry>, Self::Error>> + Send + '_;

  fn insert_entry(
    &self,
    actor: Uuid,
    input: NewEntry,
  ) -> impl Future<Output = Result<Entry, Self::Error>> + Send + '_;

  /// Back-fill the photo path of an existing entry.
  fn set_entry_photo(
    &self,
    actor: Uuid,
    entry_id: Uuid,
    photo_path: String,
  ) -> impl Future<Output = Result<Entry, Self::Error>> + Send + '_;
}

// ─── Photo store ─────────────────────────────────────────────────────────────

/// Options for [`PhotoStore::upload`].
#[derive(Debug, Clone, Copy, Default)]
pub struct UploadOptions {
  /// Replace an existing object at the same path instead of failing.
  pub upsert: bool,
}

/// A photo blob handed to the photo store.
#[derive(Debug, Clone)]
pub struct PhotoUpload {
  /// Original file name; only its extension is kept.
  pub file_name:    String,
  pub content_type: String,
  pub bytes:        Vec<u8>,
}

/// Object storage for photos, scoped by couple id.
pub trait PhotoStore: Send + Sync {
  type Error: BackendError;

  fn upload(
    &self,
    actor: Uuid,
    path: String,
    photo: PhotoUpload,
    options: UploadOptions,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// Mint a read URL for `path` that stops working after `ttl`.
  fn create_signed_url(
    &self,
    actor: Uuid,
    path: String,
    ttl: Duration,
  ) -> impl Future<Output = Result<String, Self::Error>> + Send + '_;
}
