//! Identity and session types.
//!
//! Identities are owned by the identity provider; this system only ever sees
//! their stable UUID. A session is the ephemeral proof that one browsing
//! context currently acts as a given identity.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A session as read back from the identity provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
  pub user_id:      Uuid,
  pub email:        String,
  pub access_token: String,
  pub created_at:   DateTime<Utc>,
  pub expires_at:   DateTime<Utc>,
}

impl Session {
  /// The confirmed identity carried by this session, if it has one.
  ///
  /// A session whose user id is still nil has been written but not yet
  /// populated, and does not count as a confirmed sign-in.
  pub fn identity(&self) -> Option<Uuid> {
    (!self.user_id.is_nil()).then_some(self.user_id)
  }

  pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool { now >= self.expires_at }
}

/// A change in the session held by a browsing context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SessionEvent {
  SignedIn(Session),
  TokenRefreshed(Session),
  SignedOut,
}

impl SessionEvent {
  /// The session after this event, `None` once signed out.
  pub fn session(&self) -> Option<&Session> {
    match self {
      Self::SignedIn(s) | Self::TokenRefreshed(s) => Some(s),
      Self::SignedOut => None,
    }
  }
}
