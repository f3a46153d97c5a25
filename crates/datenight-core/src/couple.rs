//! Couples and their memberships.
//!
//! A couple is one shared timeline. It may have at most two memberships;
//! the backend enforces that cap authoritatively, the client only
//! anticipates it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Maximum number of members a couple may have.
pub const MAX_MEMBERS: usize = 2;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Couple {
  pub couple_id:  Uuid,
  pub created_at: DateTime<Utc>,
}

/// Links one identity to one couple. Never mutated once written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Membership {
  pub couple_id: Uuid,
  pub user_id:   Uuid,
  pub joined_at: DateTime<Utc>,
}
