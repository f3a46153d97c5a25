//! Classification of failed membership inserts.
//!
//! The two-member cap is enforced by a trigger inside the store, so the only
//! signal the client gets is an error. A structured code is used when the
//! backend provides one; otherwise the message text decides.

use crate::store::{BackendError, UNIQUE_VIOLATION};

/// Why a membership insert was rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InsertRejection {
  /// The membership already exists. Joining twice is a no-op.
  Duplicate,
  /// The couple already has two members.
  Full,
  /// Anything else; carries the backend's message verbatim.
  Other(String),
}

const FULL_MARKERS: &[&str] = &["already has two members", "two members"];

const DUPLICATE_MARKERS: &[&str] = &[
  "duplicate key",
  "unique constraint",
  "already a member",
];

pub fn classify_membership_error<E>(err: &E) -> InsertRejection
where
  E: BackendError + ?Sized,
{
  if err.code() == Some(UNIQUE_VIOLATION) {
    return InsertRejection::Duplicate;
  }
  classify_message(&err.to_string())
}

/// Text-only fallback, for backends that expose no error code.
pub fn classify_message(message: &str) -> InsertRejection {
  let lower = message.to_lowercase();
  if FULL_MARKERS.iter().any(|m| lower.contains(m)) {
    InsertRejection::Full
  } else if DUPLICATE_MARKERS.iter().any(|m| lower.contains(m)) {
    InsertRejection::Duplicate
  } else {
    InsertRejection::Other(message.to_owned())
  }
}
