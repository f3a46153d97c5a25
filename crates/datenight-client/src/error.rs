//! Flow errors.
//!
//! Every backend failure is caught at the flow boundary and converted into
//! one of these. `Display` is the short notice shown to the user.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FlowError {
  #[error("invalid callback url: {0}")]
  InvalidCallback(String),

  /// The authorization code could not be exchanged for a session.
  #[error("{0}")]
  AuthExchange(String),

  /// No session became visible within the poll budget.
  #[error(
    "Signed in, but no session found. Open the link in the same browser you used to request it."
  )]
  NoSession,

  #[error("{0}")]
  SessionRead(String),

  #[error("{0}")]
  MagicLink(String),

  #[error("{0}")]
  SignOut(String),

  #[error("Not signed in.")]
  NotSignedIn,

  #[error("This timeline already has two members.")]
  MembershipFull,

  #[error("{0}")]
  Membership(String),

  #[error("Joining timed out. Tap Retry.")]
  JoinTimedOut,

  #[error("Failed to create timeline: {0}")]
  GroupCreate(String),

  #[error("{0}")]
  InvalidEntry(String),

  #[error("{0}")]
  EntryPersist(String),

  #[error("{0}")]
  Upload(String),

  #[error("{0}")]
  FeedLoad(String),

  /// A reconciliation for the same couple is already running.
  #[error("already in progress")]
  AlreadyInFlight,

  /// A single-shot flow was invoked a second time.
  #[error("already started")]
  AlreadyInvoked,

  /// The owning controller was torn down.
  #[error("cancelled")]
  Cancelled,
}

impl FlowError {
  /// The notice shown in place of the view, if any.
  pub fn notice(&self) -> Option<String> { (!self.is_silent()).then(|| self.to_string()) }

  /// Terminal states need the user to act; retrying cannot fix them.
  pub fn is_terminal(&self) -> bool { matches!(self, Self::NoSession | Self::MembershipFull) }

  /// Errors that leave nothing to show, because the flow was superseded.
  pub fn is_silent(&self) -> bool {
    matches!(self, Self::Cancelled | Self::AlreadyInFlight | Self::AlreadyInvoked)
  }
}

pub type Result<T, E = FlowError> = std::result::Result<T, E>;
