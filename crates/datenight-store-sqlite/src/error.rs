//! Error type for `datenight-store-sqlite`.

use datenight_core::store::{
  BackendError, INSUFFICIENT_PRIVILEGE, RAISE_EXCEPTION, UNIQUE_VIOLATION,
};
use rusqlite::ffi;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("{}", database_message(.0))]
  Database(#[from] tokio_rusqlite::Error),

  #[error("uuid parse error: {0}")]
  Uuid(#[from] uuid::Error),

  #[error("date/time parse error: {0}")]
  DateParse(String),

  #[error("url error: {0}")]
  Url(#[from] url::ParseError),

  /// Row-level authorization refused the write.
  #[error("new row violates row-level security policy for table \"{0}\"")]
  RowLevelSecurity(&'static str),

  #[error("{0} not found")]
  NotFound(String),

  #[error("email address is required")]
  MissingEmail,

  #[error("sign-in link is invalid or has expired")]
  InvalidMagicLink,

  #[error("invalid authorization code: {0}")]
  InvalidAuthCode(&'static str),

  /// The exchanging context holds no verifier matching the code's challenge.
  #[error(
    "code verifier mismatch: open the link in the same browser you used to request it"
  )]
  VerifierMismatch,

  #[error("the resource already exists")]
  ResourceExists,

  #[error("invalid signature")]
  InvalidSignature,

  #[error("signed url has expired")]
  SignatureExpired,
}

impl BackendError for Error {
  fn code(&self) -> Option<&str> {
    match self {
      Error::Database(tokio_rusqlite::Error::Rusqlite(rusqlite::Error::SqliteFailure(e, _))) => {
        match e.extended_code {
          ffi::SQLITE_CONSTRAINT_UNIQUE | ffi::SQLITE_CONSTRAINT_PRIMARYKEY => {
            Some(UNIQUE_VIOLATION)
          }
          ffi::SQLITE_CONSTRAINT_TRIGGER => Some(RAISE_EXCEPTION),
          _ => None,
        }
      }
      Error::RowLevelSecurity(_) => Some(INSUFFICIENT_PRIVILEGE),
      Error::ResourceExists => Some(UNIQUE_VIOLATION),
      _ => None,
    }
  }
}

/// Surface SQLite's own message (e.g. a trigger's `RAISE` text) unwrapped.
fn database_message(e: &tokio_rusqlite::Error) -> String {
  match e {
    tokio_rusqlite::Error::Rusqlite(inner) => inner.to_string(),
    other => other.to_string(),
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
