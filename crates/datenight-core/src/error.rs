//! Error types for `datenight-core`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("invalid callback url: {0}")]
  InvalidUrl(#[from] url::ParseError),

  #[error("entry title must not be empty")]
  EmptyTitle,

  #[error("invalid date {0:?}, expected YYYY-MM-DD")]
  InvalidDate(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
