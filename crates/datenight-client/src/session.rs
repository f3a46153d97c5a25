//! Session resolution.
//!
//! After a code exchange the identity provider has written the session, but
//! its own read path may not return it yet. The resolver bridges that gap by
//! re-reading a bounded number of times with a fixed delay. This is not an
//! error retry: a failed read aborts immediately.

use std::{sync::Arc, time::Duration};

use datenight_core::{
  identity::Session,
  nav::{Destination, callback_url},
  store::IdentityProvider,
};
use uuid::Uuid;

use crate::{FlowConfig, FlowError, Result};

/// Notice shown once a sign-in link has been requested.
pub const MAGIC_LINK_SENT: &str = "Check your email for the sign-in link.";

/// Ask the provider to email a sign-in link that returns to `next` through
/// the auth callback page.
pub async fn request_magic_link<A: IdentityProvider>(
  auth: &A,
  app_base_url: &str,
  email: &str,
  next: Destination,
) -> Result<()> {
  let email = email.trim();
  if email.is_empty() {
    return Err(FlowError::MagicLink("Enter your email address.".into()));
  }
  let redirect = callback_url(app_base_url, next).map_err(|e| FlowError::MagicLink(e.to_string()))?;
  auth
    .send_magic_link(email, &redirect)
    .await
    .map_err(|e| FlowError::MagicLink(e.to_string()))?;
  tracing::info!(%redirect, "sign-in link requested");
  Ok(())
}

/// A session observed with a non-empty identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedSession {
  pub session:  Session,
  pub user_id:  Uuid,
  /// Number of reads it took to observe the session.
  pub attempts: u32,
}

pub struct SessionResolver<A> {
  auth:          Arc<A>,
  attempts:      u32,
  interval:      Duration,
  settle_delay:  Duration,
}

impl<A: IdentityProvider> SessionResolver<A> {
  pub fn new(auth: Arc<A>, config: &FlowConfig) -> Self {
    Self {
      auth,
      attempts: config.session_poll_attempts.max(1),
      interval: config.poll_interval(),
      settle_delay: config.settle_delay(),
    }
  }

  /// Exchange `code` if present, then wait for the session to be readable.
  pub async fn resolve(&self, code: Option<&str>) -> Result<ResolvedSession> {
    if let Some(code) = code {
      self
        .auth
        .exchange_code_for_session(code)
        .await
        .map_err(|e| FlowError::AuthExchange(e.to_string()))?;
      tracing::debug!("authorization code exchanged");
    }
    self.poll().await
  }

  /// Read the session until it carries an identity or the budget runs out.
  ///
  /// A session first visible on read `k` returns after `k` reads and
  /// `(k - 1)` delays. An invisible session costs every read and every
  /// delay, then yields [`FlowError::NoSession`].
  pub async fn poll(&self) -> Result<ResolvedSession> {
    for attempt in 1..=self.attempts {
      let session = self
        .auth
        .get_session()
        .await
        .map_err(|e| FlowError::SessionRead(e.to_string()))?;

      if let Some(session) = session
        && let Some(user_id) = session.identity()
      {
        tracing::debug!(attempt, %user_id, "session visible");
        return Ok(ResolvedSession { session, user_id, attempts: attempt });
      }

      tracing::debug!(attempt, "session not yet visible");
      tokio::time::sleep(self.interval).await;
    }

    tracing::info!(attempts = self.attempts, "no session became visible");
    Err(FlowError::NoSession)
  }

  /// Pause between confirming a session and the first write that depends on
  /// it. A tunable margin on top of [`poll`](Self::poll), not a guarantee.
  pub async fn settle(&self) {
    if !self.settle_delay.is_zero() {
      tokio::time::sleep(self.settle_delay).await;
    }
  }
}
