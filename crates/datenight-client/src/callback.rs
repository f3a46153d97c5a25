//! The auth callback page: the magic link lands here.

use std::sync::{
  Arc,
  atomic::{AtomicBool, Ordering},
};

use datenight_core::{
  nav::{CallbackParams, Destination},
  store::{IdentityProvider, PhotoStore, TimelineStore},
};
use tokio_util::sync::CancellationToken;

use crate::{
  Backend, FlowConfig, FlowError, Result, bootstrap::GroupBootstrapper, guard::until_cancelled,
  session::SessionResolver,
};

pub struct AuthCallback<A, S> {
  resolver:     SessionResolver<A>,
  bootstrapper: GroupBootstrapper<S>,
  started:      AtomicBool,
  cancel:       CancellationToken,
}

impl<A: IdentityProvider, S: TimelineStore> AuthCallback<A, S> {
  pub fn new<P: PhotoStore>(backend: &Backend<A, S, P>, config: &FlowConfig) -> Self {
    Self {
      resolver:     SessionResolver::new(Arc::clone(&backend.auth), config),
      bootstrapper: GroupBootstrapper::new(Arc::clone(&backend.store), config),
      started:      AtomicBool::new(false),
      cancel:       CancellationToken::new(),
    }
  }

  pub fn teardown(&self) { self.cancel.cancel(); }

  /// Complete sign-in from the callback `url` and decide where to go.
  ///
  /// A `next` under `/t/` is returned as is, even when its id is mangled;
  /// the timeline page joins or reports the bad link. Otherwise a new couple
  /// is created. Runs once per instance.
  pub async fn run(&self, url: &str) -> Result<Destination> {
    if self.started.swap(true, Ordering::SeqCst) {
      return Err(FlowError::AlreadyInvoked);
    }
    until_cancelled(&self.cancel, self.complete(url)).await
  }

  async fn complete(&self, url: &str) -> Result<Destination> {
    let params = CallbackParams::from_url(url).map_err(|e| FlowError::InvalidCallback(e.to_string()))?;

    let resolved = self.resolver.resolve(params.code.as_deref()).await?;
    tracing::info!(user_id = %resolved.user_id, attempts = resolved.attempts, "signed in");

    if params.next.is_timeline() {
      return Ok(params.next);
    }

    self.resolver.settle().await;
    let couple = self.bootstrapper.bootstrap(resolved.user_id).await?;
    Ok(Destination::Timeline(couple.couple_id))
  }
}
