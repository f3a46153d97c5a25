//! Starting a new couple for an identity that has no target couple.
//!
//! Not idempotent: every successful call creates a couple. Each
//! bootstrapper therefore fires at most once.

use std::sync::{
  Arc,
  atomic::{AtomicBool, Ordering},
};

use datenight_core::{couple::Couple, store::TimelineStore};
use uuid::Uuid;

use crate::{BootstrapMode, FlowConfig, FlowError, Result};

pub struct GroupBootstrapper<S> {
  store: Arc<S>,
  mode:  BootstrapMode,
  fired: AtomicBool,
}

impl<S: TimelineStore> GroupBootstrapper<S> {
  pub fn new(store: Arc<S>, config: &FlowConfig) -> Self {
    Self { store, mode: config.bootstrap_mode, fired: AtomicBool::new(false) }
  }

  pub fn has_fired(&self) -> bool { self.fired.load(Ordering::SeqCst) }

  /// Create a couple with `user_id` as its founding member.
  ///
  /// A second call on the same bootstrapper fails with
  /// [`FlowError::AlreadyInvoked`] without touching the store.
  pub async fn bootstrap(&self, user_id: Uuid) -> Result<Couple> {
    if !self.claim() {
      return Err(FlowError::AlreadyInvoked);
    }
    self.create(user_id).await
  }

  /// Take the single shot. Only the caller that gets `true` may call
  /// [`create`](Self::create).
  pub(crate) fn claim(&self) -> bool { !self.fired.swap(true, Ordering::SeqCst) }

  pub(crate) async fn create(&self, user_id: Uuid) -> Result<Couple> {
    let couple = match self.mode {
      BootstrapMode::Atomic => self
        .store
        .create_couple_and_join(user_id)
        .await
        .map_err(|e| FlowError::GroupCreate(e.to_string()))?,
      BootstrapMode::Sequential => self.bootstrap_sequential(user_id).await?,
    };

    tracing::info!(couple_id = %couple.couple_id, %user_id, mode = %self.mode, "timeline created");
    Ok(couple)
  }

  async fn bootstrap_sequential(&self, user_id: Uuid) -> Result<Couple> {
    let couple = self
      .store
      .insert_couple(user_id)
      .await
      .map_err(|e| FlowError::GroupCreate(e.to_string()))?;

    // No compensation: a failure here leaves the couple without members.
    if let Err(e) = self.store.insert_membership(couple.couple_id, user_id).await {
      tracing::warn!(couple_id = %couple.couple_id, %user_id, error = %e, "founding membership failed; couple orphaned");
      return Err(FlowError::GroupCreate(e.to_string()));
    }
    Ok(couple)
  }
}
