//! Membership reconciliation: make sure an identity belongs to a couple
//! without ever creating a third membership.
//!
//! The store's trigger is the only authority on the two-member cap. The
//! existence check of [`MembershipStrategy::CheckThenInsert`] saves a write
//! when the row is already there; it proves nothing about the cap, since two
//! browsers can pass it at the same time.

use std::{sync::Arc, time::Duration};

use datenight_core::{
  classify::{InsertRejection, classify_membership_error},
  store::TimelineStore,
};
use serde::Serialize;
use uuid::Uuid;

use crate::{FlowConfig, FlowError, MembershipStrategy, Result};

/// Where a page is in joining its couple.
#[derive(
  Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, strum::Display, strum::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum JoinState {
  #[default]
  Idle,
  Joining,
  Joined,
  /// The couple already has two members. Terminal.
  Full,
  /// Anything else went wrong; a manual retry re-runs the reconciliation.
  Error,
}

impl JoinState {
  /// The state a finished reconciliation leaves behind.
  pub fn after(result: &Result<Joined>) -> Self {
    match result {
      Ok(_) => Self::Joined,
      Err(FlowError::MembershipFull) => Self::Full,
      Err(_) => Self::Error,
    }
  }
}

/// How a successful reconciliation got there.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Joined {
  /// The membership existed already (found, or the insert hit a duplicate).
  AlreadyMember,
  /// This call inserted the membership.
  Inserted,
}

pub struct MembershipReconciler<S> {
  store:    Arc<S>,
  strategy: MembershipStrategy,
  timeout:  Duration,
}

impl<S: TimelineStore> MembershipReconciler<S> {
  pub fn new(store: Arc<S>, config: &FlowConfig) -> Self {
    Self {
      store,
      strategy: config.membership_strategy,
      timeout: config.join_timeout(),
    }
  }

  /// Ensure `user_id` is a member of `couple_id`, within the join timeout.
  ///
  /// On timeout the pending store call is dropped; if it lands later its
  /// outcome is simply never observed.
  pub async fn reconcile(&self, couple_id: Uuid, user_id: Uuid) -> Result<Joined> {
    match tokio::time::timeout(self.timeout, self.reconcile_unbounded(couple_id, user_id)).await {
      Ok(result) => result,
      Err(_) => {
        tracing::warn!(%couple_id, %user_id, timeout = ?self.timeout, "membership reconciliation timed out");
        Err(FlowError::JoinTimedOut)
      }
    }
  }

  async fn reconcile_unbounded(&self, couple_id: Uuid, user_id: Uuid) -> Result<Joined> {
    if self.strategy == MembershipStrategy::CheckThenInsert {
      let existing = self
        .store
        .find_membership(couple_id, user_id)
        .await
        .map_err(|e| FlowError::Membership(e.to_string()))?;
      if existing.is_some() {
        tracing::debug!(%couple_id, %user_id, "already a member");
        return Ok(Joined::AlreadyMember);
      }
    }

    let err = match self.store.insert_membership(couple_id, user_id).await {
      Ok(_) => {
        tracing::info!(%couple_id, %user_id, "joined couple");
        return Ok(Joined::Inserted);
      }
      Err(e) => e,
    };

    match classify_membership_error(&err) {
      InsertRejection::Duplicate => {
        tracing::debug!(%couple_id, %user_id, "membership insert was a duplicate");
        Ok(Joined::AlreadyMember)
      }
      InsertRejection::Full => {
        tracing::info!(%couple_id, %user_id, "couple is full");
        Err(FlowError::MembershipFull)
      }
      InsertRejection::Other(message) => {
        tracing::warn!(%couple_id, %user_id, %message, "membership insert failed");
        Err(FlowError::Membership(message))
      }
    }
  }
}
