//! Tunables for the client flows.

use std::time::Duration;

use serde::Deserialize;

/// How the membership reconciler approaches the insert.
#[derive(
  Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, strum::Display, strum::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum MembershipStrategy {
  /// Look for an existing row first and skip the write when found.
  #[default]
  CheckThenInsert,
  /// Always insert and classify the failure.
  InsertAndClassify,
}

/// How a new couple and its founding membership are written.
#[derive(
  Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, strum::Display, strum::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum BootstrapMode {
  /// One server-side transaction; no orphan window.
  #[default]
  Atomic,
  /// Two client-orchestrated inserts. A failure between them leaves an
  /// orphaned couple.
  Sequential,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct FlowConfig {
  /// Session reads before giving up with "no session found".
  pub session_poll_attempts:    u32,
  pub session_poll_interval_ms: u64,
  /// Pause after a session is first observed, before dependent writes.
  /// Zero disables it.
  pub settle_delay_ms:          u64,
  /// Upper bound on one membership reconciliation.
  pub join_timeout_ms:          u64,
  pub signed_url_ttl_secs:      u64,
  pub membership_strategy:      MembershipStrategy,
  pub bootstrap_mode:           BootstrapMode,
}

impl Default for FlowConfig {
  fn default() -> Self {
    Self {
      session_poll_attempts:    10,
      session_poll_interval_ms: 150,
      settle_delay_ms:          150,
      join_timeout_ms:          8_000,
      signed_url_ttl_secs:      3_600,
      membership_strategy:      MembershipStrategy::default(),
      bootstrap_mode:           BootstrapMode::default(),
    }
  }
}

impl FlowConfig {
  pub fn poll_interval(&self) -> Duration { Duration::from_millis(self.session_poll_interval_ms) }

  pub fn settle_delay(&self) -> Duration { Duration::from_millis(self.settle_delay_ms) }

  pub fn join_timeout(&self) -> Duration { Duration::from_millis(self.join_timeout_ms) }

  pub fn signed_url_ttl(&self) -> Duration { Duration::from_secs(self.signed_url_ttl_secs) }
}
