//! Single-flight and teardown guards shared by the controllers.

use std::{
  collections::HashSet,
  future::Future,
  sync::{Arc, Mutex, PoisonError},
};

use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::{FlowError, Result};

/// Tracks which couples currently have a reconciliation running.
///
/// Keyed per couple so that unrelated flows never block each other.
#[derive(Debug, Clone, Default)]
pub struct InFlight {
  keys: Arc<Mutex<HashSet<Uuid>>>,
}

impl InFlight {
  /// Claim `key`, or `None` if someone else holds it.
  pub fn try_begin(&self, key: Uuid) -> Option<InFlightGuard> {
    let inserted = self.keys.lock().unwrap_or_else(PoisonError::into_inner).insert(key);
    inserted.then(|| InFlightGuard { keys: Arc::clone(&self.keys), key })
  }

  pub fn is_running(&self, key: Uuid) -> bool {
    self.keys.lock().unwrap_or_else(PoisonError::into_inner).contains(&key)
  }
}

/// Releases its key on drop.
#[derive(Debug)]
pub struct InFlightGuard {
  keys: Arc<Mutex<HashSet<Uuid>>>,
  key:  Uuid,
}

impl Drop for InFlightGuard {
  fn drop(&mut self) {
    self.keys.lock().unwrap_or_else(PoisonError::into_inner).remove(&self.key);
  }
}

/// Run `fut` unless `cancel` fires first. A cancelled future is dropped at
/// its current suspension point; whatever the transport does with an
/// already-sent request is left alone.
pub async fn until_cancelled<T, F>(cancel: &CancellationToken, fut: F) -> Result<T>
where
  F: Future<Output = Result<T>>,
{
  tokio::select! {
    biased;
    _ = cancel.cancelled() => Err(FlowError::Cancelled),
    res = fut => res,
  }
}

#[cfg(test)]
mod tests {
  use std::time::Duration;

  use super::*;

  #[test]
  fn keys_are_exclusive_until_released() {
    let flights = InFlight::default();
    let (a, b) = (Uuid::new_v4(), Uuid::new_v4());

    let guard = flights.try_begin(a).unwrap();
    assert!(flights.try_begin(a).is_none());
    assert!(flights.try_begin(b).is_some(), "other keys are unaffected");
    assert!(flights.is_running(a));

    drop(guard);
    assert!(!flights.is_running(a));
    assert!(flights.try_begin(a).is_some());
  }

  #[tokio::test(start_paused = true)]
  async fn cancellation_wins_over_pending_work() {
    let cancel = CancellationToken::new();
    let child = cancel.clone();
    tokio::spawn(async move {
      tokio::time::sleep(Duration::from_millis(10)).await;
      child.cancel();
    });

    let res: Result<()> = until_cancelled(&cancel, async {
      tokio::time::sleep(Duration::from_secs(60)).await;
      Ok(())
    })
    .await;
    assert_eq!(res, Err(FlowError::Cancelled));
  }
}
