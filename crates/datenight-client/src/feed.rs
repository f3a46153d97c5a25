//! Loading a couple's feed and resolving photo links.

use std::{collections::HashMap, sync::Arc, time::Duration};

use datenight_core::{
  entry::Entry,
  store::{PhotoStore, TimelineStore},
};
use futures::{Stream, StreamExt as _, stream::FuturesUnordered};
use uuid::Uuid;

use crate::{FlowConfig, FlowError, Result};

/// Entries newest first, plus whatever photo links resolved.
#[derive(Debug, Clone, Default)]
pub struct Feed {
  pub entries:    Vec<Entry>,
  /// Signed display URL per entry id. Entries whose link failed are absent.
  pub photo_urls: HashMap<Uuid, String>,
}

pub struct FeedLoader<S, P> {
  store:  Arc<S>,
  photos: Arc<P>,
  ttl:    Duration,
}

impl<S: TimelineStore, P: PhotoStore> FeedLoader<S, P> {
  pub fn new(store: Arc<S>, photos: Arc<P>, config: &FlowConfig) -> Self {
    Self { store, photos, ttl: config.signed_url_ttl() }
  }

  pub async fn entries(&self, actor: Uuid, couple_id: Uuid) -> Result<Vec<Entry>> {
    let entries = self
      .store
      .list_entries(actor, couple_id)
      .await
      .map_err(|e| FlowError::FeedLoad(e.to_string()))?;
    tracing::debug!(%couple_id, count = entries.len(), "entries loaded");
    Ok(entries)
  }

  /// Resolve photo links for `entries` concurrently, yielding each as soon
  /// as it is minted. Failures are logged and skipped.
  pub fn photo_urls<'a>(
    &'a self,
    actor: Uuid,
    entries: &'a [Entry],
  ) -> impl Stream<Item = (Uuid, String)> + Send + 'a {
    entries
      .iter()
      .filter_map(|e| e.photo_path.clone().map(|path| (e.entry_id, path)))
      .map(|(entry_id, path)| async move {
        match self.photos.create_signed_url(actor, path.clone(), self.ttl).await {
          Ok(url) => Some((entry_id, url)),
          Err(e) => {
            tracing::warn!(%entry_id, %path, error = %e, "could not sign photo url");
            None
          }
        }
      })
      .collect::<FuturesUnordered<_>>()
      .filter_map(std::future::ready)
  }

  /// Load entries and every photo link before returning.
  pub async fn load(&self, actor: Uuid, couple_id: Uuid) -> Result<Feed> {
    let entries = self.entries(actor, couple_id).await?;
    let photo_urls = self.photo_urls(actor, &entries).collect().await;
    Ok(Feed { entries, photo_urls })
  }
}
