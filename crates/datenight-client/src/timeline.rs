//! The timeline page controller for `/t/{couple_id}`.
//!
//! Sequences session resolution, membership reconciliation and the feed for
//! one page instance, and keeps the view in step with session changes.
//! After [`Timeline::teardown`] no result is applied to the view.

use std::{collections::HashMap, pin::pin, sync::Arc, time::Duration};

use datenight_core::{
  entry::Entry,
  identity::SessionEvent,
  nav::{Destination, timeline_path},
  store::{IdentityProvider, PhotoStore, TimelineStore},
};
use futures::StreamExt as _;
use tokio::{
  sync::{RwLock, broadcast::error::RecvError},
  task::JoinHandle,
};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::{
  Backend, FlowConfig, FlowError, Result,
  feed::FeedLoader,
  guard::{InFlight, until_cancelled},
  membership::{JoinState, MembershipReconciler},
  session::{MAGIC_LINK_SENT, SessionResolver, request_magic_link},
  writer::{EntryDraft, EntryWriter, WrittenEntry},
};

/// Everything the timeline page renders.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TimelineView {
  /// The first session read has finished.
  pub session_ready:   bool,
  pub authed:          bool,
  pub user_id:         Option<Uuid>,
  pub join_state:      JoinState,
  pub notice:          Option<String>,
  /// Newest first.
  pub entries:         Vec<Entry>,
  pub photo_urls:      HashMap<Uuid, String>,
  pub loading_entries: bool,
}

pub struct Timeline<A, S, P> {
  couple_id:    Uuid,
  app_base_url: String,
  auth:         Arc<A>,
  resolver:     SessionResolver<A>,
  reconciler:   MembershipReconciler<S>,
  feed:         FeedLoader<S, P>,
  writer:       EntryWriter<S, P>,
  in_flight:    InFlight,
  join_timeout: Duration,
  view:         RwLock<TimelineView>,
  cancel:       CancellationToken,
}

impl<A, S, P> Timeline<A, S, P>
where
  A: IdentityProvider,
  S: TimelineStore,
  P: PhotoStore,
{
  pub fn new(
    backend: &Backend<A, S, P>,
    couple_id: Uuid,
    app_base_url: impl Into<String>,
    config: &FlowConfig,
  ) -> Self {
    Self {
      couple_id,
      app_base_url: app_base_url.into(),
      auth: Arc::clone(&backend.auth),
      resolver: SessionResolver::new(Arc::clone(&backend.auth), config),
      reconciler: MembershipReconciler::new(Arc::clone(&backend.store), config),
      feed: FeedLoader::new(Arc::clone(&backend.store), Arc::clone(&backend.photos), config),
      writer: EntryWriter::new(Arc::clone(&backend.store), Arc::clone(&backend.photos), config),
      in_flight: InFlight::default(),
      join_timeout: config.join_timeout(),
      view: RwLock::new(TimelineView::default()),
      cancel: CancellationToken::new(),
    }
  }

  /// Share the in-flight registry with other controllers of the same
  /// browsing context.
  pub fn with_in_flight(mut self, in_flight: InFlight) -> Self {
    self.in_flight = in_flight;
    self
  }

  pub fn couple_id(&self) -> Uuid { self.couple_id }

  /// The link a member sends to their partner.
  pub fn share_path(&self) -> String { timeline_path(self.couple_id) }

  pub async fn view(&self) -> TimelineView { self.view.read().await.clone() }

  pub fn is_torn_down(&self) -> bool { self.cancel.is_cancelled() }

  /// Stop applying results. Flows suspended in a backend call are dropped at
  /// that point.
  pub fn teardown(&self) {
    tracing::debug!(couple_id = %self.couple_id, "timeline torn down");
    self.cancel.cancel();
  }

  async fn apply(&self, update: impl FnOnce(&mut TimelineView)) {
    if self.cancel.is_cancelled() {
      return;
    }
    let mut view = self.view.write().await;
    if !self.cancel.is_cancelled() {
      update(&mut view);
    }
  }

  async fn show(&self, err: &FlowError) {
    if let Some(notice) = err.notice() {
      self.apply(|v| v.notice = Some(notice)).await;
    }
  }

  /// First load of the page: resolve the session, join, load the feed.
  pub async fn open(&self) -> Result<()> { until_cancelled(&self.cancel, self.join_and_load()).await }

  /// The manual Retry control. Starts over from the session read.
  pub async fn retry(&self) -> Result<()> {
    tracing::info!(couple_id = %self.couple_id, "retrying");
    self.open().await
  }

  async fn join_and_load(&self) -> Result<()> {
    let Some(_flight) = self.in_flight.try_begin(self.couple_id) else {
      tracing::debug!(couple_id = %self.couple_id, "reconciliation already running");
      return Err(FlowError::AlreadyInFlight);
    };

    self.apply(|v| v.notice = None).await;

    // Covers the session read as well as the membership writes.
    let joined = match tokio::time::timeout(self.join_timeout, self.resolve_and_join()).await {
      Ok(joined) => joined,
      Err(_) => {
        tracing::warn!(couple_id = %self.couple_id, timeout = ?self.join_timeout, "join timed out");
        self
          .apply(|v| {
            v.session_ready = true;
            v.join_state = JoinState::Error;
          })
          .await;
        Err(FlowError::JoinTimedOut)
      }
    };

    match joined {
      Ok(Some(user_id)) => self.load_feed(user_id).await,
      Ok(None) => Ok(()),
      Err(e) => {
        self.show(&e).await;
        Err(e)
      }
    }
  }

  /// Read the session and reconcile membership. `None` when nobody is
  /// signed in.
  async fn resolve_and_join(&self) -> Result<Option<Uuid>> {
    let resolved = match self.resolver.poll().await {
      Ok(resolved) => resolved,
      Err(FlowError::NoSession) => {
        // Not an error here: the page offers the sign-in form instead.
        self
          .apply(|v| {
            v.session_ready = true;
            v.authed = false;
            v.user_id = None;
            v.join_state = JoinState::Idle;
          })
          .await;
        return Ok(None);
      }
      Err(e) => {
        self.apply(|v| v.session_ready = true).await;
        return Err(e);
      }
    };
    let user_id = resolved.user_id;

    self
      .apply(|v| {
        v.session_ready = true;
        v.authed = true;
        v.user_id = Some(user_id);
        v.join_state = JoinState::Joining;
      })
      .await;

    let joined = self.reconciler.reconcile(self.couple_id, user_id).await;
    let join_state = JoinState::after(&joined);
    self.apply(|v| v.join_state = join_state).await;
    joined.map(|_| Some(user_id))
  }

  async fn load_feed(&self, user_id: Uuid) -> Result<()> {
    self.apply(|v| v.loading_entries = true).await;

    let entries = match self.feed.entries(user_id, self.couple_id).await {
      Ok(entries) => entries,
      Err(e) => {
        self.apply(|v| v.loading_entries = false).await;
        self.show(&e).await;
        return Err(e);
      }
    };

    self
      .apply(|v| {
        v.entries = entries.clone();
        v.photo_urls.clear();
        v.loading_entries = false;
      })
      .await;

    let mut urls = pin!(self.feed.photo_urls(user_id, &entries));
    while let Some((entry_id, url)) = urls.next().await {
      self
        .apply(|v| {
          v.photo_urls.insert(entry_id, url);
        })
        .await;
    }
    Ok(())
  }

  /// Write a new entry and put it at the top of the feed.
  pub async fn add_entry(&self, draft: EntryDraft) -> Result<WrittenEntry> {
    let user_id = self.view.read().await.user_id.ok_or(FlowError::NotSignedIn)?;

    let written = until_cancelled(&self.cancel, self.writer.write(user_id, self.couple_id, draft)).await;
    match &written {
      Ok(w) => {
        let entry = w.entry.clone();
        let url = w.photo_url.clone();
        self
          .apply(|v| {
            if let Some(url) = url {
              v.photo_urls.insert(entry.entry_id, url);
            }
            v.entries.insert(0, entry);
            v.notice = None;
          })
          .await;
      }
      Err(e) => self.show(e).await,
    }
    written
  }

  /// Request a sign-in link that comes back to this timeline.
  pub async fn sign_in(&self, email: &str) -> Result<()> {
    let sent = request_magic_link(
      self.auth.as_ref(),
      &self.app_base_url,
      email,
      Destination::Timeline(self.couple_id),
    )
    .await;
    match &sent {
      Ok(()) => self.apply(|v| v.notice = Some(MAGIC_LINK_SENT.to_owned())).await,
      Err(e) => self.show(e).await,
    }
    sent
  }

  pub async fn sign_out(&self) -> Result<()> {
    self.auth.sign_out().await.map_err(|e| FlowError::SignOut(e.to_string()))
  }

  /// React to a session change notification.
  pub async fn handle_event(&self, event: SessionEvent) -> Result<()> {
    match event {
      SessionEvent::SignedOut => {
        tracing::info!(couple_id = %self.couple_id, "signed out");
        self
          .apply(|v| {
            v.authed = false;
            v.user_id = None;
            v.join_state = JoinState::Idle;
            v.entries.clear();
            v.photo_urls.clear();
            v.loading_entries = false;
          })
          .await;
        Ok(())
      }
      SessionEvent::SignedIn(_) => {
        if self.view.read().await.join_state == JoinState::Joined {
          return Ok(());
        }
        until_cancelled(&self.cancel, self.join_and_load()).await
      }
      SessionEvent::TokenRefreshed(_) => Ok(()),
    }
  }
}

impl<A, S, P> Timeline<A, S, P>
where
  A: IdentityProvider + 'static,
  S: TimelineStore + 'static,
  P: PhotoStore + 'static,
{
  /// Subscribe to session changes and handle them until teardown.
  ///
  /// The subscription is taken before this returns, so no notification sent
  /// after the call is missed.
  pub fn spawn_listener(self: &Arc<Self>) -> JoinHandle<()> {
    let mut events = self.auth.subscribe();
    let this = Arc::clone(self);
    tokio::spawn(async move {
      loop {
        let event = tokio::select! {
          biased;
          _ = this.cancel.cancelled() => break,
          event = events.recv() => event,
        };
        match event {
          Ok(event) => {
            if let Err(e) = this.handle_event(event).await
              && !e.is_silent()
            {
              tracing::debug!(couple_id = %this.couple_id, error = %e, "session change not applied");
            }
          }
          Err(RecvError::Lagged(missed)) => {
            tracing::warn!(missed, "session notifications dropped");
          }
          Err(RecvError::Closed) => break,
        }
      }
    })
  }
}
