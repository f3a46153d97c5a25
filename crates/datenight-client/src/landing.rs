//! The landing page controller.
//!
//! A visitor who is already signed in, or who signs in while the page is
//! open, gets a new couple and is sent to its timeline.

use std::sync::Arc;

use datenight_core::{
  identity::SessionEvent,
  nav::Destination,
  store::{IdentityProvider, PhotoStore, TimelineStore},
};
use tokio::{
  sync::{RwLock, broadcast::error::RecvError},
  task::JoinHandle,
};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::{
  Backend, FlowConfig, FlowError, Result,
  bootstrap::GroupBootstrapper,
  guard::until_cancelled,
  session::{MAGIC_LINK_SENT, request_magic_link},
};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LandingView {
  pub notice:      Option<String>,
  /// A couple is being created; the start control is disabled.
  pub busy:        bool,
  /// Set once a couple exists and the page should navigate.
  pub navigate_to: Option<Destination>,
}

pub struct Landing<A, S> {
  auth:         Arc<A>,
  app_base_url: String,
  bootstrapper: GroupBootstrapper<S>,
  view:         RwLock<LandingView>,
  cancel:       CancellationToken,
}

impl<A: IdentityProvider, S: TimelineStore> Landing<A, S> {
  pub fn new<P: PhotoStore>(
    backend: &Backend<A, S, P>,
    app_base_url: impl Into<String>,
    config: &FlowConfig,
  ) -> Self {
    Self {
      auth: Arc::clone(&backend.auth),
      app_base_url: app_base_url.into(),
      bootstrapper: GroupBootstrapper::new(Arc::clone(&backend.store), config),
      view: RwLock::new(LandingView::default()),
      cancel: CancellationToken::new(),
    }
  }

  pub async fn view(&self) -> LandingView { self.view.read().await.clone() }

  pub fn teardown(&self) { self.cancel.cancel(); }

  async fn apply(&self, update: impl FnOnce(&mut LandingView)) {
    if self.cancel.is_cancelled() {
      return;
    }
    let mut view = self.view.write().await;
    if !self.cancel.is_cancelled() {
      update(&mut view);
    }
  }

  /// Check for an existing session once. Signed-in visitors get a couple.
  pub async fn mount(&self) -> Result<Option<Destination>> {
    let session = until_cancelled(&self.cancel, async {
      self.auth.get_session().await.map_err(|e| FlowError::SessionRead(e.to_string()))
    })
    .await?;

    match session.and_then(|s| s.identity()) {
      Some(user_id) => self.start(user_id).await.map(Some),
      None => Ok(None),
    }
  }

  /// Create a couple for `user_id` and point the page at it.
  ///
  /// Only the call that fires the bootstrap touches `busy`; a later call
  /// fails with [`FlowError::AlreadyInvoked`] and leaves the view alone.
  pub async fn start(&self, user_id: Uuid) -> Result<Destination> {
    if !self.bootstrapper.claim() {
      tracing::debug!(%user_id, "timeline already being created");
      return Err(FlowError::AlreadyInvoked);
    }
    self.apply(|v| v.busy = true).await;
    let created = until_cancelled(&self.cancel, self.bootstrapper.create(user_id)).await;

    match created {
      Ok(couple) => {
        let dest = Destination::Timeline(couple.couple_id);
        self
          .apply(|v| {
            v.busy = false;
            v.notice = None;
            v.navigate_to = Some(dest.clone());
          })
          .await;
        Ok(dest)
      }
      Err(e) => {
        let notice = e.notice();
        self
          .apply(|v| {
            v.busy = false;
            if notice.is_some() {
              v.notice = notice;
            }
          })
          .await;
        Err(e)
      }
    }
  }

  pub async fn sign_in(&self, email: &str) -> Result<()> {
    let sent = request_magic_link(self.auth.as_ref(), &self.app_base_url, email, Destination::Landing).await;
    let notice = match &sent {
      Ok(()) => Some(MAGIC_LINK_SENT.to_owned()),
      Err(e) => e.notice(),
    };
    self.apply(|v| v.notice = notice).await;
    sent
  }

  pub async fn handle_event(&self, event: SessionEvent) -> Result<()> {
    let SessionEvent::SignedIn(session) = event else {
      return Ok(());
    };
    match session.identity() {
      Some(user_id) => self.start(user_id).await.map(|_| ()),
      None => Ok(()),
    }
  }
}

impl<A, S> Landing<A, S>
where
  A: IdentityProvider + 'static,
  S: TimelineStore + 'static,
{
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
              tracing::debug!(error = %e, "session change not applied");
            }
          }
          Err(RecvError::Lagged(missed)) => tracing::warn!(missed, "session notifications dropped"),
          Err(RecvError::Closed) => break,
        }
      }
    })
  }
}
