//! Client-side flows for the date-night timeline.
//!
//! Each flow drives the backend collaborators from `datenight-core`:
//!
//! - [`session::SessionResolver`] turns a callback into a confirmed identity,
//!   polling across the provider's write/read propagation gap.
//! - [`membership::MembershipReconciler`] idempotently joins a couple.
//! - [`bootstrap::GroupBootstrapper`] starts a new couple.
//! - [`feed::FeedLoader`] and [`writer::EntryWriter`] read and write entries.
//!
//! The controllers ([`callback::AuthCallback`], [`landing::Landing`],
//! [`timeline::Timeline`]) sequence those flows for one page instance and
//! stop applying results once torn down.

pub mod bootstrap;
pub mod callback;
pub mod config;
pub mod error;
pub mod feed;
pub mod guard;
pub mod landing;
pub mod membership;
pub mod session;
pub mod timeline;
pub mod writer;

#[cfg(test)]
mod fakes;

use std::sync::Arc;

pub use config::{BootstrapMode, FlowConfig, MembershipStrategy};
pub use error::{FlowError, Result};

/// The three backend collaborators, shared between controllers.
pub struct Backend<A, S, P> {
  pub auth:   Arc<A>,
  pub store:  Arc<S>,
  pub photos: Arc<P>,
}

impl<A, S, P> Backend<A, S, P> {
  pub fn new(auth: Arc<A>, store: Arc<S>, photos: Arc<P>) -> Self { Self { auth, store, photos } }
}

impl<A, S, P> Clone for Backend<A, S, P> {
  fn clone(&self) -> Self {
    Self {
      auth:   Arc::clone(&self.auth),
      store:  Arc::clone(&self.store),
      photos: Arc::clone(&self.photos),
    }
  }
}
