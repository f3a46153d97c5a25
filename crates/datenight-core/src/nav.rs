//! Navigation targets and callback URL parsing.
//!
//! A couple's timeline lives at `/t/{couple_id}`. The auth callback URL
//! carries an optional `code` (authorization code to exchange) and an
//! optional `next` destination; a `next` that already names a timeline means
//! the visitor is joining an existing couple rather than starting one.

use url::Url;
use uuid::Uuid;

use crate::Result;

/// Path of the auth callback page, relative to the app base URL.
pub const CALLBACK_PATH: &str = "auth/callback";

/// Where to send the browsing context after the callback completes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Destination {
  /// The landing page; reaching the callback with this target starts a new
  /// timeline.
  Landing,
  Timeline(Uuid),
  /// A `/t/…` path whose id does not parse, kept verbatim. Still a timeline
  /// link: the visitor meant to join someone, not to start a couple.
  InvalidTimeline(String),
}

impl Destination {
  /// Parse an app path. Paths under `/t/` are timelines, valid or not;
  /// everything else is the landing page.
  pub fn parse(path: &str) -> Self {
    let Some(rest) = path.strip_prefix("/t/") else {
      return Self::Landing;
    };
    match Uuid::parse_str(rest.trim_end_matches('/')) {
      Ok(id) => Self::Timeline(id),
      Err(_) => Self::InvalidTimeline(path.to_owned()),
    }
  }

  pub fn path(&self) -> String {
    match self {
      Self::Landing => "/".to_owned(),
      Self::Timeline(id) => timeline_path(*id),
      Self::InvalidTimeline(path) => path.clone(),
    }
  }

  pub fn couple_id(&self) -> Option<Uuid> {
    match self {
      Self::Timeline(id) => Some(*id),
      Self::Landing | Self::InvalidTimeline(_) => None,
    }
  }

  /// The visitor is headed to an existing timeline rather than starting one.
  pub fn is_timeline(&self) -> bool { !matches!(self, Self::Landing) }
}

/// The shareable path of a couple's timeline.
pub fn timeline_path(couple_id: Uuid) -> String { format!("/t/{couple_id}") }

/// Query parameters the auth callback acts on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallbackParams {
  pub code: Option<String>,
  pub next: Destination,
}

impl CallbackParams {
  pub fn from_url(raw: &str) -> Result<Self> {
    let url = Url::parse(raw)?;
    let mut code = None;
    let mut next = None;
    for (key, value) in url.query_pairs() {
      match key.as_ref() {
        "code" if !value.is_empty() => code = Some(value.into_owned()),
        "next" => next = Some(Destination::parse(&value)),
        _ => {}
      }
    }
    Ok(Self { code, next: next.unwrap_or(Destination::Landing) })
  }
}

/// The redirect URL handed to the identity provider when requesting a link.
///
/// The callback page sits under `app_base`, including any path it has.
pub fn callback_url(app_base: &str, next: Destination) -> Result<String> {
  let mut base = Url::parse(app_base)?;
  if !base.path().ends_with('/') {
    base.set_path(&format!("{}/", base.path()));
  }
  let mut url = base.join(CALLBACK_PATH)?;
  url.query_pairs_mut().append_pair("next", &next.path());
  Ok(url.into())
}
