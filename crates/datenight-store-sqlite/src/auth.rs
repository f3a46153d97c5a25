//! [`LocalAuth`], a magic-link identity provider for one browsing context.
//!
//! The flow mirrors a PKCE sign-in:
//!
//! 1. `send_magic_link` stores a code verifier in the requesting context's
//!    storage, records the S256 challenge with a one-time token, and
//!    "delivers" the link by logging it.
//! 2. [`SqliteStore::verify_magic_link`] (served by `datenight-api`) consumes
//!    the token and mints an authorization code, redirecting to the callback.
//! 3. `exchange_code_for_session` only succeeds from the context that holds
//!    the matching verifier, then writes that context's session.

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::{Duration, Utc};
use datenight_core::{
  identity::{Session, SessionEvent},
  store::IdentityProvider,
};
use rand_core::{OsRng, RngCore as _};
use rusqlite::OptionalExtension as _;
use sha2::{Digest as _, Sha256};
use tokio::sync::broadcast;
use url::Url;
use uuid::Uuid;

use crate::{
  encode::{RawSession, decode_dt, encode_dt, encode_uuid},
  Error, Result, SqliteStore,
};

/// How long a magic link (and the code minted from it) stays valid.
pub const MAGIC_LINK_TTL: Duration = Duration::hours(1);

/// How long a session stays valid.
pub const SESSION_TTL: Duration = Duration::days(7);

const VERIFIER_KEY: &str = "code_verifier";

const EVENT_CAPACITY: usize = 16;

fn random_token() -> String {
  let mut buf = [0u8; 32];
  OsRng.fill_bytes(&mut buf);
  URL_SAFE_NO_PAD.encode(buf)
}

fn code_challenge(verifier: &str) -> String {
  URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()))
}

// ─── Store-side entry points ─────────────────────────────────────────────────

impl SqliteStore {
  /// The identity provider as seen from browsing context `context`.
  pub fn auth(&self, context: impl Into<String>) -> LocalAuth {
    let (events, _) = broadcast::channel(EVENT_CAPACITY);
    LocalAuth { store: self.clone(), context: context.into(), events }
  }

  /// Consume a magic-link token and return the callback URL, with a fresh
  /// authorization code appended, to redirect the browser to.
  pub async fn verify_magic_link(&self, token: &str) -> Result<String> {
    let token = token.to_owned();
    let now = Utc::now();
    let now_str = encode_dt(now);
    let code = random_token();
    let code_for_update = code.clone();

    let found: Option<(String, String)> = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let row: Option<(String, String)> = tx
          .query_row(
            "SELECT redirect_to, expires_at FROM auth_flows
             WHERE token = ?1 AND verified_at IS NULL",
            rusqlite::params![token],
            |r| Ok((r.get(0)?, r.get(1)?)),
          )
          .optional()?;
        if row.is_some() {
          tx.execute(
            "UPDATE auth_flows SET verified_at = ?1, auth_code = ?2 WHERE token = ?3",
            rusqlite::params![now_str, code_for_update, token],
          )?;
        }
        tx.commit()?;
        Ok(row)
      })
      .await?;

    let (redirect_to, expires_at) = found.ok_or(Error::InvalidMagicLink)?;
    if decode_dt(&expires_at)? <= now {
      return Err(Error::InvalidMagicLink);
    }

    let mut url = Url::parse(&redirect_to)?;
    url.query_pairs_mut().append_pair("code", &code);
    tracing::info!(redirect = %url, "magic link verified");
    Ok(url.into())
  }

  /// The most recently issued, still unverified link for `email`.
  ///
  /// Stands in for the user's inbox: the local backend has no mail transport.
  pub async fn pending_magic_link(&self, email: &str) -> Result<Option<String>> {
    let email = email.trim().to_lowercase();
    let token: Option<String> = self
      .conn
      .call(move |conn| {
        Ok(conn
          .query_row(
            "SELECT token FROM auth_flows
             WHERE email = ?1 AND verified_at IS NULL
             ORDER BY created_at DESC, rowid DESC LIMIT 1",
            rusqlite::params![email],
            |r| r.get(0),
          )
          .optional()?)
      })
      .await?;

    token.map(|t| self.signer.magic_link(&t)).transpose()
  }
}

// ─── LocalAuth ───────────────────────────────────────────────────────────────

/// Identity provider bound to one browsing context of a [`SqliteStore`].
///
/// Session-change notifications reach subscribers of this instance only.
#[derive(Clone)]
pub struct LocalAuth {
  store:   SqliteStore,
  context: String,
  events:  broadcast::Sender<SessionEvent>,
}

impl LocalAuth {
  pub fn context(&self) -> &str { &self.context }

  fn notify(&self, event: SessionEvent) {
    // No subscribers is fine.
    let _ = self.events.send(event);
  }
}

impl IdentityProvider for LocalAuth {
  type Error = Error;

  async fn send_magic_link(&self, email: &str, redirect_to: &str) -> Result<()> {
    let email = email.trim().to_lowercase();
    if email.is_empty() {
      return Err(Error::MissingEmail);
    }
    Url::parse(redirect_to)?;

    let verifier  = random_token();
    let challenge = code_challenge(&verifier);
    let token     = random_token();
    let now       = Utc::now();

    let context     = self.context.clone();
    let token_row   = token.clone();
    let email_row   = email.clone();
    let redirect    = redirect_to.to_owned();
    let created_str = encode_dt(now);
    let expires_str = encode_dt(now + MAGIC_LINK_TTL);

    self
      .store
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        tx.execute(
          "INSERT INTO context_storage (context, key, value) VALUES (?1, ?2, ?3)
           ON CONFLICT (context, key) DO UPDATE SET value = excluded.value",
          rusqlite::params![context, VERIFIER_KEY, verifier],
        )?;
        tx.execute(
          "INSERT INTO auth_flows (
             token, email, redirect_to, context, code_challenge, created_at, expires_at
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
          rusqlite::params![
            token_row, email_row, redirect, context, challenge, created_str, expires_str
          ],
        )?;
        tx.commit()?;
        Ok(())
      })
      .await?;

    let link = self.store.signer.magic_link(&token)?;
    tracing::info!(%email, %link, "magic link issued");
    Ok(())
  }

  async fn exchange_code_for_session(&self, code: &str) -> Result<Session> {
    let code    = code.to_owned();
    let context = self.context.clone();
    let now     = Utc::now();

    let raw: Result<RawSession> = self
      .store
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;

        let flow: Option<(String, String, String, Option<String>)> = tx
          .query_row(
            "SELECT email, code_challenge, expires_at, exchanged_at
             FROM auth_flows WHERE auth_code = ?1",
            rusqlite::params![code],
            |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?)),
          )
          .optional()?;

        let Some((email, challenge, expires_at, exchanged_at)) = flow else {
          return Ok(Err(Error::InvalidAuthCode("unknown code")));
        };
        if exchanged_at.is_some() {
          return Ok(Err(Error::InvalidAuthCode("code already used")));
        }
        match decode_dt(&expires_at) {
          Ok(at) if at > now => {}
          Ok(_) => return Ok(Err(Error::InvalidAuthCode("code expired"))),
          Err(e) => return Ok(Err(e)),
        }

        let verifier: Option<String> = tx
          .query_row(
            "SELECT value FROM context_storage WHERE context = ?1 AND key = ?2",
            rusqlite::params![context, VERIFIER_KEY],
            |r| r.get(0),
          )
          .optional()?;
        if verifier.as_deref().map(code_challenge) != Some(challenge) {
          return Ok(Err(Error::VerifierMismatch));
        }

        let now_str = encode_dt(now);
        tx.execute(
          "UPDATE auth_flows SET exchanged_at = ?1 WHERE auth_code = ?2",
          rusqlite::params![now_str, code],
        )?;
        tx.execute(
          "DELETE FROM context_storage WHERE context = ?1 AND key = ?2",
          rusqlite::params![context, VERIFIER_KEY],
        )?;

        // First successful verification creates the identity.
        tx.execute(
          "INSERT INTO users (user_id, email, created_at) VALUES (?1, ?2, ?3)
           ON CONFLICT (email) DO NOTHING",
          rusqlite::params![encode_uuid(Uuid::new_v4()), email, now_str],
        )?;
        let user_id: String = tx.query_row(
          "SELECT user_id FROM users WHERE email = ?1",
          rusqlite::params![email],
          |r| r.get(0),
        )?;

        let session = RawSession {
          user_id,
          email,
          access_token: random_token(),
          created_at:   now_str,
          expires_at:   encode_dt(now + SESSION_TTL),
        };
        tx.execute(
          "INSERT INTO sessions (context, user_id, access_token, created_at, expires_at)
           VALUES (?1, ?2, ?3, ?4, ?5)
           ON CONFLICT (context) DO UPDATE SET
             user_id = excluded.user_id,
             access_token = excluded.access_token,
             created_at = excluded.created_at,
             expires_at = excluded.expires_at",
          rusqlite::params![
            context,
            session.user_id,
            session.access_token,
            session.created_at,
            session.expires_at
          ],
        )?;
        tx.commit()?;
        Ok(Ok(session))
      })
      .await?;

    let session = raw?.into_session()?;
    tracing::info!(context = %self.context, user_id = %session.user_id, "session established");
    self.notify(SessionEvent::SignedIn(session.clone()));
    Ok(session)
  }

  async fn get_session(&self) -> Result<Option<Session>> {
    let context = self.context.clone();

    let raw: Option<RawSession> = self
      .store
      .conn
      .call(move |conn| {
        Ok(conn
          .query_row(
            "SELECT s.user_id, u.email, s.access_token, s.created_at, s.expires_at
             FROM sessions s JOIN users u ON u.user_id = s.user_id
             WHERE s.context = ?1",
            rusqlite::params![context],
            |r| {
              Ok(RawSession {
                user_id:      r.get(0)?,
                email:        r.get(1)?,
                access_token: r.get(2)?,
                created_at:   r.get(3)?,
                expires_at:   r.get(4)?,
              })
            },
          )
          .optional()?)
      })
      .await?;

    let session = raw.map(RawSession::into_session).transpose()?;
    Ok(session.filter(|s| !s.is_expired_at(Utc::now())))
  }

  async fn sign_out(&self) -> Result<()> {
    let context = self.context.clone();
    self
      .store
      .conn
      .call(move |conn| {
        conn.execute("DELETE FROM sessions WHERE context = ?1", rusqlite::params![context])?;
        Ok(())
      })
      .await?;
    tracing::info!(context = %self.context, "signed out");
    self.notify(SessionEvent::SignedOut);
    Ok(())
  }

  fn subscribe(&self) -> broadcast::Receiver<SessionEvent> { self.events.subscribe() }
}
