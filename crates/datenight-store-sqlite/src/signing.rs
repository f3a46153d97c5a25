//! Public URLs minted by the local backend: magic links and signed photo
//! download links.
//!
//! Photo links carry `expires` (unix seconds) and `sig`, a hex HMAC-SHA256
//! over `"{path}\n{expires}"` keyed by the backend secret.

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use url::Url;

use crate::{Error, Result};

type HmacSha256 = Hmac<Sha256>;

/// Base URL used by [`UrlSigner::dev`].
pub const DEV_BASE_URL: &str = "http://localhost:5240";

const DEV_SECRET: &[u8] = b"datenight-dev-secret";

#[derive(Clone)]
pub struct UrlSigner {
  base_url: Url,
  secret:   Vec<u8>,
}

impl std::fmt::Debug for UrlSigner {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("UrlSigner").field("base_url", &self.base_url.as_str()).finish_non_exhaustive()
  }
}

impl UrlSigner {
  pub fn new(base_url: &str, secret: impl Into<Vec<u8>>) -> Result<Self> {
    Ok(Self { base_url: Url::parse(base_url)?, secret: secret.into() })
  }

  /// Signer for local development and tests. Never use outside of them.
  pub fn dev() -> Self {
    Self::new(DEV_BASE_URL, DEV_SECRET).expect("DEV_BASE_URL is a valid url")
  }

  pub fn base_url(&self) -> &Url { &self.base_url }

  /// The link a user follows to verify a magic-link token.
  pub fn magic_link(&self, token: &str) -> Result<String> {
    let mut url = self.base_url.join("/auth/verify")?;
    url.query_pairs_mut().append_pair("token", token);
    Ok(url.into())
  }

  /// A download link for `path` that stops verifying at `expires_at`.
  pub fn sign_photo(&self, path: &str, expires_at: DateTime<Utc>) -> Result<String> {
    let expires = expires_at.timestamp();
    let sig = hex::encode(self.mac(path, expires)?.finalize().into_bytes());
    let mut url = self.base_url.join(&format!("/photos/{path}"))?;
    url
      .query_pairs_mut()
      .append_pair("expires", &expires.to_string())
      .append_pair("sig", &sig);
    Ok(url.into())
  }

  /// Check a signature presented for `path`.
  pub fn verify_photo(&self, path: &str, expires: i64, sig: &str, now: DateTime<Utc>) -> Result<()> {
    let raw = hex::decode(sig).map_err(|_| Error::InvalidSignature)?;
    self
      .mac(path, expires)?
      .verify_slice(&raw)
      .map_err(|_| Error::InvalidSignature)?;
    if now.timestamp() >= expires {
      return Err(Error::SignatureExpired);
    }
    Ok(())
  }

  fn mac(&self, path: &str, expires: i64) -> Result<HmacSha256> {
    let mut mac = HmacSha256::new_from_slice(&self.secret).map_err(|_| Error::InvalidSignature)?;
    mac.update(path.as_bytes());
    mac.update(b"\n");
    mac.update(expires.to_string().as_bytes());
    Ok(mac)
  }
}
