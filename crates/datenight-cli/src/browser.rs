//! The browser's side of the two public endpoints: following a magic link
//! and downloading a signed photo.

use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use reqwest::{Client, StatusCode, header, redirect::Policy};

#[derive(Clone)]
pub struct Browser {
  client: Client,
}

impl Browser {
  pub fn new() -> Result<Self> {
    // Redirects are read, not followed: the callback page is ours to run.
    let client = Client::builder()
      .redirect(Policy::none())
      .timeout(Duration::from_secs(30))
      .build()
      .context("failed to build HTTP client")?;
    Ok(Self { client })
  }

  /// Open a magic link and return the callback URL it redirects to.
  pub async fn follow_magic_link(&self, link: &str) -> Result<String> {
    let resp = self.client.get(link).send().await.context("GET /auth/verify failed")?;

    if resp.status() != StatusCode::SEE_OTHER {
      let status = resp.status();
      let body = resp.text().await.unwrap_or_default();
      return Err(anyhow!("GET /auth/verify → {status}: {body}"));
    }
    let location = resp
      .headers()
      .get(header::LOCATION)
      .context("redirect without a Location header")?
      .to_str()
      .context("Location header is not valid UTF-8")?;
    Ok(location.to_owned())
  }

  /// Fetch a signed photo URL.
  pub async fn download(&self, url: &str) -> Result<Vec<u8>> {
    let resp = self.client.get(url).send().await.context("GET /photos failed")?;
    if !resp.status().is_success() {
      return Err(anyhow!("GET /photos → {}", resp.status()));
    }
    Ok(resp.bytes().await.context("reading photo body")?.to_vec())
  }
}
