//! `datenight`: the shared date-night timeline, driven from a terminal.
//!
//! Every command runs one page's flow against the local SQLite backend;
//! `serve` exposes the link endpoints that magic links and photo links
//! point at.
//!
//! # Usage
//!
//! ```
//! datenight serve
//! datenight sign-in a@example.com
//! datenight callback 'http://localhost:5240/auth/verify?token=…'
//! datenight --context phone open 7d0c…
//! ```

mod browser;
mod settings;

use std::{
  path::{Path, PathBuf},
  sync::Arc,
};

use anyhow::{Context as _, Result, bail};
use browser::Browser;
use clap::{Parser, Subcommand};
use datenight_client::{
  Backend,
  callback::AuthCallback,
  landing::Landing,
  timeline::{Timeline, TimelineView},
  writer::EntryDraft,
};
use datenight_core::{
  entry::{parse_entry_date, today},
  nav::Destination,
  store::{IdentityProvider, PhotoUpload},
};
use datenight_store_sqlite::{LocalAuth, SqliteStore, UrlSigner};
use settings::CliConfig;
use tokio::net::TcpListener;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

type LocalBackend = Backend<LocalAuth, SqliteStore, SqliteStore>;

// ─── CLI args ─────────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "datenight", about = "A private timeline for two")]
struct Args {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "config.toml")]
  config: PathBuf,

  /// Browsing context to act as (overrides the config file).
  #[arg(long, env = "DATENIGHT_CONTEXT")]
  context: Option<String>,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Serve magic-link verification and signed photo downloads.
  Serve,
  /// Request a sign-in link, from the landing page or a timeline.
  SignIn {
    email:  String,
    /// Sign in to join this couple's timeline.
    #[arg(long)]
    couple: Option<Uuid>,
  },
  /// Complete sign-in from a magic link or a callback URL.
  Callback { url: String },
  /// Start a new timeline if signed in.
  Start,
  /// Join (if needed) and show a timeline.
  Open { couple: Uuid },
  /// Add an entry to a timeline.
  Add {
    couple: Uuid,
    title:  String,
    /// Day of the date, `YYYY-MM-DD`. Defaults to today.
    #[arg(long)]
    date:   Option<String>,
    #[arg(long)]
    photo:  Option<PathBuf>,
  },
  /// Download a photo through its signed link.
  Photo {
    url: String,
    #[arg(short, long)]
    out: PathBuf,
  },
  SignOut,
}

// ─── Entry point ──────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let args = Args::parse();
  let mut cfg = CliConfig::load(&args.config)?;
  if let Some(context) = args.context {
    cfg.context = context;
  }

  let store = Arc::new(open_store(&cfg).await?);
  let backend: LocalBackend =
    Backend::new(Arc::new(store.auth(cfg.context.clone())), store.clone(), store.clone());

  match args.command {
    Command::Serve => serve(&cfg, store).await,
    Command::SignIn { email, couple } => sign_in(&cfg, &backend, &email, couple).await,
    Command::Callback { url } => callback(&cfg, &backend, &url).await,
    Command::Start => start(&cfg, &backend).await,
    Command::Open { couple } => {
      let timeline = Timeline::new(&backend, couple, &cfg.app_base_url, &cfg.flow);
      // Failures are part of the view.
      let _ = timeline.open().await;
      print_view(&timeline, &timeline.view().await);
      Ok(())
    }
    Command::Add { couple, title, date, photo } => {
      add(&cfg, &backend, couple, title, date.as_deref(), photo.as_deref()).await
    }
    Command::Photo { url, out } => {
      let bytes = Browser::new()?.download(&url).await?;
      tokio::fs::write(&out, &bytes)
        .await
        .with_context(|| format!("failed to write {}", out.display()))?;
      println!("saved {} bytes to {}", bytes.len(), out.display());
      Ok(())
    }
    Command::SignOut => {
      backend.auth.sign_out().await.context("sign-out failed")?;
      println!("Signed out of context {:?}.", cfg.context);
      Ok(())
    }
  }
}

async fn open_store(cfg: &CliConfig) -> Result<SqliteStore> {
  if let Some(parent) = cfg.store_path.parent()
    && !parent.as_os_str().is_empty()
  {
    tokio::fs::create_dir_all(parent)
      .await
      .with_context(|| format!("failed to create {}", parent.display()))?;
  }
  let signer = UrlSigner::new(&cfg.api_base_url, cfg.signing_secret.as_bytes())
    .context("invalid api_base_url")?;
  let store = SqliteStore::open(&cfg.store_path)
    .await
    .with_context(|| format!("failed to open store at {:?}", cfg.store_path))?;
  Ok(store.with_signer(signer))
}

// ─── Commands ─────────────────────────────────────────────────────────────────

async fn serve(cfg: &CliConfig, store: Arc<SqliteStore>) -> Result<()> {
  let app = datenight_api::router(store);
  let address = format!("{}:{}", cfg.host, cfg.port);

  tracing::info!("Listening on http://{address}");
  let listener = TcpListener::bind(&address)
    .await
    .with_context(|| format!("failed to bind {address}"))?;

  axum::serve(listener, app).await.context("server error")?;
  Ok(())
}

async fn sign_in(cfg: &CliConfig, backend: &LocalBackend, email: &str, couple: Option<Uuid>) -> Result<()> {
  let sent = match couple {
    Some(couple) => Timeline::new(backend, couple, &cfg.app_base_url, &cfg.flow).sign_in(email).await,
    None => Landing::new(backend, &cfg.app_base_url, &cfg.flow).sign_in(email).await,
  };
  sent?;
  println!("Check your email for the sign-in link.");
  Ok(())
}

async fn callback(cfg: &CliConfig, backend: &LocalBackend, url: &str) -> Result<()> {
  let callback_url = if is_magic_link(url) {
    Browser::new()?.follow_magic_link(url).await?
  } else {
    url.to_owned()
  };

  let dest = AuthCallback::new(backend, &cfg.flow).run(&callback_url).await?;
  match &dest {
    Destination::Timeline(couple) => {
      println!("Signed in. Your timeline: {}{}", cfg.app_base_url.trim_end_matches('/'), dest.path());
      println!("Open it with: datenight open {couple}");
    }
    Destination::InvalidTimeline(path) => {
      println!("Signed in, but {path:?} is not a valid timeline link. Ask your partner to share it again.");
    }
    Destination::Landing => println!("Signed in."),
  }
  Ok(())
}

fn is_magic_link(url: &str) -> bool { url.contains("/auth/verify") }

async fn start(cfg: &CliConfig, backend: &LocalBackend) -> Result<()> {
  match Landing::new(backend, &cfg.app_base_url, &cfg.flow).mount().await? {
    Some(dest) => println!("Started {}", dest.path()),
    None => bail!("not signed in; run `datenight sign-in <email>` first"),
  }
  Ok(())
}

async fn add(
  cfg: &CliConfig,
  backend: &LocalBackend,
  couple: Uuid,
  title: String,
  date: Option<&str>,
  photo: Option<&Path>,
) -> Result<()> {
  let date = match date {
    Some(raw) => parse_entry_date(raw)?,
    None => today(),
  };
  let photo = match photo {
    Some(path) => Some(read_photo(path).await?),
    None => None,
  };

  let timeline = Timeline::new(backend, couple, &cfg.app_base_url, &cfg.flow);
  timeline.open().await?;
  let view = timeline.view().await;
  if !view.authed {
    bail!("not signed in; run `datenight sign-in <email> --couple {couple}` first");
  }

  let written = timeline.add_entry(EntryDraft { date, title, photo }).await?;
  println!("Added {} on {}", written.entry.title, written.entry.created_at.date_naive());
  if let Some(url) = written.photo_url {
    println!("  photo: {url}");
  }
  Ok(())
}

async fn read_photo(path: &Path) -> Result<PhotoUpload> {
  let bytes = tokio::fs::read(path)
    .await
    .with_context(|| format!("failed to read {}", path.display()))?;
  let file_name = path
    .file_name()
    .map(|n| n.to_string_lossy().into_owned())
    .unwrap_or_default();
  Ok(PhotoUpload { content_type: content_type_for(&file_name).to_owned(), file_name, bytes })
}

fn content_type_for(file_name: &str) -> &'static str {
  let ext = file_name.rsplit_once('.').map(|(_, e)| e.to_ascii_lowercase()).unwrap_or_default();
  match ext.as_str() {
    "png" => "image/png",
    "gif" => "image/gif",
    "webp" => "image/webp",
    "heic" => "image/heic",
    _ => "image/jpeg",
  }
}

// ─── Output ───────────────────────────────────────────────────────────────────

fn print_view(timeline: &Timeline<LocalAuth, SqliteStore, SqliteStore>, view: &TimelineView) {
  if !view.authed {
    println!("Not signed in. Run `datenight sign-in <email> --couple {}`.", timeline.couple_id());
    return;
  }
  println!("Timeline {}  [{}]", timeline.share_path(), view.join_state);
  if let Some(notice) = &view.notice {
    println!("  {notice}");
  }
  if view.entries.is_empty() && view.notice.is_none() {
    println!("  No entries yet.");
  }
  for entry in &view.entries {
    println!("  {}  {}", entry.created_at.date_naive(), entry.title);
    if let Some(url) = view.photo_urls.get(&entry.entry_id) {
      println!("      {url}");
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn photo_content_types() {
    assert_eq!(content_type_for("a.PNG"), "image/png");
    assert_eq!(content_type_for("a.jpeg"), "image/jpeg");
    assert_eq!(content_type_for("noext"), "image/jpeg");
  }

  #[test]
  fn args_parse() {
    let couple = Uuid::nil().to_string();
    let args = Args::try_parse_from([
      "datenight", "--context", "phone", "add", &couple, "Picnic", "--date", "2024-06-01",
    ])
    .unwrap();
    assert_eq!(args.context.as_deref(), Some("phone"));
    assert!(matches!(args.command, Command::Add { ref title, .. } if title == "Picnic"));
  }
}
