//! Scripted in-memory collaborators for flow tests.

use std::{
  collections::HashMap,
  future::Future,
  sync::{Mutex, MutexGuard},
  time::Duration,
};

use chrono::{Duration as ChronoDuration, Utc};
use datenight_core::{
  couple::{Couple, Membership},
  entry::{Entry, NewEntry, entry_timestamp, parse_entry_date},
  identity::{Session, SessionEvent},
  store::{
    BackendError, INSUFFICIENT_PRIVILEGE, IdentityProvider, PhotoStore, PhotoUpload,
    RAISE_EXCEPTION, TimelineStore, UNIQUE_VIOLATION, UploadOptions,
  },
};
use thiserror::Error;
use tokio::sync::broadcast;
use uuid::Uuid;

#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct FakeError {
  code:    Option<&'static str>,
  message: String,
}

impl FakeError {
  fn plain(message: impl Into<String>) -> Self { Self { code: None, message: message.into() } }

  fn coded(code: &'static str, message: impl Into<String>) -> Self {
    Self { code: Some(code), message: message.into() }
  }
}

impl BackendError for FakeError {
  fn code(&self) -> Option<&str> { self.code }
}

async fn stall_if(stalled: bool) {
  if stalled {
    std::future::pending::<()>().await;
  }
}

fn session_for(user_id: Uuid) -> Session {
  let now = Utc::now();
  Session {
    user_id,
    email: format!("{user_id}@example.com"),
    access_token: "fake-token".into(),
    created_at: now,
    expires_at: now + ChronoDuration::hours(1),
  }
}

// ─── Identity provider ───────────────────────────────────────────────────────

struct AuthState {
  /// Read number on which the session first shows up.
  visible_after:  Option<u32>,
  nil_first:      bool,
  read_error:     Option<String>,
  exchange_error: Option<String>,
  link_error:     Option<String>,
  signed_out:     bool,
  stalled:        bool,
  reads:          u32,
  exchanged:      Vec<String>,
  sent_links:     Vec<(String, String)>,
}

pub struct FakeAuth {
  user_id: Uuid,
  state:   Mutex<AuthState>,
  events:  broadcast::Sender<SessionEvent>,
}

impl FakeAuth {
  fn with_visibility(visible_after: Option<u32>) -> Self {
    let (events, _) = broadcast::channel(16);
    Self {
      user_id: Uuid::new_v4(),
      state: Mutex::new(AuthState {
        visible_after,
        nil_first: false,
        read_error: None,
        exchange_error: None,
        link_error: None,
        signed_out: false,
        stalled: false,
        reads: 0,
        exchanged: Vec::new(),
        sent_links: Vec::new(),
      }),
      events,
    }
  }

  /// The session appears on read `k`.
  pub fn visible_after(k: u32) -> Self { Self::with_visibility(Some(k)) }

  pub fn never_visible() -> Self { Self::with_visibility(None) }

  /// Signed in as `user_id` from the first read.
  pub fn signed_in_as(user_id: Uuid) -> Self { Self { user_id, ..Self::visible_after(1) } }

  /// Reads before the session is visible return a session with a nil user
  /// instead of none.
  pub fn with_nil_identity_first(mut self) -> Self {
    self.state_mut().nil_first = true;
    self
  }

  pub fn failing_reads(mut self, message: &str) -> Self {
    self.state_mut().read_error = Some(message.to_owned());
    self
  }

  pub fn failing_exchange(mut self, message: &str) -> Self {
    self.state_mut().exchange_error = Some(message.to_owned());
    self
  }

  pub fn failing_magic_link(mut self, message: &str) -> Self {
    self.state_mut().link_error = Some(message.to_owned());
    self
  }

  /// Session reads pend forever.
  pub fn stalled(mut self) -> Self {
    self.state_mut().stalled = true;
    self
  }

  fn state_mut(&mut self) -> &mut AuthState { self.state.get_mut().unwrap() }

  fn state(&self) -> MutexGuard<'_, AuthState> { self.state.lock().unwrap() }

  pub fn user_id(&self) -> Uuid { self.user_id }

  pub fn reads(&self) -> u32 { self.state().reads }

  pub fn exchanged_codes(&self) -> Vec<String> { self.state().exchanged.clone() }

  /// `(email, redirect_to)` of every link requested.
  pub fn sent_links(&self) -> Vec<(String, String)> { self.state().sent_links.clone() }

  /// Make the session visible on the next read and announce it.
  pub fn sign_in_now(&self) {
    {
      let mut state = self.state();
      state.signed_out = false;
      state.visible_after = Some(state.reads + 1);
    }
    let _ = self.events.send(SessionEvent::SignedIn(session_for(self.user_id)));
  }

  pub fn emit(&self, event: SessionEvent) { let _ = self.events.send(event); }

  pub fn subscribers(&self) -> usize { self.events.receiver_count() }
}

impl IdentityProvider for FakeAuth {
  type Error = FakeError;

  fn send_magic_link<'a>(
    &'a self,
    email: &'a str,
    redirect_to: &'a str,
  ) -> impl Future<Output = Result<(), FakeError>> + Send + 'a {
    async move {
      let mut state = self.state();
      if let Some(message) = &state.link_error {
        return Err(FakeError::plain(message.clone()));
      }
      state.sent_links.push((email.to_owned(), redirect_to.to_owned()));
      Ok(())
    }
  }

  fn exchange_code_for_session<'a>(
    &'a self,
    code: &'a str,
  ) -> impl Future<Output = Result<Session, FakeError>> + Send + 'a {
    async move {
      let mut state = self.state();
      if let Some(message) = &state.exchange_error {
        return Err(FakeError::plain(message.clone()));
      }
      state.exchanged.push(code.to_owned());
      Ok(session_for(self.user_id))
    }
  }

  fn get_session(&self) -> impl Future<Output = Result<Option<Session>, FakeError>> + Send + '_ {
    async move {
      let stalled = {
        let mut state = self.state();
        state.reads += 1;
        state.stalled
      };
      stall_if(stalled).await;

      let state = self.state();
      if let Some(message) = &state.read_error {
        return Err(FakeError::plain(message.clone()));
      }
      if state.signed_out {
        return Ok(None);
      }
      let visible = state.visible_after.is_some_and(|k| state.reads >= k);
      Ok(if visible {
        Some(session_for(self.user_id))
      } else if state.nil_first {
        Some(session_for(Uuid::nil()))
      } else {
        None
      })
    }
  }

  fn sign_out(&self) -> impl Future<Output = Result<(), FakeError>> + Send + '_ {
    async move {
      self.state().signed_out = true;
      let _ = self.events.send(SessionEvent::SignedOut);
      Ok(())
    }
  }

  fn subscribe(&self) -> broadcast::Receiver<SessionEvent> { self.events.subscribe() }
}

// ─── Relational store ────────────────────────────────────────────────────────

#[derive(Default)]
struct StoreState {
  couples:           Vec<Couple>,
  memberships:       Vec<Membership>,
  entries:           Vec<Entry>,
  insert_attempts:   u32,
  hide_memberships:  bool,
  membership_error:  Option<String>,
  read_error:        Option<String>,
  entry_error:       Option<String>,
  photo_link_error:  Option<String>,
  stalled:           bool,
}

impl StoreState {
  fn is_member(&self, couple_id: Uuid, user_id: Uuid) -> bool {
    self.memberships.iter().any(|m| m.couple_id == couple_id && m.user_id == user_id)
  }

  fn member_count(&self, couple_id: Uuid) -> usize {
    self.memberships.iter().filter(|m| m.couple_id == couple_id).count()
  }

  fn new_couple(&mut self) -> Couple {
    let couple = Couple { couple_id: Uuid::new_v4(), created_at: Utc::now() };
    self.couples.push(couple.clone());
    couple
  }

  fn join(&mut self, couple_id: Uuid, user_id: Uuid) -> Membership {
    let membership = Membership { couple_id, user_id, joined_at: Utc::now() };
    self.memberships.push(membership.clone());
    membership
  }
}

/// Behaves like the relational store: duplicate errors carry only text, the
/// cap trigger carries a raise code, and reads are filtered by membership.
#[derive(Default)]
pub struct FakeStore {
  state: Mutex<StoreState>,
}

impl FakeStore {
  fn state(&self) -> MutexGuard<'_, StoreState> { self.state.lock().unwrap() }

  fn state_mut(&mut self) -> &mut StoreState { self.state.get_mut().unwrap() }

  /// Membership inserts (and the atomic create) fail with `message`.
  pub fn failing_membership_insert(mut self, message: &str) -> Self {
    self.state_mut().membership_error = Some(message.to_owned());
    self
  }

  pub fn failing_reads(mut self, message: &str) -> Self {
    self.state_mut().read_error = Some(message.to_owned());
    self
  }

  pub fn failing_entry_insert(mut self, message: &str) -> Self {
    self.state_mut().entry_error = Some(message.to_owned());
    self
  }

  pub fn failing_photo_link(mut self, message: &str) -> Self {
    self.state_mut().photo_link_error = Some(message.to_owned());
    self
  }

  /// Every call pends forever.
  pub fn stalled(mut self) -> Self {
    self.state_mut().stalled = true;
    self
  }

  /// Membership lookups report nothing, as if racing another tab's insert.
  pub fn hide_memberships_from_reads(&self) { self.state().hide_memberships = true; }

  pub fn seed_couple(&self, members: &[Uuid]) -> Uuid {
    let mut state = self.state();
    let couple_id = state.new_couple().couple_id;
    for user_id in members {
      state.join(couple_id, *user_id);
    }
    couple_id
  }

  pub fn seed_entry(&self, couple_id: Uuid, author: Uuid, date: &str, photo_path: Option<String>) -> Uuid {
    let entry = Entry {
      entry_id: Uuid::new_v4(),
      couple_id,
      created_at: entry_timestamp(parse_entry_date(date).unwrap()),
      title: format!("entry on {date}"),
      photo_path,
      created_by: author,
    };
    let id = entry.entry_id;
    self.state().entries.push(entry);
    id
  }

  pub fn member_count(&self, couple_id: Uuid) -> usize { self.state().member_count(couple_id) }

  pub fn is_member(&self, couple_id: Uuid, user_id: Uuid) -> bool { self.state().is_member(couple_id, user_id) }

  pub fn insert_attempts(&self) -> u32 { self.state().insert_attempts }

  pub fn couple_count(&self) -> usize { self.state().couples.len() }

  pub fn total_memberships(&self) -> usize { self.state().memberships.len() }

  pub fn entries_of(&self, couple_id: Uuid) -> Vec<Entry> {
    self.state().entries.iter().filter(|e| e.couple_id == couple_id).cloned().collect()
  }

  fn stalled_now(&self) -> bool { self.state().stalled }
}

impl TimelineStore for FakeStore {
  type Error = FakeError;

  fn find_membership(
    &self,
    couple_id: Uuid,
    user_id: Uuid,
  ) -> impl Future<Output = Result<Option<Membership>, FakeError>> + Send + '_ {
    async move {
      stall_if(self.stalled_now()).await;
      let state = self.state();
      if state.hide_memberships {
        return Ok(None);
      }
      Ok(state.memberships.iter().find(|m| m.couple_id == couple_id && m.user_id == user_id).cloned())
    }
  }

  fn insert_membership(
    &self,
    couple_id: Uuid,
    user_id: Uuid,
  ) -> impl Future<Output = Result<Membership, FakeError>> + Send + '_ {
    async move {
      stall_if(self.stalled_now()).await;
      let mut state = self.state();
      state.insert_attempts += 1;
      if let Some(message) = &state.membership_error {
        return Err(FakeError::plain(message.clone()));
      }
      if !state.couples.iter().any(|c| c.couple_id == couple_id) {
        return Err(FakeError::plain(
          "insert or update on table \"couple_members\" violates foreign key constraint",
        ));
      }
      if state.is_member(couple_id, user_id) {
        return Err(FakeError::plain(
          "duplicate key value violates unique constraint \"couple_members_pkey\"",
        ));
      }
      if state.member_count(couple_id) >= 2 {
        return Err(FakeError::coded(RAISE_EXCEPTION, "couple already has two members"));
      }
      Ok(state.join(couple_id, user_id))
    }
  }

  fn insert_couple(&self, _actor: Uuid) -> impl Future<Output = Result<Couple, FakeError>> + Send + '_ {
    async move {
      stall_if(self.stalled_now()).await;
      Ok(self.state().new_couple())
    }
  }

  fn create_couple_and_join(
    &self,
    actor: Uuid,
  ) -> impl Future<Output = Result<Couple, FakeError>> + Send + '_ {
    async move {
      stall_if(self.stalled_now()).await;
      let mut state = self.state();
      if let Some(message) = &state.membership_error {
        return Err(FakeError::plain(message.clone()));
      }
      let couple = state.new_couple();
      state.join(couple.couple_id, actor);
      Ok(couple)
    }
  }

  fn list_entries(
    &self,
    actor: Uuid,
    couple_id: Uuid,
  ) -> impl Future<Output = Result<Vec<Entry>, FakeError>> + Send + '_ {
    async move {
      stall_if(self.stalled_now()).await;
      let state = self.state();
      if let Some(message) = &state.read_error {
        return Err(FakeError::plain(message.clone()));
      }
      if !state.is_member(couple_id, actor) {
        return Ok(Vec::new());
      }
      let mut entries: Vec<Entry> =
        state.entries.iter().rev().filter(|e| e.couple_id == couple_id).cloned().collect();
      entries.sort_by(|a, b| b.created_at.cmp(&a.created_at));
      Ok(entries)
    }
  }

  fn insert_entry(
    &self,
    actor: Uuid,
    input: NewEntry,
  ) -> impl Future<Output = Result<Entry, FakeError>> + Send + '_ {
    async move {
      stall_if(self.stalled_now()).await;
      let mut state = self.state();
      if let Some(message) = &state.entry_error {
        return Err(FakeError::plain(message.clone()));
      }
      if input.created_by != actor || !state.is_member(input.couple_id, actor) {
        return Err(FakeError::coded(
          INSUFFICIENT_PRIVILEGE,
          "new row violates row-level security policy for table \"entries\"",
        ));
      }
      let entry = Entry {
        entry_id:   Uuid::new_v4(),
        couple_id:  input.couple_id,
        created_at: input.created_at,
        title:      input.title,
        photo_path: None,
        created_by: input.created_by,
      };
      state.entries.push(entry.clone());
      Ok(entry)
    }
  }

  fn set_entry_photo(
    &self,
    actor: Uuid,
    entry_id: Uuid,
    photo_path: String,
  ) -> impl Future<Output = Result<Entry, FakeError>> + Send + '_ {
    async move {
      stall_if(self.stalled_now()).await;
      let mut guard = self.state();
      let state = &mut *guard;
      if let Some(message) = &state.photo_link_error {
        return Err(FakeError::plain(message.clone()));
      }
      let memberships = &state.memberships;
      let entry = state
        .entries
        .iter_mut()
        .find(|e| {
          e.entry_id == entry_id
            && memberships.iter().any(|m| m.couple_id == e.couple_id && m.user_id == actor)
        })
        .ok_or_else(|| FakeError::plain(format!("entry {entry_id} not found")))?;
      entry.photo_path = Some(photo_path);
      Ok(entry.clone())
    }
  }
}

// ─── Photo store ─────────────────────────────────────────────────────────────

#[derive(Default)]
struct PhotoState {
  objects:      HashMap<String, PhotoUpload>,
  upload_error: Option<String>,
  failing_sign: Vec<String>,
  last_ttl:     Option<Duration>,
}

#[derive(Default)]
pub struct FakePhotos {
  state: Mutex<PhotoState>,
}

impl FakePhotos {
  fn state(&self) -> MutexGuard<'_, PhotoState> { self.state.lock().unwrap() }

  pub fn failing_upload(mut self, message: &str) -> Self {
    self.state.get_mut().unwrap().upload_error = Some(message.to_owned());
    self
  }

  /// Signing fails for any path ending in `suffix`.
  pub fn failing_sign_for(mut self, suffix: &str) -> Self {
    self.state.get_mut().unwrap().failing_sign.push(suffix.to_owned());
    self
  }

  pub fn last_ttl(&self) -> Option<Duration> { self.state().last_ttl }

  pub fn paths(&self) -> Vec<String> { self.state().objects.keys().cloned().collect() }
}

impl PhotoStore for FakePhotos {
  type Error = FakeError;

  fn upload(
    &self,
    _actor: Uuid,
    path: String,
    photo: PhotoUpload,
    options: UploadOptions,
  ) -> impl Future<Output = Result<(), FakeError>> + Send + '_ {
    async move {
      let mut state = self.state();
      if let Some(message) = &state.upload_error {
        return Err(FakeError::plain(message.clone()));
      }
      if !options.upsert && state.objects.contains_key(&path) {
        return Err(FakeError::coded(UNIQUE_VIOLATION, "The resource already exists"));
      }
      state.objects.insert(path, photo);
      Ok(())
    }
  }

  fn create_signed_url(
    &self,
    _actor: Uuid,
    path: String,
    ttl: Duration,
  ) -> impl Future<Output = Result<String, FakeError>> + Send + '_ {
    async move {
      let mut state = self.state();
      if state.failing_sign.iter().any(|suffix| path.ends_with(suffix.as_str())) {
        return Err(FakeError::plain("Object not found"));
      }
      state.last_ttl = Some(ttl);
      Ok(format!("https://photos.test/{path}?ttl={}", ttl.as_secs()))
    }
  }
}
