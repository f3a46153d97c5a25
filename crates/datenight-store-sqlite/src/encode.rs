//! Encoding and decoding helpers between domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! All timestamps are stored as RFC 3339 strings. UUIDs are stored as
//! hyphenated lowercase strings.

use chrono::{DateTime, Utc};
use datenight_core::{
  couple::{Couple, Membership},
  entry::Entry,
  identity::Session,
};
use uuid::Uuid;

use crate::{Error, Result};

// ─── Uuid ─────────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

// ─── DateTime<Utc> ────────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String { dt.to_rfc3339() }

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

// ─── Raw rows ─────────────────────────────────────────────────────────────────

pub const COUPLE_COLUMNS: &str = "couple_id, created_at";

#[derive(Debug)]
pub struct RawCouple {
  pub couple_id:  String,
  pub created_at: String,
}

impl RawCouple {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self { couple_id: row.get(0)?, created_at: row.get(1)? })
  }

  pub fn into_couple(self) -> Result<Couple> {
    Ok(Couple {
      couple_id:  decode_uuid(&self.couple_id)?,
      created_at: decode_dt(&self.created_at)?,
    })
  }
}

pub const MEMBERSHIP_COLUMNS: &str = "couple_id, user_id, joined_at";

#[derive(Debug)]
pub struct RawMembership {
  pub couple_id: String,
  pub user_id:   String,
  pub joined_at: String,
}

impl RawMembership {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      couple_id: row.get(0)?,
      user_id:   row.get(1)?,
      joined_at: row.get(2)?,
    })
  }

  pub fn into_membership(self) -> Result<Membership> {
    Ok(Membership {
      couple_id: decode_uuid(&self.couple_id)?,
      user_id:   decode_uuid(&self.user_id)?,
      joined_at: decode_dt(&self.joined_at)?,
    })
  }
}

pub const ENTRY_COLUMNS: &str = "entry_id, couple_id, created_at, title, photo_path, created_by";

#[derive(Debug)]
pub struct RawEntry {
  pub entry_id:   String,
  pub couple_id:  String,
  pub created_at: String,
  pub title:      String,
  pub photo_path: Option<String>,
  pub created_by: String,
}

impl RawEntry {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      entry_id:   row.get(0)?,
      couple_id:  row.get(1)?,
      created_at: row.get(2)?,
      title:      row.get(3)?,
      photo_path: row.get(4)?,
      created_by: row.get(5)?,
    })
  }

  pub fn into_entry(self) -> Result<Entry> {
    Ok(Entry {
      entry_id:   decode_uuid(&self.entry_id)?,
      couple_id:  decode_uuid(&self.couple_id)?,
      created_at: decode_dt(&self.created_at)?,
      title:      self.title,
      photo_path: self.photo_path,
      created_by: decode_uuid(&self.created_by)?,
    })
  }
}

#[derive(Debug)]
pub struct RawSession {
  pub user_id:      String,
  pub email:        String,
  pub access_token: String,
  pub created_at:   String,
  pub expires_at:   String,
}

impl RawSession {
  pub fn into_session(self) -> Result<Session> {
    Ok(Session {
      user_id:      decode_uuid(&self.user_id)?,
      email:        self.email,
      access_token: self.access_token,
      created_at:   decode_dt(&self.created_at)?,
      expires_at:   decode_dt(&self.expires_at)?,
    })
  }
}
