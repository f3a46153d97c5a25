//! [`SqliteStore`], the SQLite implementation of [`TimelineStore`].
//!
//! Row-level authorization is emulated here: an actor sees and writes only
//! the entries of couples it belongs to. The member cap itself lives in the
//! schema's trigger.

use std::{path::Path, sync::Arc};

use chrono::Utc;
use rusqlite::OptionalExtension as _;
use uuid::Uuid;

use datenight_core::{
  couple::{Couple, Membership},
  entry::{Entry, NewEntry},
  store::TimelineStore,
};

use crate::{
  encode::{
    COUPLE_COLUMNS, ENTRY_COLUMNS, MEMBERSHIP_COLUMNS, RawCouple, RawEntry, RawMembership,
    encode_dt, encode_uuid,
  },
  schema::SCHEMA,
  signing::UrlSigner,
  Error, Result,
};

// ─── Store ───────────────────────────────────────────────────────────────────

/// The local date-night backend, backed by a single SQLite file.
///
/// Cloning is cheap: the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  pub(crate) conn:   tokio_rusqlite::Connection,
  pub(crate) signer: Arc<UrlSigner>,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn, signer: Arc::new(UrlSigner::dev()) };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store, for tests.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn, signer: Arc::new(UrlSigner::dev()) };
    store.init_schema().await?;
    Ok(store)
  }

  /// Replace the signer used for magic links and photo URLs.
  pub fn with_signer(mut self, signer: UrlSigner) -> Self {
    self.signer = Arc::new(signer);
    self
  }

  pub fn signer(&self) -> &UrlSigner { &self.signer }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  /// Number of members a couple currently has.
  pub async fn member_count(&self, couple_id: Uuid) -> Result<usize> {
    let id_str = encode_uuid(couple_id);
    let count: i64 = self
      .conn
      .call(move |conn| {
        Ok(conn.query_row(
          "SELECT COUNT(*) FROM couple_members WHERE couple_id = ?1",
          rusqlite::params![id_str],
          |r| r.get(0),
        )?)
      })
      .await?;
    Ok(count as usize)
  }

  /// Number of couples in the store, regardless of membership.
  pub async fn couple_count(&self) -> Result<usize> {
    let count: i64 = self
      .conn
      .call(|conn| Ok(conn.query_row("SELECT COUNT(*) FROM couples", [], |r| r.get(0))?))
      .await?;
    Ok(count as usize)
  }
}

pub(crate) fn is_member(
  conn: &rusqlite::Connection,
  couple_id: &str,
  user_id: &str,
) -> rusqlite::Result<bool> {
  conn.query_row(
    "SELECT EXISTS(SELECT 1 FROM couple_members WHERE couple_id = ?1 AND user_id = ?2)",
    rusqlite::params![couple_id, user_id],
    |r| r.get(0),
  )
}

fn insert_couple_row(conn: &rusqlite::Connection, actor: &str) -> rusqlite::Result<RawCouple> {
  let raw = RawCouple {
    couple_id:  encode_uuid(Uuid::new_v4()),
    created_at: encode_dt(Utc::now()),
  };
  conn.execute(
    "INSERT INTO couples (couple_id, created_at, created_by) VALUES (?1, ?2, ?3)",
    rusqlite::params![raw.couple_id, raw.created_at, actor],
  )?;
  Ok(raw)
}

fn insert_member_row(
  conn: &rusqlite::Connection,
  couple_id: &str,
  user_id: &str,
) -> rusqlite::Result<RawMembership> {
  let raw = RawMembership {
    couple_id: couple_id.to_owned(),
    user_id:   user_id.to_owned(),
    joined_at: encode_dt(Utc::now()),
  };
  conn.execute(
    "INSERT INTO couple_members (couple_id, user_id, joined_at) VALUES (?1, ?2, ?3)",
    rusqlite::params![raw.couple_id, raw.user_id, raw.joined_at],
  )?;
  Ok(raw)
}

fn select_entry(conn: &rusqlite::Connection, entry_id: &str) -> rusqlite::Result<Option<RawEntry>> {
  conn
    .query_row(
      &format!("SELECT {ENTRY_COLUMNS} FROM entries WHERE entry_id = ?1"),
      rusqlite::params![entry_id],
      RawEntry::from_row,
    )
    .optional()
}

// ─── TimelineStore impl ──────────────────────────────────────────────────────

impl TimelineStore for SqliteStore {
  type Error = Error;

  // ── Memberships ───────────────────────────────────────────────────────────

  async fn find_membership(&self, couple_id: Uuid, user_id: Uuid) -> Result<Option<Membership>> {
    let couple_str = encode_uuid(couple_id);
    let user_str   = encode_uuid(user_id);

    let raw: Option<RawMembership> = self
      .conn
      .call(move |conn| {
        Ok(conn
          .query_row(
            &format!(
              "SELECT {MEMBERSHIP_COLUMNS} FROM couple_members
               WHERE couple_id = ?1 AND user_id = ?2"
            ),
            rusqlite::params![couple_str, user_str],
            RawMembership::from_row,
          )
          .optional()?)
      })
      .await?;

    raw.map(RawMembership::into_membership).transpose()
  }

  async fn insert_membership(&self, couple_id: Uuid, user_id: Uuid) -> Result<Membership> {
    let couple_str = encode_uuid(couple_id);
    let user_str   = encode_uuid(user_id);

    let raw = self
      .conn
      .call(move |conn| Ok(insert_member_row(conn, &couple_str, &user_str)?))
      .await?;

    raw.into_membership()
  }

  // ── Couples ───────────────────────────────────────────────────────────────

  async fn insert_couple(&self, actor: Uuid) -> Result<Couple> {
    let actor_str = encode_uuid(actor);

    let raw = self
      .conn
      .call(move |conn| Ok(insert_couple_row(conn, &actor_str)?))
      .await?;

    raw.into_couple()
  }

  async fn create_couple_and_join(&self, actor: Uuid) -> Result<Couple> {
    let actor_str = encode_uuid(actor);

    let raw = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let couple = insert_couple_row(&tx, &actor_str)?;
        insert_member_row(&tx, &couple.couple_id, &actor_str)?;
        tx.commit()?;
        Ok(couple)
      })
      .await?;

    raw.into_couple()
  }

  // ── Entries ───────────────────────────────────────────────────────────────

  async fn list_entries(&self, actor: Uuid, couple_id: Uuid) -> Result<Vec<Entry>> {
    let couple_str = encode_uuid(couple_id);
    let actor_str  = encode_uuid(actor);

    // Rows of couples the actor does not belong to are filtered, not refused.
    let raws: Vec<RawEntry> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {ENTRY_COLUMNS} FROM entries e
           WHERE e.couple_id = ?1
             AND EXISTS (
               SELECT 1 FROM couple_members m
               WHERE m.couple_id = e.couple_id AND m.user_id = ?2
             )
           ORDER BY e.created_at DESC, e.rowid DESC"
        ))?;
        let rows = stmt
          .query_map(rusqlite::params![couple_str, actor_str], RawEntry::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawEntry::into_entry).collect()
  }

  async fn insert_entry(&self, actor: Uuid, input: NewEntry) -> Result<Entry> {
    if input.created_by != actor {
      return Err(Error::RowLevelSecurity("entries"));
    }

    let raw = RawEntry {
      entry_id:   encode_uuid(Uuid::new_v4()),
      couple_id:  encode_uuid(input.couple_id),
      created_at: encode_dt(input.created_at),
      title:      input.title,
      photo_path: None,
      created_by: encode_uuid(actor),
    };

    let inserted: Option<RawEntry> = self
      .conn
      .call(move |conn| {
        if !is_member(conn, &raw.couple_id, &raw.created_by)? {
          return Ok(None);
        }
        conn.execute(
          "INSERT INTO entries (entry_id, couple_id, created_at, title, photo_path, created_by)
           VALUES (?1, ?2, ?3, ?4, NULL, ?5)",
          rusqlite::params![raw.entry_id, raw.couple_id, raw.created_at, raw.title, raw.created_by],
        )?;
        Ok(Some(raw))
      })
      .await?;

    inserted.ok_or(Error::RowLevelSecurity("entries"))?.into_entry()
  }

  async fn set_entry_photo(&self, actor: Uuid, entry_id: Uuid, photo_path: String) -> Result<Entry> {
    let entry_str = encode_uuid(entry_id);
    let actor_str = encode_uuid(actor);

    let updated: Option<RawEntry> = self
      .conn
      .call(move |conn| {
        let changed = conn.execute(
          "UPDATE entries SET photo_path = ?1
           WHERE entry_id = ?2
             AND EXISTS (
               SELECT 1 FROM couple_members m
               WHERE m.couple_id = entries.couple_id AND m.user_id = ?3
             )",
          rusqlite::params![photo_path, entry_str, actor_str],
        )?;
        if changed == 0 {
          return Ok(None);
        }
        Ok(select_entry(conn, &entry_str)?)
      })
      .await?;

    updated
      .ok_or_else(|| Error::NotFound(format!("entry {entry_id}")))?
      .into_entry()
  }
}
