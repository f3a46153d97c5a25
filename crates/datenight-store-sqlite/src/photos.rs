//! Photo blobs stored alongside the relational data, served through signed
//! URLs.

use std::time::Duration;

use chrono::Utc;
use datenight_core::{
  entry::photo_path_couple,
  store::{PhotoStore, PhotoUpload, UploadOptions},
};
use rusqlite::OptionalExtension as _;
use uuid::Uuid;

use crate::{
  encode::{encode_dt, encode_uuid},
  store::is_member,
  Error, Result, SqliteStore,
};

/// A photo as read back through a signed URL.
#[derive(Debug, Clone)]
pub struct StoredPhoto {
  pub content_type: String,
  pub bytes:        Vec<u8>,
}

enum UploadOutcome {
  Stored,
  Forbidden,
  Exists,
}

impl SqliteStore {
  /// Read a photo after checking the signature presented with its URL.
  pub async fn read_signed_photo(&self, path: &str, expires: i64, sig: &str) -> Result<StoredPhoto> {
    self.signer.verify_photo(path, expires, sig, Utc::now())?;

    let path_owned = path.to_owned();
    let photo: Option<StoredPhoto> = self
      .conn
      .call(move |conn| {
        Ok(conn
          .query_row(
            "SELECT content_type, bytes FROM photos WHERE path = ?1",
            rusqlite::params![path_owned],
            |r| Ok(StoredPhoto { content_type: r.get(0)?, bytes: r.get(1)? }),
          )
          .optional()?)
      })
      .await?;

    photo.ok_or_else(|| Error::NotFound(format!("object {path}")))
  }
}

impl PhotoStore for SqliteStore {
  type Error = Error;

  async fn upload(
    &self,
    actor:   Uuid,
    path:    String,
    photo:   PhotoUpload,
    options: UploadOptions,
  ) -> Result<()> {
    let couple_id = photo_path_couple(&path).ok_or(Error::RowLevelSecurity("objects"))?;
    let couple_str = encode_uuid(couple_id);
    let actor_str  = encode_uuid(actor);
    let now_str    = encode_dt(Utc::now());
    let size       = photo.bytes.len();
    let path_row   = path.clone();

    let outcome = self
      .conn
      .call(move |conn| {
        if !is_member(conn, &couple_str, &actor_str)? {
          return Ok(UploadOutcome::Forbidden);
        }
        let exists: bool = conn.query_row(
          "SELECT EXISTS(SELECT 1 FROM photos WHERE path = ?1)",
          rusqlite::params![path_row],
          |r| r.get(0),
        )?;
        if exists && !options.upsert {
          return Ok(UploadOutcome::Exists);
        }
        conn.execute(
          "INSERT INTO photos (path, couple_id, content_type, bytes, uploaded_by, created_at)
           VALUES (?1, ?2, ?3, ?4, ?5, ?6)
           ON CONFLICT (path) DO UPDATE SET
             content_type = excluded.content_type,
             bytes = excluded.bytes,
             uploaded_by = excluded.uploaded_by,
             created_at = excluded.created_at",
          rusqlite::params![path_row, couple_str, photo.content_type, photo.bytes, actor_str, now_str],
        )?;
        Ok(UploadOutcome::Stored)
      })
      .await?;

    match outcome {
      UploadOutcome::Stored => {
        tracing::debug!(%path, size, "photo stored");
        Ok(())
      }
      UploadOutcome::Forbidden => Err(Error::RowLevelSecurity("objects")),
      UploadOutcome::Exists => Err(Error::ResourceExists),
    }
  }

  async fn create_signed_url(&self, actor: Uuid, path: String, ttl: Duration) -> Result<String> {
    let actor_str = encode_uuid(actor);
    let path_row  = path.clone();

    let visible: bool = self
      .conn
      .call(move |conn| {
        let couple: Option<String> = conn
          .query_row(
            "SELECT couple_id FROM photos WHERE path = ?1",
            rusqlite::params![path_row],
            |r| r.get(0),
          )
          .optional()?;
        match couple {
          Some(c) => Ok(is_member(conn, &c, &actor_str)?),
          None => Ok(false),
        }
      })
      .await?;

    if !visible {
      return Err(Error::NotFound(format!("object {path}")));
    }

    let ttl = chrono::Duration::from_std(ttl).map_err(|e| Error::DateParse(e.to_string()))?;
    self.signer.sign_photo(&path, Utc::now() + ttl)
  }
}
