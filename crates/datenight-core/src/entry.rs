//! Timeline entries and photo paths.

use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone as _, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Error, Result};

/// Extension used when an uploaded file name carries none.
pub const DEFAULT_PHOTO_EXT: &str = "jpg";

/// One dated, titled record in a couple's timeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
  pub entry_id:   Uuid,
  pub couple_id:  Uuid,
  /// Display date, normalised by [`entry_timestamp`].
  pub created_at: DateTime<Utc>,
  pub title:      String,
  /// Object-store path, back-filled after an upload.
  pub photo_path: Option<String>,
  pub created_by: Uuid,
}

/// Input for inserting an entry. The store assigns the id.
#[derive(Debug, Clone)]
pub struct NewEntry {
  pub couple_id:  Uuid,
  pub created_at: DateTime<Utc>,
  pub title:      String,
  pub created_by: Uuid,
}

impl NewEntry {
  /// Build an entry for `date`, trimming the title and rejecting blanks.
  pub fn new(couple_id: Uuid, created_by: Uuid, date: NaiveDate, title: &str) -> Result<Self> {
    let title = title.trim();
    if title.is_empty() {
      return Err(Error::EmptyTitle);
    }
    Ok(Self {
      couple_id,
      created_at: entry_timestamp(date),
      title: title.to_owned(),
      created_by,
    })
  }
}

/// Day-precision dates are pinned to noon UTC so that rendering in any
/// timezone within ±11h shows the same calendar day.
pub fn entry_timestamp(date: NaiveDate) -> DateTime<Utc> {
  let noon = NaiveTime::from_hms_opt(12, 0, 0).unwrap_or_default();
  Utc.from_utc_datetime(&date.and_time(noon))
}

/// Parse a `YYYY-MM-DD` form value.
pub fn parse_entry_date(s: &str) -> Result<NaiveDate> {
  NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").map_err(|_| Error::InvalidDate(s.to_owned()))
}

/// Today's date, the default for a new entry.
pub fn today() -> NaiveDate { Utc::now().date_naive() }

/// Generate a fresh object-store path for a photo belonging to `couple_id`.
///
/// The first segment is always the couple id; the storage policy authorises
/// uploads by it. The file name is random, keeping the original extension.
pub fn photo_path(couple_id: Uuid, file_name: &str) -> String {
  let ext = photo_extension(file_name);
  format!("{couple_id}/{}.{ext}", Uuid::new_v4())
}

fn photo_extension(file_name: &str) -> String {
  file_name
    .rsplit_once('.')
    .map(|(_, ext)| ext.trim().to_ascii_lowercase())
    .filter(|ext| !ext.is_empty() && ext.chars().all(|c| c.is_ascii_alphanumeric()))
    .unwrap_or_else(|| DEFAULT_PHOTO_EXT.to_owned())
}

/// The couple id a photo path is scoped under, if it has one.
pub fn photo_path_couple(path: &str) -> Option<Uuid> {
  let (first, _) = path.split_once('/')?;
  Uuid::parse_str(first).ok()
}

#[cfg(test)]
mod tests {
  use chrono::Timelike as _;

  use super::*;

  #[test]
  fn timestamp_is_noon_utc() {
    let date = NaiveDate::from_ymd_opt(2024, 2, 14).unwrap();
    let ts = entry_timestamp(date);
    assert_eq!(ts.date_naive(), date);
    assert_eq!(ts.hour(), 12);
    assert_eq!(ts.to_rfc3339(), "2024-02-14T12:00:00+00:00");
  }

  #[test]
  fn new_entry_trims_and_rejects_blank_titles() {
    let date = parse_entry_date("2024-02-14").unwrap();
    let entry = NewEntry::new(Uuid::new_v4(), Uuid::new_v4(), date, "  Pizza + late movie ").unwrap();
    assert_eq!(entry.title, "Pizza + late movie");
    assert!(matches!(
      NewEntry::new(Uuid::new_v4(), Uuid::new_v4(), date, "   "),
      Err(Error::EmptyTitle)
    ));
  }

  #[test]
  fn bad_dates_are_rejected() {
    assert!(matches!(parse_entry_date("14/02/2024"), Err(Error::InvalidDate(_))));
  }

  #[test]
  fn photo_paths_keep_extension_under_couple() {
    let couple = Uuid::new_v4();
    let a = photo_path(couple, "Beach.PNG");
    let b = photo_path(couple, "Beach.PNG");
    assert!(a.starts_with(&format!("{couple}/")));
    assert!(a.ends_with(".png"));
    assert_ne!(a, b);
    assert_eq!(photo_path_couple(&a), Some(couple));
  }

  #[test]
  fn photo_paths_default_extension() {
    assert!(photo_path(Uuid::new_v4(), "IMG_0001").ends_with(".jpg"));
    assert!(photo_path(Uuid::new_v4(), "weird.").ends_with(".jpg"));
  }
}
