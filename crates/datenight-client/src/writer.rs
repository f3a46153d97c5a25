//! Writing a new entry, with an optional photo.
//!
//! The steps run strictly in order: insert the entry, upload the photo,
//! link the photo, sign a display URL. Nothing already written is rolled
//! back when a later step fails.

use std::{sync::Arc, time::Duration};

use chrono::NaiveDate;
use datenight_core::{
  entry::{Entry, NewEntry, photo_path},
  store::{PhotoStore, PhotoUpload, TimelineStore, UploadOptions},
};
use uuid::Uuid;

use crate::{FlowConfig, FlowError, Result};

/// What the entry form submits.
#[derive(Debug, Clone)]
pub struct EntryDraft {
  pub date:  NaiveDate,
  pub title: String,
  pub photo: Option<PhotoUpload>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrittenEntry {
  pub entry:     Entry,
  /// Display URL for the photo, when one was uploaded and could be signed.
  pub photo_url: Option<String>,
}

pub struct EntryWriter<S, P> {
  store:  Arc<S>,
  photos: Arc<P>,
  ttl:    Duration,
}

impl<S: TimelineStore, P: PhotoStore> EntryWriter<S, P> {
  pub fn new(store: Arc<S>, photos: Arc<P>, config: &FlowConfig) -> Self {
    Self { store, photos, ttl: config.signed_url_ttl() }
  }

  pub async fn write(&self, actor: Uuid, couple_id: Uuid, draft: EntryDraft) -> Result<WrittenEntry> {
    let input = NewEntry::new(couple_id, actor, draft.date, &draft.title)
      .map_err(|e| FlowError::InvalidEntry(e.to_string()))?;

    let entry = self
      .store
      .insert_entry(actor, input)
      .await
      .map_err(|e| FlowError::EntryPersist(e.to_string()))?;
    tracing::info!(entry_id = %entry.entry_id, %couple_id, "entry saved");

    let Some(photo) = draft.photo else {
      return Ok(WrittenEntry { entry, photo_url: None });
    };

    let path = photo_path(couple_id, &photo.file_name);
    self
      .photos
      .upload(actor, path.clone(), photo, UploadOptions { upsert: false })
      .await
      .map_err(|e| FlowError::Upload(e.to_string()))?;

    let entry = self
      .store
      .set_entry_photo(actor, entry.entry_id, path.clone())
      .await
      .map_err(|e| FlowError::EntryPersist(e.to_string()))?;
    tracing::debug!(entry_id = %entry.entry_id, %path, "photo linked");

    let photo_url = match self.photos.create_signed_url(actor, path.clone(), self.ttl).await {
      Ok(url) => Some(url),
      Err(e) => {
        tracing::warn!(entry_id = %entry.entry_id, %path, error = %e, "could not sign photo url");
        None
      }
    };
    Ok(WrittenEntry { entry, photo_url })
  }
}

#[cfg(test)]
mod tests {
  use datenight_core::entry::parse_entry_date;

  use super::*;
  use crate::fakes::{FakePhotos, FakeStore};

  fn draft(title: &str, photo: Option<&str>) -> EntryDraft {
    EntryDraft {
      date:  parse_entry_date("2024-02-14").unwrap(),
      title: title.to_owned(),
      photo: photo.map(|name| PhotoUpload {
        file_name:    name.to_owned(),
        content_type: "image/jpeg".into(),
        bytes:        vec![0xff, 0xd8, 0xff],
      }),
    }
  }

  struct Setup {
    store:  Arc<FakeStore>,
    photos: Arc<FakePhotos>,
    alice:  Uuid,
    couple: Uuid,
  }

  impl Setup {
    fn new(store: FakeStore, photos: FakePhotos) -> Self {
      let store = Arc::new(store);
      let alice = Uuid::new_v4();
      let couple = store.seed_couple(&[alice]);
      Self { store, photos: Arc::new(photos), alice, couple }
    }

    fn writer(&self) -> EntryWriter<FakeStore, FakePhotos> {
      EntryWriter::new(self.store.clone(), self.photos.clone(), &FlowConfig::default())
    }
  }

  #[tokio::test]
  async fn entry_without_photo() {
    let s = Setup::new(FakeStore::default(), FakePhotos::default());

    let written = s.writer().write(s.alice, s.couple, draft(" Pizza + late movie ", None)).await.unwrap();

    assert_eq!(written.entry.title, "Pizza + late movie");
    assert_eq!(written.entry.photo_path, None);
    assert_eq!(written.photo_url, None);
    assert_eq!(written.entry.created_at.to_rfc3339(), "2024-02-14T12:00:00+00:00");
    assert!(s.photos.paths().is_empty());
  }

  #[tokio::test]
  async fn photo_is_uploaded_then_linked() {
    let s = Setup::new(FakeStore::default(), FakePhotos::default());
    let writer = s.writer();

    let first = writer.write(s.alice, s.couple, draft("Beach", Some("IMG.PNG"))).await.unwrap();
    let second = writer.write(s.alice, s.couple, draft("Beach again", Some("IMG.PNG"))).await.unwrap();

    let path = first.entry.photo_path.clone().unwrap();
    assert!(path.starts_with(&format!("{}/", s.couple)));
    assert!(path.ends_with(".png"));
    assert_ne!(first.entry.photo_path, second.entry.photo_path);
    assert_ne!(first.photo_url, second.photo_url);
    assert!(first.photo_url.unwrap().contains(&path));

    let stored = s.store.entries_of(s.couple);
    assert!(stored.iter().all(|e| e.photo_path.is_some()));
  }

  #[tokio::test]
  async fn blank_title_is_rejected_before_any_write() {
    let s = Setup::new(FakeStore::default(), FakePhotos::default());
    let err = s.writer().write(s.alice, s.couple, draft("   ", Some("a.jpg"))).await.unwrap_err();
    assert!(matches!(err, FlowError::InvalidEntry(_)));
    assert!(s.store.entries_of(s.couple).is_empty());
    assert!(s.photos.paths().is_empty());
  }

  #[tokio::test]
  async fn non_member_cannot_write() {
    let s = Setup::new(FakeStore::default(), FakePhotos::default());
    let err = s.writer().write(Uuid::new_v4(), s.couple, draft("Sneaky", None)).await.unwrap_err();
    assert_eq!(
      err,
      FlowError::EntryPersist("new row violates row-level security policy for table \"entries\"".into())
    );
  }

  #[tokio::test]
  async fn failed_upload_keeps_the_entry() {
    let s = Setup::new(FakeStore::default(), FakePhotos::default().failing_upload("payload too large"));

    let err = s.writer().write(s.alice, s.couple, draft("Hike", Some("a.jpg"))).await.unwrap_err();

    assert_eq!(err, FlowError::Upload("payload too large".into()));
    let stored = s.store.entries_of(s.couple);
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].photo_path, None);
  }

  #[tokio::test]
  async fn failed_link_surfaces_as_persist_error() {
    let s = Setup::new(FakeStore::default().failing_photo_link("update failed"), FakePhotos::default());
    let err = s.writer().write(s.alice, s.couple, draft("Hike", Some("a.jpg"))).await.unwrap_err();
    assert_eq!(err, FlowError::EntryPersist("update failed".into()));
    assert_eq!(s.photos.paths().len(), 1);
  }

  #[tokio::test]
  async fn unsigned_photo_still_succeeds() {
    let s = Setup::new(FakeStore::default(), FakePhotos::default().failing_sign_for(".jpg"));
    let written = s.writer().write(s.alice, s.couple, draft("Hike", Some("a.jpg"))).await.unwrap();
    assert!(written.entry.photo_path.is_some());
    assert_eq!(written.photo_url, None);
  }
}
