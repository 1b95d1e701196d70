// Backtrack - Offline Media Library Client
// Copyright (C) 2025 Henning Berge
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.


//! Local media cache
//!
//! [`MediaCache`] is the contract the acquisition manager depends on;
//! [`MediaStore`] implements it on top of the SQLite [`Database`] and also
//! owns the library entries collection.
//!
//! A missing record is `Ok(None)`. Any storage failure is an error in the
//! `Store` category and must never be read as a miss.

use crate::api::models::ContentId;
use crate::error::Result;
use crate::storage::database::Database;
use crate::storage::models::{CachedMedia, LibraryEntry, NewLibraryEntry};
use crate::storage::queries;
use async_trait::async_trait;
use tracing::{debug, info};

/// Keyed store of assembled media
///
/// Every operation is atomic per key.
#[async_trait]
pub trait MediaCache: Send + Sync {
    async fn get(&self, id: &ContentId) -> Result<Option<CachedMedia>>;

    /// Replace any existing record for `media.content_id` entirely
    async fn put(&self, media: &CachedMedia) -> Result<()>;

    /// Remove the record; removing a missing record is not an error
    async fn delete(&self, id: &ContentId) -> Result<()>;
}

/// SQLite-backed media cache and library
#[derive(Debug, Clone)]
pub struct MediaStore {
    db: Database,
}

impl MediaStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Content ids that currently have cached media
    pub async fn cached_ids(&self) -> Result<Vec<ContentId>> {
        let ids = queries::list_cached_ids(self.db.pool()).await?;
        Ok(ids.into_iter().map(ContentId::new).collect())
    }

    pub async fn total_cached_bytes(&self) -> Result<u64> {
        queries::total_cached_bytes(self.db.pool()).await
    }

    // ===== Library entries =====

    /// Add an entry; adding an id twice is an error
    pub async fn add_entry(&self, entry: &NewLibraryEntry) -> Result<LibraryEntry> {
        let entry = queries::insert_library_entry(self.db.pool(), entry).await?;
        info!(content_id = %entry.content_id, "Added library entry");
        Ok(entry)
    }

    pub async fn find_entry(&self, id: &ContentId) -> Result<Option<LibraryEntry>> {
        queries::find_library_entry(self.db.pool(), id.as_str()).await
    }

    pub async fn entry_exists(&self, id: &ContentId) -> Result<bool> {
        queries::library_entry_exists(self.db.pool(), id.as_str()).await
    }

    pub async fn list_entries(&self) -> Result<Vec<LibraryEntry>> {
        queries::list_library_entries(self.db.pool()).await
    }

    /// Remove an entry and its cached media in one transaction
    pub async fn remove_entry(&self, id: &ContentId) -> Result<bool> {
        let removed = queries::delete_library_entry(self.db.pool(), id.as_str()).await?;
        info!(content_id = %id, removed, "Removed library entry");
        Ok(removed)
    }
}

#[async_trait]
impl MediaCache for MediaStore {
    async fn get(&self, id: &ContentId) -> Result<Option<CachedMedia>> {
        let media = queries::find_cached_media(self.db.pool(), id.as_str()).await?;
        debug!(content_id = %id, hit = media.is_some(), "Cache lookup");
        Ok(media)
    }

    async fn put(&self, media: &CachedMedia) -> Result<()> {
        queries::replace_cached_media(self.db.pool(), media).await?;
        info!(content_id = %media.content_id, bytes = media.byte_size(), "Cached media");
        Ok(())
    }

    async fn delete(&self, id: &ContentId) -> Result<()> {
        let removed = queries::delete_cached_media(self.db.pool(), id.as_str()).await?;
        debug!(content_id = %id, removed, "Deleted cached media");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCategory;
    use crate::storage::models::MediaTrack;

    fn track(bytes: Vec<u8>, mime_type: &str, format_id: &str) -> MediaTrack {
        MediaTrack {
            bytes,
            mime_type: mime_type.to_string(),
            format_id: format_id.to_string(),
        }
    }

    async fn store() -> MediaStore {
        MediaStore::new(Database::new_in_memory().await.expect("Failed to create database"))
    }

    #[tokio::test]
    async fn test_get_put_delete() {
        let store = store().await;
        let id = ContentId::new("dQw4w9WgXcQ");

        assert!(store.get(&id).await.unwrap().is_none());

        let media = CachedMedia::new(
            &id,
            track(vec![7; 1024], "video/webm", "243"),
            track(vec![9; 256], "audio/webm", "251"),
        );
        store.put(&media).await.unwrap();

        let cached = store.get(&id).await.unwrap().expect("Media not cached");
        assert_eq!(cached.video, media.video);
        assert_eq!(cached.audio, media.audio);
        assert_eq!(cached.video_mime_type, "video/webm");
        assert_eq!(store.cached_ids().await.unwrap(), vec![id.clone()]);
        assert_eq!(store.total_cached_bytes().await.unwrap(), 1280);

        store.delete(&id).await.unwrap();
        assert!(store.get(&id).await.unwrap().is_none());

        // Deleting again is fine
        store.delete(&id).await.unwrap();
    }

    #[tokio::test]
    async fn test_remove_entry_cascades_to_media() {
        let store = store().await;
        let id = ContentId::new("dQw4w9WgXcQ");

        store
            .add_entry(&NewLibraryEntry::new(&id, "Title".to_string(), "Author".to_string()))
            .await
            .unwrap();
        store
            .put(&CachedMedia::new(&id, track(vec![1], "video/webm", "243"), track(vec![2], "audio/webm", "251")))
            .await
            .unwrap();

        assert!(store.entry_exists(&id).await.unwrap());
        assert!(store.remove_entry(&id).await.unwrap());
        assert!(!store.entry_exists(&id).await.unwrap());
        assert!(store.get(&id).await.unwrap().is_none());
        assert!(store.list_entries().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_closed_store_is_an_error_not_a_miss() {
        let store = store().await;
        store.database().pool().close().await;

        let err = store.get(&ContentId::new("dQw4w9WgXcQ")).await.unwrap_err();
        assert_eq!(err.category(), ErrorCategory::Store);
    }
}
