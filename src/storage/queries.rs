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


//! Database query functions
//!
//! # Query Patterns
//! - One free function per operation, taking the pool
//! - Multi-statement writes run in a single transaction
//! - Absence is `Ok(None)` / `Ok(false)`, never an error

use crate::error::{BacktrackError, Result};
use crate::storage::models::*;
use chrono::Utc;
use sqlx::SqlitePool;

// ============================================================================
// LIBRARY ENTRY QUERIES
// ============================================================================

/// Insert a new library entry
///
/// # Errors
/// `InvalidInput` if an entry with the same content id already exists
pub async fn insert_library_entry(pool: &SqlitePool, entry: &NewLibraryEntry) -> Result<LibraryEntry> {
    let added_at = Utc::now();

    let result = sqlx::query(
        r#"
        INSERT INTO library_entries (content_id, title, author, description, added_at)
        VALUES (?, ?, ?, ?, ?)
        "#,
    )
    .bind(&entry.content_id)
    .bind(&entry.title)
    .bind(&entry.author)
    .bind(&entry.description)
    .bind(added_at)
    .execute(pool)
    .await;

    match result {
        Ok(_) => Ok(LibraryEntry {
            content_id: entry.content_id.clone(),
            title: entry.title.clone(),
            author: entry.author.clone(),
            description: entry.description.clone(),
            added_at,
        }),
        Err(sqlx::Error::Database(e)) if e.is_unique_violation() => Err(BacktrackError::InvalidInput(
            format!("Library entry already exists: {}", entry.content_id),
        )),
        Err(e) => Err(e.into()),
    }
}

/// Find library entry by content id
pub async fn find_library_entry(pool: &SqlitePool, content_id: &str) -> Result<Option<LibraryEntry>> {
    let entry = sqlx::query_as::<_, LibraryEntry>("SELECT * FROM library_entries WHERE content_id = ?")
        .bind(content_id)
        .fetch_optional(pool)
        .await?;

    Ok(entry)
}

pub async fn library_entry_exists(pool: &SqlitePool, content_id: &str) -> Result<bool> {
    let exists: i64 = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM library_entries WHERE content_id = ?)")
        .bind(content_id)
        .fetch_one(pool)
        .await?;

    Ok(exists != 0)
}

/// List library entries, most recently added first
pub async fn list_library_entries(pool: &SqlitePool) -> Result<Vec<LibraryEntry>> {
    let entries = sqlx::query_as::<_, LibraryEntry>(
        "SELECT * FROM library_entries ORDER BY added_at DESC, content_id ASC",
    )
    .fetch_all(pool)
    .await?;

    Ok(entries)
}

/// Delete a library entry together with its cached media
///
/// Returns whether an entry was removed.
pub async fn delete_library_entry(pool: &SqlitePool, content_id: &str) -> Result<bool> {
    let mut tx = pool.begin().await?;

    sqlx::query("DELETE FROM media_binaries WHERE content_id = ?")
        .bind(content_id)
        .execute(&mut *tx)
        .await?;

    let result = sqlx::query("DELETE FROM library_entries WHERE content_id = ?")
        .bind(content_id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;

    Ok(result.rows_affected() > 0)
}

// ============================================================================
// MEDIA BINARY QUERIES
// ============================================================================

/// Find cached media by content id
pub async fn find_cached_media(pool: &SqlitePool, content_id: &str) -> Result<Option<CachedMedia>> {
    let media = sqlx::query_as::<_, CachedMedia>("SELECT * FROM media_binaries WHERE content_id = ?")
        .bind(content_id)
        .fetch_optional(pool)
        .await?;

    Ok(media)
}

/// Replace the cached media of a content id
///
/// Delete and insert run in one transaction, so a reader sees either the
/// previous record, no record, or the complete new one.
pub async fn replace_cached_media(pool: &SqlitePool, media: &CachedMedia) -> Result<()> {
    let mut tx = pool.begin().await?;

    sqlx::query("DELETE FROM media_binaries WHERE content_id = ?")
        .bind(&media.content_id)
        .execute(&mut *tx)
        .await?;

    sqlx::query(
        r#"
        INSERT INTO media_binaries (
            content_id, video, video_mime_type, video_format_id,
            audio, audio_mime_type, audio_format_id, cached_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&media.content_id)
    .bind(&media.video)
    .bind(&media.video_mime_type)
    .bind(&media.video_format_id)
    .bind(&media.audio)
    .bind(&media.audio_mime_type)
    .bind(&media.audio_format_id)
    .bind(media.cached_at)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    Ok(())
}

/// Delete cached media; returns whether a record was removed
pub async fn delete_cached_media(pool: &SqlitePool, content_id: &str) -> Result<bool> {
    let result = sqlx::query("DELETE FROM media_binaries WHERE content_id = ?")
        .bind(content_id)
        .execute(pool)
        .await?;

    Ok(result.rows_affected() > 0)
}

/// Content ids with cached media, ascending
pub async fn list_cached_ids(pool: &SqlitePool) -> Result<Vec<String>> {
    let ids: Vec<String> = sqlx::query_scalar("SELECT content_id FROM media_binaries ORDER BY content_id")
        .fetch_all(pool)
        .await?;

    Ok(ids)
}

/// Sum of all cached payload sizes, without loading any payload
pub async fn total_cached_bytes(pool: &SqlitePool) -> Result<u64> {
    let total: i64 = sqlx::query_scalar(
        "SELECT COALESCE(SUM(length(video) + length(audio)), 0) FROM media_binaries",
    )
    .fetch_one(pool)
    .await?;

    Ok(total as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::models::ContentId;
    use crate::storage::Database;

    fn media(id: &str, video: Vec<u8>, audio: Vec<u8>) -> CachedMedia {
        CachedMedia::new(
            &ContentId::new(id),
            MediaTrack {
                bytes: video,
                mime_type: "video/webm".to_string(),
                format_id: "243".to_string(),
            },
            MediaTrack {
                bytes: audio,
                mime_type: "audio/webm".to_string(),
                format_id: "251".to_string(),
            },
        )
    }

    fn entry(id: &str, title: &str) -> NewLibraryEntry {
        NewLibraryEntry::new(&ContentId::new(id), title.to_string(), "Author".to_string())
    }

    #[tokio::test]
    async fn test_insert_and_find_entry() {
        let db = Database::new_in_memory().await.expect("Failed to create database");

        let inserted = insert_library_entry(db.pool(), &entry("aaaaaaaaaaa", "First"))
            .await
            .expect("Failed to insert entry");

        let found = find_library_entry(db.pool(), "aaaaaaaaaaa")
            .await
            .expect("Failed to query entry")
            .expect("Entry not found");

        assert_eq!(found.title, inserted.title);
        assert_eq!(found.author, "Author");
        assert!((found.added_at - inserted.added_at).num_seconds().abs() <= 1);
        assert!(library_entry_exists(db.pool(), "aaaaaaaaaaa").await.unwrap());
        assert!(!library_entry_exists(db.pool(), "bbbbbbbbbbb").await.unwrap());
    }

    #[tokio::test]
    async fn test_duplicate_entry_is_rejected() {
        let db = Database::new_in_memory().await.unwrap();
        insert_library_entry(db.pool(), &entry("aaaaaaaaaaa", "First")).await.unwrap();

        let err = insert_library_entry(db.pool(), &entry("aaaaaaaaaaa", "Again"))
            .await
            .unwrap_err();
        assert!(matches!(err, BacktrackError::InvalidInput(_)));

        let found = find_library_entry(db.pool(), "aaaaaaaaaaa").await.unwrap().unwrap();
        assert_eq!(found.title, "First");
    }

    #[tokio::test]
    async fn test_list_entries() {
        let db = Database::new_in_memory().await.unwrap();
        insert_library_entry(db.pool(), &entry("aaaaaaaaaaa", "A")).await.unwrap();
        insert_library_entry(db.pool(), &entry("bbbbbbbbbbb", "B")).await.unwrap();

        let entries = list_library_entries(db.pool()).await.unwrap();
        assert_eq!(entries.len(), 2);
    }

    #[tokio::test]
    async fn test_replace_media_overwrites_whole_record() {
        let db = Database::new_in_memory().await.unwrap();

        replace_cached_media(db.pool(), &media("aaaaaaaaaaa", vec![1; 10], vec![2; 5]))
            .await
            .unwrap();
        replace_cached_media(db.pool(), &media("aaaaaaaaaaa", vec![3; 4], vec![4; 2]))
            .await
            .unwrap();

        let found = find_cached_media(db.pool(), "aaaaaaaaaaa").await.unwrap().unwrap();
        assert_eq!(found.video, vec![3; 4]);
        assert_eq!(found.audio, vec![4; 2]);
        assert_eq!(total_cached_bytes(db.pool()).await.unwrap(), 6);
    }

    #[tokio::test]
    async fn test_missing_media_is_none() {
        let db = Database::new_in_memory().await.unwrap();
        assert!(find_cached_media(db.pool(), "aaaaaaaaaaa").await.unwrap().is_none());
        assert!(!delete_cached_media(db.pool(), "aaaaaaaaaaa").await.unwrap());
        assert_eq!(total_cached_bytes(db.pool()).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_delete_entry_removes_media() {
        let db = Database::new_in_memory().await.unwrap();
        insert_library_entry(db.pool(), &entry("aaaaaaaaaaa", "A")).await.unwrap();
        replace_cached_media(db.pool(), &media("aaaaaaaaaaa", vec![1], vec![2])).await.unwrap();
        replace_cached_media(db.pool(), &media("bbbbbbbbbbb", vec![1], vec![2])).await.unwrap();

        assert!(delete_library_entry(db.pool(), "aaaaaaaaaaa").await.unwrap());

        assert!(find_library_entry(db.pool(), "aaaaaaaaaaa").await.unwrap().is_none());
        assert!(find_cached_media(db.pool(), "aaaaaaaaaaa").await.unwrap().is_none());
        assert_eq!(list_cached_ids(db.pool()).await.unwrap(), vec!["bbbbbbbbbbb".to_string()]);
    }
}
