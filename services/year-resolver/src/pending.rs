//! 
//! src/pending.rs  
//! 
//! SQLite store for albums waiting on a human to confirm their year. One row 
//! per artist/album; re-flagging an album refreshes its row. 
//!

use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use serde_json::Value;
use sqlx::{sqlite::SqliteConnectOptions, sqlite::SqlitePoolOptions, Pool, Row, Sqlite};
use tracing::info;
use uuid::Uuid;

use crate::errors::ResolverError;
use crate::fallback::{PendingReviewSink, VerificationReason};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PendingEntry {
    pub id: String, 
    pub artist: String, 
    pub album: String, 
    pub reason: String, 
    pub metadata: Value, 
    pub attempts: i64, 
    pub created_at: DateTime<Utc>, 
    pub recheck_after: DateTime<Utc> 
}

pub struct SqlitePendingStore {
    pool: Pool<Sqlite>
}

fn timestamp(secs: i64) -> Result<DateTime<Utc>, ResolverError> {
    DateTime::from_timestamp(secs, 0)
        .ok_or_else(|| ResolverError::Db(format!("timestamp out of range: {secs}")))
}

impl SqlitePendingStore {
    async fn ensure_schema(pool: &Pool<Sqlite>) -> Result<(), ResolverError> {
        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS pending_verification (
              id             TEXT PRIMARY KEY, 
              artist         TEXT NOT NULL, 
              album          TEXT NOT NULL, 
              reason         TEXT NOT NULL, 
              metadata       TEXT NOT NULL, 
              attempts       INTEGER NOT NULL DEFAULT 1, 
              created_at     INTEGER NOT NULL, 
              updated_at     INTEGER NOT NULL, 
              recheck_after  INTEGER NOT NULL, 
              UNIQUE(artist, album)
            );
            "
        )
        .execute(pool)
        .await?; 

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_pending_recheck ON pending_verification(recheck_after);"
        )
        .execute(pool)
        .await?; 
        Ok(())
    }

    pub async fn init(database_url: &str) -> Result<Self, ResolverError> {
        let is_memory = database_url == "sqlite::memory:";

        let mut opts = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true);

        // WAL is file-only 
        if !is_memory {
            opts = opts.journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
                       .synchronous(sqlx::sqlite::SqliteSynchronous::Normal);
        }

        let pool = SqlitePoolOptions::new()
            .min_connections(1)
            .max_connections(if is_memory {1} else {4})
            .connect_with(opts)
            .await?;

        Self::ensure_schema(&pool).await?;
        Ok(Self { pool })
    }

    pub async fn upsert(
        &self, 
        artist: &str, 
        album: &str, 
        reason: VerificationReason, 
        metadata: &Value, 
        recheck_days: u32 
    ) -> Result<(), ResolverError> {
        let now = Utc::now();
        let recheck_after = now + Duration::days(i64::from(recheck_days));
        sqlx::query(
            r"
            INSERT INTO pending_verification (
                id, artist, album, reason, metadata, attempts, 
                created_at, updated_at, recheck_after
            ) VALUES (?1, ?2, ?3, ?4, ?5, 1, ?6, ?6, ?7)
            ON CONFLICT(artist, album) DO UPDATE SET 
                reason = excluded.reason, 
                metadata = excluded.metadata, 
                attempts = attempts + 1, 
                updated_at = excluded.updated_at, 
                recheck_after = excluded.recheck_after;
            "
        )
        .bind(Uuid::new_v4().to_string())
        .bind(artist)
        .bind(album)
        .bind(reason.as_str())
        .bind(serde_json::to_string(metadata)?)
        .bind(now.timestamp())
        .bind(recheck_after.timestamp())
        .execute(&self.pool)
        .await?; 
        Ok(())
    }

    /// Entries whose recheck time is at or before `at`, oldest first 
    pub async fn list_due_at(&self, at: DateTime<Utc>) -> Result<Vec<PendingEntry>, ResolverError> {
        let rows = sqlx::query(
            r"
            SELECT id, artist, album, reason, metadata, attempts, created_at, recheck_after 
              FROM pending_verification 
             WHERE recheck_after <= ?1 
             ORDER BY recheck_after ASC, created_at ASC;
            "
        )
        .bind(at.timestamp())
        .fetch_all(&self.pool)
        .await?; 

        rows.into_iter().map(|row| -> Result<PendingEntry, ResolverError> {
            let metadata: String = row.try_get("metadata")?;
            Ok(PendingEntry {
                id: row.try_get("id")?, 
                artist: row.try_get("artist")?, 
                album: row.try_get("album")?, 
                reason: row.try_get("reason")?, 
                metadata: serde_json::from_str(&metadata)?, 
                attempts: row.try_get("attempts")?, 
                created_at: timestamp(row.try_get("created_at")?)?, 
                recheck_after: timestamp(row.try_get("recheck_after")?)? 
            })
        }).collect()
    }

    pub async fn list_due(&self) -> Result<Vec<PendingEntry>, ResolverError> {
        self.list_due_at(Utc::now()).await 
    }

    /// Drops an album once its year has been confirmed 
    pub async fn remove(&self, artist: &str, album: &str) -> Result<bool, ResolverError> {
        let done = sqlx::query("DELETE FROM pending_verification WHERE artist = ?1 AND album = ?2;")
            .bind(artist)
            .bind(album)
            .execute(&self.pool)
            .await?; 
        Ok(done.rows_affected() > 0)
    }

    pub async fn count(&self) -> Result<i64, ResolverError> {
        let count = sqlx::query_scalar("SELECT COUNT(*) FROM pending_verification;")
            .fetch_one(&self.pool)
            .await?; 
        Ok(count)
    }
}

#[async_trait]
impl PendingReviewSink for SqlitePendingStore {
    async fn mark_for_verification(
        &self, 
        artist: &str, 
        album: &str, 
        reason: VerificationReason, 
        metadata: Value, 
        recheck_days: u32 
    ) -> Result<(), ResolverError> {
        self.upsert(artist, album, reason, &metadata, recheck_days).await?; 
        info!(artist = %artist, album = %album, reason = %reason, recheck_days, 
            "pending.marked");
        Ok(())
    }
}
