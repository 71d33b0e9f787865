//! Durable `SQLite` insight store.
//!
//! Insights stay retrievable here whether or not the live push reached a
//! subscriber: delivery loss on the stream is an accepted degradation, the
//! store is the source of truth.

use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;

use super::{Insight, InsightLevel, InsightPayload, InsightType, NewInsight};
use crate::error::StorageError;

/// Per-user insight counters for the stats endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InsightStats {
    /// Non-expired insights stored for the user.
    pub total_insights: i64,
    /// Non-expired unread insights.
    pub unread_count: i64,
    /// Counts keyed by insight type tag.
    pub by_type: HashMap<String, i64>,
    /// Counts keyed by level tag.
    pub by_level: HashMap<String, i64>,
    /// Insights created in the last 24 hours.
    pub recent_count: i64,
}

/// `SQLite`-backed insight store.
#[derive(Debug, Clone)]
pub struct InsightStore {
    pool: SqlitePool,
}

impl InsightStore {
    /// Open (or create) the store at `database_path` and run migrations.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::ConnectionFailed`] if the connection fails,
    /// or [`StorageError::MigrationFailed`] if the schema cannot be applied.
    pub async fn new(database_path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let path = database_path.as_ref();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| StorageError::ConnectionFailed {
                message: format!("Failed to create database directory: {e}"),
            })?;
        }

        let options =
            SqliteConnectOptions::from_str(&format!("sqlite://{}?mode=rwc", path.display()))
                .map_err(|e| StorageError::ConnectionFailed {
                    message: format!("Invalid database path: {e}"),
                })?
                .journal_mode(SqliteJournalMode::Wal)
                .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(|e| StorageError::ConnectionFailed {
                message: format!("Failed to connect to database: {e}"),
            })?;

        let store = Self { pool };
        store.run_migrations().await?;
        Ok(store)
    }

    /// Create an in-memory store for testing and the standalone binary.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::ConnectionFailed`] if the connection fails.
    pub async fn new_in_memory() -> Result<Self, StorageError> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(|e| StorageError::ConnectionFailed {
                message: format!("Invalid memory database options: {e}"),
            })?
            .journal_mode(SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .map_err(|e| StorageError::ConnectionFailed {
                message: format!("Failed to create in-memory database: {e}"),
            })?;

        let store = Self { pool };
        store.run_migrations().await?;
        Ok(store)
    }

    async fn run_migrations(&self) -> Result<(), StorageError> {
        let schema = include_str!("../../migrations/001_insights.sql");
        sqlx::query(schema)
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::MigrationFailed {
                version: "001".to_string(),
                message: format!("Failed to run migration 001: {e}"),
            })?;
        Ok(())
    }

    /// Persist a new insight, returning it with its assigned id.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::QueryFailed`] if the insert fails.
    pub async fn insert(&self, new: &NewInsight) -> Result<Insight, StorageError> {
        let created_at = Utc::now();
        let payload = serde_json::to_string(&new.payload).map_err(|e| {
            StorageError::QueryFailed {
                message: format!("Failed to encode payload: {e}"),
            }
        })?;

        let result = sqlx::query(
            "INSERT INTO insights \
             (user_id, insight_type, level, title, message, payload, action_url, is_read, created_at, expires_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, 0, ?, ?)",
        )
        .bind(new.user_id)
        .bind(new.insight_type.as_str())
        .bind(new.level.as_str())
        .bind(&new.title)
        .bind(&new.message)
        .bind(&payload)
        .bind(&new.action_url)
        .bind(created_at)
        .bind(new.expires_at)
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::QueryFailed {
            message: format!("Failed to insert insight: {e}"),
        })?;

        Ok(Insight {
            id: result.last_insert_rowid(),
            user_id: new.user_id,
            insight_type: new.insight_type,
            level: new.level,
            title: new.title.clone(),
            message: new.message.clone(),
            payload: new.payload.clone(),
            action_url: new.action_url.clone(),
            is_read: false,
            created_at,
            expires_at: new.expires_at,
        })
    }

    /// List a user's non-expired insights, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::QueryFailed`] if the query fails.
    pub async fn list(
        &self,
        user_id: i64,
        limit: Option<u32>,
        only_unread: bool,
    ) -> Result<Vec<Insight>, StorageError> {
        let mut sql = String::from(
            "SELECT id, user_id, insight_type, level, title, message, payload, \
             action_url, is_read, created_at, expires_at \
             FROM insights WHERE user_id = ? \
             AND (expires_at IS NULL OR expires_at > ?)",
        );
        if only_unread {
            sql.push_str(" AND is_read = 0");
        }
        sql.push_str(" ORDER BY created_at DESC, id DESC");
        if limit.is_some() {
            sql.push_str(" LIMIT ?");
        }

        let mut query = sqlx::query(&sql).bind(user_id).bind(Utc::now());
        if let Some(limit) = limit {
            query = query.bind(i64::from(limit));
        }

        let rows = query
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StorageError::QueryFailed {
                message: format!("Failed to list insights: {e}"),
            })?;

        rows.iter().map(map_row).collect()
    }

    /// Total and unread counts of non-expired insights for a user.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::QueryFailed`] if the query fails.
    pub async fn counts(&self, user_id: i64) -> Result<(i64, i64), StorageError> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS total, \
             COALESCE(SUM(CASE WHEN is_read = 0 THEN 1 ELSE 0 END), 0) AS unread \
             FROM insights WHERE user_id = ? \
             AND (expires_at IS NULL OR expires_at > ?)",
        )
        .bind(user_id)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| StorageError::QueryFailed {
            message: format!("Failed to count insights: {e}"),
        })?;

        let total: i64 = row.try_get("total").unwrap_or(0);
        let unread: i64 = row.try_get("unread").unwrap_or(0);
        Ok((total, unread))
    }

    /// Mark the given insights read for `user_id`, returning how many rows
    /// changed. Ids belonging to other users are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::QueryFailed`] if the update fails.
    pub async fn mark_read(&self, user_id: i64, ids: &[i64]) -> Result<u64, StorageError> {
        if ids.is_empty() {
            return Ok(0);
        }

        let placeholders = vec!["?"; ids.len()].join(", ");
        let sql = format!(
            "UPDATE insights SET is_read = 1 WHERE user_id = ? AND id IN ({placeholders})"
        );

        let mut query = sqlx::query(&sql).bind(user_id);
        for id in ids {
            query = query.bind(id);
        }

        let result = query
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::QueryFailed {
                message: format!("Failed to mark insights read: {e}"),
            })?;
        Ok(result.rows_affected())
    }

    /// Per-user counters for the stats endpoint.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::QueryFailed`] if a query fails.
    pub async fn stats(&self, user_id: i64) -> Result<InsightStats, StorageError> {
        let now = Utc::now();
        let rows = sqlx::query(
            "SELECT insight_type, level, is_read, created_at \
             FROM insights WHERE user_id = ? \
             AND (expires_at IS NULL OR expires_at > ?)",
        )
        .bind(user_id)
        .bind(now)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StorageError::QueryFailed {
            message: format!("Failed to load insight stats: {e}"),
        })?;

        let mut stats = InsightStats {
            total_insights: 0,
            unread_count: 0,
            by_type: HashMap::new(),
            by_level: HashMap::new(),
            recent_count: 0,
        };
        let recent_cutoff = now - Duration::hours(24);

        for row in &rows {
            stats.total_insights += 1;
            let insight_type: String = row.try_get("insight_type").unwrap_or_default();
            let level: String = row.try_get("level").unwrap_or_default();
            let is_read: bool = row.try_get("is_read").unwrap_or(false);
            let created_at: DateTime<Utc> = row.try_get("created_at").unwrap_or(now);

            *stats.by_type.entry(insight_type).or_insert(0) += 1;
            *stats.by_level.entry(level).or_insert(0) += 1;
            if !is_read {
                stats.unread_count += 1;
            }
            if created_at > recent_cutoff {
                stats.recent_count += 1;
            }
        }

        Ok(stats)
    }

    /// Delete every insight whose `expires_at` is at or before `now`,
    /// returning how many were removed.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::QueryFailed`] if the delete fails.
    pub async fn delete_expired(&self, now: DateTime<Utc>) -> Result<u64, StorageError> {
        let result =
            sqlx::query("DELETE FROM insights WHERE expires_at IS NOT NULL AND expires_at <= ?")
                .bind(now)
                .execute(&self.pool)
                .await
                .map_err(|e| StorageError::QueryFailed {
                    message: format!("Failed to delete expired insights: {e}"),
                })?;
        Ok(result.rows_affected())
    }
}

fn map_row(row: &SqliteRow) -> Result<Insight, StorageError> {
    let type_tag: String = row.try_get("insight_type").map_err(map_column_err)?;
    let level_tag: String = row.try_get("level").map_err(map_column_err)?;
    let payload_json: String = row.try_get("payload").map_err(map_column_err)?;

    let insight_type =
        InsightType::parse(&type_tag).ok_or_else(|| StorageError::QueryFailed {
            message: format!("Unknown insight type tag: {type_tag}"),
        })?;
    let level = InsightLevel::parse(&level_tag).ok_or_else(|| StorageError::QueryFailed {
        message: format!("Unknown insight level tag: {level_tag}"),
    })?;
    let payload: InsightPayload =
        serde_json::from_str(&payload_json).map_err(|e| StorageError::QueryFailed {
            message: format!("Failed to decode payload: {e}"),
        })?;

    Ok(Insight {
        id: row.try_get("id").map_err(map_column_err)?,
        user_id: row.try_get("user_id").map_err(map_column_err)?,
        insight_type,
        level,
        title: row.try_get("title").map_err(map_column_err)?,
        message: row.try_get("message").map_err(map_column_err)?,
        payload,
        action_url: row.try_get("action_url").map_err(map_column_err)?,
        is_read: row.try_get("is_read").map_err(map_column_err)?,
        created_at: row.try_get("created_at").map_err(map_column_err)?,
        expires_at: row.try_get("expires_at").map_err(map_column_err)?,
    })
}

fn map_column_err(e: sqlx::Error) -> StorageError {
    StorageError::QueryFailed {
        message: format!("Failed to read insight column: {e}"),
    }
}
