use async_trait::async_trait;
use rusqlite::{params, Row};
use std::sync::Arc;

use crate::db::models::{Friend, Notification};
use crate::db::{with_conn, RepositoryError};
use crate::state::DbPool;

#[async_trait]
pub trait NotificationRepository: Send + Sync {
    /// Edges whose `user_id` is the poster; `added_by_id` is who gets told.
    async fn friends_of(&self, user_id: i64) -> Result<Vec<Friend>, RepositoryError>;

    async fn create(&self, user_id: i64, message: &str) -> Result<Notification, RepositoryError>;

    /// Newest first.
    async fn list_for_user(&self, user_id: i64) -> Result<Vec<Notification>, RepositoryError>;

    /// Idempotent: adding an existing edge returns it unchanged.
    async fn add_friend(&self, user_id: i64, added_by_id: i64) -> Result<Friend, RepositoryError>;

    /// Returns whether an edge was removed.
    async fn remove_friend(&self, user_id: i64, added_by_id: i64) -> Result<bool, RepositoryError>;
}

pub type DynNotificationRepository = Arc<dyn NotificationRepository>;

pub struct SqliteNotificationRepository {
    pool: DbPool,
}

impl SqliteNotificationRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn friend_from_row(row: &Row<'_>) -> rusqlite::Result<Friend> {
    Ok(Friend {
        id: row.get(0)?,
        user_id: row.get(1)?,
        added_by_id: row.get(2)?,
        created_at: row.get(3)?,
    })
}

fn notification_from_row(row: &Row<'_>) -> rusqlite::Result<Notification> {
    Ok(Notification {
        id: row.get(0)?,
        user_id: row.get(1)?,
        message: row.get(2)?,
        is_read: row.get(3)?,
        created_at: row.get(4)?,
    })
}

#[async_trait]
impl NotificationRepository for SqliteNotificationRepository {
    async fn friends_of(&self, user_id: i64) -> Result<Vec<Friend>, RepositoryError> {
        with_conn(&self.pool, move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, user_id, added_by_id, created_at
                 FROM friends WHERE user_id = ?1 ORDER BY id",
            )?;
            let friends = stmt
                .query_map(params![user_id], friend_from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(friends)
        })
        .await
    }

    async fn create(&self, user_id: i64, message: &str) -> Result<Notification, RepositoryError> {
        let message = message.to_string();
        with_conn(&self.pool, move |conn| {
            conn.execute(
                "INSERT INTO notifications (user_id, message) VALUES (?1, ?2)",
                params![user_id, message],
            )?;
            let notification = conn.query_row(
                "SELECT id, user_id, message, is_read, created_at
                 FROM notifications WHERE id = ?1",
                params![conn.last_insert_rowid()],
                notification_from_row,
            )?;
            Ok(notification)
        })
        .await
    }

    async fn list_for_user(&self, user_id: i64) -> Result<Vec<Notification>, RepositoryError> {
        with_conn(&self.pool, move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, user_id, message, is_read, created_at
                 FROM notifications WHERE user_id = ?1
                 ORDER BY created_at DESC, id DESC",
            )?;
            let notifications = stmt
                .query_map(params![user_id], notification_from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(notifications)
        })
        .await
    }

    async fn add_friend(&self, user_id: i64, added_by_id: i64) -> Result<Friend, RepositoryError> {
        with_conn(&self.pool, move |conn| {
            let exists: bool = conn.query_row(
                "SELECT COUNT(*) > 0 FROM users WHERE id = ?1",
                params![user_id],
                |row| row.get(0),
            )?;
            if !exists {
                return Err(RepositoryError::NotFound(format!("user {user_id}")));
            }

            conn.execute(
                "INSERT OR IGNORE INTO friends (user_id, added_by_id) VALUES (?1, ?2)",
                params![user_id, added_by_id],
            )?;
            let friend = conn.query_row(
                "SELECT id, user_id, added_by_id, created_at
                 FROM friends WHERE user_id = ?1 AND added_by_id = ?2",
                params![user_id, added_by_id],
                friend_from_row,
            )?;
            Ok(friend)
        })
        .await
    }

    async fn remove_friend(&self, user_id: i64, added_by_id: i64) -> Result<bool, RepositoryError> {
        with_conn(&self.pool, move |conn| {
            let removed = conn.execute(
                "DELETE FROM friends WHERE user_id = ?1 AND added_by_id = ?2",
                params![user_id, added_by_id],
            )?;
            Ok(removed > 0)
        })
        .await
    }
}
