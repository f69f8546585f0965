// Persistence for users; uniqueness of email and username is enforced here
// by the schema, never by callers.
use async_trait::async_trait;
use rusqlite::{params, OptionalExtension, Row};
use std::sync::Arc;

use crate::db::models::{NewUser, User};
use crate::db::{with_conn, RepositoryError};
use crate::state::DbPool;

#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn find_by_id(&self, id: i64) -> Result<Option<User>, RepositoryError>;

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, RepositoryError>;

    /// Insert a user. A taken email or username surfaces as
    /// `RepositoryError::UniqueViolation` naming the column.
    async fn insert(&self, user: &NewUser) -> Result<User, RepositoryError>;
}

pub type DynUserRepository = Arc<dyn UserRepository>;

pub struct SqliteUserRepository {
    pool: DbPool,
}

impl SqliteUserRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

const USER_COLUMNS: &str = "id, email, username, image, password_hash, is_admin, created_at";

pub(crate) fn user_from_row(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        email: row.get(1)?,
        username: row.get(2)?,
        image: row.get(3)?,
        password_hash: row.get(4)?,
        is_admin: row.get(5)?,
        created_at: row.get(6)?,
    })
}

#[async_trait]
impl UserRepository for SqliteUserRepository {
    async fn find_by_id(&self, id: i64) -> Result<Option<User>, RepositoryError> {
        with_conn(&self.pool, move |conn| {
            let user = conn
                .query_row(
                    &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"),
                    params![id],
                    user_from_row,
                )
                .optional()?;
            Ok(user)
        })
        .await
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, RepositoryError> {
        let email = email.to_string();
        with_conn(&self.pool, move |conn| {
            let user = conn
                .query_row(
                    &format!("SELECT {USER_COLUMNS} FROM users WHERE email = ?1"),
                    params![email],
                    user_from_row,
                )
                .optional()?;
            Ok(user)
        })
        .await
    }

    async fn insert(&self, user: &NewUser) -> Result<User, RepositoryError> {
        let user = user.clone();
        with_conn(&self.pool, move |conn| {
            conn.execute(
                "INSERT INTO users (email, username, image, password_hash) VALUES (?1, ?2, ?3, ?4)",
                params![user.email, user.username, user.image, user.password_hash],
            )?;
            let id = conn.last_insert_rowid();
            let created = conn.query_row(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"),
                params![id],
                user_from_row,
            )?;
            Ok(created)
        })
        .await
    }
}
