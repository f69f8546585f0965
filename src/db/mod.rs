pub mod models;

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, Connection, ErrorCode};
use std::path::Path;
use thiserror::Error;

use crate::state::DbPool;

pub const MIGRATIONS: &[(&str, &str)] = &[
    (
        "001_initial",
        include_str!("../../migrations/001_initial.sql"),
    ),
    (
        "002_reactions_reports",
        include_str!("../../migrations/002_reactions_reports.sql"),
    ),
    (
        "003_friends_notifications",
        include_str!("../../migrations/003_friends_notifications.sql"),
    ),
];

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("Pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("SQL error: {0}")]
    Sql(rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Not found: {0}")]
    NotFound(String),

    /// A UNIQUE constraint rejected the write; holds the offending column(s)
    #[error("Unique constraint violated on {0}")]
    UniqueViolation(String),

    #[error("Blocking task failed: {0}")]
    Task(String),
}

impl From<rusqlite::Error> for RepositoryError {
    fn from(err: rusqlite::Error) -> Self {
        match unique_violation_columns(&err) {
            Some(columns) => RepositoryError::UniqueViolation(columns),
            None => RepositoryError::Sql(err),
        }
    }
}

/// Column list of a UNIQUE violation, with table prefixes stripped.
///
/// SQLite reports these as `UNIQUE constraint failed: users.username`.
pub fn unique_violation_columns(err: &rusqlite::Error) -> Option<String> {
    let rusqlite::Error::SqliteFailure(code, Some(message)) = err else {
        return None;
    };
    if code.code != ErrorCode::ConstraintViolation {
        return None;
    }
    let columns = message.strip_prefix("UNIQUE constraint failed: ")?;
    Some(
        columns
            .split(',')
            .map(|c| c.trim().rsplit('.').next().unwrap_or("").to_string())
            .collect::<Vec<_>>()
            .join(","),
    )
}

/// Run synchronous SQLite work on tokio's blocking pool with its own pooled
/// connection, so concurrent callers really do hit the database concurrently.
pub async fn with_conn<T, F>(pool: &DbPool, f: F) -> Result<T, RepositoryError>
where
    T: Send + 'static,
    F: FnOnce(&mut Connection) -> Result<T, RepositoryError> + Send + 'static,
{
    let pool = pool.clone();
    tokio::task::spawn_blocking(move || {
        let mut conn = pool.get()?;
        f(&mut *conn)
    })
    .await
    .map_err(|e| RepositoryError::Task(e.to_string()))?
}

pub fn create_pool(db_path: &Path) -> anyhow::Result<DbPool> {
    // Ensure parent directory exists
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    // Pragmas are per connection, so they go in the init hook
    let manager = SqliteConnectionManager::file(db_path).with_init(|conn| {
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            PRAGMA busy_timeout = 5000;
            ",
        )
    });
    let pool = Pool::builder().max_size(8).build(manager)?;

    Ok(pool)
}

pub fn run_migrations(pool: &DbPool) -> anyhow::Result<()> {
    let conn = pool.get()?;

    // Create migrations tracking table
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
            name TEXT PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );",
    )?;

    for (name, sql) in MIGRATIONS {
        let already_applied: bool = conn.query_row(
            "SELECT COUNT(*) > 0 FROM schema_version WHERE name = ?1",
            params![name],
            |row| row.get(0),
        )?;

        if !already_applied {
            tracing::info!("Applying migration: {}", name);
            conn.execute_batch(sql)?;
            conn.execute(
                "INSERT INTO schema_version (name) VALUES (?1)",
                params![name],
            )?;
        }
    }

    tracing::info!("Database migrations complete");
    Ok(())
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;

    #[test]
    fn create_pool_creates_db_file() {
        let tmp = tempfile::tempdir().unwrap();
        let db_path = tmp.path().join("sub/dir/test.db");
        let pool = create_pool(&db_path).unwrap();
        assert!(db_path.exists());
        let conn = pool.get().unwrap();
        let mode: String = conn
            .query_row("PRAGMA journal_mode", [], |row| row.get(0))
            .unwrap();
        assert_eq!(mode, "wal");
    }

    #[test]
    fn migrations_run_successfully() {
        let (pool, _tmp) = migrated_pool();
        let conn = pool.get().unwrap();

        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM schema_version", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, MIGRATIONS.len() as i64);

        let tables: Vec<String> = {
            let mut stmt = conn
                .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
                .unwrap();
            stmt.query_map([], |row| row.get(0))
                .unwrap()
                .filter_map(|r| r.ok())
                .collect()
        };
        for table in [
            "users",
            "posts",
            "comments",
            "likes",
            "reports",
            "friends",
            "notifications",
        ] {
            assert!(tables.contains(&table.to_string()), "missing {table}");
        }
    }

    #[test]
    fn migrations_are_idempotent() {
        let (pool, _tmp) = migrated_pool();
        run_migrations(&pool).unwrap();

        let conn = pool.get().unwrap();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM schema_version", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, MIGRATIONS.len() as i64);
    }

    #[test]
    fn foreign_keys_enforced() {
        let (pool, _tmp) = migrated_pool();
        let conn = pool.get().unwrap();
        let result = conn.execute(
            "INSERT INTO posts (user_id, image) VALUES (?1, ?2)",
            params![4242, "https://cdn.example.com/a.png"],
        );
        assert!(result.is_err());
    }

    #[test]
    fn duplicate_username_is_classified_as_unique_violation() {
        let (pool, _tmp) = migrated_pool();
        insert_user(&pool, "alice", false);

        let conn = pool.get().unwrap();
        let err = conn
            .execute(
                "INSERT INTO users (email, username) VALUES ('other@example.com', 'alice')",
                [],
            )
            .unwrap_err();
        assert_eq!(unique_violation_columns(&err).as_deref(), Some("username"));
        assert!(matches!(
            RepositoryError::from(err),
            RepositoryError::UniqueViolation(col) if col == "username"
        ));
    }

    #[test]
    fn composite_unique_violation_lists_all_columns() {
        let (pool, _tmp) = migrated_pool();
        let a = insert_user(&pool, "alice", false);
        let b = insert_user(&pool, "bob", false);

        let conn = pool.get().unwrap();
        let insert = "INSERT INTO friends (user_id, added_by_id) VALUES (?1, ?2)";
        conn.execute(insert, params![a, b]).unwrap();
        let err = conn.execute(insert, params![a, b]).unwrap_err();
        assert_eq!(
            unique_violation_columns(&err).as_deref(),
            Some("user_id,added_by_id")
        );
    }

    #[test]
    fn other_constraint_failures_are_not_unique_violations() {
        let (pool, _tmp) = migrated_pool();
        let a = insert_user(&pool, "alice", false);

        let conn = pool.get().unwrap();
        let err = conn
            .execute(
                "INSERT INTO friends (user_id, added_by_id) VALUES (?1, ?1)",
                params![a],
            )
            .unwrap_err();
        assert!(unique_violation_columns(&err).is_none());
    }

    #[tokio::test]
    async fn with_conn_runs_on_a_pooled_connection() {
        let (pool, _tmp) = migrated_pool();
        insert_user(&pool, "alice", false);

        let n = with_conn(&pool, |conn| {
            Ok(conn.query_row("SELECT COUNT(*) FROM users", [], |row| row.get::<_, i64>(0))?)
        })
        .await
        .unwrap();
        assert_eq!(n, 1);
    }
}
