// Repository pattern - isolates all post-related database side effects
use async_trait::async_trait;
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row, TransactionBehavior};
use std::sync::Arc;

use crate::db::models::{
    CascadeCounts, Comment, CommentDetail, CommentRef, FeedPage, FeedPost, Like, LikeTarget,
    NewPost, Post, PostDetail, Report, UserSummary,
};
use crate::db::{with_conn, RepositoryError};
use crate::posts::domain::Page;
use crate::state::DbPool;

#[async_trait]
pub trait PostRepository: Send + Sync {
    async fn insert(&self, post: &NewPost) -> Result<Post, RepositoryError>;

    async fn find(&self, id: i64) -> Result<Option<Post>, RepositoryError>;

    /// Delete a post with every comment, like and report that references it,
    /// all in one transaction. `NotFound` if the post row is gone.
    async fn delete_cascade(&self, id: i64) -> Result<CascadeCounts, RepositoryError>;

    /// One feed page plus the total post count, read from a single snapshot.
    async fn feed_page(&self, page: Page) -> Result<FeedPage, RepositoryError>;

    async fn feed_all(&self) -> Result<Vec<FeedPost>, RepositoryError>;

    async fn detail(&self, id: i64) -> Result<Option<PostDetail>, RepositoryError>;

    async fn add_comment(
        &self,
        post_id: i64,
        user_id: i64,
        body: &str,
    ) -> Result<Comment, RepositoryError>;

    /// Flip the caller's like on a post or comment. Returns whether the
    /// target is now liked and its like count.
    async fn toggle_like(
        &self,
        user_id: i64,
        target: LikeTarget,
    ) -> Result<(bool, i64), RepositoryError>;

    async fn add_report(
        &self,
        post_id: i64,
        user_id: i64,
        reason: &str,
    ) -> Result<Report, RepositoryError>;
}

pub type DynPostRepository = Arc<dyn PostRepository>;

/// SQLite implementation
pub struct SqlitePostRepository {
    pool: DbPool,
}

impl SqlitePostRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

// --- Row mapping ---

const POST_COLUMNS: &str = "p.id, p.image, p.caption, p.tags, p.user_id, p.created_at";
const LIKE_COLUMNS: &str = "id, user_id, post_id, comment_id, created_at";

fn post_from_row(row: &Row<'_>) -> rusqlite::Result<Post> {
    let tags: String = row.get(3)?;
    let tags = serde_json::from_str(&tags)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(3, Type::Text, Box::new(e)))?;
    Ok(Post {
        id: row.get(0)?,
        image: row.get(1)?,
        caption: row.get(2)?,
        tags,
        user_id: row.get(4)?,
        created_at: row.get(5)?,
    })
}

/// Post columns followed by the owner projection at offset 6.
fn post_with_owner(row: &Row<'_>) -> rusqlite::Result<(Post, UserSummary)> {
    Ok((
        post_from_row(row)?,
        UserSummary {
            id: row.get(6)?,
            username: row.get(7)?,
            image: row.get(8)?,
        },
    ))
}

fn like_from_row(row: &Row<'_>) -> rusqlite::Result<Like> {
    Ok(Like {
        id: row.get(0)?,
        user_id: row.get(1)?,
        post_id: row.get(2)?,
        comment_id: row.get(3)?,
        created_at: row.get(4)?,
    })
}

fn comment_from_row(row: &Row<'_>) -> rusqlite::Result<Comment> {
    Ok(Comment {
        id: row.get(0)?,
        post_id: row.get(1)?,
        user_id: row.get(2)?,
        body: row.get(3)?,
        created_at: row.get(4)?,
    })
}

// --- Query helpers ---

fn select_post(conn: &Connection, id: i64) -> rusqlite::Result<Option<Post>> {
    conn.query_row(
        &format!("SELECT {POST_COLUMNS} FROM posts p WHERE p.id = ?1"),
        params![id],
        post_from_row,
    )
    .optional()
}

fn post_exists(conn: &Connection, id: i64) -> rusqlite::Result<bool> {
    conn.query_row(
        "SELECT COUNT(*) > 0 FROM posts WHERE id = ?1",
        params![id],
        |row| row.get(0),
    )
}

fn likes_on_post(conn: &Connection, post_id: i64) -> rusqlite::Result<Vec<Like>> {
    let mut stmt = conn.prepare_cached(&format!(
        "SELECT {LIKE_COLUMNS} FROM likes WHERE post_id = ?1 ORDER BY id"
    ))?;
    let likes = stmt
        .query_map(params![post_id], like_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(likes)
}

fn likes_on_comment(conn: &Connection, comment_id: i64) -> rusqlite::Result<Vec<Like>> {
    let mut stmt = conn.prepare_cached(&format!(
        "SELECT {LIKE_COLUMNS} FROM likes WHERE comment_id = ?1 ORDER BY id"
    ))?;
    let likes = stmt
        .query_map(params![comment_id], like_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(likes)
}

fn comment_refs(conn: &Connection, post_id: i64) -> rusqlite::Result<Vec<CommentRef>> {
    let mut stmt = conn.prepare_cached("SELECT id FROM comments WHERE post_id = ?1 ORDER BY id")?;
    let refs = stmt
        .query_map(params![post_id], |row| Ok(CommentRef { id: row.get(0)? }))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(refs)
}

/// Feed rows in newest-first order, with likes and comment ids attached.
fn query_feed(
    conn: &Connection,
    page: Option<Page>,
) -> Result<Vec<FeedPost>, RepositoryError> {
    let base = format!(
        "SELECT {POST_COLUMNS}, u.id, u.username, u.image
         FROM posts p
         JOIN users u ON u.id = p.user_id
         ORDER BY p.created_at DESC, p.id DESC"
    );

    let rows: Vec<(Post, UserSummary)> = match page {
        Some(page) => {
            let mut stmt = conn.prepare(&format!("{base} LIMIT ?1 OFFSET ?2"))?;
            let rows = stmt
                .query_map(params![page.limit, page.offset()], post_with_owner)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            rows
        }
        None => {
            let mut stmt = conn.prepare(&base)?;
            let rows = stmt
                .query_map([], post_with_owner)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            rows
        }
    };

    rows.into_iter()
        .map(|(post, user)| -> Result<FeedPost, RepositoryError> {
            Ok(FeedPost {
                likes: likes_on_post(conn, post.id)?,
                comments: comment_refs(conn, post.id)?,
                post,
                user,
            })
        })
        .collect()
}

#[async_trait]
impl PostRepository for SqlitePostRepository {
    async fn insert(&self, post: &NewPost) -> Result<Post, RepositoryError> {
        let post = post.clone();
        with_conn(&self.pool, move |conn| {
            conn.execute(
                "INSERT INTO posts (user_id, image, caption, tags) VALUES (?1, ?2, ?3, ?4)",
                params![
                    post.user_id,
                    post.image,
                    post.caption,
                    serde_json::to_string(&post.tags)?
                ],
            )?;
            let id = conn.last_insert_rowid();
            select_post(conn, id)?
                .ok_or_else(|| RepositoryError::NotFound(format!("post {id}")))
        })
        .await
    }

    async fn find(&self, id: i64) -> Result<Option<Post>, RepositoryError> {
        with_conn(&self.pool, move |conn| Ok(select_post(conn, id)?)).await
    }

    async fn delete_cascade(&self, id: i64) -> Result<CascadeCounts, RepositoryError> {
        with_conn(&self.pool, move |conn| {
            // Dropping the transaction without commit rolls everything back
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

            let counts = CascadeCounts {
                comment_likes: tx.execute(
                    "DELETE FROM likes WHERE comment_id IN (SELECT id FROM comments WHERE post_id = ?1)",
                    params![id],
                )?,
                comments: tx.execute("DELETE FROM comments WHERE post_id = ?1", params![id])?,
                likes: tx.execute("DELETE FROM likes WHERE post_id = ?1", params![id])?,
                reports: tx.execute("DELETE FROM reports WHERE post_id = ?1", params![id])?,
            };

            if tx.execute("DELETE FROM posts WHERE id = ?1", params![id])? == 0 {
                return Err(RepositoryError::NotFound(format!("post {id}")));
            }

            tx.commit()?;
            Ok(counts)
        })
        .await
    }

    async fn feed_page(&self, page: Page) -> Result<FeedPage, RepositoryError> {
        with_conn(&self.pool, move |conn| {
            let tx = conn.transaction()?;
            let posts = query_feed(&tx, Some(page))?;
            let total: i64 = tx.query_row("SELECT COUNT(*) FROM posts", [], |row| row.get(0))?;
            tx.commit()?;
            Ok(FeedPage { posts, total })
        })
        .await
    }

    async fn feed_all(&self) -> Result<Vec<FeedPost>, RepositoryError> {
        with_conn(&self.pool, |conn| query_feed(conn, None)).await
    }

    async fn detail(&self, id: i64) -> Result<Option<PostDetail>, RepositoryError> {
        with_conn(&self.pool, move |conn| {
            let conn: &Connection = conn;
            let head = conn
                .query_row(
                    &format!(
                        "SELECT {POST_COLUMNS}, u.id, u.username, u.image
                         FROM posts p
                         JOIN users u ON u.id = p.user_id
                         WHERE p.id = ?1"
                    ),
                    params![id],
                    post_with_owner,
                )
                .optional()?;

            let Some((post, user)) = head else {
                return Ok(None);
            };

            let mut stmt = conn.prepare(
                "SELECT c.id, c.post_id, c.user_id, c.body, c.created_at,
                        u.id, u.username, u.image
                 FROM comments c
                 JOIN users u ON u.id = c.user_id
                 WHERE c.post_id = ?1
                 ORDER BY c.created_at ASC, c.id ASC",
            )?;
            let rows = stmt
                .query_map(params![id], |row| {
                    Ok((
                        comment_from_row(row)?,
                        UserSummary {
                            id: row.get(5)?,
                            username: row.get(6)?,
                            image: row.get(7)?,
                        },
                    ))
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;

            let comments = rows
                .into_iter()
                .map(|(comment, user)| -> rusqlite::Result<CommentDetail> {
                    Ok(CommentDetail {
                        likes: likes_on_comment(conn, comment.id)?,
                        comment,
                        user,
                    })
                })
                .collect::<rusqlite::Result<Vec<_>>>()?;

            Ok(Some(PostDetail {
                likes: likes_on_post(conn, post.id)?,
                post,
                user,
                comments,
            }))
        })
        .await
    }

    async fn add_comment(
        &self,
        post_id: i64,
        user_id: i64,
        body: &str,
    ) -> Result<Comment, RepositoryError> {
        let body = body.to_string();
        with_conn(&self.pool, move |conn| {
            if !post_exists(conn, post_id)? {
                return Err(RepositoryError::NotFound(format!("post {post_id}")));
            }
            conn.execute(
                "INSERT INTO comments (post_id, user_id, body) VALUES (?1, ?2, ?3)",
                params![post_id, user_id, body],
            )?;
            let comment = conn.query_row(
                "SELECT id, post_id, user_id, body, created_at FROM comments WHERE id = ?1",
                params![conn.last_insert_rowid()],
                comment_from_row,
            )?;
            Ok(comment)
        })
        .await
    }

    async fn toggle_like(
        &self,
        user_id: i64,
        target: LikeTarget,
    ) -> Result<(bool, i64), RepositoryError> {
        let (table, column, target_id) = match target {
            LikeTarget::Post(id) => ("posts", "post_id", id),
            LikeTarget::Comment(id) => ("comments", "comment_id", id),
        };

        with_conn(&self.pool, move |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

            let exists: bool = tx.query_row(
                &format!("SELECT COUNT(*) > 0 FROM {table} WHERE id = ?1"),
                params![target_id],
                |row| row.get(0),
            )?;
            if !exists {
                return Err(RepositoryError::NotFound(format!("{table} {target_id}")));
            }

            let removed = tx.execute(
                &format!("DELETE FROM likes WHERE {column} = ?1 AND user_id = ?2"),
                params![target_id, user_id],
            )?;
            if removed == 0 {
                tx.execute(
                    &format!("INSERT INTO likes (user_id, {column}) VALUES (?1, ?2)"),
                    params![user_id, target_id],
                )?;
            }

            let count: i64 = tx.query_row(
                &format!("SELECT COUNT(*) FROM likes WHERE {column} = ?1"),
                params![target_id],
                |row| row.get(0),
            )?;
            tx.commit()?;
            Ok((removed == 0, count))
        })
        .await
    }

    async fn add_report(
        &self,
        post_id: i64,
        user_id: i64,
        reason: &str,
    ) -> Result<Report, RepositoryError> {
        let reason = reason.to_string();
        with_conn(&self.pool, move |conn| {
            if !post_exists(conn, post_id)? {
                return Err(RepositoryError::NotFound(format!("post {post_id}")));
            }
            conn.execute(
                "INSERT INTO reports (post_id, user_id, reason) VALUES (?1, ?2, ?3)",
                params![post_id, user_id, reason],
            )?;
            let report = conn.query_row(
                "SELECT id, post_id, user_id, reason, created_at FROM reports WHERE id = ?1",
                params![conn.last_insert_rowid()],
                |row| {
                    Ok(Report {
                        id: row.get(0)?,
                        post_id: row.get(1)?,
                        user_id: row.get(2)?,
                        reason: row.get(3)?,
                        created_at: row.get(4)?,
                    })
                },
            )?;
            Ok(report)
        })
        .await
    }
}
