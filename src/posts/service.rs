use crate::config::FeedConfig;
use crate::db::models::{
    CascadeCounts, Comment, FeedPage, FeedPost, LikeTarget, NewPost, Post, PostDetail, Report,
};
use crate::error::{AppError, AppResult};
use crate::extractors::{AdminUser, CurrentUser};
use crate::notifications::{notify_friends, DynNotificationRepository, FanoutError};
use crate::posts::domain::{extract_tags, parse_post_id, PageParams};
use crate::posts::repository::DynPostRepository;

pub const MAX_COMMENT_CHARS: usize = 500;

/// Post lifecycle and feed reads. Callers pass the resolved identity in;
/// nothing here looks at request headers.
#[derive(Clone)]
pub struct PostService {
    posts: DynPostRepository,
    notifications: DynNotificationRepository,
    feed: FeedConfig,
}

impl PostService {
    pub fn new(
        posts: DynPostRepository,
        notifications: DynNotificationRepository,
        feed: FeedConfig,
    ) -> Self {
        Self {
            posts,
            notifications,
            feed,
        }
    }

    /// Persist a post, then tell the owner's friends. A failed fanout is
    /// logged and the post stands.
    pub async fn create(&self, owner: &CurrentUser, image: &str, caption: &str) -> AppResult<Post> {
        let image = image.trim();
        if image.is_empty() {
            return Err(AppError::InvalidArgument("Image is required".to_string()));
        }

        let post = self
            .posts
            .insert(&NewPost {
                user_id: owner.id,
                image: image.to_string(),
                caption: caption.to_string(),
                tags: extract_tags(caption),
            })
            .await?;
        tracing::debug!(post_id = post.id, user_id = owner.id, "Post created");

        match notify_friends(self.notifications.as_ref(), owner.id, &owner.username).await {
            Ok(_) => {}
            Err(FanoutError::Partial(report)) => {
                for failure in &report.failures {
                    tracing::warn!(
                        post_id = post.id,
                        recipient_id = failure.recipient_id,
                        "Notification not delivered: {}",
                        failure.error
                    );
                }
            }
            Err(e) => tracing::warn!(post_id = post.id, "Notification fanout failed: {}", e),
        }

        Ok(post)
    }

    /// Owner-scoped delete. Dependents go with the post.
    pub async fn delete_own(&self, raw_id: &str, caller: &CurrentUser) -> AppResult<CascadeCounts> {
        let id = parse_post_id(raw_id).map_err(|_| AppError::NotFound)?;
        let post = self.posts.find(id).await?.ok_or(AppError::NotFound)?;
        if post.user_id != caller.id {
            return Err(AppError::Forbidden);
        }
        Ok(self.posts.delete_cascade(id).await?)
    }

    /// Administrator delete with full cascade. The id is validated before
    /// any database access.
    pub async fn delete_as_admin(&self, raw_id: &str, admin: &AdminUser) -> AppResult<CascadeCounts> {
        let id = parse_post_id(raw_id)?;
        let counts = self.posts.delete_cascade(id).await?;
        tracing::info!(
            post_id = id,
            admin_id = admin.0.id,
            comments = counts.comments,
            comment_likes = counts.comment_likes,
            likes = counts.likes,
            reports = counts.reports,
            "Post removed by administrator"
        );
        Ok(counts)
    }

    pub async fn list_page(&self, params: &PageParams) -> AppResult<FeedPage> {
        Ok(self.posts.feed_page(params.resolve(&self.feed)).await?)
    }

    pub async fn list_all(&self) -> AppResult<Vec<FeedPost>> {
        Ok(self.posts.feed_all().await?)
    }

    /// Non-integer ids are simply not found.
    pub async fn detail(&self, raw_id: &str) -> AppResult<PostDetail> {
        let id = parse_post_id(raw_id).map_err(|_| AppError::NotFound)?;
        self.posts.detail(id).await?.ok_or(AppError::NotFound)
    }

    pub async fn comment(&self, raw_id: &str, caller: &CurrentUser, body: &str) -> AppResult<Comment> {
        let id = parse_post_id(raw_id).map_err(|_| AppError::NotFound)?;
        let body = body.trim();
        if body.is_empty() {
            return Err(AppError::InvalidArgument("Comment cannot be empty".to_string()));
        }
        if body.chars().count() > MAX_COMMENT_CHARS {
            return Err(AppError::InvalidArgument(format!(
                "Comment cannot exceed {MAX_COMMENT_CHARS} characters"
            )));
        }
        Ok(self.posts.add_comment(id, caller.id, body).await?)
    }

    pub async fn toggle_like(&self, target: LikeTarget, caller: &CurrentUser) -> AppResult<(bool, i64)> {
        Ok(self.posts.toggle_like(caller.id, target).await?)
    }

    pub async fn report(&self, raw_id: &str, caller: &CurrentUser, reason: &str) -> AppResult<Report> {
        let id = parse_post_id(raw_id).map_err(|_| AppError::NotFound)?;
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(AppError::InvalidArgument("Reason is required".to_string()));
        }
        Ok(self.posts.add_report(id, caller.id, reason).await?)
    }
}
