use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: i64,
    pub email: String,
    pub username: String,
    pub image: Option<String>,
    /// Empty for accounts that only sign in through a third party
    #[serde(skip_serializing, default)]
    pub password_hash: String,
    pub is_admin: bool,
    pub created_at: String,
}

/// Owner projection embedded in posts and comments.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserSummary {
    pub id: i64,
    pub username: String,
    pub image: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub username: String,
    pub image: Option<String>,
    pub password_hash: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    pub id: i64,
    pub image: String,
    pub caption: String,
    pub tags: Vec<String>,
    pub user_id: i64,
    pub created_at: String,
}

#[derive(Debug, Clone)]
pub struct NewPost {
    pub user_id: i64,
    pub image: String,
    pub caption: String,
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub id: i64,
    pub post_id: i64,
    pub user_id: i64,
    pub body: String,
    pub created_at: String,
}

/// Count-only comment projection used by the feed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CommentRef {
    pub id: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Like {
    pub id: i64,
    pub user_id: i64,
    pub post_id: Option<i64>,
    pub comment_id: Option<i64>,
    pub created_at: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LikeTarget {
    Post(i64),
    Comment(i64),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Report {
    pub id: i64,
    pub post_id: i64,
    pub user_id: i64,
    pub reason: String,
    pub created_at: String,
}

/// `added_by_id` is notified whenever `user_id` posts.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Friend {
    pub id: i64,
    pub user_id: i64,
    pub added_by_id: i64,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: i64,
    pub user_id: i64,
    pub message: String,
    pub is_read: bool,
    pub created_at: String,
}

// --- Read models ---

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct FeedPost {
    #[serde(flatten)]
    pub post: Post,
    pub user: UserSummary,
    pub likes: Vec<Like>,
    pub comments: Vec<CommentRef>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct FeedPage {
    pub posts: Vec<FeedPost>,
    pub total: i64,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct CommentDetail {
    #[serde(flatten)]
    pub comment: Comment,
    pub user: UserSummary,
    pub likes: Vec<Like>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct PostDetail {
    #[serde(flatten)]
    pub post: Post,
    pub user: UserSummary,
    pub comments: Vec<CommentDetail>,
    pub likes: Vec<Like>,
}

/// Rows removed by a cascading post delete.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CascadeCounts {
    pub comment_likes: usize,
    pub comments: usize,
    pub likes: usize,
    pub reports: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_json_never_contains_password_hash() {
        let user = User {
            id: 1,
            email: "a@example.com".into(),
            username: "alice".into(),
            image: None,
            password_hash: "$2b$04$secret".into(),
            is_admin: false,
            created_at: "2025-01-15T12:00:00.000Z".into(),
        };
        let json = serde_json::to_value(&user).unwrap();
        assert!(json.get("passwordHash").is_none());
        assert_eq!(json["isAdmin"], false);
    }

    #[test]
    fn feed_post_flattens_post_fields() {
        let post = FeedPost {
            post: Post {
                id: 3,
                image: "https://cdn.example.com/p.png".into(),
                caption: "hi".into(),
                tags: vec![],
                user_id: 1,
                created_at: "2025-01-15T12:00:00.000Z".into(),
            },
            user: UserSummary {
                id: 1,
                username: "alice".into(),
                image: None,
            },
            likes: vec![],
            comments: vec![CommentRef { id: 9 }],
        };
        let json = serde_json::to_value(&post).unwrap();
        assert_eq!(json["id"], 3);
        assert_eq!(json["userId"], 1);
        assert_eq!(json["user"]["username"], "alice");
        assert_eq!(json["comments"][0]["id"], 9);
    }
}
