use futures::future::join_all;
use thiserror::Error;

use crate::db::RepositoryError;
use crate::notifications::repository::NotificationRepository;

pub fn new_post_message(username: &str) -> String {
    format!("{username} just posted something new.")
}

#[derive(Debug)]
pub struct FanoutFailure {
    pub recipient_id: i64,
    pub error: RepositoryError,
}

/// Outcome of one fanout: every recipient lands in exactly one list.
#[derive(Debug, Default)]
pub struct FanoutReport {
    pub delivered: Vec<i64>,
    pub failures: Vec<FanoutFailure>,
}

impl FanoutReport {
    pub fn attempted(&self) -> usize {
        self.delivered.len() + self.failures.len()
    }
}

#[derive(Debug, Error)]
pub enum FanoutError {
    #[error("Could not load friends of user {poster_id}: {source}")]
    Friends {
        poster_id: i64,
        #[source]
        source: RepositoryError,
    },

    #[error("{} of {} notifications failed", .0.failures.len(), .0.attempted())]
    Partial(FanoutReport),
}

/// Tell everyone who friended `poster_id` that they posted.
///
/// Writes run concurrently and are all awaited; one failing recipient does
/// not stop the others. Any failure comes back as `FanoutError::Partial`
/// carrying the full report.
pub async fn notify_friends(
    repo: &dyn NotificationRepository,
    poster_id: i64,
    username: &str,
) -> Result<FanoutReport, FanoutError> {
    let friends = repo
        .friends_of(poster_id)
        .await
        .map_err(|source| FanoutError::Friends { poster_id, source })?;

    let message = new_post_message(username);
    let writes = friends.iter().map(|friend| {
        let recipient_id = friend.added_by_id;
        let message = message.as_str();
        async move { (recipient_id, repo.create(recipient_id, message).await) }
    });

    let mut report = FanoutReport::default();
    for (recipient_id, result) in join_all(writes).await {
        match result {
            Ok(_) => report.delivered.push(recipient_id),
            Err(error) => report.failures.push(FanoutFailure {
                recipient_id,
                error,
            }),
        }
    }

    tracing::debug!(
        poster_id,
        delivered = report.delivered.len(),
        failed = report.failures.len(),
        "Notification fanout finished"
    );

    if report.failures.is_empty() {
        Ok(report)
    } else {
        Err(FanoutError::Partial(report))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::{Friend, Notification};
    use crate::db::test_support::{insert_user, migrated_pool};
    use crate::notifications::repository::SqliteNotificationRepository;
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[tokio::test]
    async fn three_friends_get_three_notifications() {
        let (pool, _tmp) = migrated_pool();
        let poster = insert_user(&pool, "alice", false);
        let repo = SqliteNotificationRepository::new(pool.clone());

        let mut friends = Vec::new();
        for name in ["bob", "carol", "dave"] {
            let id = insert_user(&pool, name, false);
            repo.add_friend(poster, id).await.unwrap();
            friends.push(id);
        }

        let report = notify_friends(&repo, poster, "alice").await.unwrap();
        let mut delivered = report.delivered.clone();
        delivered.sort_unstable();
        assert_eq!(delivered, friends);

        for id in friends {
            let inbox = repo.list_for_user(id).await.unwrap();
            assert_eq!(inbox.len(), 1);
            assert_eq!(inbox[0].message, "alice just posted something new.");
        }
        assert!(repo.list_for_user(poster).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn no_friends_is_an_empty_report() {
        let (pool, _tmp) = migrated_pool();
        let poster = insert_user(&pool, "alice", false);
        let repo = SqliteNotificationRepository::new(pool);

        let report = notify_friends(&repo, poster, "alice").await.unwrap();
        assert!(report.delivered.is_empty());
        assert!(report.failures.is_empty());
    }

    /// Fails writes for one recipient and records the rest.
    struct FlakyRepository {
        friends: Vec<i64>,
        failing: i64,
        written: Mutex<Vec<i64>>,
    }

    #[async_trait]
    impl NotificationRepository for FlakyRepository {
        async fn friends_of(&self, user_id: i64) -> Result<Vec<Friend>, RepositoryError> {
            Ok(self
                .friends
                .iter()
                .map(|&added_by_id| Friend {
                    id: added_by_id,
                    user_id,
                    added_by_id,
                    created_at: String::new(),
                })
                .collect())
        }

        async fn create(
            &self,
            user_id: i64,
            message: &str,
        ) -> Result<Notification, RepositoryError> {
            if user_id == self.failing {
                return Err(RepositoryError::Task("disk on fire".into()));
            }
            self.written.lock().unwrap().push(user_id);
            Ok(Notification {
                id: user_id,
                user_id,
                message: message.to_string(),
                is_read: false,
                created_at: String::new(),
            })
        }

        async fn list_for_user(&self, _: i64) -> Result<Vec<Notification>, RepositoryError> {
            Ok(vec![])
        }

        async fn add_friend(&self, _: i64, _: i64) -> Result<Friend, RepositoryError> {
            unreachable!()
        }

        async fn remove_friend(&self, _: i64, _: i64) -> Result<bool, RepositoryError> {
            unreachable!()
        }
    }

    #[tokio::test]
    async fn one_failure_does_not_stop_the_rest() {
        let repo = FlakyRepository {
            friends: vec![2, 3, 4],
            failing: 3,
            written: Mutex::new(Vec::new()),
        };

        let err = notify_friends(&repo, 1, "alice").await.unwrap_err();
        let FanoutError::Partial(report) = err else {
            panic!("expected partial failure");
        };
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].recipient_id, 3);
        assert_eq!(report.delivered, vec![2, 4]);
        assert_eq!(*repo.written.lock().unwrap(), vec![2, 4]);
    }
}
