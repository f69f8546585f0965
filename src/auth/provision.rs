// Find-or-create for third-party sign-on.
//
// Username assignment is a small state machine driven by the datastore's
// UNIQUE constraint: a rejected username moves to the next numeric suffix,
// anything else is fatal. No in-process lock: two racing sign-ons are
// serialized by SQLite and the loser retries with the next suffix.
use std::fmt;

use thiserror::Error;

use crate::db::models::{NewUser, User};
use crate::db::RepositoryError;
use crate::users::UserRepository;

/// Verified profile handed over by an identity provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalProfile {
    pub email: String,
    pub display_name: Option<String>,
    pub avatar_url: Option<String>,
}

#[derive(Debug, Error)]
pub enum ProvisionError {
    #[error(transparent)]
    Repository(#[from] RepositoryError),

    #[error("no free username for base {base:?} after {attempts} attempts")]
    Exhausted { base: String, attempts: u32 },
}

/// Whitespace stripped and lowercased; `user` when nothing is left.
pub fn base_username(display_name: Option<&str>) -> String {
    let base: String = display_name
        .unwrap_or("")
        .chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect();

    if base.is_empty() {
        "user".to_string()
    } else {
        base
    }
}

/// Attempt 0 is the bare base, attempt n is `base` followed by `n`.
pub fn candidate_username(base: &str, attempt: u32) -> String {
    if attempt == 0 {
        base.to_string()
    } else {
        format!("{base}{attempt}")
    }
}

enum ClaimState {
    Candidate { username: String, attempt: u32 },
    Conflict { attempt: u32 },
    Committed(User),
    Fatal(ProvisionError),
}

impl fmt::Display for ClaimState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Candidate { username, attempt } => {
                write!(f, "Candidate({username}, attempt {attempt})")
            }
            Self::Conflict { attempt } => write!(f, "Conflict(attempt {attempt})"),
            Self::Committed(user) => write!(f, "Committed({})", user.username),
            Self::Fatal(err) => write!(f, "Fatal({err})"),
        }
    }
}

/// Return the user owning `profile.email`, creating one if needed. The email
/// is matched trimmed and lowercased, the same form local registration stores.
///
/// At most `max_attempts` inserts are tried. Only a uniqueness violation on
/// the username column is retried; every other error, including a racing
/// insert of the same email, is returned after the attempt that produced it.
pub async fn provision_user(
    users: &dyn UserRepository,
    profile: &ExternalProfile,
    max_attempts: u32,
) -> Result<User, ProvisionError> {
    let email = profile.email.trim().to_lowercase();
    if let Some(user) = users.find_by_email(&email).await? {
        tracing::debug!(user_id = user.id, "Sign-on matched existing user");
        return Ok(user);
    }

    let base = base_username(profile.display_name.as_deref());
    let mut state = ClaimState::Candidate {
        username: base.clone(),
        attempt: 0,
    };

    loop {
        tracing::trace!(%state, "Username claim");
        state = match state {
            ClaimState::Candidate { username, attempt } => {
                let new_user = NewUser {
                    email: email.clone(),
                    username,
                    image: profile.avatar_url.clone(),
                    password_hash: String::new(),
                };
                match users.insert(&new_user).await {
                    Ok(user) => ClaimState::Committed(user),
                    Err(RepositoryError::UniqueViolation(column)) if column == "username" => {
                        ClaimState::Conflict { attempt }
                    }
                    Err(e) => ClaimState::Fatal(e.into()),
                }
            }
            ClaimState::Conflict { attempt } => {
                let next = attempt + 1;
                if next >= max_attempts {
                    ClaimState::Fatal(ProvisionError::Exhausted {
                        base: base.clone(),
                        attempts: max_attempts,
                    })
                } else {
                    ClaimState::Candidate {
                        username: candidate_username(&base, next),
                        attempt: next,
                    }
                }
            }
            ClaimState::Committed(user) => {
                tracing::info!(user_id = user.id, username = %user.username, "Provisioned user from sign-on");
                return Ok(user);
            }
            ClaimState::Fatal(err) => return Err(err),
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::migrated_pool;
    use crate::users::SqliteUserRepository;
    use async_trait::async_trait;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn profile(email: &str, name: Option<&str>) -> ExternalProfile {
        ExternalProfile {
            email: email.to_string(),
            display_name: name.map(str::to_string),
            avatar_url: Some("https://lh3.example.com/photo.jpg".to_string()),
        }
    }

    #[test]
    fn base_username_strips_whitespace_and_lowercases() {
        assert_eq!(base_username(Some("John Doe")), "johndoe");
        assert_eq!(base_username(Some("  Ada\tLove lace ")), "adalovelace");
        assert_eq!(base_username(Some("ALLCAPS")), "allcaps");
    }

    #[test]
    fn base_username_falls_back_to_user() {
        assert_eq!(base_username(None), "user");
        assert_eq!(base_username(Some("")), "user");
        assert_eq!(base_username(Some("   ")), "user");
    }

    #[test]
    fn candidates_count_up_from_one() {
        assert_eq!(candidate_username("johndoe", 0), "johndoe");
        assert_eq!(candidate_username("johndoe", 1), "johndoe1");
        assert_eq!(candidate_username("johndoe", 2), "johndoe2");
    }

    #[tokio::test]
    async fn existing_email_returns_existing_user() {
        let (pool, _tmp) = migrated_pool();
        let repo = SqliteUserRepository::new(pool);

        let first = provision_user(&repo, &profile("j@example.com", Some("John Doe")), 10)
            .await
            .unwrap();
        let again = provision_user(&repo, &profile("j@example.com", Some("Other Name")), 10)
            .await
            .unwrap();
        assert_eq!(first, again);
        assert_eq!(again.username, "johndoe");
        assert!(again.password_hash.is_empty());
    }

    #[tokio::test]
    async fn provider_email_case_matches_registered_account() {
        let (pool, _tmp) = migrated_pool();
        let repo = SqliteUserRepository::new(pool);
        let registered = repo
            .insert(&NewUser {
                email: "a@x.com".to_string(),
                username: "alice".to_string(),
                image: None,
                password_hash: "$2b$04$hash".to_string(),
            })
            .await
            .unwrap();

        let signed_on = provision_user(&repo, &profile("  A@X.com ", Some("Alice")), 10)
            .await
            .unwrap();
        assert_eq!(signed_on.id, registered.id);

        let fresh = provision_user(&repo, &profile("New@Example.COM", Some("Newbie")), 10)
            .await
            .unwrap();
        assert_eq!(fresh.email, "new@example.com");
    }

    #[tokio::test]
    async fn repeated_collisions_get_increasing_suffixes() {
        let (pool, _tmp) = migrated_pool();
        let repo = SqliteUserRepository::new(pool);

        let mut names = Vec::new();
        for i in 0..3 {
            let user = provision_user(
                &repo,
                &profile(&format!("j{i}@example.com"), Some("John Doe")),
                10,
            )
            .await
            .unwrap();
            names.push(user.username);
        }
        assert_eq!(names, vec!["johndoe", "johndoe1", "johndoe2"]);
    }

    #[tokio::test]
    async fn attempts_are_capped() {
        let (pool, _tmp) = migrated_pool();
        let repo = SqliteUserRepository::new(pool);

        provision_user(&repo, &profile("a@example.com", Some("Sam")), 2)
            .await
            .unwrap();
        provision_user(&repo, &profile("b@example.com", Some("Sam")), 2)
            .await
            .unwrap();
        let err = provision_user(&repo, &profile("c@example.com", Some("Sam")), 2)
            .await
            .unwrap_err();
        assert!(matches!(err, ProvisionError::Exhausted { attempts: 2, .. }));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_sign_ons_with_same_base_both_succeed() {
        let (pool, _tmp) = migrated_pool();
        let repo = Arc::new(SqliteUserRepository::new(pool));

        let a = {
            let repo = repo.clone();
            tokio::spawn(async move {
                provision_user(repo.as_ref(), &profile("a@example.com", Some("John Doe")), 10).await
            })
        };
        let b = {
            let repo = repo.clone();
            tokio::spawn(async move {
                provision_user(repo.as_ref(), &profile("b@example.com", Some("John Doe")), 10).await
            })
        };

        let a = a.await.unwrap().unwrap();
        let b = b.await.unwrap().unwrap();
        let names: HashSet<_> = [a.username, b.username].into_iter().collect();
        assert_eq!(
            names,
            HashSet::from(["johndoe".to_string(), "johndoe1".to_string()])
        );
        assert_ne!(a.id, b.id);
    }

    /// Fails every insert with a non-username error and counts attempts.
    struct BrokenRepository {
        inserts: AtomicU32,
        error: fn() -> RepositoryError,
    }

    #[async_trait]
    impl UserRepository for BrokenRepository {
        async fn find_by_id(&self, _id: i64) -> Result<Option<User>, RepositoryError> {
            Ok(None)
        }

        async fn find_by_email(&self, _email: &str) -> Result<Option<User>, RepositoryError> {
            Ok(None)
        }

        async fn insert(&self, _user: &NewUser) -> Result<User, RepositoryError> {
            self.inserts.fetch_add(1, Ordering::SeqCst);
            Err((self.error)())
        }
    }

    #[tokio::test]
    async fn unrelated_failure_is_fatal_after_one_attempt() {
        let repo = BrokenRepository {
            inserts: AtomicU32::new(0),
            error: || RepositoryError::Task("disk on fire".into()),
        };
        let err = provision_user(&repo, &profile("x@example.com", Some("X")), 10)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ProvisionError::Repository(RepositoryError::Task(_))
        ));
        assert_eq!(repo.inserts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn email_uniqueness_violation_is_not_retried() {
        let repo = BrokenRepository {
            inserts: AtomicU32::new(0),
            error: || RepositoryError::UniqueViolation("email".into()),
        };
        let err = provision_user(&repo, &profile("x@example.com", Some("X")), 10)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ProvisionError::Repository(RepositoryError::UniqueViolation(col)) if col == "email"
        ));
        assert_eq!(repo.inserts.load(Ordering::SeqCst), 1);
    }
}
