use std::sync::Arc;

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;

use crate::auth::google::{DynIdentityProvider, GoogleProvider};
use crate::auth::token::TokenKeys;
use crate::config::Config;
use crate::notifications::{DynNotificationRepository, SqliteNotificationRepository};
use crate::posts::{PostService, SqlitePostRepository};
use crate::users::{DynUserRepository, SqliteUserRepository};

pub type DbPool = Pool<SqliteConnectionManager>;

#[derive(Clone)]
pub struct AppState {
    pub db: DbPool,
    pub config: Config,
    pub tokens: Arc<TokenKeys>,
    pub users: DynUserRepository,
    pub notifications: DynNotificationRepository,
    pub posts: PostService,
    /// `None` when no `[oauth]` section is configured
    pub identity_provider: Option<DynIdentityProvider>,
}

impl AppState {
    pub fn new(db: DbPool, config: Config) -> Self {
        let notifications: DynNotificationRepository =
            Arc::new(SqliteNotificationRepository::new(db.clone()));
        let posts = PostService::new(
            Arc::new(SqlitePostRepository::new(db.clone())),
            notifications.clone(),
            config.feed,
        );
        let identity_provider = config
            .oauth
            .clone()
            .map(|oauth| Arc::new(GoogleProvider::new(oauth)) as DynIdentityProvider);

        Self {
            tokens: Arc::new(TokenKeys::from_config(&config.auth)),
            users: Arc::new(SqliteUserRepository::new(db.clone())),
            notifications,
            posts,
            identity_provider,
            config,
            db,
        }
    }

    /// Swap the sign-on provider, e.g. for a stub in tests.
    pub fn with_identity_provider(mut self, provider: DynIdentityProvider) -> Self {
        self.identity_provider = Some(provider);
        self
    }
}
