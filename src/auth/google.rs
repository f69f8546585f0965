use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use url::Url;

use crate::auth::provision::ExternalProfile;
use crate::config::OAuthConfig;
use crate::error::{AppError, AppResult};

const AUTHORIZE_ENDPOINT: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const TOKEN_ENDPOINT: &str = "https://oauth2.googleapis.com/token";
const USERINFO_ENDPOINT: &str = "https://openidconnect.googleapis.com/v1/userinfo";

/// Third-party sign-on: builds the consent redirect and turns the callback
/// code into a verified profile.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    fn authorize_url(&self) -> AppResult<Url>;

    async fn exchange_code(&self, code: &str) -> AppResult<ExternalProfile>;
}

pub type DynIdentityProvider = Arc<dyn IdentityProvider>;

pub struct GoogleProvider {
    http: reqwest::Client,
    config: OAuthConfig,
}

impl GoogleProvider {
    pub fn new(config: OAuthConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
        }
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Deserialize)]
struct UserInfo {
    email: Option<String>,
    email_verified: Option<bool>,
    name: Option<String>,
    picture: Option<String>,
}

impl UserInfo {
    fn into_profile(self) -> AppResult<ExternalProfile> {
        if self.email_verified == Some(false) {
            return Err(AppError::Unauthenticated);
        }
        let email = self
            .email
            .filter(|e| !e.trim().is_empty())
            .ok_or(AppError::Unauthenticated)?;
        Ok(ExternalProfile {
            email,
            display_name: self.name,
            avatar_url: self.picture,
        })
    }
}

#[async_trait]
impl IdentityProvider for GoogleProvider {
    fn authorize_url(&self) -> AppResult<Url> {
        Url::parse_with_params(
            AUTHORIZE_ENDPOINT,
            &[
                ("client_id", self.config.client_id.as_str()),
                ("redirect_uri", self.config.callback_url.as_str()),
                ("response_type", "code"),
                ("scope", "openid email profile"),
            ],
        )
        .map_err(|e| AppError::Internal(format!("bad authorize url: {e}")))
    }

    async fn exchange_code(&self, code: &str) -> AppResult<ExternalProfile> {
        let response = self
            .http
            .post(TOKEN_ENDPOINT)
            .form(&[
                ("code", code),
                ("client_id", self.config.client_id.as_str()),
                ("client_secret", self.config.client_secret.as_str()),
                ("redirect_uri", self.config.callback_url.as_str()),
                ("grant_type", "authorization_code"),
            ])
            .send()
            .await?;

        if response.status().is_client_error() {
            tracing::warn!(status = %response.status(), "Google rejected authorization code");
            return Err(AppError::Unauthenticated);
        }
        let token: TokenResponse = response.error_for_status()?.json().await?;

        let info: UserInfo = self
            .http
            .get(USERINFO_ENDPOINT)
            .bearer_auth(&token.access_token)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        info.into_profile()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider() -> GoogleProvider {
        GoogleProvider::new(OAuthConfig {
            client_id: "client-123".into(),
            client_secret: "shh".into(),
            callback_url: "http://localhost:3000/auth/google/callback".into(),
            client_redirect: "http://localhost:5173/oauth".into(),
        })
    }

    #[test]
    fn authorize_url_carries_client_and_callback() {
        let url = provider().authorize_url().unwrap();
        assert_eq!(url.host_str(), Some("accounts.google.com"));

        let pairs: Vec<(String, String)> = url
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        assert!(pairs.contains(&("client_id".into(), "client-123".into())));
        assert!(pairs.contains(&(
            "redirect_uri".into(),
            "http://localhost:3000/auth/google/callback".into()
        )));
        assert!(pairs.contains(&("response_type".into(), "code".into())));
        assert!(!url.as_str().contains("shh"));
    }

    #[test]
    fn userinfo_maps_to_profile() {
        let info: UserInfo = serde_json::from_str(
            r#"{"email":"j@example.com","email_verified":true,"name":"John Doe","picture":"https://lh3/p.jpg"}"#,
        )
        .unwrap();
        let profile = info.into_profile().unwrap();
        assert_eq!(profile.email, "j@example.com");
        assert_eq!(profile.display_name.as_deref(), Some("John Doe"));
        assert_eq!(profile.avatar_url.as_deref(), Some("https://lh3/p.jpg"));
    }

    #[test]
    fn unverified_or_missing_email_is_rejected() {
        let unverified: UserInfo =
            serde_json::from_str(r#"{"email":"j@example.com","email_verified":false}"#).unwrap();
        assert!(matches!(
            unverified.into_profile(),
            Err(AppError::Unauthenticated)
        ));

        let missing: UserInfo = serde_json::from_str(r#"{"name":"No Mail"}"#).unwrap();
        assert!(matches!(missing.into_profile(), Err(AppError::Unauthenticated)));
    }
}
