use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::AuthConfig;

#[derive(Debug, Error)]
pub enum TokenError {
    /// Bad signature, malformed, or expired
    #[error("invalid token: {0}")]
    Invalid(jsonwebtoken::errors::Error),

    #[error("token subject is not a user id: {0}")]
    BadSubject(String),

    #[error("could not sign token: {0}")]
    Encode(jsonwebtoken::errors::Error),
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// User id
    pub sub: String,
    pub iat: i64,
    pub exp: i64,
}

/// HS256 signing and verification keys for bearer tokens.
#[derive(Clone)]
pub struct TokenKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    ttl: Duration,
}

impl TokenKeys {
    pub fn new(secret: &[u8], ttl_hours: u64) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "sub"]);

        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            validation,
            ttl: Duration::hours(ttl_hours as i64),
        }
    }

    pub fn from_config(config: &AuthConfig) -> Self {
        match config.jwt_secret.as_deref() {
            Some(secret) if !secret.is_empty() => Self::new(secret.as_bytes(), config.token_hours),
            _ => {
                tracing::warn!(
                    "auth.jwt_secret not set; using a random secret, tokens will not survive a restart"
                );
                Self::new(generate_secret().as_bytes(), config.token_hours)
            }
        }
    }

    pub fn issue(&self, user_id: i64) -> Result<String, TokenError> {
        self.issue_at(user_id, Utc::now())
    }

    pub fn issue_at(&self, user_id: i64, now: DateTime<Utc>) -> Result<String, TokenError> {
        let claims = Claims {
            sub: user_id.to_string(),
            iat: now.timestamp(),
            exp: (now + self.ttl).timestamp(),
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding).map_err(TokenError::Encode)
    }

    /// Check signature and expiry, returning the subject user id.
    pub fn verify(&self, token: &str) -> Result<i64, TokenError> {
        let data =
            decode::<Claims>(token, &self.decoding, &self.validation).map_err(TokenError::Invalid)?;
        data.claims
            .sub
            .parse::<i64>()
            .map_err(|_| TokenError::BadSubject(data.claims.sub))
    }
}

/// Generate a cryptographically random 32-byte hex secret.
fn generate_secret() -> String {
    let mut rng = rand::thread_rng();
    let bytes: [u8; 32] = rng.gen();
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}
