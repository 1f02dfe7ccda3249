//! HS256 bearer tokens for anonymous users.

use std::time::{SystemTime, UNIX_EPOCH};

use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::AuthConfig;

pub const ANONYMOUS_ACCOUNT: &str = "anonymous";
pub const TOKEN_TYPE: &str = "bearer";

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Not authenticated")]
    MissingToken,

    #[error("Could not validate credentials")]
    InvalidToken(#[source] jsonwebtoken::errors::Error),

    #[error("Token has no subject")]
    MissingSubject,

    #[error("Failed to sign token: {0}")]
    Signing(#[source] jsonwebtoken::errors::Error),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct Claims {
    pub sub: String,
    #[serde(rename = "type")]
    pub account_type: String,
    pub exp: u64,
    #[serde(default)]
    pub iat: u64,
}

/// The caller a valid token identifies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Principal {
    pub user_id: String,
    #[serde(rename = "type")]
    pub account_type: String,
}

/// Response body of `POST /auth/anonymous`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IssuedToken {
    pub user_id: String,
    pub access_token: String,
    pub token_type: String,
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

pub struct TokenIssuer {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    ttl_secs: u64,
}

impl TokenIssuer {
    pub fn new(secret: &[u8], ttl_secs: u64) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.required_spec_claims = ["exp", "sub"].iter().map(|c| c.to_string()).collect();
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            validation,
            ttl_secs,
        }
    }

    /// Uses the configured secret, or a random one that only lives as long
    /// as this process. Returns whether the secret was generated.
    pub fn from_config(config: &AuthConfig) -> (Self, bool) {
        match config.secret.as_deref().filter(|s| !s.is_empty()) {
            Some(secret) => (Self::new(secret.as_bytes(), config.token_ttl_secs), false),
            None => {
                let mut secret = [0u8; 32];
                rand::rng().fill_bytes(&mut secret);
                (Self::new(&secret, config.token_ttl_secs), true)
            }
        }
    }

    pub fn issue_anonymous(&self) -> Result<IssuedToken, AuthError> {
        let user_id = format!("anon_{}", uuid::Uuid::new_v4());
        let access_token = self.sign(&user_id, ANONYMOUS_ACCOUNT)?;
        debug!(user_id = %user_id, "Issued anonymous token");
        Ok(IssuedToken {
            user_id,
            access_token,
            token_type: TOKEN_TYPE.to_string(),
        })
    }

    pub(crate) fn sign(&self, subject: &str, account_type: &str) -> Result<String, AuthError> {
        let iat = now_secs();
        let claims = Claims {
            sub: subject.to_string(),
            account_type: account_type.to_string(),
            exp: iat.saturating_add(self.ttl_secs),
            iat,
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding).map_err(AuthError::Signing)
    }

    pub fn verify(&self, token: &str) -> Result<Principal, AuthError> {
        let data = decode::<Claims>(token, &self.decoding, &self.validation)
            .map_err(AuthError::InvalidToken)?;
        if data.claims.sub.is_empty() {
            return Err(AuthError::MissingSubject);
        }
        Ok(Principal {
            user_id: data.claims.sub,
            account_type: data.claims.account_type,
        })
    }
}
