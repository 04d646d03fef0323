//! # Bearer Tokens
//!
//! HS256 JSON Web Tokens carrying the caller's user and company.

use crate::error::Result;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use uuid::Uuid;

/// Identity claims of a token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Authenticated user
    pub user_uuid: Uuid,
    /// Company the user acts for
    pub company_uuid: Uuid,
    /// Expiry, seconds since the Unix epoch
    pub exp: u64,
}

/// Shared-secret token configuration
#[derive(Clone, Default)]
pub struct AuthConfig {
    secret: String,
}

impl AuthConfig {
    /// Configuration signing and verifying with `secret`
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
        }
    }

    /// Whether a secret is set
    #[must_use]
    pub fn is_configured(&self) -> bool {
        !self.secret.is_empty()
    }

    /// Verify `token` and return its claims
    ///
    /// # Errors
    ///
    /// Returns `Error::Token` when the signature, algorithm or expiry is invalid.
    pub fn validate_token(&self, token: &str) -> Result<Claims> {
        let key = DecodingKey::from_secret(self.secret.as_bytes());
        let data = decode::<Claims>(token, &key, &Validation::new(Algorithm::HS256))?;
        Ok(data.claims)
    }

    /// Sign a token for `user` and `company` valid for `ttl`
    ///
    /// # Errors
    ///
    /// Returns `Error::Token` when encoding fails.
    pub fn issue_token(&self, user: Uuid, company: Uuid, ttl: Duration) -> Result<String> {
        let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default();
        let claims = Claims {
            user_uuid: user,
            company_uuid: company,
            exp: (now + ttl).as_secs(),
        };
        let key = EncodingKey::from_secret(self.secret.as_bytes());
        Ok(encode(&Header::new(Algorithm::HS256), &claims, &key)?)
    }
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("secret", &if self.is_configured() { "<redacted>" } else { "<unset>" })
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    #[test]
    fn test_issue_and_validate() {
        let config = AuthConfig::new("s3cret");
        let (user, company) = (Uuid::new_v4(), Uuid::new_v4());
        let token = config.issue_token(user, company, Duration::from_secs(60)).unwrap();

        let claims = config.validate_token(&token).unwrap();
        assert_eq!(claims.user_uuid, user);
        assert_eq!(claims.company_uuid, company);
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let token = AuthConfig::new("a")
            .issue_token(Uuid::new_v4(), Uuid::new_v4(), Duration::from_secs(60))
            .unwrap();
        let err = AuthConfig::new("b").validate_token(&token).unwrap_err();
        assert!(matches!(err, Error::Token(_)));
    }

    #[test]
    fn test_expired_rejected() {
        let config = AuthConfig::new("s3cret");
        let claims = Claims {
            user_uuid: Uuid::new_v4(),
            company_uuid: Uuid::new_v4(),
            exp: 1_000,
        };
        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(b"s3cret"),
        )
        .unwrap();
        assert!(config.validate_token(&token).is_err());
    }

    #[test]
    fn test_debug_redacts_secret() {
        let debug = format!("{:?}", AuthConfig::new("hunter2"));
        assert!(!debug.contains("hunter2"));
        assert!(!AuthConfig::default().is_configured());
    }
}
