//! Session token validation
//!
//! The hosted auth provider signs session JWTs with a shared HS256 secret.
//! Tokens are checked locally: signature, expiry and the `authenticated`
//! audience. The `sub` claim is the user ID.

use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};

use taskflow_types::UserId;

use crate::context::AuthContext;
use crate::error::AuthError;

/// Audience carried by end-user session tokens
pub const SESSION_AUDIENCE: &str = "authenticated";

/// Claims read from a session token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionClaims {
    /// Subject (user ID)
    pub sub: String,
    /// Audience
    pub aud: String,
    /// Expiration timestamp
    pub exp: i64,
    /// Issued at timestamp
    #[serde(default)]
    pub iat: Option<i64>,
    pub email: Option<String>,
    pub role: Option<String>,
}

/// Session token validator
#[derive(Clone)]
pub struct TokenValidator {
    key: DecodingKey,
    validation: Validation,
}

impl TokenValidator {
    /// Create a validator for tokens signed with `secret`
    pub fn new(secret: &str) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_audience(&[SESSION_AUDIENCE]);
        validation.leeway = 30;

        Self {
            key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
        }
    }

    /// Validate a raw token and build the caller's context
    pub fn validate(&self, token: &str) -> Result<AuthContext, AuthError> {
        let data = decode::<SessionClaims>(token, &self.key, &self.validation).map_err(|e| {
            match e.kind() {
                ErrorKind::ExpiredSignature => AuthError::TokenExpired,
                _ => AuthError::InvalidToken(e.to_string()),
            }
        })?;

        let claims = data.claims;
        let user_id = UserId::parse(&claims.sub)
            .map_err(|_| AuthError::InvalidToken("subject is not a user id".to_string()))?;

        Ok(AuthContext {
            user_id,
            email: claims.email,
            role: claims.role,
        })
    }
}

impl std::fmt::Debug for TokenValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenValidator")
            .field("algorithms", &self.validation.algorithms)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};

    const SECRET: &str = "test-jwt-secret-at-least-32-bytes-long";

    fn now() -> i64 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_secs() as i64
    }

    fn token(claims: &SessionClaims, secret: &str) -> String {
        encode(
            &Header::new(Algorithm::HS256),
            claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    fn claims(sub: &str, aud: &str, exp: i64) -> SessionClaims {
        SessionClaims {
            sub: sub.to_string(),
            aud: aud.to_string(),
            exp,
            iat: Some(now()),
            email: Some("ada@example.com".into()),
            role: Some("authenticated".into()),
        }
    }

    #[test]
    fn test_valid_token() {
        let user = UserId::new();
        let validator = TokenValidator::new(SECRET);
        let ctx = validator
            .validate(&token(
                &claims(&user.to_string(), SESSION_AUDIENCE, now() + 3600),
                SECRET,
            ))
            .unwrap();

        assert_eq!(ctx.user_id, user);
        assert_eq!(ctx.email.as_deref(), Some("ada@example.com"));
    }

    #[test]
    fn test_expired_token() {
        let validator = TokenValidator::new(SECRET);
        let result = validator.validate(&token(
            &claims(&UserId::new().to_string(), SESSION_AUDIENCE, now() - 3600),
            SECRET,
        ));
        assert!(matches!(result, Err(AuthError::TokenExpired)));
    }

    #[test]
    fn test_wrong_secret() {
        let validator = TokenValidator::new(SECRET);
        let result = validator.validate(&token(
            &claims(&UserId::new().to_string(), SESSION_AUDIENCE, now() + 3600),
            "another-secret-another-secret-xx",
        ));
        assert!(matches!(result, Err(AuthError::InvalidToken(_))));
    }

    #[test]
    fn test_wrong_audience() {
        let validator = TokenValidator::new(SECRET);
        let result = validator.validate(&token(
            &claims(&UserId::new().to_string(), "service", now() + 3600),
            SECRET,
        ));
        assert!(matches!(result, Err(AuthError::InvalidToken(_))));
    }

    #[test]
    fn test_non_uuid_subject() {
        let validator = TokenValidator::new(SECRET);
        let result = validator.validate(&token(
            &claims("not-a-uuid", SESSION_AUDIENCE, now() + 3600),
            SECRET,
        ));
        assert!(matches!(result, Err(AuthError::InvalidToken(_))));
    }
}
