//! Signed session tokens (HS256 JWT).

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::errors::AppError;
use crate::models::User;

/// Claims carried by a session token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// User id
    pub sub: String,
    pub email: String,
    pub role: String,
    pub iat: i64,
    pub exp: i64,
}

/// Issue a token for `user` valid for `ttl_hours`.
pub fn issue(user: &User, secret: &str, ttl_hours: i64) -> Result<(String, DateTime<Utc>), AppError> {
    let now = Utc::now();
    let expires_at = now + Duration::hours(ttl_hours);
    let claims = Claims {
        sub: user.id.clone(),
        email: user.email.clone(),
        role: user.role.as_str().to_string(),
        iat: now.timestamp(),
        exp: expires_at.timestamp(),
    };

    let token = encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| AppError::Internal(format!("Failed to sign token: {}", e)))?;

    Ok((token, expires_at))
}

/// Verify signature and expiry, returning the claims.
pub fn verify(token: &str, secret: &str) -> Result<Claims, AppError> {
    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::new(Algorithm::HS256),
    )?;
    Ok(data.claims)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Role;

    fn user() -> User {
        User {
            id: "u-1".into(),
            email: "asha@example.com".into(),
            name: "Asha".into(),
            phone: None,
            role: Role::Customer,
            created_at: String::new(),
            updated_at: String::new(),
        }
    }

    #[test]
    fn test_issue_and_verify() {
        let (token, expires_at) = issue(&user(), "secret", 2).unwrap();
        let claims = verify(&token, "secret").unwrap();
        assert_eq!(claims.sub, "u-1");
        assert_eq!(claims.role, "customer");
        assert_eq!(claims.exp, expires_at.timestamp());
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let (token, _) = issue(&user(), "secret", 2).unwrap();
        assert!(matches!(
            verify(&token, "other-secret"),
            Err(AppError::Unauthorized(_))
        ));
    }

    #[test]
    fn test_expired_token_rejected() {
        let past = Utc::now() - Duration::hours(3);
        let claims = Claims {
            sub: "u-1".into(),
            email: "asha@example.com".into(),
            role: "customer".into(),
            iat: past.timestamp(),
            exp: (past + Duration::minutes(5)).timestamp(),
        };
        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(b"secret"),
        )
        .unwrap();
        assert!(verify(&token, "secret").is_err());
    }

    #[test]
    fn test_garbage_rejected() {
        assert!(verify("not.a.token", "secret").is_err());
    }
}
