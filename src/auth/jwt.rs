use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, TokenData, Validation};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::config::Config;
use crate::error::{AppError, AppResult};

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    pub sub: Uuid,
    pub email: String,
    pub exp: i64,
    pub iat: i64,
    pub token_type: TokenType,
    #[serde(default)]
    pub jti: Option<Uuid>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TokenType {
    Access,
    Refresh,
}

#[derive(Debug)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

fn sign(
    user_id: Uuid,
    email: &str,
    token_type: TokenType,
    ttl_secs: i64,
    config: &Config,
) -> AppResult<String> {
    let now = Utc::now();
    let claims = Claims {
        sub: user_id,
        email: email.to_string(),
        exp: (now + Duration::seconds(ttl_secs)).timestamp(),
        iat: now.timestamp(),
        token_type,
        // refresh tokens must hash uniquely even when issued in the same second
        jti: (token_type == TokenType::Refresh).then(Uuid::new_v4),
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(config.jwt_secret.as_bytes()),
    )
    .map_err(|e| AppError::Internal(anyhow::anyhow!("Failed to sign {:?} token: {}", token_type, e)))
}

pub fn create_access_token(user_id: Uuid, email: &str, config: &Config) -> AppResult<String> {
    sign(user_id, email, TokenType::Access, config.jwt_access_ttl_secs, config)
}

pub fn create_refresh_token(user_id: Uuid, email: &str, config: &Config) -> AppResult<String> {
    sign(user_id, email, TokenType::Refresh, config.jwt_refresh_ttl_secs, config)
}

pub fn create_token_pair(user_id: Uuid, email: &str, config: &Config) -> AppResult<TokenPair> {
    Ok(TokenPair {
        access_token: create_access_token(user_id, email, config)?,
        refresh_token: create_refresh_token(user_id, email, config)?,
    })
}

/// SHA-256 of a raw token as lowercase hex; only the hash is stored.
pub fn hash_token(raw_token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(raw_token.as_bytes());
    format!("{:x}", hasher.finalize())
}

pub fn verify_token(token: &str, config: &Config) -> AppResult<TokenData<Claims>> {
    let mut validation = Validation::default();
    validation.validate_exp = true;

    decode::<Claims>(
        token,
        &DecodingKey::from_secret(config.jwt_secret.as_bytes()),
        &validation,
    )
    .map_err(|_| AppError::Unauthorized)
}

/// Verify and additionally require the given token type.
pub fn verify_token_of_type(
    token: &str,
    expected: TokenType,
    config: &Config,
) -> AppResult<Claims> {
    let data = verify_token(token, config)?;
    if data.claims.token_type != expected {
        return Err(AppError::Unauthorized);
    }
    Ok(data.claims)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_access_token_round_trip() {
        let config = Config::for_tests();
        let user_id = Uuid::new_v4();
        let token = create_access_token(user_id, "an@example.com", &config).unwrap();

        let claims = verify_token_of_type(&token, TokenType::Access, &config).unwrap();
        assert_eq!(claims.sub, user_id);
        assert_eq!(claims.email, "an@example.com");
        assert!(claims.jti.is_none());
    }

    #[test]
    fn test_refresh_token_is_not_an_access_token() {
        let config = Config::for_tests();
        let token = create_refresh_token(Uuid::new_v4(), "", &config).unwrap();
        assert!(matches!(
            verify_token_of_type(&token, TokenType::Access, &config),
            Err(AppError::Unauthorized)
        ));
        let claims = verify_token_of_type(&token, TokenType::Refresh, &config).unwrap();
        assert!(claims.jti.is_some());
    }

    #[test]
    fn test_refresh_tokens_are_unique() {
        let config = Config::for_tests();
        let user_id = Uuid::new_v4();
        let a = create_refresh_token(user_id, "", &config).unwrap();
        let b = create_refresh_token(user_id, "", &config).unwrap();
        assert_ne!(hash_token(&a), hash_token(&b));
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let config = Config::for_tests();
        let token = create_access_token(Uuid::new_v4(), "", &config).unwrap();

        let mut other = Config::for_tests();
        other.jwt_secret = "a-different-secret".into();
        assert!(verify_token(&token, &other).is_err());
    }

    #[test]
    fn test_expired_token_rejected() {
        let mut config = Config::for_tests();
        // beyond the default 60s leeway
        config.jwt_access_ttl_secs = -3600;
        let token = create_access_token(Uuid::new_v4(), "", &config).unwrap();
        assert!(verify_token(&token, &config).is_err());
    }

    #[test]
    fn test_hash_token_deterministic() {
        let h1 = hash_token("test-refresh-token-value");
        let h2 = hash_token("test-refresh-token-value");
        assert_eq!(h1, h2);
        assert_eq!(h1.len(), 64); // SHA-256 hex = 64 chars
        assert_ne!(h1, hash_token("token-b"));
    }
}
