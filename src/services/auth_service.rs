//! Token verification
//!
//! Identities come from bearer tokens signed with the shared secret. The
//! service does not manage accounts.

use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    constants::roles,
    error::{AppError, AppResult},
};

/// JWT claims structure
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String, // user_id
    pub username: String,
    pub role: String,
    pub exp: i64,
    pub iat: i64,
}

/// Authentication service
pub struct AuthService;

impl AuthService {
    /// Verify JWT token and extract claims
    pub fn verify_token(token: &str, secret: &str) -> AppResult<Claims> {
        let token_data = decode::<Claims>(
            token,
            &DecodingKey::from_secret(secret.as_bytes()),
            &Validation::default(),
        )?;

        if !roles::ALL.contains(&token_data.claims.role.as_str()) {
            return Err(AppError::InvalidToken);
        }

        Ok(token_data.claims)
    }

    /// Sign a token for a user
    pub fn issue_token(
        user_id: &Uuid,
        username: &str,
        role: &str,
        secret: &str,
        valid_for: Duration,
    ) -> AppResult<String> {
        if !roles::ALL.contains(&role) {
            return Err(AppError::Validation(format!("Unknown role: {}", role)));
        }

        let now = Utc::now();
        let claims = Claims {
            sub: user_id.to_string(),
            username: username.to_string(),
            role: role.to_string(),
            exp: (now + valid_for).timestamp(),
            iat: now.timestamp(),
        };

        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .map_err(|e| AppError::Internal(anyhow::anyhow!("Token generation failed: {}", e)))?;

        Ok(token)
    }
}
