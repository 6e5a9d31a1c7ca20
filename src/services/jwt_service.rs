// src/services/jwt_service.rs
// DOCUMENTATION: Signing and verification of login tokens (HS256)

use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::Config;
use crate::errors::AppError;

/// Claims carried by every token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub id: Uuid,  // User ID
    pub iat: i64,  // Issued-at, unix seconds
    pub exp: i64,  // Expiration, unix seconds
}

pub struct JwtService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    expires_in: Duration,
}

impl JwtService {
    pub fn new(secret: &str, expires_in_days: i64) -> Self {
        JwtService {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            expires_in: Duration::days(expires_in_days),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(&config.jwt_secret, config.jwt_expires_in_days)
    }

    /// Issue a token for `user_id`
    pub fn sign(&self, user_id: Uuid) -> Result<String, AppError> {
        let now = Utc::now();
        let claims = Claims {
            id: user_id,
            iat: now.timestamp(),
            exp: (now + self.expires_in).timestamp(),
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key).map_err(|e| {
            log::error!("Failed to sign token: {}", e);
            AppError::InternalError(e.to_string())
        })
    }

    /// Decode a token, rejecting bad signatures and expired tokens
    pub fn verify(&self, token: &str) -> Result<Claims, AppError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;

        let decoded = decode::<Claims>(token, &self.decoding_key, &validation)?;
        Ok(decoded.claims)
    }
}
