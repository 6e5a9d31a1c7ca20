// src/models/user.rs
// DOCUMENTATION: User accounts, roles and credential helpers
// PURPOSE: API/database shapes for users plus password and reset-token logic

use chrono::{DateTime, Duration, Utc};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;
use tokio::task;
use uuid::Uuid;
use validator::Validate;

use crate::errors::AppError;

/// bcrypt work factor used for every stored password
pub const BCRYPT_COST: u32 = 12;

/// Reset tokens expire after ten minutes
pub const RESET_TOKEN_TTL_MINUTES: i64 = 10;

/// Access level of an account
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Role {
    User,
    Guide,
    LeadGuide,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Guide => "guide",
            Role::LeadGuide => "lead-guide",
            Role::Admin => "admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Role::User),
            "guide" => Ok(Role::Guide),
            "lead-guide" => Ok(Role::LeadGuide),
            "admin" => Ok(Role::Admin),
            other => Err(AppError::InvalidInput(format!("Unknown role: {}", other))),
        }
    }
}

/// A user account
/// DOCUMENTATION: Credential fields are never serialized into API responses
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub photo: String,
    pub role: Role,

    #[serde(skip_serializing)]
    pub password_hash: String,

    #[serde(skip_serializing)]
    pub password_changed_at: Option<DateTime<Utc>>,

    #[serde(skip_serializing)]
    pub password_reset_token: Option<String>,

    #[serde(skip_serializing)]
    pub password_reset_expires: Option<DateTime<Utc>>,

    #[serde(skip_serializing)]
    pub active: bool,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// Compare a plain candidate password against the stored hash
    /// DOCUMENTATION: bcrypt runs on the blocking pool, off the request worker
    pub async fn correct_password(&self, candidate: &str) -> bool {
        let candidate = candidate.to_string();
        let hash = self.password_hash.clone();

        match task::spawn_blocking(move || bcrypt::verify(candidate, &hash)).await {
            Ok(result) => result.unwrap_or(false),
            Err(e) => {
                log::error!("Password verification task failed: {}", e);
                false
            }
        }
    }

    /// True when the password was changed after a token issued at `jwt_iat` (unix seconds)
    pub fn changed_password_after(&self, jwt_iat: i64) -> bool {
        match self.password_changed_at {
            Some(changed_at) => jwt_iat < changed_at.timestamp(),
            None => false,
        }
    }

    pub fn has_role(&self, roles: &[Role]) -> bool {
        roles.contains(&self.role)
    }
}

/// Hash a plain password for storage, on the blocking pool
pub async fn hash_password(password: &str) -> Result<String, AppError> {
    let password = password.to_string();

    task::spawn_blocking(move || bcrypt::hash(password, BCRYPT_COST))
        .await
        .map_err(|e| AppError::InternalError(e.to_string()))?
        .map_err(|e| {
            log::error!("Password hashing failed: {}", e);
            AppError::InternalError(e.to_string())
        })
}

/// SHA-256 hex digest of a reset token, the only form that is persisted
pub fn hash_reset_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// A freshly generated password reset token
#[derive(Debug, Clone)]
pub struct PasswordResetToken {
    /// Sent to the user, never stored
    pub plain: String,
    pub hashed: String,
    pub expires_at: DateTime<Utc>,
}

impl PasswordResetToken {
    pub fn generate() -> Self {
        let mut bytes = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut bytes);
        let plain: String = bytes.iter().map(|b| format!("{:02x}", b)).collect();

        PasswordResetToken {
            hashed: hash_reset_token(&plain),
            plain,
            expires_at: Utc::now() + Duration::minutes(RESET_TOKEN_TTL_MINUTES),
        }
    }
}

fn passwords_match(password: &str, confirm: &str) -> Result<(), AppError> {
    if password != confirm {
        return Err(AppError::ValidationError(
            "Passwords are not the same!".to_string(),
        ));
    }
    Ok(())
}

/// POST /users/signup
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SignupRequest {
    #[validate(length(min = 1, max = 100, message = "Please tell us your name!"))]
    pub name: String,

    #[validate(email(message = "Please provide a valid email"))]
    pub email: String,

    #[serde(default)]
    pub photo: Option<String>,

    #[validate(length(min = 8, message = "Password must have at least 8 characters"))]
    pub password: String,

    pub password_confirm: String,
}

impl SignupRequest {
    pub fn check_confirmation(&self) -> Result<(), AppError> {
        passwords_match(&self.password, &self.password_confirm)
    }
}

/// POST /users/login
/// Both fields are optional so a missing one yields a 400 instead of a parse error
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: Option<String>,
    pub password: Option<String>,
}

/// POST /users/forgot-password
#[derive(Debug, Deserialize, Validate)]
pub struct ForgotPasswordRequest {
    #[validate(email(message = "Please provide a valid email"))]
    pub email: String,
}

/// PATCH /users/reset-password/{token}
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ResetPasswordRequest {
    #[validate(length(min = 8, message = "Password must have at least 8 characters"))]
    pub password: String,

    pub password_confirm: String,
}

impl ResetPasswordRequest {
    pub fn check_confirmation(&self) -> Result<(), AppError> {
        passwords_match(&self.password, &self.password_confirm)
    }
}

/// PATCH /users/update-password
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdatePasswordRequest {
    pub password_current: String,

    #[validate(length(min = 8, message = "Password must have at least 8 characters"))]
    pub password: String,

    pub password_confirm: String,
}

impl UpdatePasswordRequest {
    pub fn check_confirmation(&self) -> Result<(), AppError> {
        passwords_match(&self.password, &self.password_confirm)
    }
}

/// PATCH /users (current user)
/// Only name, email and photo are applied; password fields are rejected
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateMeRequest {
    #[validate(length(min = 1, max = 100))]
    pub name: Option<String>,

    #[validate(email(message = "Please provide a valid email"))]
    pub email: Option<String>,

    pub photo: Option<String>,

    #[serde(default)]
    pub password: Option<Value>,

    #[serde(default)]
    pub password_confirm: Option<Value>,
}

impl UpdateMeRequest {
    pub fn reject_password_fields(&self) -> Result<(), AppError> {
        if self.password.is_some() || self.password_confirm.is_some() {
            return Err(AppError::InvalidInput(
                "This route is not for password updates. Please use /update-password."
                    .to_string(),
            ));
        }
        Ok(())
    }
}

/// PUT /users/{id} (admin)
/// Deactivated accounts stay hidden; there is no reactivation
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateUserRequest {
    #[validate(length(min = 1, max = 100))]
    pub name: Option<String>,

    #[validate(email(message = "Please provide a valid email"))]
    pub email: Option<String>,

    pub photo: Option<String>,

    pub role: Option<Role>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user_with_password(password: &str) -> User {
        User {
            id: Uuid::new_v4(),
            name: "Laura Wilson".to_string(),
            email: "laura@example.com".to_string(),
            photo: "default.jpg".to_string(),
            role: Role::User,
            password_hash: bcrypt::hash(password, 4).unwrap(),
            password_changed_at: None,
            password_reset_token: None,
            password_reset_expires: None,
            active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_role_round_trips_through_text() {
        for role in [Role::User, Role::Guide, Role::LeadGuide, Role::Admin] {
            assert_eq!(role.as_str().parse::<Role>().unwrap(), role);
        }
        assert!("superuser".parse::<Role>().is_err());
        assert_eq!(serde_json::to_value(Role::LeadGuide).unwrap(), "lead-guide");
    }

    #[tokio::test]
    async fn test_correct_password() {
        let user = user_with_password("test1234");
        assert!(user.correct_password("test1234").await);
        assert!(!user.correct_password("wrong-password").await);
    }

    #[tokio::test]
    async fn test_hash_password_uses_work_factor() {
        let hash = hash_password("pass1234").await.unwrap();
        assert!(hash.starts_with("$2b$12$"));

        let mut user = user_with_password("unused");
        user.password_hash = hash;
        assert!(user.correct_password("pass1234").await);
    }

    #[test]
    fn test_changed_password_after() {
        let mut user = user_with_password("test1234");
        let issued_at = Utc::now().timestamp();
        assert!(!user.changed_password_after(issued_at));

        user.password_changed_at = Some(Utc::now() + Duration::seconds(30));
        assert!(user.changed_password_after(issued_at));

        user.password_changed_at = Some(Utc::now() - Duration::hours(1));
        assert!(!user.changed_password_after(issued_at));
    }

    #[test]
    fn test_serialization_hides_credentials() {
        let user = user_with_password("test1234");
        let json = serde_json::to_value(&user).unwrap();
        assert!(json.get("passwordHash").is_none());
        assert!(json.get("passwordResetToken").is_none());
        assert!(json.get("active").is_none());
        assert_eq!(json["role"], "user");
        assert_eq!(json["name"], "Laura Wilson");
    }

    #[test]
    fn test_reset_token_generation() {
        let token = PasswordResetToken::generate();
        assert_eq!(token.plain.len(), 64);
        assert_eq!(token.hashed, hash_reset_token(&token.plain));
        assert_ne!(token.plain, token.hashed);
        assert!(token.expires_at > Utc::now());
        assert!(token.expires_at <= Utc::now() + Duration::minutes(RESET_TOKEN_TTL_MINUTES));
    }

    #[test]
    fn test_signup_validation() {
        let req = SignupRequest {
            name: "Jonas".to_string(),
            email: "not-an-email".to_string(),
            photo: None,
            password: "short".to_string(),
            password_confirm: "short".to_string(),
        };
        let err: AppError = req.validate().unwrap_err().into();
        let message = err.to_string();
        assert!(message.contains("valid email"));
        assert!(message.contains("at least 8 characters"));
    }

    #[test]
    fn test_password_confirmation_mismatch() {
        let req = ResetPasswordRequest {
            password: "pass1234".to_string(),
            password_confirm: "pass12345".to_string(),
        };
        assert!(req.validate().is_ok());
        assert!(req.check_confirmation().is_err());
    }

    #[test]
    fn test_update_me_rejects_password() {
        let req: UpdateMeRequest =
            serde_json::from_value(serde_json::json!({ "name": "New", "password": "x" }))
                .unwrap();
        assert!(req.reject_password_fields().is_err());

        let req: UpdateMeRequest =
            serde_json::from_value(serde_json::json!({ "name": "New" })).unwrap();
        assert!(req.reject_password_fields().is_ok());
    }
}
