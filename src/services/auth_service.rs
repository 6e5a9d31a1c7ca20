// src/services/auth_service.rs
// DOCUMENTATION: Account flows behind /users
// PURPOSE: Signup, login, token checks and password management.
// Handlers only deal with HTTP; everything here returns domain values.

use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::db::{Resource, UserRepository};
use crate::errors::AppError;
use crate::models::*;
use crate::services::email_service::{send_password_reset, EmailSender};
use crate::services::JwtService;

/// A user together with a freshly signed token
pub struct Session {
    pub user: User,
    pub token: String,
}

/// Account lookups and reset-token writes used by the forgot-password flow
#[async_trait]
pub trait AccountStore: Send + Sync {
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, AppError>;

    /// Store, or clear with `None`, the pending reset token
    async fn set_reset_token(
        &self,
        id: Uuid,
        token: Option<&PasswordResetToken>,
    ) -> Result<(), AppError>;
}

#[async_trait]
impl AccountStore for PgPool {
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        UserRepository::find_by_email(self, email).await
    }

    async fn set_reset_token(
        &self,
        id: Uuid,
        token: Option<&PasswordResetToken>,
    ) -> Result<(), AppError> {
        UserRepository::set_reset_token(self, id, token).await
    }
}

pub struct AuthService;

impl AuthService {
    pub async fn signup(
        pool: &PgPool,
        jwt: &JwtService,
        req: SignupRequest,
    ) -> Result<Session, AppError> {
        let user = UserRepository::create(pool, req).await?;
        let token = jwt.sign(user.id)?;
        Ok(Session { user, token })
    }

    pub async fn login(
        pool: &PgPool,
        jwt: &JwtService,
        req: LoginRequest,
    ) -> Result<Session, AppError> {
        let (email, password) = match (req.email, req.password) {
            (Some(email), Some(password)) if !email.is_empty() && !password.is_empty() => {
                (email, password)
            }
            _ => {
                return Err(AppError::InvalidInput(
                    "Please provide email and password!".to_string(),
                ))
            }
        };

        let incorrect = || AppError::Unauthorized("Incorrect email or password".to_string());
        let user = UserRepository::find_by_email(pool, &email)
            .await?
            .ok_or_else(incorrect)?;
        if !user.correct_password(&password).await {
            return Err(incorrect());
        }

        log::info!("User {} logged in", user.id);
        let token = jwt.sign(user.id)?;
        Ok(Session { user, token })
    }

    /// Resolve the user behind a token
    /// DOCUMENTATION: Fails when the user is gone or changed the password after the token was issued
    pub async fn authenticate(
        pool: &PgPool,
        jwt: &JwtService,
        token: &str,
    ) -> Result<User, AppError> {
        let claims = jwt.verify(token)?;

        let user = UserRepository::find_active(pool, claims.id)
            .await?
            .ok_or_else(|| {
                AppError::Unauthorized(
                    "The user belonging to this token does no longer exist.".to_string(),
                )
            })?;

        if user.changed_password_after(claims.iat) {
            return Err(AppError::Unauthorized(
                "User recently changed password! Please log in again.".to_string(),
            ));
        }

        Ok(user)
    }

    /// Email a reset link; the stored token is cleared again if sending fails
    pub async fn forgot_password(
        store: &dyn AccountStore,
        mailer: &dyn EmailSender,
        req: ForgotPasswordRequest,
        reset_base_url: &str,
    ) -> Result<(), AppError> {
        let user = store
            .find_by_email(&req.email)
            .await?
            .ok_or_else(|| {
                AppError::NotFound("There is no user with that email address.".to_string())
            })?;

        let reset = PasswordResetToken::generate();
        store.set_reset_token(user.id, Some(&reset)).await?;

        let reset_url = format!("{}/{}", reset_base_url.trim_end_matches('/'), reset.plain);
        if let Err(err) = send_password_reset(mailer, &user.email, &reset_url).await {
            if let Err(rollback) = store.set_reset_token(user.id, None).await {
                log::error!("Failed to clear reset token of user {}: {}", user.id, rollback);
            }
            return Err(err);
        }

        log::info!("Password reset token sent to user {}", user.id);
        Ok(())
    }

    pub async fn reset_password(
        pool: &PgPool,
        jwt: &JwtService,
        token: &str,
        req: ResetPasswordRequest,
    ) -> Result<Session, AppError> {
        req.check_confirmation()?;

        let user = UserRepository::find_by_reset_token(pool, &hash_reset_token(token))
            .await?
            .ok_or_else(|| AppError::InvalidInput("Token is invalid or has expired".to_string()))?;

        let password_hash = hash_password(&req.password).await?;
        let user = UserRepository::set_password(pool, user.id, &password_hash).await?;

        let token = jwt.sign(user.id)?;
        Ok(Session { user, token })
    }

    pub async fn update_password(
        pool: &PgPool,
        jwt: &JwtService,
        user: &User,
        req: UpdatePasswordRequest,
    ) -> Result<Session, AppError> {
        if !user.correct_password(&req.password_current).await {
            return Err(AppError::Unauthorized(
                "Your current password is wrong.".to_string(),
            ));
        }
        req.check_confirmation()?;

        let password_hash = hash_password(&req.password).await?;
        let user = UserRepository::set_password(pool, user.id, &password_hash).await?;

        let token = jwt.sign(user.id)?;
        Ok(Session { user, token })
    }
}
