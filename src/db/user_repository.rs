// src/db/user_repository.rs
// DOCUMENTATION: Database access layer for user accounts
// PURPOSE: Account lookup for authentication, credential updates and admin CRUD

use crate::db::resource::{Field, FieldKind, Resource};
use crate::db::ApiFeatures;
use crate::errors::AppError;
use crate::models::*;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool, QueryBuilder};
use uuid::Uuid;

const USER_SELECT: &str = r#"
    SELECT
        id, name, email, photo, role, password_hash, password_changed_at,
        password_reset_token, password_reset_expires, active, created_at, updated_at
    FROM users
"#;

/// Profile/role update; deactivated accounts are never matched
const UPDATE_ACTIVE_USER: &str = r#"
    UPDATE users
    SET name = COALESCE($1, name),
        email = COALESCE($2, email),
        photo = COALESCE($3, photo),
        role = COALESCE($4, role),
        updated_at = NOW()
    WHERE id = $5 AND active = true
    RETURNING
        id, name, email, photo, role, password_hash, password_changed_at,
        password_reset_token, password_reset_expires, active, created_at, updated_at
"#;

const DELETE_ACTIVE_USER: &str = "DELETE FROM users WHERE id = $1 AND active = true";

const USER_FIELDS: &[Field] = &[
    Field::new("name", "name", FieldKind::Text),
    Field::new("email", "email", FieldKind::Text),
    Field::new("role", "role", FieldKind::Text),
    Field::new("createdAt", "created_at", FieldKind::Timestamp),
];

#[derive(Debug, FromRow)]
struct UserRow {
    id: Uuid,
    name: String,
    email: String,
    photo: String,
    role: String,
    password_hash: String,
    password_changed_at: Option<DateTime<Utc>>,
    password_reset_token: Option<String>,
    password_reset_expires: Option<DateTime<Utc>>,
    active: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl UserRow {
    fn to_user(self) -> Result<User, AppError> {
        Ok(User {
            id: self.id,
            name: self.name,
            email: self.email,
            photo: self.photo,
            role: self.role.parse()?,
            password_hash: self.password_hash,
            password_changed_at: self.password_changed_at,
            password_reset_token: self.password_reset_token,
            password_reset_expires: self.password_reset_expires,
            active: self.active,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

/// Emails are stored lowercase
fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// UserRepository: All database operations for users
/// DOCUMENTATION: Deactivated accounts are invisible to every lookup
pub struct UserRepository;

impl UserRepository {
    async fn fetch_one_where(
        pool: &PgPool,
        condition: &str,
        value: &str,
    ) -> Result<Option<User>, AppError> {
        let sql = format!("{} WHERE active = true AND {}", USER_SELECT, condition);
        sqlx::query_as::<_, UserRow>(&sql)
            .bind(value)
            .fetch_optional(pool)
            .await?
            .map(UserRow::to_user)
            .transpose()
    }

    /// Active user by ID, `None` when missing or deactivated
    pub async fn find_active(pool: &PgPool, id: Uuid) -> Result<Option<User>, AppError> {
        let sql = format!("{} WHERE id = $1 AND active = true", USER_SELECT);
        sqlx::query_as::<_, UserRow>(&sql)
            .bind(id)
            .fetch_optional(pool)
            .await?
            .map(UserRow::to_user)
            .transpose()
    }

    pub async fn find_by_email(pool: &PgPool, email: &str) -> Result<Option<User>, AppError> {
        Self::fetch_one_where(pool, "email = $1", &normalize_email(email)).await
    }

    /// User owning an unexpired reset token (hashed form)
    pub async fn find_by_reset_token(
        pool: &PgPool,
        hashed_token: &str,
    ) -> Result<Option<User>, AppError> {
        Self::fetch_one_where(
            pool,
            "password_reset_token = $1 AND password_reset_expires > NOW()",
            hashed_token,
        )
        .await
    }

    /// Store (or clear, with `None`) a password reset token
    pub async fn set_reset_token(
        pool: &PgPool,
        id: Uuid,
        token: Option<&PasswordResetToken>,
    ) -> Result<(), AppError> {
        sqlx::query(
            r#"
            UPDATE users
            SET password_reset_token = $1, password_reset_expires = $2
            WHERE id = $3
            "#,
        )
        .bind(token.map(|t| t.hashed.as_str()))
        .bind(token.map(|t| t.expires_at))
        .bind(id)
        .execute(pool)
        .await?;

        Ok(())
    }

    /// Replace the password hash and invalidate any pending reset token
    /// DOCUMENTATION: password_changed_at is backdated one second so a token
    /// issued right after the change is still accepted
    pub async fn set_password(
        pool: &PgPool,
        id: Uuid,
        password_hash: &str,
    ) -> Result<User, AppError> {
        let sql = r#"
            UPDATE users
            SET password_hash = $1,
                password_changed_at = NOW() - INTERVAL '1 second',
                password_reset_token = NULL,
                password_reset_expires = NULL,
                updated_at = NOW()
            WHERE id = $2
            RETURNING
                id, name, email, photo, role, password_hash, password_changed_at,
                password_reset_token, password_reset_expires, active, created_at, updated_at
        "#;

        let row = sqlx::query_as::<_, UserRow>(sql)
            .bind(password_hash)
            .bind(id)
            .fetch_optional(pool)
            .await?
            .ok_or_else(AppError::no_document)?;

        log::info!("Password changed for user {}", id);
        row.to_user()
    }

    /// Self-service profile update; only name, email and photo
    pub async fn update_me(
        pool: &PgPool,
        id: Uuid,
        req: &UpdateMeRequest,
    ) -> Result<User, AppError> {
        Self::apply_update(
            pool,
            id,
            req.name.as_deref(),
            req.email.as_deref(),
            req.photo.as_deref(),
            None,
        )
        .await
    }

    /// Soft delete: the account stays but can no longer log in
    pub async fn deactivate(pool: &PgPool, id: Uuid) -> Result<(), AppError> {
        sqlx::query("UPDATE users SET active = false, updated_at = NOW() WHERE id = $1 AND active = true")
            .bind(id)
            .execute(pool)
            .await?;

        log::info!("Deactivated user {}", id);
        Ok(())
    }

    async fn apply_update(
        pool: &PgPool,
        id: Uuid,
        name: Option<&str>,
        email: Option<&str>,
        photo: Option<&str>,
        role: Option<Role>,
    ) -> Result<User, AppError> {
        let row = sqlx::query_as::<_, UserRow>(UPDATE_ACTIVE_USER)
            .bind(name)
            .bind(email.map(normalize_email))
            .bind(photo)
            .bind(role.map(|r| r.as_str()))
            .bind(id)
            .fetch_optional(pool)
            .await?
            .ok_or_else(|| AppError::NotFound("No user found with that ID".to_string()))?;

        row.to_user()
    }
}

#[async_trait]
impl Resource for UserRepository {
    type Model = User;
    type Detail = User;
    type Create = SignupRequest;
    type Update = UpdateUserRequest;

    const NAME: &'static str = "user";
    const FIELDS: &'static [Field] = USER_FIELDS;

    async fn find_all(pool: &PgPool, features: &ApiFeatures) -> Result<Vec<User>, AppError> {
        let mut qb = QueryBuilder::new(USER_SELECT);
        qb.push(" WHERE active = true");
        features.push_filters(&mut qb, USER_FIELDS)?;
        features.push_order(&mut qb, USER_FIELDS, "created_at DESC")?;
        features.push_pagination(&mut qb);

        let rows = qb.build_query_as::<UserRow>().fetch_all(pool).await?;
        rows.into_iter().map(UserRow::to_user).collect()
    }

    async fn find_one(pool: &PgPool, id: Uuid) -> Result<User, AppError> {
        Self::find_active(pool, id)
            .await?
            .ok_or_else(|| AppError::NotFound("No user found with that ID".to_string()))
    }

    /// Registration; the role always starts as `user`
    async fn create(pool: &PgPool, req: SignupRequest) -> Result<User, AppError> {
        req.check_confirmation()?;
        let password_hash = hash_password(&req.password).await?;

        let sql = r#"
            INSERT INTO users (name, email, photo, role, password_hash)
            VALUES ($1, $2, COALESCE($3, 'default.jpg'), 'user', $4)
            RETURNING
                id, name, email, photo, role, password_hash, password_changed_at,
                password_reset_token, password_reset_expires, active, created_at, updated_at
        "#;

        let row = sqlx::query_as::<_, UserRow>(sql)
            .bind(req.name.trim())
            .bind(normalize_email(&req.email))
            .bind(&req.photo)
            .bind(password_hash)
            .fetch_one(pool)
            .await?;

        let user = row.to_user()?;
        log::info!("Created user {} ({})", user.email, user.id);
        Ok(user)
    }

    /// Admin update; passwords are never changed here
    async fn update(pool: &PgPool, id: Uuid, req: UpdateUserRequest) -> Result<User, AppError> {
        Self::apply_update(
            pool,
            id,
            req.name.as_deref(),
            req.email.as_deref(),
            req.photo.as_deref(),
            req.role,
        )
        .await
    }

    async fn delete(pool: &PgPool, id: Uuid) -> Result<(), AppError> {
        let rows = sqlx::query(DELETE_ACTIVE_USER)
            .bind(id)
            .execute(pool)
            .await?
            .rows_affected();

        if rows == 0 {
            return Err(AppError::NotFound("No user found with that ID".to_string()));
        }

        log::info!("Deleted user {}", id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_writes_skip_deactivated_accounts() {
        assert!(UPDATE_ACTIVE_USER.contains("WHERE id = $5 AND active = true"));
        assert!(DELETE_ACTIVE_USER.ends_with("AND active = true"));
        assert!(USER_SELECT.contains("active"));
    }

    #[test]
    fn test_normalize_email() {
        assert_eq!(normalize_email("  Admin@Natours.IO "), "admin@natours.io");
    }

    #[test]
    fn test_row_to_user_parses_role() {
        let row = UserRow {
            id: Uuid::new_v4(),
            name: "Jonas".to_string(),
            email: "jonas@example.com".to_string(),
            photo: "default.jpg".to_string(),
            role: "lead-guide".to_string(),
            password_hash: "hash".to_string(),
            password_changed_at: None,
            password_reset_token: None,
            password_reset_expires: None,
            active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        let user = row.to_user().unwrap();
        assert_eq!(user.role, Role::LeadGuide);

        let json = serde_json::to_value(&user).unwrap();
        assert!(json.get("passwordHash").is_none());
        assert!(json.get("active").is_none());
        assert_eq!(json["role"], "lead-guide");
    }
}
