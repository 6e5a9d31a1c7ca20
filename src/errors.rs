// src/errors.rs
// DOCUMENTATION: Custom error types and HTTP responses
// PURPOSE: Centralized error handling for entire application

use actix_web::{error::ResponseError, http::StatusCode, HttpResponse};
use serde_json::json;
use thiserror::Error;

/// Application-specific error types
/// DOCUMENTATION: Operational errors carry a status and a client-facing message.
/// DatabaseError and InternalError are programming errors: they are logged and the
/// client only sees a generic message.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    InvalidInput(String),

    #[error("Invalid input data. {0}")]
    ValidationError(String),

    #[error("Duplicate field value for {0}. Please use another value!")]
    Duplicate(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("{0}")]
    EmailError(String),

    #[error("Too many requests from this IP, please try again in an hour!")]
    RateLimitExceeded,

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl AppError {
    pub fn not_logged_in() -> Self {
        AppError::Unauthorized("You are not logged in! Please log in to get access.".to_string())
    }

    pub fn no_permission() -> Self {
        AppError::Forbidden("You do not have permission to perform this action".to_string())
    }

    pub fn no_document() -> Self {
        AppError::NotFound("No document found with that ID".to_string())
    }

    /// Whether the message is safe to show to clients
    pub fn is_operational(&self) -> bool {
        !matches!(self, AppError::DatabaseError(_) | AppError::InternalError(_))
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => AppError::no_document(),
            sqlx::Error::Database(db_err) => {
                if db_err.is_unique_violation() {
                    let field = duplicate_field(db_err.constraint().unwrap_or_default());
                    return AppError::Duplicate(field);
                }
                if db_err.is_check_violation() {
                    return AppError::ValidationError(format!(
                        "Constraint {} failed",
                        db_err.constraint().unwrap_or("check")
                    ));
                }
                if db_err.is_foreign_key_violation() {
                    return AppError::InvalidInput(
                        "Referenced tour or user does not exist".to_string(),
                    );
                }
                log::error!("Database error: {}", db_err);
                AppError::DatabaseError(db_err.to_string())
            }
            other => {
                log::error!("Database error: {}", other);
                AppError::DatabaseError(other.to_string())
            }
        }
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let mut messages: Vec<String> = errors
            .field_errors()
            .into_iter()
            .flat_map(|(field, errs)| {
                errs.iter().map(move |e| match &e.message {
                    Some(msg) => msg.to_string(),
                    None => format!("{} is invalid ({})", field, e.code),
                })
            })
            .collect();
        messages.sort();
        AppError::ValidationError(messages.join(". "))
    }
}

impl From<jsonwebtoken::errors::Error> for AppError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        match err.kind() {
            jsonwebtoken::errors::ErrorKind::ExpiredSignature => AppError::Unauthorized(
                "Your token has expired! Please log in again.".to_string(),
            ),
            _ => AppError::Unauthorized("Invalid token. Please log in again!".to_string()),
        }
    }
}

/// "tours_name_key" -> "name", "reviews_tour_id_user_id_key" -> "tour_id_user_id"
fn duplicate_field(constraint: &str) -> String {
    let trimmed = constraint.strip_suffix("_key").unwrap_or(constraint);
    match trimmed.split_once('_') {
        Some((_, field)) if !field.is_empty() => field.to_string(),
        _ => "field".to_string(),
    }
}

/// Convert AppError to HTTP response
/// DOCUMENTATION: 4xx answer {status:"fail"}, 5xx answer {status:"error"}
impl ResponseError for AppError {
    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        let message = if self.is_operational() {
            self.to_string()
        } else {
            log::error!("ERROR: {}", self);
            "Something went very wrong!".to_string()
        };

        let body = json!({
            "status": if status.is_server_error() { "error" } else { "fail" },
            "message": message,
        });

        HttpResponse::build(status).json(body)
    }

    fn status_code(&self) -> StatusCode {
        match self {
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            AppError::ValidationError(_) => StatusCode::BAD_REQUEST,
            AppError::Duplicate(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::DatabaseError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::EmailError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::RateLimitExceeded => StatusCode::TOO_MANY_REQUESTS,
            AppError::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::body::to_bytes;

    async fn body_json(err: AppError) -> serde_json::Value {
        let resp = err.error_response();
        let bytes = to_bytes(resp.into_body()).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[actix_rt::test]
    async fn test_operational_error_shape() {
        let err = AppError::NotFound("No tour found".to_string());
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);

        let body = body_json(err).await;
        assert_eq!(body["status"], "fail");
        assert_eq!(body["message"], "No tour found");
    }

    #[actix_rt::test]
    async fn test_programming_error_is_hidden() {
        let err = AppError::DatabaseError("relation \"tours\" does not exist".to_string());
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);

        let body = body_json(err).await;
        assert_eq!(body["status"], "error");
        assert_eq!(body["message"], "Something went very wrong!");
    }

    #[actix_rt::test]
    async fn test_email_error_keeps_message() {
        let err = AppError::EmailError("There was an error sending the email".to_string());
        let body = body_json(err).await;
        assert_eq!(body["status"], "error");
        assert_eq!(body["message"], "There was an error sending the email");
    }

    #[test]
    fn test_row_not_found_maps_to_404() {
        let err: AppError = sqlx::Error::RowNotFound.into();
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(err.to_string(), "No document found with that ID");
    }

    #[test]
    fn test_duplicate_field_from_constraint() {
        assert_eq!(duplicate_field("tours_name_key"), "name");
        assert_eq!(duplicate_field("users_email_key"), "email");
        assert_eq!(duplicate_field("reviews_tour_id_user_id_key"), "tour_id_user_id");
        assert_eq!(duplicate_field(""), "field");
    }

    #[test]
    fn test_rate_limit_status() {
        assert_eq!(
            AppError::RateLimitExceeded.status_code(),
            StatusCode::TOO_MANY_REQUESTS
        );
    }
}
