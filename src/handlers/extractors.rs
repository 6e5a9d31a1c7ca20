// src/handlers/extractors.rs
// DOCUMENTATION: Extractor settings
// PURPOSE: Body, path and query parse failures answer with the usual
// `{status:"fail", message}` instead of actix's plain-text errors

use actix_web::web::{JsonConfig, PathConfig, QueryConfig};

use crate::errors::AppError;

/// Request bodies above this size are rejected
pub const JSON_LIMIT_BYTES: usize = 10 * 1024;

pub fn json_config() -> JsonConfig {
    JsonConfig::default()
        .limit(JSON_LIMIT_BYTES)
        .error_handler(|err, _req| AppError::InvalidInput(err.to_string()).into())
}

pub fn path_config() -> PathConfig {
    PathConfig::default().error_handler(|err, req| {
        AppError::InvalidInput(format!("Invalid value in {}: {}", req.path(), err)).into()
    })
}

pub fn query_config() -> QueryConfig {
    QueryConfig::default()
        .error_handler(|err, _req| AppError::InvalidInput(format!("Invalid query string: {}", err)).into())
}
