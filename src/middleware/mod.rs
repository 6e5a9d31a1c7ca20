// src/middleware/mod.rs
// DOCUMENTATION: Request guards and limits

pub mod auth;
pub mod rate_limit;

pub use auth::{CurrentUser, Protect, RestrictTo, JWT_COOKIE};
pub use rate_limit::RateLimit;
