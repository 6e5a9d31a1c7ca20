// src/services/mod.rs
// DOCUMENTATION: Services module organization
// PURPOSE: Re-export service components

pub mod auth_service;
pub mod email_service;
pub mod jwt_service;

pub use auth_service::*;
pub use email_service::{sender_from_config, EmailSender};
pub use jwt_service::*;
