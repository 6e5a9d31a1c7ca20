// src/db/mod.rs
// DOCUMENTATION: Database module organization
// PURPOSE: Re-export repositories and the shared query features

pub mod booking_repository;
pub mod features;
pub mod resource;
pub mod review_repository;
pub mod tour_repository;
pub mod user_repository;

pub use booking_repository::*;
pub use features::ApiFeatures;
pub use resource::Resource;
pub use review_repository::*;
pub use tour_repository::*;
pub use user_repository::*;
