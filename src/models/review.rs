// src/models/review.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

/// Author shown next to a review
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewAuthor {
    pub id: Uuid,
    pub name: String,
    pub photo: String,
}

/// Tour review; one per user per tour
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Review {
    pub id: Uuid,
    pub review: String,
    pub rating: f64,
    pub created_at: DateTime<Utc>,
    pub tour: Uuid,
    /// `null` once the author deactivates their account
    pub user: Option<ReviewAuthor>,
}

/// Request to create a new review
/// DOCUMENTATION: tour and user may be omitted; they are filled from the
/// nested route and the logged-in user
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateReviewRequest {
    #[validate(length(min = 1, message = "Review can not be empty!"))]
    pub review: String,

    #[validate(range(min = 1.0, max = 5.0, message = "Rating must be between 1 and 5"))]
    pub rating: f64,

    pub tour: Option<Uuid>,

    pub user: Option<Uuid>,
}

/// Request to edit an existing review
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct UpdateReviewRequest {
    #[validate(length(min = 1, message = "Review can not be empty!"))]
    pub review: Option<String>,

    #[validate(range(min = 1.0, max = 5.0, message = "Rating must be between 1 and 5"))]
    pub rating: Option<f64>,
}
