// src/models/tour.rs
// DOCUMENTATION: Core data structures for tours
// PURPOSE: Defines all serialization/deserialization models for API and database

use chrono::{DateTime, Utc};
use geo_types::Point;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;
use validator::{Validate, ValidationError};

use super::Review;
use crate::errors::AppError;

/// Tour difficulty levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    Medium,
    Difficult,
}

impl Difficulty {
    pub fn as_str(&self) -> &'static str {
        match self {
            Difficulty::Easy => "easy",
            Difficulty::Medium => "medium",
            Difficulty::Difficult => "difficult",
        }
    }
}

impl FromStr for Difficulty {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "easy" => Ok(Difficulty::Easy),
            "medium" => Ok(Difficulty::Medium),
            "difficult" => Ok(Difficulty::Difficult),
            other => Err(AppError::InvalidInput(format!(
                "Difficulty is either: easy, medium, difficult (got {})",
                other
            ))),
        }
    }
}

/// GeoJSON point with tour metadata
/// DOCUMENTATION: Coordinates are [longitude, latitude] as in GeoJSON
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeoLocation {
    #[serde(rename = "type", default = "point_type")]
    pub kind: String,

    pub coordinates: [f64; 2],

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Day of the tour on which this stop is visited
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub day: Option<i32>,
}

fn point_type() -> String {
    "Point".to_string()
}

impl GeoLocation {
    pub fn new(lng: f64, lat: f64) -> Self {
        GeoLocation {
            kind: point_type(),
            coordinates: [lng, lat],
            address: None,
            description: None,
            day: None,
        }
    }

    pub fn point(&self) -> Point<f64> {
        Point::new(self.coordinates[0], self.coordinates[1])
    }
}

fn validate_location(location: &GeoLocation) -> Result<(), ValidationError> {
    if location.kind != "Point" {
        return Err(ValidationError::new("location type must be Point"));
    }
    let point = location.point();
    if !(-180.0..=180.0).contains(&point.x()) || !(-90.0..=90.0).contains(&point.y()) {
        return Err(ValidationError::new("coordinates out of range"));
    }
    Ok(())
}

fn validate_locations(locations: &Vec<GeoLocation>) -> Result<(), ValidationError> {
    locations.iter().try_for_each(validate_location)
}

/// Guide reference populated on every tour read
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuideSummary {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub photo: String,
    pub role: String,
}

/// A tour in the catalog
/// DOCUMENTATION: Secret tours are never returned, so the flag is not serialized
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Tour {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
    pub duration: i32,
    pub max_group_size: i32,
    pub difficulty: Difficulty,
    pub ratings_average: f64,
    pub ratings_quantity: i32,
    pub price: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price_discount: Option<f64>,
    pub summary: String,
    pub description: Option<String>,
    pub image_cover: String,
    pub images: Vec<String>,
    pub start_dates: Vec<DateTime<Utc>>,
    #[serde(skip_serializing)]
    pub secret_tour: bool,
    pub start_location: Option<GeoLocation>,
    pub locations: Vec<GeoLocation>,
    pub guides: Vec<GuideSummary>,
    /// Virtual: duration expressed in weeks
    pub duration_weeks: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// GET /tours/{id}: tour plus its reviews
#[derive(Debug, Serialize)]
pub struct TourDetail {
    #[serde(flatten)]
    pub tour: Tour,
    pub reviews: Vec<Review>,
}

/// Lowercase, dash-separated URL slug
pub fn slugify(name: &str) -> String {
    name.split(|c: char| !c.is_alphanumeric())
        .filter(|part| !part.is_empty())
        .map(|part| part.to_lowercase())
        .collect::<Vec<_>>()
        .join("-")
}

/// Round to one decimal place, as stored for ratings
pub fn round_rating(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// Average given to a tour that has no reviews
pub const DEFAULT_RATINGS_AVERAGE: f64 = 4.5;

/// `(ratingsQuantity, ratingsAverage)` for a tour with `count` reviews averaging `average`
pub fn rating_summary(count: i64, average: Option<f64>) -> (i32, f64) {
    match average {
        Some(avg) if count > 0 => (i32::try_from(count).unwrap_or(i32::MAX), round_rating(avg)),
        _ => (0, DEFAULT_RATINGS_AVERAGE),
    }
}

/// Request DTO for creating a tour
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateTourRequest {
    #[validate(length(
        min = 10,
        max = 40,
        message = "A tour name must have between 10 and 40 characters"
    ))]
    pub name: String,

    #[validate(range(min = 1, message = "A tour must have a duration"))]
    pub duration: i32,

    #[validate(range(min = 1, message = "A tour must have a group size"))]
    pub max_group_size: i32,

    pub difficulty: Difficulty,

    #[validate(range(min = 1.0, max = 5.0, message = "Rating must be between 1.0 and 5.0"))]
    pub ratings_average: Option<f64>,

    #[validate(range(min = 0))]
    pub ratings_quantity: Option<i32>,

    #[validate(range(min = 0.01, message = "A tour must have a price"))]
    pub price: f64,

    pub price_discount: Option<f64>,

    #[validate(length(min = 1, message = "A tour must have a summary"))]
    pub summary: String,

    pub description: Option<String>,

    #[validate(length(min = 1, message = "A tour must have a cover image"))]
    pub image_cover: String,

    #[serde(default)]
    pub images: Vec<String>,

    #[serde(default)]
    pub start_dates: Vec<DateTime<Utc>>,

    #[serde(default)]
    pub secret_tour: bool,

    #[validate(custom = "validate_location")]
    pub start_location: Option<GeoLocation>,

    #[serde(default)]
    #[validate(custom = "validate_locations")]
    pub locations: Vec<GeoLocation>,

    #[serde(default)]
    pub guides: Vec<Uuid>,
}

impl CreateTourRequest {
    /// Discount must stay below the regular price
    pub fn check_discount(&self) -> Result<(), AppError> {
        match self.price_discount {
            Some(discount) if discount >= self.price => Err(AppError::ValidationError(format!(
                "Discount price ({}) should be below regular price",
                discount
            ))),
            _ => Ok(()),
        }
    }
}

/// Request DTO for updating a tour
/// DOCUMENTATION: All fields are optional - only provided fields are updated
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateTourRequest {
    #[validate(length(
        min = 10,
        max = 40,
        message = "A tour name must have between 10 and 40 characters"
    ))]
    pub name: Option<String>,

    #[validate(range(min = 1))]
    pub duration: Option<i32>,

    #[validate(range(min = 1))]
    pub max_group_size: Option<i32>,

    pub difficulty: Option<Difficulty>,

    #[validate(range(min = 0.01))]
    pub price: Option<f64>,

    pub price_discount: Option<f64>,

    #[validate(length(min = 1))]
    pub summary: Option<String>,

    pub description: Option<String>,

    #[validate(length(min = 1))]
    pub image_cover: Option<String>,

    pub images: Option<Vec<String>>,

    pub start_dates: Option<Vec<DateTime<Utc>>>,

    pub secret_tour: Option<bool>,

    #[validate(custom = "validate_location")]
    pub start_location: Option<GeoLocation>,

    #[validate(custom = "validate_locations")]
    pub locations: Option<Vec<GeoLocation>>,

    pub guides: Option<Vec<Uuid>>,
}

/// Row of GET /tours/tour-stats
#[derive(Debug, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct DifficultyStats {
    pub difficulty: String,
    pub num_tours: i64,
    pub num_ratings: i64,
    pub num_price: f64,
    pub avg_rating: f64,
    pub avg_price: f64,
    pub min_price: f64,
    pub max_price: f64,
}

/// Row of GET /tours/monthly-plan/{year}
#[derive(Debug, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct MonthlyPlan {
    pub month: i32,
    pub num_tour_starts: i64,
    pub tours: Vec<String>,
}

/// Row of GET /tours/distances/{latlng}/unit/{unit}
#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct TourDistance {
    pub id: Uuid,
    pub name: String,
    pub distance: f64,
}
