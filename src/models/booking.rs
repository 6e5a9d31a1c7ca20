// src/models/booking.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookedTour {
    pub id: Uuid,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookingCustomer {
    pub id: Uuid,
    pub name: String,
    pub email: String,
}

/// A purchased seat on a tour
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Booking {
    pub id: Uuid,
    pub tour: BookedTour,
    pub user: Option<BookingCustomer>,
    pub price: f64,
    pub paid: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateBookingRequest {
    pub tour: Uuid,

    pub user: Uuid,

    #[validate(range(min = 0.01, message = "Booking must have a price."))]
    pub price: f64,

    pub paid: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct UpdateBookingRequest {
    #[validate(range(min = 0.01, message = "Booking must have a price."))]
    pub price: Option<f64>,

    pub paid: Option<bool>,
}
