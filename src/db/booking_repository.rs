// src/db/booking_repository.rs
// DOCUMENTATION: Booking persistence with tour and customer populated

use crate::db::resource::{Field, FieldKind, Resource};
use crate::db::ApiFeatures;
use crate::errors::AppError;
use crate::models::*;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool, QueryBuilder};
use uuid::Uuid;

const BOOKING_SELECT: &str = r#"
    SELECT
        b.id, b.price, b.paid, b.created_at,
        b.tour_id, t.name AS tour_name,
        b.user_id, u.name AS user_name, u.email AS user_email
    FROM bookings b
    JOIN tours t ON t.id = b.tour_id
    LEFT JOIN users u ON u.id = b.user_id AND u.active = true
"#;

const BOOKING_FIELDS: &[Field] = &[
    Field::new("price", "b.price", FieldKind::Number),
    Field::new("paid", "b.paid", FieldKind::Bool),
    Field::new("tour", "b.tour_id", FieldKind::Uuid),
    Field::new("user", "b.user_id", FieldKind::Uuid),
    Field::new("createdAt", "b.created_at", FieldKind::Timestamp),
];

#[derive(Debug, FromRow)]
struct BookingRow {
    id: Uuid,
    price: f64,
    paid: bool,
    created_at: DateTime<Utc>,
    tour_id: Uuid,
    tour_name: String,
    user_id: Uuid,
    user_name: Option<String>,
    user_email: Option<String>,
}

impl BookingRow {
    fn to_booking(self) -> Booking {
        Booking {
            id: self.id,
            tour: BookedTour {
                id: self.tour_id,
                name: self.tour_name,
            },
            user: match (self.user_name, self.user_email) {
                (Some(name), Some(email)) => Some(BookingCustomer {
                    id: self.user_id,
                    name,
                    email,
                }),
                _ => None,
            },
            price: self.price,
            paid: self.paid,
            created_at: self.created_at,
        }
    }
}

pub struct BookingRepository;

impl BookingRepository {
    async fn select_by_id(pool: &PgPool, id: Uuid) -> Result<Booking, AppError> {
        let sql = format!("{} WHERE b.id = $1", BOOKING_SELECT);
        sqlx::query_as::<_, BookingRow>(&sql)
            .bind(id)
            .fetch_optional(pool)
            .await?
            .map(BookingRow::to_booking)
            .ok_or_else(|| AppError::NotFound("No booking found with that ID".to_string()))
    }
}

#[async_trait]
impl Resource for BookingRepository {
    type Model = Booking;
    type Detail = Booking;
    type Create = CreateBookingRequest;
    type Update = UpdateBookingRequest;

    const NAME: &'static str = "booking";
    const FIELDS: &'static [Field] = BOOKING_FIELDS;

    async fn find_all(pool: &PgPool, features: &ApiFeatures) -> Result<Vec<Booking>, AppError> {
        let mut qb = QueryBuilder::new(BOOKING_SELECT);
        qb.push(" WHERE TRUE");
        features.push_filters(&mut qb, BOOKING_FIELDS)?;
        features.push_order(&mut qb, BOOKING_FIELDS, "b.created_at DESC")?;
        features.push_pagination(&mut qb);

        let rows = qb.build_query_as::<BookingRow>().fetch_all(pool).await?;
        Ok(rows.into_iter().map(BookingRow::to_booking).collect())
    }

    async fn find_one(pool: &PgPool, id: Uuid) -> Result<Booking, AppError> {
        Self::select_by_id(pool, id).await
    }

    async fn create(pool: &PgPool, req: CreateBookingRequest) -> Result<Booking, AppError> {
        let (id,): (Uuid,) = sqlx::query_as(
            r#"
            INSERT INTO bookings (tour_id, user_id, price, paid)
            VALUES ($1, $2, $3, COALESCE($4, true))
            RETURNING id
            "#,
        )
        .bind(req.tour)
        .bind(req.user)
        .bind(req.price)
        .bind(req.paid)
        .fetch_one(pool)
        .await?;

        log::info!("Booking {} created for tour {}", id, req.tour);
        Self::select_by_id(pool, id).await
    }

    async fn update(pool: &PgPool, id: Uuid, req: UpdateBookingRequest) -> Result<Booking, AppError> {
        let updated: Option<(Uuid,)> = sqlx::query_as(
            r#"
            UPDATE bookings
            SET price = COALESCE($1, price),
                paid = COALESCE($2, paid)
            WHERE id = $3
            RETURNING id
            "#,
        )
        .bind(req.price)
        .bind(req.paid)
        .bind(id)
        .fetch_optional(pool)
        .await?;

        if updated.is_none() {
            return Err(AppError::NotFound("No booking found with that ID".to_string()));
        }
        Self::select_by_id(pool, id).await
    }

    async fn delete(pool: &PgPool, id: Uuid) -> Result<(), AppError> {
        let rows = sqlx::query("DELETE FROM bookings WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?
            .rows_affected();

        if rows == 0 {
            return Err(AppError::NotFound("No booking found with that ID".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_booking_json_shape() {
        let row = BookingRow {
            id: Uuid::new_v4(),
            price: 497.0,
            paid: true,
            created_at: Utc::now(),
            tour_id: Uuid::new_v4(),
            tour_name: "The Forest Hiker".to_string(),
            user_id: Uuid::new_v4(),
            user_name: Some("Leo Gillespie".to_string()),
            user_email: Some("leo@example.com".to_string()),
        };

        let json = serde_json::to_value(row.to_booking()).unwrap();
        assert_eq!(json["tour"]["name"], "The Forest Hiker");
        assert_eq!(json["user"]["email"], "leo@example.com");
        assert_eq!(json["paid"], true);
        assert!(json.get("createdAt").is_some());
    }

    #[test]
    fn test_deactivated_customer_is_null() {
        assert!(BOOKING_SELECT.contains("LEFT JOIN users u ON u.id = b.user_id AND u.active = true"));

        let row = BookingRow {
            id: Uuid::new_v4(),
            price: 397.0,
            paid: true,
            created_at: Utc::now(),
            tour_id: Uuid::new_v4(),
            tour_name: "The Sea Explorer".to_string(),
            user_id: Uuid::new_v4(),
            user_name: None,
            user_email: None,
        };

        let json = serde_json::to_value(row.to_booking()).unwrap();
        assert!(json["user"].is_null());
        assert_eq!(json["tour"]["name"], "The Sea Explorer");
    }
}
