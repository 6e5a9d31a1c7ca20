// src/db/review_repository.rs
// DOCUMENTATION: Review database operations
// PURPOSE: Handle CRUD operations for tour reviews and keep tour ratings in sync

use crate::db::resource::{Field, FieldKind, Resource};
use crate::db::ApiFeatures;
use crate::errors::AppError;
use crate::models::{rating_summary, CreateReviewRequest, Review, ReviewAuthor, UpdateReviewRequest};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgConnection, PgPool, QueryBuilder};
use uuid::Uuid;

const REVIEW_SELECT: &str = r#"
    SELECT
        r.id, r.review, r.rating, r.created_at, r.tour_id,
        r.user_id, u.name AS user_name, u.photo AS user_photo
    FROM reviews r
    LEFT JOIN users u ON u.id = r.user_id AND u.active = true
"#;

const RATING_STATS: &str =
    "SELECT COUNT(*), AVG(rating)::float8 FROM reviews WHERE tour_id = $1";

const REVIEW_FIELDS: &[Field] = &[
    Field::new("rating", "r.rating", FieldKind::Number),
    Field::new("tour", "r.tour_id", FieldKind::Uuid),
    Field::new("user", "r.user_id", FieldKind::Uuid),
    Field::new("createdAt", "r.created_at", FieldKind::Timestamp),
];

#[derive(Debug, FromRow)]
struct ReviewRow {
    id: Uuid,
    review: String,
    rating: f64,
    created_at: DateTime<Utc>,
    tour_id: Uuid,
    user_id: Uuid,
    user_name: Option<String>,
    user_photo: Option<String>,
}

impl ReviewRow {
    fn to_review(self) -> Review {
        Review {
            id: self.id,
            review: self.review,
            rating: self.rating,
            created_at: self.created_at,
            tour: self.tour_id,
            // Deactivated authors are not shown
            user: match (self.user_name, self.user_photo) {
                (Some(name), Some(photo)) => Some(ReviewAuthor {
                    id: self.user_id,
                    name,
                    photo,
                }),
                _ => None,
            },
        }
    }
}

pub struct ReviewRepository;

impl ReviewRepository {
    /// Get reviews for a tour, newest first
    pub async fn find_by_tour(pool: &PgPool, tour_id: Uuid) -> Result<Vec<Review>, AppError> {
        let sql = format!("{} WHERE r.tour_id = $1 ORDER BY r.created_at DESC", REVIEW_SELECT);
        let rows = sqlx::query_as::<_, ReviewRow>(&sql)
            .bind(tour_id)
            .fetch_all(pool)
            .await?;

        Ok(rows.into_iter().map(ReviewRow::to_review).collect())
    }

    async fn select_by_id(pool: &PgPool, id: Uuid) -> Result<Review, AppError> {
        let sql = format!("{} WHERE r.id = $1", REVIEW_SELECT);
        sqlx::query_as::<_, ReviewRow>(&sql)
            .bind(id)
            .fetch_optional(pool)
            .await?
            .map(ReviewRow::to_review)
            .ok_or_else(|| AppError::NotFound("No review found with that ID".to_string()))
    }

    /// Recompute ratingsQuantity / ratingsAverage of a tour from its reviews
    /// DOCUMENTATION: A tour without reviews goes back to 0 ratings and the default average
    async fn calc_average_ratings(conn: &mut PgConnection, tour_id: Uuid) -> Result<(), AppError> {
        let (count, average): (i64, Option<f64>) = sqlx::query_as(RATING_STATS)
            .bind(tour_id)
            .fetch_one(&mut *conn)
            .await?;
        let (quantity, average) = rating_summary(count, average);

        sqlx::query(
            "UPDATE tours SET ratings_quantity = $1, ratings_average = $2, updated_at = NOW() WHERE id = $3",
        )
        .bind(quantity)
        .bind(average)
        .bind(tour_id)
        .execute(&mut *conn)
        .await
        .map_err(|e| {
            log::error!("Failed to recalculate ratings for tour {}: {}", tour_id, e);
            AppError::from(e)
        })?;

        log::debug!("Tour {} now has {} ratings averaging {}", tour_id, quantity, average);
        Ok(())
    }
}

#[async_trait]
impl Resource for ReviewRepository {
    type Model = Review;
    type Detail = Review;
    type Create = CreateReviewRequest;
    type Update = UpdateReviewRequest;

    const NAME: &'static str = "review";
    const FIELDS: &'static [Field] = REVIEW_FIELDS;

    async fn find_all(pool: &PgPool, features: &ApiFeatures) -> Result<Vec<Review>, AppError> {
        let mut qb = QueryBuilder::new(REVIEW_SELECT);
        qb.push(" WHERE TRUE");
        features.push_filters(&mut qb, REVIEW_FIELDS)?;
        features.push_order(&mut qb, REVIEW_FIELDS, "r.created_at DESC")?;
        features.push_pagination(&mut qb);

        let rows = qb.build_query_as::<ReviewRow>().fetch_all(pool).await?;
        Ok(rows.into_iter().map(ReviewRow::to_review).collect())
    }

    async fn find_one(pool: &PgPool, id: Uuid) -> Result<Review, AppError> {
        Self::select_by_id(pool, id).await
    }

    /// DOCUMENTATION: tour and user must be resolved by the caller
    async fn create(pool: &PgPool, req: CreateReviewRequest) -> Result<Review, AppError> {
        let tour_id = req
            .tour
            .ok_or_else(|| AppError::ValidationError("Review must belong to a tour.".to_string()))?;
        let user_id = req
            .user
            .ok_or_else(|| AppError::ValidationError("Review must belong to a user".to_string()))?;

        let mut tx = pool.begin().await?;

        let (id,): (Uuid,) = sqlx::query_as(
            r#"
            INSERT INTO reviews (review, rating, tour_id, user_id)
            VALUES ($1, $2, $3, $4)
            RETURNING id
            "#,
        )
        .bind(&req.review)
        .bind(req.rating)
        .bind(tour_id)
        .bind(user_id)
        .fetch_one(&mut *tx)
        .await?;

        Self::calc_average_ratings(&mut tx, tour_id).await?;
        tx.commit().await?;

        log::info!("User {} reviewed tour {}", user_id, tour_id);
        Self::select_by_id(pool, id).await
    }

    async fn update(pool: &PgPool, id: Uuid, req: UpdateReviewRequest) -> Result<Review, AppError> {
        let mut tx = pool.begin().await?;

        let (tour_id,): (Uuid,) = sqlx::query_as(
            r#"
            UPDATE reviews
            SET review = COALESCE($1, review),
                rating = COALESCE($2, rating)
            WHERE id = $3
            RETURNING tour_id
            "#,
        )
        .bind(&req.review)
        .bind(req.rating)
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::NotFound("No review found with that ID".to_string()))?;

        Self::calc_average_ratings(&mut tx, tour_id).await?;
        tx.commit().await?;

        Self::select_by_id(pool, id).await
    }

    async fn delete(pool: &PgPool, id: Uuid) -> Result<(), AppError> {
        let mut tx = pool.begin().await?;

        let (tour_id,): (Uuid,) =
            sqlx::query_as("DELETE FROM reviews WHERE id = $1 RETURNING tour_id")
                .bind(id)
                .fetch_optional(&mut *tx)
                .await?
                .ok_or_else(|| AppError::NotFound("No review found with that ID".to_string()))?;

        Self::calc_average_ratings(&mut tx, tour_id).await?;
        tx.commit().await?;

        log::info!("Deleted review {} of tour {}", id, tour_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::Postgres;

    #[test]
    fn test_row_to_review_nests_author() {
        let row = ReviewRow {
            id: Uuid::new_v4(),
            review: "Great tour!".to_string(),
            rating: 5.0,
            created_at: Utc::now(),
            tour_id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            user_name: Some("Lourdes Browning".to_string()),
            user_photo: Some("user-2.jpg".to_string()),
        };
        let user_id = row.user_id;
        let review = row.to_review();
        assert_eq!(review.user.as_ref().map(|u| u.id), Some(user_id));

        let json = serde_json::to_value(&review).unwrap();
        assert_eq!(json["user"]["name"], "Lourdes Browning");
        assert!(json.get("createdAt").is_some());
        assert!(json["tour"].is_string());
    }

    #[test]
    fn test_rating_stats_are_per_tour() {
        assert!(RATING_STATS.contains("COUNT(*)"));
        assert!(RATING_STATS.ends_with("WHERE tour_id = $1"));
    }

    #[test]
    fn test_deactivated_author_is_null() {
        assert!(REVIEW_SELECT.contains("LEFT JOIN users u ON u.id = r.user_id AND u.active = true"));

        let row = ReviewRow {
            id: Uuid::new_v4(),
            review: "Loved it".to_string(),
            rating: 4.0,
            created_at: Utc::now(),
            tour_id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            user_name: None,
            user_photo: None,
        };

        let json = serde_json::to_value(row.to_review()).unwrap();
        assert!(json["user"].is_null());
        assert_eq!(json["review"], "Loved it");
    }

    #[test]
    fn test_nested_route_filter_targets_tour_column() {
        let tour_id = Uuid::new_v4();
        let features = ApiFeatures::default().with_filter("tour", &tour_id.to_string());

        let mut qb = QueryBuilder::<Postgres>::new(REVIEW_SELECT);
        qb.push(" WHERE TRUE");
        features.push_filters(&mut qb, REVIEW_FIELDS).unwrap();
        assert!(qb.sql().contains("AND (r.tour_id = $1)"));
    }
}
