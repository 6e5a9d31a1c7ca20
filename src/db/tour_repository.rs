// src/db/tour_repository.rs
// DOCUMENTATION: Database access layer for tours
// PURPOSE: CRUD, aggregate statistics and PostGIS radius/distance queries

use crate::db::resource::{Field, FieldKind, Resource};
use crate::db::{ApiFeatures, ReviewRepository};
use crate::errors::AppError;
use crate::models::*;
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use geo_types::Point;
use sqlx::types::Json;
use sqlx::{FromRow, PgPool, QueryBuilder};
use uuid::Uuid;

/// Shared SELECT: extracts the start point from the geography column and
/// populates guides from the users table
const TOUR_SELECT: &str = r#"
    SELECT
        t.id, t.name, t.slug, t.duration, t.max_group_size, t.difficulty,
        t.ratings_average, t.ratings_quantity, t.price, t.price_discount,
        t.summary, t.description, t.image_cover, t.images, t.start_dates, t.secret_tour,
        ST_X(t.start_location::geometry) AS start_lng,
        ST_Y(t.start_location::geometry) AS start_lat,
        t.start_address, t.start_description, t.locations,
        COALESCE((
            SELECT json_agg(json_build_object(
                'id', u.id, 'name', u.name, 'email', u.email, 'photo', u.photo, 'role', u.role
            ))
            FROM users u
            WHERE u.id = ANY(t.guides) AND u.active = true
        ), '[]'::json) AS guides,
        t.created_at, t.updated_at
    FROM tours t
"#;

const TOUR_FIELDS: &[Field] = &[
    Field::new("name", "t.name", FieldKind::Text),
    Field::new("slug", "t.slug", FieldKind::Text),
    Field::new("duration", "t.duration", FieldKind::Number),
    Field::new("maxGroupSize", "t.max_group_size", FieldKind::Number),
    Field::new("difficulty", "t.difficulty", FieldKind::Text),
    Field::new("ratingsAverage", "t.ratings_average", FieldKind::Number),
    Field::new("ratingsQuantity", "t.ratings_quantity", FieldKind::Number),
    Field::new("price", "t.price", FieldKind::Number),
    Field::new("priceDiscount", "t.price_discount", FieldKind::Number),
    Field::new("createdAt", "t.created_at", FieldKind::Timestamp),
];

/// Internal struct for mapping database rows to Tour
#[derive(Debug, FromRow)]
struct TourRow {
    id: Uuid,
    name: String,
    slug: String,
    duration: i32,
    max_group_size: i32,
    difficulty: String,
    ratings_average: f64,
    ratings_quantity: i32,
    price: f64,
    price_discount: Option<f64>,
    summary: String,
    description: Option<String>,
    image_cover: String,
    images: Vec<String>,
    start_dates: Vec<DateTime<Utc>>,
    secret_tour: bool,
    start_lng: Option<f64>, // From ST_X(start_location)
    start_lat: Option<f64>, // From ST_Y(start_location)
    start_address: Option<String>,
    start_description: Option<String>,
    locations: Json<Vec<GeoLocation>>,
    guides: Json<Vec<GuideSummary>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TourRow {
    fn to_tour(self) -> Result<Tour, AppError> {
        let start_location = match (self.start_lng, self.start_lat) {
            (Some(lng), Some(lat)) => Some(GeoLocation {
                address: self.start_address,
                description: self.start_description,
                ..GeoLocation::new(lng, lat)
            }),
            _ => None,
        };

        Ok(Tour {
            id: self.id,
            name: self.name,
            slug: self.slug,
            duration: self.duration,
            max_group_size: self.max_group_size,
            difficulty: self.difficulty.parse()?,
            ratings_average: self.ratings_average,
            ratings_quantity: self.ratings_quantity,
            price: self.price,
            price_discount: self.price_discount,
            summary: self.summary,
            description: self.description,
            image_cover: self.image_cover,
            images: self.images,
            start_dates: self.start_dates,
            secret_tour: self.secret_tour,
            start_location,
            locations: self.locations.0,
            guides: self.guides.0,
            duration_weeks: self.duration as f64 / 7.0,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

fn to_tours(rows: Vec<TourRow>) -> Result<Vec<Tour>, AppError> {
    rows.into_iter().map(TourRow::to_tour).collect()
}

/// Distance units accepted by the geospatial endpoints
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DistanceUnit {
    Miles,
    Kilometers,
}

impl DistanceUnit {
    pub fn parse(unit: &str) -> Result<Self, AppError> {
        match unit {
            "mi" => Ok(DistanceUnit::Miles),
            "km" => Ok(DistanceUnit::Kilometers),
            other => Err(AppError::InvalidInput(format!(
                "Unit must be either mi or km (got {})",
                other
            ))),
        }
    }

    /// Radius in meters for a distance expressed in this unit
    pub fn to_meters(&self, distance: f64) -> f64 {
        match self {
            DistanceUnit::Miles => distance * 1609.344,
            DistanceUnit::Kilometers => distance * 1000.0,
        }
    }

    /// Factor converting meters into this unit
    pub fn multiplier(&self) -> f64 {
        match self {
            DistanceUnit::Miles => 0.000621371,
            DistanceUnit::Kilometers => 0.001,
        }
    }
}

/// Parse `lat,lng` into a point (x = longitude, y = latitude)
pub fn parse_lat_lng(latlng: &str) -> Result<Point<f64>, AppError> {
    let invalid = || {
        AppError::InvalidInput(
            "Please provide latitude and longitude in the format lat,lng.".to_string(),
        )
    };

    let (lat, lng) = latlng.split_once(',').ok_or_else(invalid)?;
    let lat: f64 = lat.trim().parse().map_err(|_| invalid())?;
    let lng: f64 = lng.trim().parse().map_err(|_| invalid())?;

    if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lng) {
        return Err(invalid());
    }
    Ok(Point::new(lng, lat))
}

/// TourRepository: All database operations for tours
/// DOCUMENTATION: Secret tours are excluded from every read
pub struct TourRepository;

impl TourRepository {
    /// Retrieve a tour by ID
    /// `include_secret` is only set when returning a tour that was just written
    async fn select_by_id(
        pool: &PgPool,
        id: Uuid,
        include_secret: bool,
    ) -> Result<Tour, AppError> {
        let sql = format!(
            "{} WHERE t.id = $1 AND (t.secret_tour = false OR $2)",
            TOUR_SELECT
        );
        let row = sqlx::query_as::<_, TourRow>(&sql)
            .bind(id)
            .bind(include_secret)
            .fetch_optional(pool)
            .await?
            .ok_or_else(|| {
                log::warn!("Tour not found: {}", id);
                AppError::NotFound("No tour found with that ID".to_string())
            })?;

        row.to_tour()
    }

    /// Tours whose start location lies within `radius_m` meters of `center`
    pub async fn find_within(
        pool: &PgPool,
        center: Point<f64>,
        radius_m: f64,
    ) -> Result<Vec<Tour>, AppError> {
        let sql = format!(
            r#"{}
            WHERE t.secret_tour = false
              AND ST_DWithin(
                    t.start_location,
                    ST_SetSRID(ST_MakePoint($1, $2), 4326)::geography,
                    $3
                  )
            ORDER BY t.created_at DESC
            "#,
            TOUR_SELECT
        );

        let rows = sqlx::query_as::<_, TourRow>(&sql)
            .bind(center.x())
            .bind(center.y())
            .bind(radius_m)
            .fetch_all(pool)
            .await?;

        log::debug!(
            "Tours within {:.0}m of ({}, {}): {}",
            radius_m,
            center.y(),
            center.x(),
            rows.len()
        );
        to_tours(rows)
    }

    /// Distance from `center` to every tour start, nearest first
    pub async fn distances_from(
        pool: &PgPool,
        center: Point<f64>,
        unit: DistanceUnit,
    ) -> Result<Vec<TourDistance>, AppError> {
        let distances = sqlx::query_as::<_, TourDistance>(
            r#"
            SELECT
                t.id, t.name,
                ST_Distance(
                    t.start_location,
                    ST_SetSRID(ST_MakePoint($1, $2), 4326)::geography
                ) * $3 AS distance
            FROM tours t
            WHERE t.secret_tour = false AND t.start_location IS NOT NULL
            ORDER BY distance ASC
            "#,
        )
        .bind(center.x())
        .bind(center.y())
        .bind(unit.multiplier())
        .fetch_all(pool)
        .await?;

        Ok(distances)
    }

    /// Statistics of highly rated tours grouped by difficulty
    pub async fn stats(pool: &PgPool) -> Result<Vec<DifficultyStats>, AppError> {
        let stats = sqlx::query_as::<_, DifficultyStats>(
            r#"
            SELECT
                UPPER(difficulty) AS difficulty,
                COUNT(*) AS num_tours,
                SUM(ratings_quantity)::int8 AS num_ratings,
                SUM(price) AS num_price,
                AVG(ratings_average) AS avg_rating,
                AVG(price) AS avg_price,
                MIN(price) AS min_price,
                MAX(price) AS max_price
            FROM tours
            WHERE ratings_average >= 4.5 AND secret_tour = false
            GROUP BY UPPER(difficulty)
            ORDER BY avg_price ASC
            "#,
        )
        .fetch_all(pool)
        .await?;

        Ok(stats)
    }

    /// Tour starts per month of `year`, busiest month first
    pub async fn monthly_plan(pool: &PgPool, year: i32) -> Result<Vec<MonthlyPlan>, AppError> {
        let (from, to) = year_bounds(year)?;

        let plan = sqlx::query_as::<_, MonthlyPlan>(
            r#"
            SELECT
                EXTRACT(MONTH FROM d.start_date)::int AS month,
                COUNT(*) AS num_tour_starts,
                ARRAY_AGG(t.name ORDER BY t.name) AS tours
            FROM tours t
            CROSS JOIN LATERAL UNNEST(t.start_dates) AS d(start_date)
            WHERE t.secret_tour = false
              AND d.start_date >= $1
              AND d.start_date < $2
            GROUP BY month
            ORDER BY num_tour_starts DESC, month ASC
            LIMIT 12
            "#,
        )
        .bind(from)
        .bind(to)
        .fetch_all(pool)
        .await?;

        Ok(plan)
    }
}

/// [Jan 1 of year, Jan 1 of year + 1) in UTC
fn year_bounds(year: i32) -> Result<(DateTime<Utc>, DateTime<Utc>), AppError> {
    let start = |y: i32| {
        Utc.with_ymd_and_hms(y, 1, 1, 0, 0, 0)
            .single()
            .ok_or_else(|| AppError::InvalidInput(format!("Invalid year: {}", year)))
    };
    Ok((start(year)?, start(year + 1)?))
}

#[async_trait]
impl Resource for TourRepository {
    type Model = Tour;
    type Detail = TourDetail;
    type Create = CreateTourRequest;
    type Update = UpdateTourRequest;

    const NAME: &'static str = "tour";
    const FIELDS: &'static [Field] = TOUR_FIELDS;

    async fn find_all(pool: &PgPool, features: &ApiFeatures) -> Result<Vec<Tour>, AppError> {
        let mut qb = QueryBuilder::new(TOUR_SELECT);
        qb.push(" WHERE t.secret_tour = false");
        features.push_filters(&mut qb, TOUR_FIELDS)?;
        features.push_order(&mut qb, TOUR_FIELDS, "t.created_at DESC")?;
        features.push_pagination(&mut qb);

        let rows = qb.build_query_as::<TourRow>().fetch_all(pool).await?;
        to_tours(rows)
    }

    /// Tour with its reviews populated
    async fn find_one(pool: &PgPool, id: Uuid) -> Result<TourDetail, AppError> {
        let tour = Self::select_by_id(pool, id, false).await?;
        let reviews = ReviewRepository::find_by_tour(pool, id).await?;
        Ok(TourDetail { tour, reviews })
    }

    async fn create(pool: &PgPool, req: CreateTourRequest) -> Result<Tour, AppError> {
        req.check_discount()?;

        let (lng, lat, address, description) = split_location(req.start_location.as_ref());

        let inserted: (Uuid,) = sqlx::query_as(
            r#"
            INSERT INTO tours (
                name, slug, duration, max_group_size, difficulty,
                ratings_average, ratings_quantity, price, price_discount,
                summary, description, image_cover, images, start_dates, secret_tour,
                start_location, start_address, start_description, locations, guides
            )
            VALUES (
                $1, $2, $3, $4, $5,
                COALESCE($6, 4.5), COALESCE($7, 0), $8, $9,
                $10, $11, $12, $13, $14, $15,
                ST_SetSRID(ST_MakePoint($16, $17), 4326)::geography, $18, $19, $20, $21
            )
            RETURNING id
            "#,
        )
        .bind(&req.name) // $1
        .bind(slugify(&req.name)) // $2
        .bind(req.duration) // $3
        .bind(req.max_group_size) // $4
        .bind(req.difficulty.as_str()) // $5
        .bind(req.ratings_average.map(round_rating)) // $6
        .bind(req.ratings_quantity) // $7
        .bind(req.price) // $8
        .bind(req.price_discount) // $9
        .bind(&req.summary) // $10
        .bind(&req.description) // $11
        .bind(&req.image_cover) // $12
        .bind(&req.images) // $13
        .bind(&req.start_dates) // $14
        .bind(req.secret_tour) // $15
        .bind(lng) // $16 - longitude
        .bind(lat) // $17 - latitude
        .bind(address) // $18
        .bind(description) // $19
        .bind(Json(&req.locations)) // $20
        .bind(&req.guides) // $21
        .fetch_one(pool)
        .await?;

        let tour = Self::select_by_id(pool, inserted.0, true).await?;
        log::info!("Created tour {} ({})", tour.name, tour.id);
        Ok(tour)
    }

    /// Partial update - only provided fields are modified
    async fn update(pool: &PgPool, id: Uuid, req: UpdateTourRequest) -> Result<Tour, AppError> {
        let has_location = req.start_location.is_some();
        let (lng, lat, address, description) = split_location(req.start_location.as_ref());

        let updated: Option<(Uuid,)> = sqlx::query_as(
            r#"
            UPDATE tours
            SET name = COALESCE($1, name),
                slug = COALESCE($2, slug),
                duration = COALESCE($3, duration),
                max_group_size = COALESCE($4, max_group_size),
                difficulty = COALESCE($5, difficulty),
                price = COALESCE($6, price),
                price_discount = COALESCE($7, price_discount),
                summary = COALESCE($8, summary),
                description = COALESCE($9, description),
                image_cover = COALESCE($10, image_cover),
                images = COALESCE($11, images),
                start_dates = COALESCE($12, start_dates),
                secret_tour = COALESCE($13, secret_tour),
                start_location = CASE WHEN $14
                    THEN ST_SetSRID(ST_MakePoint($15, $16), 4326)::geography
                    ELSE start_location END,
                start_address = CASE WHEN $14 THEN $17 ELSE start_address END,
                start_description = CASE WHEN $14 THEN $18 ELSE start_description END,
                locations = COALESCE($19, locations),
                guides = COALESCE($20, guides),
                updated_at = NOW()
            WHERE id = $21 AND secret_tour = false
            RETURNING id
            "#,
        )
        .bind(&req.name)
        .bind(req.name.as_deref().map(slugify))
        .bind(req.duration)
        .bind(req.max_group_size)
        .bind(req.difficulty.map(|d| d.as_str()))
        .bind(req.price)
        .bind(req.price_discount)
        .bind(&req.summary)
        .bind(&req.description)
        .bind(&req.image_cover)
        .bind(&req.images)
        .bind(&req.start_dates)
        .bind(req.secret_tour)
        .bind(has_location)
        .bind(lng)
        .bind(lat)
        .bind(address)
        .bind(description)
        .bind(req.locations.as_ref().map(Json))
        .bind(&req.guides)
        .bind(id)
        .fetch_optional(pool)
        .await?;

        let (updated_id,) =
            updated.ok_or_else(|| AppError::NotFound("No tour found with that ID".to_string()))?;

        let tour = Self::select_by_id(pool, updated_id, true).await?;
        log::info!("Updated tour: {}", id);
        Ok(tour)
    }

    async fn delete(pool: &PgPool, id: Uuid) -> Result<(), AppError> {
        let rows = sqlx::query("DELETE FROM tours WHERE id = $1 AND secret_tour = false")
            .bind(id)
            .execute(pool)
            .await?
            .rows_affected();

        if rows == 0 {
            return Err(AppError::NotFound("No tour found with that ID".to_string()));
        }

        log::info!("Deleted tour: {}", id);
        Ok(())
    }
}

fn split_location(
    location: Option<&GeoLocation>,
) -> (Option<f64>, Option<f64>, Option<String>, Option<String>) {
    match location {
        Some(loc) => {
            let point = loc.point();
            (
                Some(point.x()),
                Some(point.y()),
                loc.address.clone(),
                loc.description.clone(),
            )
        }
        None => (None, None, None, None),
    }
}
