// src/bin/import_data.rs
// Seed or wipe the database from data/*.json
//
//   cargo run --bin import-data -- --import
//   cargo run --bin import-data -- --delete
use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use dotenv::dotenv;
use serde::Deserialize;
use serde_json::Value;
use sqlx::postgres::PgPoolOptions;
use sqlx::types::Json;
use sqlx::{PgPool, Postgres, Transaction};
use std::env;
use std::fs;
use std::path::Path;
use tours_api::models::{hash_password, slugify};
use uuid::Uuid;

// --- ANSI colors ---
const RESET: &str = "\x1b[0m";
const BOLD: &str = "\x1b[1m";
const RED: &str = "\x1b[31m";
const GREEN: &str = "\x1b[32m";
const CYAN: &str = "\x1b[36m";

const DATA_DIR: &str = "data";

// --- Seed file shapes ---

#[derive(Debug, Deserialize)]
struct SeedLocation {
    coordinates: [f64; 2], // [lng, lat]
    address: Option<String>,
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SeedTour {
    id: Uuid,
    name: String,
    duration: i32,
    max_group_size: i32,
    difficulty: String,
    ratings_average: Option<f64>,
    ratings_quantity: Option<i32>,
    price: f64,
    price_discount: Option<f64>,
    summary: String,
    description: Option<String>,
    image_cover: String,
    #[serde(default)]
    images: Vec<String>,
    #[serde(default)]
    start_dates: Vec<DateTime<Utc>>,
    #[serde(default)]
    secret_tour: bool,
    start_location: Option<SeedLocation>,
    #[serde(default)]
    locations: Vec<Value>,
    #[serde(default)]
    guides: Vec<Uuid>,
}

#[derive(Debug, Deserialize)]
struct SeedUser {
    id: Uuid,
    name: String,
    email: String,
    photo: Option<String>,
    role: String,
    password: String,
}

#[derive(Debug, Deserialize)]
struct SeedReview {
    review: String,
    rating: f64,
    tour: Uuid,
    user: Uuid,
}

fn read_json<T: serde::de::DeserializeOwned>(file: &str) -> Result<Vec<T>> {
    let path = Path::new(DATA_DIR).join(file);
    let raw = fs::read_to_string(&path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("Failed to parse {}", path.display()))
}

async fn insert_users(tx: &mut Transaction<'_, Postgres>, users: &[SeedUser]) -> Result<()> {
    for user in users {
        // Seed passwords are plain text; already hashed ones are kept
        let hash = if user.password.starts_with("$2") {
            user.password.clone()
        } else {
            hash_password(&user.password)
                .await
                .with_context(|| format!("Failed to hash password of {}", user.email))?
        };

        sqlx::query(
            r#"
            INSERT INTO users (id, name, email, photo, role, password_hash)
            VALUES ($1, $2, $3, COALESCE($4, 'default.jpg'), $5, $6)
            "#,
        )
        .bind(user.id)
        .bind(&user.name)
        .bind(user.email.to_lowercase())
        .bind(&user.photo)
        .bind(&user.role)
        .bind(hash)
        .execute(&mut **tx)
        .await
        .with_context(|| format!("Failed to insert user {}", user.email))?;
    }
    Ok(())
}

async fn insert_tours(tx: &mut Transaction<'_, Postgres>, tours: &[SeedTour]) -> Result<()> {
    for tour in tours {
        let (lng, lat, address, description) = match &tour.start_location {
            Some(loc) => (
                Some(loc.coordinates[0]),
                Some(loc.coordinates[1]),
                loc.address.clone(),
                loc.description.clone(),
            ),
            None => (None, None, None, None),
        };

        sqlx::query(
            r#"
            INSERT INTO tours (
                id, name, slug, duration, max_group_size, difficulty,
                ratings_average, ratings_quantity, price, price_discount,
                summary, description, image_cover, images, start_dates, secret_tour,
                start_location, start_address, start_description, locations, guides
            )
            VALUES (
                $1, $2, $3, $4, $5, $6,
                COALESCE($7, 4.5), COALESCE($8, 0), $9, $10,
                $11, $12, $13, $14, $15, $16,
                ST_SetSRID(ST_MakePoint($17, $18), 4326)::geography, $19, $20, $21, $22
            )
            "#,
        )
        .bind(tour.id)
        .bind(&tour.name)
        .bind(slugify(&tour.name))
        .bind(tour.duration)
        .bind(tour.max_group_size)
        .bind(&tour.difficulty)
        .bind(tour.ratings_average)
        .bind(tour.ratings_quantity)
        .bind(tour.price)
        .bind(tour.price_discount)
        .bind(&tour.summary)
        .bind(&tour.description)
        .bind(&tour.image_cover)
        .bind(&tour.images)
        .bind(&tour.start_dates)
        .bind(tour.secret_tour)
        .bind(lng)
        .bind(lat)
        .bind(address)
        .bind(description)
        .bind(Json(&tour.locations))
        .bind(&tour.guides)
        .execute(&mut **tx)
        .await
        .with_context(|| format!("Failed to insert tour {}", tour.name))?;
    }
    Ok(())
}

async fn insert_reviews(tx: &mut Transaction<'_, Postgres>, reviews: &[SeedReview]) -> Result<()> {
    for review in reviews {
        sqlx::query("INSERT INTO reviews (review, rating, tour_id, user_id) VALUES ($1, $2, $3, $4)")
            .bind(&review.review)
            .bind(review.rating)
            .bind(review.tour)
            .bind(review.user)
            .execute(&mut **tx)
            .await
            .with_context(|| format!("Failed to insert review of tour {}", review.tour))?;
    }

    // Rating aggregates follow the imported reviews
    sqlx::query(
        r#"
        UPDATE tours t
        SET ratings_quantity = s.n,
            ratings_average = ROUND(s.avg_rating::numeric, 1)::float8
        FROM (
            SELECT tour_id, COUNT(*)::int AS n, AVG(rating) AS avg_rating
            FROM reviews
            GROUP BY tour_id
        ) s
        WHERE t.id = s.tour_id
        "#,
    )
    .execute(&mut **tx)
    .await
    .context("Failed to recalculate tour ratings")?;

    Ok(())
}

async fn import_data(pool: &PgPool) -> Result<()> {
    let users: Vec<SeedUser> = read_json("users.json")?;
    let tours: Vec<SeedTour> = read_json("tours.json")?;
    let reviews: Vec<SeedReview> = read_json("reviews.json")?;

    let mut tx = pool.begin().await?;
    insert_users(&mut tx, &users).await?;
    insert_tours(&mut tx, &tours).await?;
    insert_reviews(&mut tx, &reviews).await?;
    tx.commit().await?;

    println!(
        "{}✅ Data successfully loaded!{} ({} users, {} tours, {} reviews)",
        GREEN,
        RESET,
        users.len(),
        tours.len(),
        reviews.len()
    );
    Ok(())
}

async fn delete_data(pool: &PgPool) -> Result<()> {
    let mut tx = pool.begin().await?;
    for table in ["bookings", "reviews", "tours", "users"] {
        sqlx::query(&format!("DELETE FROM {}", table))
            .execute(&mut *tx)
            .await
            .with_context(|| format!("Failed to empty {}", table))?;
    }
    tx.commit().await?;

    println!("{}✅ Data successfully deleted!{}", GREEN, RESET);
    Ok(())
}

async fn run() -> Result<()> {
    let mode = env::args().nth(1).unwrap_or_default();
    if mode != "--import" && mode != "--delete" {
        bail!("Usage: import-data --import | --delete");
    }

    let database_url = env::var("DATABASE_URL").context("DATABASE_URL must be set")?;
    println!("{}🔍 Connecting to database...{}", CYAN, RESET);
    let pool = PgPoolOptions::new()
        .max_connections(2)
        .connect(&database_url)
        .await
        .context("Failed to connect to database")?;
    sqlx::migrate!("./migrations").run(&pool).await?;
    println!("{}DB connection successful{}", BOLD, RESET);

    if mode == "--import" {
        import_data(&pool).await
    } else {
        delete_data(&pool).await
    }
}

#[tokio::main]
async fn main() {
    dotenv().ok();

    if let Err(e) = run().await {
        eprintln!("{}❌ {:#}{}", RED, e, RESET);
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seed_files_parse() {
        let users: Vec<SeedUser> = read_json("users.json").unwrap();
        let tours: Vec<SeedTour> = read_json("tours.json").unwrap();
        let reviews: Vec<SeedReview> = read_json("reviews.json").unwrap();

        assert!(!users.is_empty());
        assert!(!tours.is_empty());

        // Every review points at a seeded tour and user
        for review in &reviews {
            assert!(tours.iter().any(|t| t.id == review.tour));
            assert!(users.iter().any(|u| u.id == review.user));
            assert!((1.0..=5.0).contains(&review.rating));
        }

        // Guides are seeded staff
        for tour in &tours {
            for guide in &tour.guides {
                let user = users.iter().find(|u| u.id == *guide).unwrap();
                assert!(user.role == "guide" || user.role == "lead-guide");
            }
            assert!((10..=40).contains(&tour.name.chars().count()));
        }
    }

    #[test]
    fn test_seeded_slugs_match_api_slugs() {
        let tours: Vec<SeedTour> = read_json("tours.json").unwrap();
        let slugs: Vec<String> = tours.iter().map(|t| slugify(&t.name)).collect();

        assert!(slugs.contains(&"the-forest-hiker".to_string()));
        for slug in &slugs {
            assert!(!slug.is_empty());
            assert_eq!(slug.to_lowercase(), *slug);
            assert_eq!(slugs.iter().filter(|s| *s == slug).count(), 1);
        }
    }
}
