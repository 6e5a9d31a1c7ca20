// src/handlers/tours.rs
// DOCUMENTATION: HTTP handlers for tour operations
// PURPOSE: Aliases, analytics and geospatial endpoints; plain CRUD goes through the factory

use actix_web::{web, HttpResponse};
use serde::Deserialize;
use serde_json::json;
use sqlx::PgPool;

use crate::db::tour_repository::{parse_lat_lng, DistanceUnit};
use crate::db::{ApiFeatures, Resource, ReviewRepository, TourRepository};
use crate::errors::AppError;
use crate::handlers::factory::{self, list_response};
use crate::handlers::reviews;
use crate::middleware::{Protect, RestrictTo};
use crate::models::Role;

/// GET /tours/top-5-tours
/// Five best rated, cheapest first on ties; other query filters still apply
pub async fn top_tours(
    pool: web::Data<PgPool>,
    query: web::Query<Vec<(String, String)>>,
) -> Result<HttpResponse, AppError> {
    let top = ApiFeatures::top_tours();
    let features = ApiFeatures {
        limit: top.limit,
        sort: top.sort,
        projection: top.projection,
        ..ApiFeatures::from_pairs(&query)?
    };

    let tours = TourRepository::find_all(pool.get_ref(), &features).await?;
    list_response(&tours, &features)
}

/// GET /tours/tour-stats
pub async fn tour_stats(pool: web::Data<PgPool>) -> Result<HttpResponse, AppError> {
    let stats = TourRepository::stats(pool.get_ref()).await?;
    Ok(HttpResponse::Ok().json(json!({
        "status": "success",
        "data": { "stats": stats },
    })))
}

/// GET /tours/monthly-plan/{year}
pub async fn monthly_plan(
    pool: web::Data<PgPool>,
    path: web::Path<i32>,
) -> Result<HttpResponse, AppError> {
    let year = path.into_inner();
    let plan = TourRepository::monthly_plan(pool.get_ref(), year).await?;
    Ok(HttpResponse::Ok().json(json!({
        "status": "success",
        "data": { "plan": plan },
    })))
}

#[derive(Debug, Deserialize)]
pub struct WithinPath {
    pub distance: f64,
    pub latlng: String,
    pub unit: String,
}

/// GET /tours/tours-within/{distance}/center/{latlng}/unit/{unit}
pub async fn tours_within(
    pool: web::Data<PgPool>,
    path: web::Path<WithinPath>,
) -> Result<HttpResponse, AppError> {
    let WithinPath {
        distance,
        latlng,
        unit,
    } = path.into_inner();

    let unit = DistanceUnit::parse(&unit)?;
    let center = parse_lat_lng(&latlng)?;
    let radius_m = unit.to_meters(distance);
    if !radius_m.is_finite() || radius_m < 0.0 {
        return Err(AppError::InvalidInput(
            "Distance must be a positive number".to_string(),
        ));
    }

    let tours = TourRepository::find_within(pool.get_ref(), center, radius_m).await?;
    list_response(&tours, &ApiFeatures::default())
}

#[derive(Debug, Deserialize)]
pub struct DistancesPath {
    pub latlng: String,
    pub unit: String,
}

/// GET /tours/distances/{latlng}/unit/{unit}
pub async fn distances(
    pool: web::Data<PgPool>,
    path: web::Path<DistancesPath>,
) -> Result<HttpResponse, AppError> {
    let DistancesPath { latlng, unit } = path.into_inner();

    let unit = DistanceUnit::parse(&unit)?;
    let center = parse_lat_lng(&latlng)?;

    let distances = TourRepository::distances_from(pool.get_ref(), center, unit).await?;
    Ok(HttpResponse::Ok().json(json!({
        "status": "success",
        "data": { "data": distances },
    })))
}

const TOUR_EDITORS: [Role; 2] = [Role::Admin, Role::LeadGuide];
const TOUR_PLANNERS: [Role; 3] = [Role::Admin, Role::LeadGuide, Role::Guide];

/// Configuration for tour routes
/// Fixed paths are registered before `/{id}`
pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/tours")
            .route("/top-5-tours", web::get().to(top_tours))
            .route("/tour-stats", web::get().to(tour_stats))
            .route(
                "/monthly-plan/{year}",
                web::get()
                    .to(monthly_plan)
                    .wrap(RestrictTo::new(&TOUR_PLANNERS))
                    .wrap(Protect),
            )
            .route(
                "/tours-within/{distance}/center/{latlng}/unit/{unit}",
                web::get().to(tours_within),
            )
            .route("/distances/{latlng}/unit/{unit}", web::get().to(distances))
            .route(
                "",
                web::get()
                    .to(factory::get_all::<TourRepository>)
                    .wrap(Protect),
            )
            .route(
                "",
                web::post()
                    .to(factory::create_one::<TourRepository>)
                    .wrap(RestrictTo::new(&TOUR_EDITORS))
                    .wrap(Protect),
            )
            .route(
                "/{tourId}/reviews",
                web::get()
                    .to(factory::get_all::<ReviewRepository>)
                    .wrap(Protect),
            )
            .route(
                "/{tourId}/reviews",
                web::post()
                    .to(reviews::create_review)
                    .wrap(RestrictTo::new(&[Role::User]))
                    .wrap(Protect),
            )
            .route("/{id}", web::get().to(factory::get_one::<TourRepository>))
            .route(
                "/{id}",
                web::put()
                    .to(factory::update_one::<TourRepository>)
                    .wrap(RestrictTo::new(&TOUR_EDITORS))
                    .wrap(Protect),
            )
            .route(
                "/{id}",
                web::delete()
                    .to(factory::delete_one::<TourRepository>)
                    .wrap(RestrictTo::new(&TOUR_EDITORS))
                    .wrap(Protect),
            ),
    );
}
