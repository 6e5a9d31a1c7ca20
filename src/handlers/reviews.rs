// src/handlers/reviews.rs
// DOCUMENTATION: HTTP handlers for reviews
// PURPOSE: Review creation ties the review to the route's tour and the logged-in user

use actix_web::{web, HttpRequest, HttpResponse};
use serde_json::json;
use sqlx::PgPool;
use uuid::Uuid;
use validator::Validate;

use crate::db::{Resource, ReviewRepository};
use crate::errors::AppError;
use crate::handlers::factory;
use crate::middleware::{CurrentUser, Protect, RestrictTo};
use crate::models::{CreateReviewRequest, Role};

/// POST /reviews and POST /tours/{tourId}/reviews
pub async fn create_review(
    pool: web::Data<PgPool>,
    req: HttpRequest,
    user: CurrentUser,
    body: web::Json<CreateReviewRequest>,
) -> Result<HttpResponse, AppError> {
    let mut body = body.into_inner();
    body.validate()?;

    if let Some(tour_id) = req.match_info().get("tourId") {
        let tour_id = Uuid::parse_str(tour_id)
            .map_err(|_| AppError::InvalidInput(format!("Invalid tourId: {}", tour_id)))?;
        body.tour = Some(tour_id);
    }
    body.user = Some(user.0.id);

    let review = ReviewRepository::create(pool.get_ref(), body).await?;
    Ok(HttpResponse::Created().json(json!({
        "status": "success",
        "data": { "data": review },
    })))
}

const REVIEW_EDITORS: [Role; 2] = [Role::Admin, Role::User];

/// Configuration for review routes; every route requires login
pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/reviews")
            .route("", web::get().to(factory::get_all::<ReviewRepository>))
            .route(
                "",
                web::post()
                    .to(create_review)
                    .wrap(RestrictTo::new(&[Role::User])),
            )
            .route("/{id}", web::get().to(factory::get_one::<ReviewRepository>))
            .route(
                "/{id}",
                web::patch()
                    .to(factory::update_one::<ReviewRepository>)
                    .wrap(RestrictTo::new(&REVIEW_EDITORS)),
            )
            .route(
                "/{id}",
                web::delete()
                    .to(factory::delete_one::<ReviewRepository>)
                    .wrap(RestrictTo::new(&REVIEW_EDITORS)),
            )
            .wrap(Protect),
    );
}
