// src/handlers/health.rs
// DOCUMENTATION: Health check handler
// PURPOSE: Liveness plus a database round trip

use actix_web::{web, HttpResponse, Responder};
use serde_json::json;
use sqlx::PgPool;

pub async fn health_check(pool: web::Data<PgPool>) -> impl Responder {
    let database = match sqlx::query("SELECT 1").execute(pool.get_ref()).await {
        Ok(_) => "up",
        Err(e) => {
            log::warn!("Health check database query failed: {}", e);
            "down"
        }
    };

    HttpResponse::Ok().json(json!({
        "status": "ok",
        "service": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
        "database": database,
    }))
}

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.route("/health", web::get().to(health_check));
}
