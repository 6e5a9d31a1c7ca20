// src/handlers/mod.rs
// DOCUMENTATION: Handlers module organization
// PURPOSE: Route registration for /health and /api/v1

pub mod bookings;
pub mod extractors;
pub mod factory;
pub mod health;
pub mod reviews;
pub mod tours;
pub mod users;

use actix_web::{web, HttpRequest, HttpResponse};

use crate::errors::AppError;
use crate::middleware::RateLimit;

pub use health::config as health_config;

/// Fallback for every unmatched route
pub async fn not_found(req: HttpRequest) -> Result<HttpResponse, AppError> {
    Err(AppError::NotFound(format!(
        "Can't find {} on this server",
        req.path()
    )))
}

/// Register all routes; `/api` is rate limited per client
pub fn configure(cfg: &mut web::ServiceConfig, rate_limit: RateLimit) {
    cfg.app_data(extractors::json_config())
        .app_data(extractors::path_config())
        .app_data(extractors::query_config())
        .configure(health_config)
        .service(
            web::scope("/api").wrap(rate_limit).service(
                web::scope("/v1")
                    .configure(tours::config)
                    .configure(users::config)
                    .configure(reviews::config)
                    .configure(bookings::config),
            ),
        );
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::config::Config;
    use crate::services::email_service::mock::MockEmailSender;
    use crate::services::{EmailSender, JwtService};
    use sqlx::postgres::PgPoolOptions;
    use sqlx::PgPool;
    use std::sync::Arc;
    use std::time::Duration;

    /// Never connects unless a handler actually queries
    pub fn lazy_pool() -> PgPool {
        PgPoolOptions::new()
            .acquire_timeout(Duration::from_secs(1))
            .connect_lazy(&Config::for_tests().database_url)
            .unwrap()
    }

    pub fn configure_test_app(cfg: &mut web::ServiceConfig) {
        let config = Config::for_tests();
        let mailer: Arc<dyn EmailSender> = Arc::new(MockEmailSender::default());

        cfg.app_data(web::Data::new(lazy_pool()))
            .app_data(web::Data::new(JwtService::from_config(&config)))
            .app_data(web::Data::from(mailer))
            .app_data(web::Data::new(config));

        configure(cfg, RateLimit::per_hour(1000));
    }
}
