// src/main.rs
// DOCUMENTATION: Application entry point
// PURPOSE: Initialize config, database, auth/email services and start HTTP server

use actix_web::middleware::{Compress, DefaultHeaders, Logger};
use actix_web::{web, App, HttpServer};
use dotenv::dotenv;
use tours_api::config::{self, Config};
use tours_api::handlers;
use tours_api::middleware::RateLimit;
use tours_api::services::{self, EmailSender, JwtService};
use std::io;
use std::sync::Arc;
use std::time::Duration;

/// How often idle clients are dropped from the rate limiter
const RATE_LIMIT_PRUNE_SECS: u64 = 600;

#[actix_web::main]
async fn main() -> io::Result<()> {
    // 1. Load environment variables
    dotenv().ok();

    // 2. Load configuration
    let config = Config::from_env();

    // 3. Initialize logging
    if std::env::var("RUST_LOG").is_err() {
        let log_level = if !config.log_level.is_empty() {
            &config.log_level
        } else {
            "info,actix_web=info,sqlx=warn"
        };
        std::env::set_var("RUST_LOG", log_level);
    }
    env_logger::init();

    if let Err(e) = config.validate() {
        log::error!("Configuration error: {}", e);
        std::process::exit(1);
    }

    log::info!("Starting tours-api...");
    log::info!("Environment: {}", config.environment);
    log::info!(
        "Server Address: {}:{}",
        config.server_address,
        config.server_port
    );

    // 4. Initialize database connection pool
    let pool = match config::init_db_pool(&config).await {
        Ok(pool) => pool,
        Err(e) => {
            log::error!("Failed to connect to database: {}", e);
            std::process::exit(1);
        }
    };

    // 5. Auth and email services, shared by every worker
    let jwt = web::Data::new(JwtService::from_config(&config));
    let mailer: Arc<dyn EmailSender> = match services::sender_from_config(&config) {
        Ok(sender) => Arc::from(sender),
        Err(e) => {
            log::error!("Failed to configure email: {}", e);
            std::process::exit(1);
        }
    };
    let mailer = web::Data::from(mailer);
    let rate_limit =
        RateLimit::per_hour(config.rate_limit_per_hour).trust_proxy(config.trust_proxy);
    rate_limit.spawn_pruner(Duration::from_secs(RATE_LIMIT_PRUNE_SECS));
    log::info!(
        "Rate limit: {} requests per hour per IP",
        config.rate_limit_per_hour
    );

    // 6. Start HTTP server
    let server_addr = format!("{}:{}", config.server_address, config.server_port);
    let pool = web::Data::new(pool);
    let config = web::Data::new(config);

    HttpServer::new(move || {
        let rate_limit = rate_limit.clone();

        App::new()
            // Application state
            .app_data(pool.clone())
            .app_data(config.clone())
            .app_data(jwt.clone())
            .app_data(mailer.clone())
            // Middleware
            .wrap(Logger::default())
            .wrap(Compress::default())
            .wrap(
                DefaultHeaders::new()
                    .add(("X-Content-Type-Options", "nosniff"))
                    .add(("X-Frame-Options", "DENY"))
                    .add(("Referrer-Policy", "no-referrer"))
                    .add(("Access-Control-Allow-Origin", "*")),
            )
            // Routes
            .configure(|cfg| handlers::configure(cfg, rate_limit))
            .default_service(web::to(handlers::not_found))
    })
    .bind(&server_addr)?
    .run()
    .await
}
