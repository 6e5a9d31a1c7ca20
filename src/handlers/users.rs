// src/handlers/users.rs
// DOCUMENTATION: HTTP handlers for authentication and user accounts
// PURPOSE: Issue the login cookie, self-service profile routes and admin user management

use actix_web::cookie::{time::Duration as CookieDuration, Cookie};
use actix_web::http::StatusCode;
use actix_web::{web, HttpRequest, HttpResponse};
use serde_json::json;
use sqlx::PgPool;
use validator::Validate;

use crate::config::Config;
use crate::db::UserRepository;
use crate::errors::AppError;
use crate::handlers::factory;
use crate::middleware::{CurrentUser, Protect, RestrictTo, JWT_COOKIE};
use crate::models::*;
use crate::services::{AuthService, EmailSender, JwtService, Session};

/// Set the `jwt` cookie and answer `{status, token, data: {user}}`
fn send_token(session: Session, status: StatusCode, config: &Config) -> HttpResponse {
    let cookie = Cookie::build(JWT_COOKIE, session.token.clone())
        .path("/")
        .http_only(true)
        .secure(config.is_production())
        .max_age(CookieDuration::days(config.jwt_cookie_expires_in_days))
        .finish();

    HttpResponse::build(status).cookie(cookie).json(json!({
        "status": "success",
        "token": session.token,
        "data": { "user": session.user },
    }))
}

/// POST /users/signup
pub async fn signup(
    pool: web::Data<PgPool>,
    jwt: web::Data<JwtService>,
    config: web::Data<Config>,
    body: web::Json<SignupRequest>,
) -> Result<HttpResponse, AppError> {
    let body = body.into_inner();
    body.validate()?;

    let session = AuthService::signup(pool.get_ref(), &jwt, body).await?;
    Ok(send_token(session, StatusCode::CREATED, &config))
}

/// POST /users/login
pub async fn login(
    pool: web::Data<PgPool>,
    jwt: web::Data<JwtService>,
    config: web::Data<Config>,
    body: web::Json<LoginRequest>,
) -> Result<HttpResponse, AppError> {
    let session = AuthService::login(pool.get_ref(), &jwt, body.into_inner()).await?;
    Ok(send_token(session, StatusCode::OK, &config))
}

/// GET /users/logout
/// Overwrites the cookie with a short-lived dummy value
pub async fn logout() -> HttpResponse {
    let cookie = Cookie::build(JWT_COOKIE, "loggedout")
        .path("/")
        .http_only(true)
        .max_age(CookieDuration::seconds(10))
        .finish();

    HttpResponse::Ok()
        .cookie(cookie)
        .json(json!({ "status": "success" }))
}

/// POST /users/forgot-password
pub async fn forgot_password(
    pool: web::Data<PgPool>,
    mailer: web::Data<dyn EmailSender>,
    req: HttpRequest,
    body: web::Json<ForgotPasswordRequest>,
) -> Result<HttpResponse, AppError> {
    let body = body.into_inner();
    body.validate()?;

    let reset_base_url = {
        let conn = req.connection_info();
        format!(
            "{}://{}/api/v1/users/reset-password",
            conn.scheme(),
            conn.host()
        )
    };

    AuthService::forgot_password(pool.get_ref(), mailer.get_ref(), body, &reset_base_url).await?;

    Ok(HttpResponse::Ok().json(json!({
        "status": "success",
        "message": "Token sent to email!",
    })))
}

/// PATCH /users/reset-password/{token}
pub async fn reset_password(
    pool: web::Data<PgPool>,
    jwt: web::Data<JwtService>,
    config: web::Data<Config>,
    path: web::Path<String>,
    body: web::Json<ResetPasswordRequest>,
) -> Result<HttpResponse, AppError> {
    let body = body.into_inner();
    body.validate()?;

    let session =
        AuthService::reset_password(pool.get_ref(), &jwt, &path.into_inner(), body).await?;
    Ok(send_token(session, StatusCode::OK, &config))
}

/// PATCH /users/update-password
pub async fn update_password(
    pool: web::Data<PgPool>,
    jwt: web::Data<JwtService>,
    config: web::Data<Config>,
    user: CurrentUser,
    body: web::Json<UpdatePasswordRequest>,
) -> Result<HttpResponse, AppError> {
    let body = body.into_inner();
    body.validate()?;

    let session = AuthService::update_password(pool.get_ref(), &jwt, &user.0, body).await?;
    Ok(send_token(session, StatusCode::OK, &config))
}

/// GET /users/me
pub async fn get_me(user: CurrentUser) -> HttpResponse {
    factory::doc_response(&user.0)
}

/// PATCH /users
pub async fn update_me(
    pool: web::Data<PgPool>,
    user: CurrentUser,
    body: web::Json<UpdateMeRequest>,
) -> Result<HttpResponse, AppError> {
    let body = body.into_inner();
    body.reject_password_fields()?;
    body.validate()?;

    let updated = UserRepository::update_me(pool.get_ref(), user.0.id, &body).await?;
    Ok(HttpResponse::Ok().json(json!({
        "status": "success",
        "data": { "user": updated },
    })))
}

/// DELETE /users
pub async fn delete_me(
    pool: web::Data<PgPool>,
    user: CurrentUser,
) -> Result<HttpResponse, AppError> {
    UserRepository::deactivate(pool.get_ref(), user.0.id).await?;
    Ok(HttpResponse::NoContent().finish())
}

/// POST /users (admin): accounts are only created through signup
pub async fn create_user() -> HttpResponse {
    HttpResponse::InternalServerError().json(json!({
        "status": "error",
        "message": "This route is not defined! Please use /signup instead",
    }))
}

const ADMIN: [Role; 1] = [Role::Admin];

/// Configuration for user routes
pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/users")
            .route("/signup", web::post().to(signup))
            .route("/login", web::post().to(login))
            .route("/logout", web::get().to(logout))
            .route("/forgot-password", web::post().to(forgot_password))
            .route("/reset-password/{token}", web::patch().to(reset_password))
            .route(
                "/update-password",
                web::patch().to(update_password).wrap(Protect),
            )
            .route("/me", web::get().to(get_me).wrap(Protect))
            .route(
                "",
                web::get()
                    .to(factory::get_all::<UserRepository>)
                    .wrap(RestrictTo::new(&ADMIN))
                    .wrap(Protect),
            )
            .route(
                "",
                web::post()
                    .to(create_user)
                    .wrap(RestrictTo::new(&ADMIN))
                    .wrap(Protect),
            )
            .route("", web::patch().to(update_me).wrap(Protect))
            .route("", web::delete().to(delete_me).wrap(Protect))
            .route(
                "/{id}",
                web::get()
                    .to(factory::get_one::<UserRepository>)
                    .wrap(RestrictTo::new(&ADMIN))
                    .wrap(Protect),
            )
            .route(
                "/{id}",
                web::put()
                    .to(factory::update_one::<UserRepository>)
                    .wrap(RestrictTo::new(&ADMIN))
                    .wrap(Protect),
            )
            .route(
                "/{id}",
                web::delete()
                    .to(factory::delete_one::<UserRepository>)
                    .wrap(RestrictTo::new(&ADMIN))
                    .wrap(Protect),
            ),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    fn session() -> Session {
        Session {
            user: User {
                id: Uuid::new_v4(),
                name: "Jonas".to_string(),
                email: "jonas@example.com".to_string(),
                photo: "default.jpg".to_string(),
                role: Role::User,
                password_hash: "hash".to_string(),
                password_changed_at: None,
                password_reset_token: None,
                password_reset_expires: None,
                active: true,
                created_at: Utc::now(),
                updated_at: Utc::now(),
            },
            token: "header.payload.signature".to_string(),
        }
    }

    #[test]
    fn test_send_token_sets_http_only_cookie() {
        let config = Config::for_tests();
        let resp = send_token(session(), StatusCode::CREATED, &config);
        assert_eq!(resp.status(), StatusCode::CREATED);

        let cookie = resp.cookies().find(|c| c.name() == JWT_COOKIE).unwrap();
        assert_eq!(cookie.value(), "header.payload.signature");
        assert_eq!(cookie.http_only(), Some(true));
        assert_ne!(cookie.secure(), Some(true));
        assert_eq!(cookie.max_age(), Some(CookieDuration::days(90)));
    }

    #[test]
    fn test_cookie_is_secure_in_production() {
        let mut config = Config::for_tests();
        config.environment = "production".to_string();
        let resp = send_token(session(), StatusCode::OK, &config);
        let cookie = resp.cookies().find(|c| c.name() == JWT_COOKIE).unwrap();
        assert_eq!(cookie.secure(), Some(true));
    }

    #[actix_rt::test]
    async fn test_logout_overwrites_cookie() {
        let resp = logout().await;
        assert_eq!(resp.status(), StatusCode::OK);
        let cookie = resp.cookies().find(|c| c.name() == JWT_COOKIE).unwrap();
        assert_eq!(cookie.value(), "loggedout");
        assert_eq!(cookie.max_age(), Some(CookieDuration::seconds(10)));
    }
}
