// src/middleware/auth.rs
// DOCUMENTATION: Route guards
// PURPOSE: `Protect` resolves the logged-in user from the JWT (Bearer header or
// `jwt` cookie); `RestrictTo` then checks the user's role.
// Register RestrictTo first so Protect wraps it: `.wrap(RestrictTo::new(..)).wrap(Protect)`

use actix_web::body::{EitherBody, MessageBody};
use actix_web::dev::{forward_ready, Payload, Service, ServiceRequest, ServiceResponse, Transform};
use actix_web::{web, Error, FromRequest, HttpMessage, HttpRequest};
use futures::future::LocalBoxFuture;
use sqlx::PgPool;
use std::future::{ready, Ready};
use std::rc::Rc;

use crate::errors::AppError;
use crate::models::{Role, User};
use crate::services::{AuthService, JwtService};

/// Name of the cookie carrying the token
pub const JWT_COOKIE: &str = "jwt";

/// Token from `Authorization: Bearer <token>`, else from the `jwt` cookie
pub fn extract_token(req: &HttpRequest) -> Option<String> {
    let from_header = req
        .headers()
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(|t| t.trim().to_string());

    from_header
        .or_else(|| req.cookie(JWT_COOKIE).map(|c| c.value().to_string()))
        .filter(|t| !t.is_empty() && t != "loggedout")
}

fn app_data<T: 'static>(req: &ServiceRequest) -> Result<web::Data<T>, AppError> {
    req.app_data::<web::Data<T>>()
        .cloned()
        .ok_or_else(|| AppError::InternalError("application state not configured".to_string()))
}

async fn resolve_user(req: &ServiceRequest) -> Result<User, AppError> {
    let token = extract_token(req.request()).ok_or_else(AppError::not_logged_in)?;
    let pool = app_data::<PgPool>(req)?;
    let jwt = app_data::<JwtService>(req)?;

    AuthService::authenticate(&pool, &jwt, &token).await
}

/// Requires a valid token for an active user
pub struct Protect;

impl<S, B> Transform<S, ServiceRequest> for Protect
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    B: MessageBody + 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Transform = ProtectMiddleware<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(ProtectMiddleware {
            service: Rc::new(service),
        }))
    }
}

pub struct ProtectMiddleware<S> {
    service: Rc<S>,
}

impl<S, B> Service<ServiceRequest> for ProtectMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    B: MessageBody + 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let service = Rc::clone(&self.service);

        Box::pin(async move {
            match resolve_user(&req).await {
                Ok(user) => {
                    log::debug!("Authenticated user {} ({})", user.id, user.role);
                    req.extensions_mut().insert(user);
                    service.call(req).await.map(ServiceResponse::map_into_left_body)
                }
                Err(err) => Ok(req.error_response(err).map_into_right_body()),
            }
        })
    }
}

/// Only lets through users holding one of the given roles
#[derive(Clone)]
pub struct RestrictTo {
    roles: Rc<Vec<Role>>,
}

impl RestrictTo {
    pub fn new(roles: &[Role]) -> Self {
        RestrictTo {
            roles: Rc::new(roles.to_vec()),
        }
    }
}

impl<S, B> Transform<S, ServiceRequest> for RestrictTo
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    B: MessageBody + 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Transform = RestrictToMiddleware<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(RestrictToMiddleware {
            service: Rc::new(service),
            roles: Rc::clone(&self.roles),
        }))
    }
}

pub struct RestrictToMiddleware<S> {
    service: Rc<S>,
    roles: Rc<Vec<Role>>,
}

impl<S, B> Service<ServiceRequest> for RestrictToMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    B: MessageBody + 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let service = Rc::clone(&self.service);
        let roles = Rc::clone(&self.roles);

        Box::pin(async move {
            let allowed = req.extensions().get::<User>().map(|user| user.has_role(&roles));
            match allowed {
                Some(true) => service.call(req).await.map(ServiceResponse::map_into_left_body),
                Some(false) => Ok(req
                    .error_response(AppError::no_permission())
                    .map_into_right_body()),
                None => Ok(req
                    .error_response(AppError::not_logged_in())
                    .map_into_right_body()),
            }
        })
    }
}

/// The user attached by `Protect`
#[derive(Debug, Clone)]
pub struct CurrentUser(pub User);

impl FromRequest for CurrentUser {
    type Error = Error;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        let user = req.extensions().get::<User>().cloned();
        ready(
            user.map(CurrentUser)
                .ok_or_else(|| AppError::not_logged_in().into()),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::cookie::Cookie;
    use actix_web::test::{self, TestRequest};
    use actix_web::{App, HttpResponse};
    use chrono::Utc;
    use uuid::Uuid;

    fn user_with_role(role: Role) -> User {
        User {
            id: Uuid::new_v4(),
            name: "Kate Morrison".to_string(),
            email: "kate@example.com".to_string(),
            photo: "default.jpg".to_string(),
            role,
            password_hash: String::new(),
            password_changed_at: None,
            password_reset_token: None,
            password_reset_expires: None,
            active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    async fn whoami(user: CurrentUser) -> HttpResponse {
        HttpResponse::Ok().body(user.0.role.to_string())
    }

    /// Status for a request by `user` (or anonymous) against an admin-only resource
    async fn admin_only_status(user: Option<User>) -> u16 {
        let app = test::init_service(
            App::new().service(
                web::resource("/admin")
                    .wrap(RestrictTo::new(&[Role::Admin, Role::LeadGuide]))
                    .wrap_fn(move |req, srv| {
                        if let Some(user) = user.clone() {
                            req.extensions_mut().insert(user);
                        }
                        srv.call(req)
                    })
                    .route(web::get().to(whoami)),
            ),
        )
        .await;

        let resp = test::call_service(&app, TestRequest::get().uri("/admin").to_request()).await;
        resp.status().as_u16()
    }

    #[actix_rt::test]
    async fn test_restrict_to_roles() {
        assert_eq!(admin_only_status(Some(user_with_role(Role::Admin))).await, 200);
        assert_eq!(admin_only_status(Some(user_with_role(Role::LeadGuide))).await, 200);
        assert_eq!(admin_only_status(Some(user_with_role(Role::Guide))).await, 403);
        assert_eq!(admin_only_status(Some(user_with_role(Role::User))).await, 403);
        assert_eq!(admin_only_status(None).await, 401);
    }

    #[actix_rt::test]
    async fn test_current_user_requires_protect() {
        let app = test::init_service(App::new().route("/me", web::get().to(whoami))).await;
        let resp = test::call_service(&app, TestRequest::get().uri("/me").to_request()).await;
        assert_eq!(resp.status().as_u16(), 401);
    }

    #[test]
    fn test_token_from_bearer_header() {
        let req = TestRequest::default()
            .insert_header(("Authorization", "Bearer abc.def.ghi"))
            .to_http_request();
        assert_eq!(extract_token(&req).as_deref(), Some("abc.def.ghi"));
    }

    #[test]
    fn test_token_from_cookie() {
        let req = TestRequest::default()
            .cookie(Cookie::new(JWT_COOKIE, "cookie.token.value"))
            .to_http_request();
        assert_eq!(extract_token(&req).as_deref(), Some("cookie.token.value"));
    }

    #[test]
    fn test_logged_out_cookie_is_ignored() {
        let req = TestRequest::default()
            .cookie(Cookie::new(JWT_COOKIE, "loggedout"))
            .to_http_request();
        assert!(extract_token(&req).is_none());

        let req = TestRequest::default()
            .insert_header(("Authorization", "Basic dXNlcjpwYXNz"))
            .to_http_request();
        assert!(extract_token(&req).is_none());
    }
}
