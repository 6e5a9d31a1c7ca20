// src/middleware/rate_limit.rs
// DOCUMENTATION: Per-client request quota for /api
// The client is the TCP peer. Forwarded headers are only honoured when the
// server runs behind a trusted proxy (TRUST_PROXY=true).

use actix_web::body::{EitherBody, MessageBody};
use actix_web::dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform};
use actix_web::Error;
use futures::future::LocalBoxFuture;
use governor::{DefaultKeyedRateLimiter, Quota, RateLimiter};
use std::future::{ready, Ready};
use std::net::{IpAddr, Ipv4Addr};
use std::num::NonZeroU32;
use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;

use crate::errors::AppError;

/// Key used when the peer address is unknown
const UNKNOWN_CLIENT: IpAddr = IpAddr::V4(Ipv4Addr::UNSPECIFIED);

/// Keyed by client IP; the limiter is shared by every worker
#[derive(Clone)]
pub struct RateLimit {
    limiter: Arc<DefaultKeyedRateLimiter<IpAddr>>,
    trust_proxy: bool,
}

impl RateLimit {
    /// `max_per_hour` requests per IP, refilled evenly over the hour
    pub fn per_hour(max_per_hour: u32) -> Self {
        let max = NonZeroU32::new(max_per_hour).unwrap_or(NonZeroU32::MIN);
        RateLimit {
            limiter: Arc::new(RateLimiter::keyed(Quota::per_hour(max))),
            trust_proxy: false,
        }
    }

    pub fn trust_proxy(mut self, trust_proxy: bool) -> Self {
        self.trust_proxy = trust_proxy;
        self
    }

    /// Drop clients whose quota is full again
    pub fn prune(&self) {
        self.limiter.retain_recent();
        self.limiter.shrink_to_fit();
    }

    /// Prune on a fixed interval for the lifetime of the runtime
    pub fn spawn_pruner(&self, every: Duration) {
        let limit = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            loop {
                ticker.tick().await;
                limit.prune();
                log::debug!("Rate limiter tracks {} clients", limit.limiter.len());
            }
        });
    }

    fn client_ip(&self, req: &ServiceRequest) -> IpAddr {
        if self.trust_proxy {
            let forwarded = req
                .connection_info()
                .realip_remote_addr()
                .and_then(parse_ip);
            if let Some(ip) = forwarded {
                return ip;
            }
        }
        req.peer_addr().map(|addr| addr.ip()).unwrap_or(UNKNOWN_CLIENT)
    }
}

/// `1.2.3.4`, `1.2.3.4:80` or `[::1]:80`
fn parse_ip(addr: &str) -> Option<IpAddr> {
    addr.parse::<IpAddr>().ok().or_else(|| {
        addr.parse::<std::net::SocketAddr>()
            .ok()
            .map(|socket| socket.ip())
    })
}

impl<S, B> Transform<S, ServiceRequest> for RateLimit
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    B: MessageBody + 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Transform = RateLimitMiddleware<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(RateLimitMiddleware {
            service: Rc::new(service),
            limit: self.clone(),
        }))
    }
}

pub struct RateLimitMiddleware<S> {
    service: Rc<S>,
    limit: RateLimit,
}

impl<S, B> Service<ServiceRequest> for RateLimitMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    B: MessageBody + 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let client = self.limit.client_ip(&req);

        if self.limit.limiter.check_key(&client).is_err() {
            log::warn!("Rate limit exceeded for {}", client);
            let resp = req
                .error_response(AppError::RateLimitExceeded)
                .map_into_right_body();
            return Box::pin(async { Ok(resp) });
        }

        let fut = self.service.call(req);
        Box::pin(async move { fut.await.map(ServiceResponse::map_into_left_body) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::{test, web, App, HttpResponse};
    use std::net::SocketAddr;

    async fn statuses_from(
        limit: RateLimit,
        peers: &[&str],
        forwarded_for: impl Fn(usize) -> String,
    ) -> Vec<u16> {
        let app = test::init_service(
            App::new().service(
                web::scope("/api")
                    .wrap(limit)
                    .route("/ping", web::get().to(|| async { HttpResponse::Ok().finish() })),
            ),
        )
        .await;

        let mut statuses = Vec::new();
        for (i, peer) in peers.iter().enumerate() {
            let req = test::TestRequest::get()
                .uri("/api/ping")
                .peer_addr(peer.parse::<SocketAddr>().unwrap())
                .insert_header(("X-Forwarded-For", forwarded_for(i)))
                .to_request();
            let resp = test::call_service(&app, req).await;
            statuses.push(resp.status().as_u16());
        }
        statuses
    }

    #[actix_rt::test]
    async fn test_requests_over_quota_get_429() {
        let app = test::init_service(
            App::new().service(
                web::scope("/api")
                    .wrap(RateLimit::per_hour(2))
                    .route("/ping", web::get().to(|| async { HttpResponse::Ok().finish() })),
            ),
        )
        .await;

        for _ in 0..2 {
            let req = test::TestRequest::get().uri("/api/ping").to_request();
            let resp = test::call_service(&app, req).await;
            assert_eq!(resp.status(), 200);
        }

        let req = test::TestRequest::get().uri("/api/ping").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 429);

        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(
            body["message"],
            "Too many requests from this IP, please try again in an hour!"
        );
    }

    #[actix_rt::test]
    async fn test_forwarded_header_does_not_reset_quota() {
        let peers = ["10.9.9.9:40000"; 5];
        let statuses = statuses_from(RateLimit::per_hour(1), &peers, |i| format!("1.2.3.{}", i)).await;
        assert_eq!(statuses, vec![200, 429, 429, 429, 429]);
    }

    #[actix_rt::test]
    async fn test_quota_is_per_peer() {
        let peers = ["10.0.0.1:40000", "10.0.0.1:40001", "10.0.0.2:40000"];
        let statuses = statuses_from(RateLimit::per_hour(1), &peers, |_| "1.2.3.4".to_string()).await;
        assert_eq!(statuses, vec![200, 429, 200]);
    }

    #[actix_rt::test]
    async fn test_trusted_proxy_keys_on_forwarded_client() {
        let peers = ["10.9.9.9:40000"; 3];
        let limit = RateLimit::per_hour(1).trust_proxy(true);
        let statuses = statuses_from(limit, &peers, |i| format!("1.2.3.{}", i)).await;
        assert_eq!(statuses, vec![200, 200, 200]);
    }

    #[::core::prelude::v1::test]
    fn test_prune_keeps_exhausted_clients() {
        let limit = RateLimit::per_hour(1);
        let client: IpAddr = "10.0.0.1".parse().unwrap();
        assert!(limit.limiter.check_key(&client).is_ok());

        limit.prune();
        assert_eq!(limit.limiter.len(), 1);
        assert!(limit.limiter.check_key(&client).is_err());
    }

    #[::core::prelude::v1::test]
    fn test_parse_ip() {
        assert_eq!(parse_ip("1.2.3.4"), Some("1.2.3.4".parse().unwrap()));
        assert_eq!(parse_ip("1.2.3.4:8080"), Some("1.2.3.4".parse().unwrap()));
        assert_eq!(parse_ip("[::1]:80"), Some("::1".parse().unwrap()));
        assert_eq!(parse_ip("not-an-ip"), None);
    }
}
