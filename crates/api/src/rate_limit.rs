//! Per-IP token-bucket rate limiting, trusting `X-Forwarded-For` only from
//! configured proxy CIDRs (ported from the teacher's gateway rate limiter).

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Instant;

use axum::body::Body;
use axum::extract::{ConnectInfo, State};
use axum::http::{Request, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use dashmap::DashMap;
use ipnetwork::IpNetwork;

#[derive(Clone)]
struct Bucket {
    tokens: f64,
    last: Instant,
}

#[derive(Clone)]
pub struct IpLimiter {
    buckets: Arc<DashMap<IpAddr, Bucket>>,
    rps: f64,
    burst: f64,
    trusted_proxy_cidrs: Arc<Vec<IpNetwork>>,
}

impl IpLimiter {
    pub fn new(rps: u32, burst: u32, trusted_proxy_cidrs: Vec<IpNetwork>) -> Self {
        Self {
            buckets: Arc::new(DashMap::new()),
            rps: rps as f64,
            burst: burst as f64,
            trusted_proxy_cidrs: Arc::new(trusted_proxy_cidrs),
        }
    }

    fn client_ip<B>(&self, req: &Request<B>) -> IpAddr {
        if let Some(peer_ip) = req
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|c| c.0.ip())
        {
            if self.trusted_proxy_cidrs.iter().any(|cidr| cidr.contains(peer_ip)) {
                if let Some(xff) = req.headers().get("x-forwarded-for").and_then(|h| h.to_str().ok()) {
                    if let Some(first) = xff.split(',').next() {
                        if let Ok(ip) = first.trim().parse::<IpAddr>() {
                            return ip;
                        }
                    }
                }
            }
            return peer_ip;
        }
        IpAddr::from([127, 0, 0, 1])
    }

    fn allow<B>(&self, req: &Request<B>) -> bool {
        let ip = self.client_ip(req);
        let now = Instant::now();
        let mut entry = self.buckets.entry(ip).or_insert_with(|| Bucket {
            tokens: self.burst,
            last: now,
        });
        let elapsed = now.duration_since(entry.last).as_secs_f64();
        entry.tokens = (entry.tokens + elapsed * self.rps).min(self.burst);
        entry.last = now;
        if entry.tokens >= 1.0 {
            entry.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

pub async fn rate_limit_middleware(
    State(limiter): State<IpLimiter>,
    req: Request<Body>,
    next: Next,
) -> Response {
    if limiter.allow(&req) {
        next.run(req).await
    } else {
        prov_telemetry::api_metrics().inc_rate_limited();
        (StatusCode::TOO_MANY_REQUESTS, "Too many requests").into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> Request<Body> {
        Request::builder().body(Body::empty()).unwrap()
    }

    #[test]
    fn burst_then_limited_then_recovers() {
        let limiter = IpLimiter::new(1, 2, Vec::new());
        let req = request();
        assert!(limiter.allow(&req));
        assert!(limiter.allow(&req));
        assert!(!limiter.allow(&req));
    }
}
