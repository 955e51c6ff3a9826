use axum::{
    extract::{ConnectInfo, Request, State},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};
use redis::aio::ConnectionManager;
use std::net::SocketAddr;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::{AppError, RATE_LIMIT_RETRY_AFTER_SECS};
use crate::middleware::auth::Identity;

/// Fixed one-minute window limiter backed by Redis counters.
#[derive(Clone)]
pub struct RateLimiter {
    redis: ConnectionManager,
    scope: &'static str,
    per_minute: u32,
}

impl RateLimiter {
    pub fn new(redis: ConnectionManager, scope: &'static str, per_minute: u32) -> Self {
        Self {
            redis,
            scope,
            per_minute,
        }
    }

    /// Count one request for `subject`. Returns whether it is within the limit.
    async fn hit(&self, subject: &str) -> redis::RedisResult<bool> {
        let key = window_key(self.scope, subject, unix_now());
        let mut redis = self.redis.clone();
        let (count,): (u64,) = count_pipeline(&key).query_async(&mut redis).await?;
        Ok(count <= u64::from(self.per_minute))
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}

/// Counter key for the minute containing `unix_secs`.
pub fn window_key(scope: &str, subject: &str, unix_secs: u64) -> String {
    format!("ratelimit:{scope}:{subject}:{}", unix_secs / 60)
}

/// INCR and EXPIRE in one MULTI/EXEC so a counter never outlives its window.
fn count_pipeline(key: &str) -> redis::Pipeline {
    let mut pipe = redis::pipe();
    pipe.atomic()
        .incr(key, 1u64)
        .expire(key, RATE_LIMIT_RETRY_AFTER_SECS as i64)
        .ignore();
    pipe
}

/// Who a request is counted against: the key owner when authenticated,
/// otherwise the client address.
pub fn client_subject(
    identity: Option<&Identity>,
    headers: &HeaderMap,
    peer: Option<SocketAddr>,
) -> String {
    if let Some(identity) = identity {
        return format!("user:{}", identity.user_id);
    }

    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty());

    match (forwarded, peer) {
        (Some(ip), _) => format!("ip:{ip}"),
        (None, Some(addr)) => format!("ip:{}", addr.ip()),
        (None, None) => "ip:unknown".to_string(),
    }
}

pub async fn rate_limit(
    State(limiter): State<RateLimiter>,
    req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let peer = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let subject = client_subject(req.extensions().get::<Identity>(), req.headers(), peer);

    match limiter.hit(&subject).await {
        Ok(true) => Ok(next.run(req).await),
        Ok(false) => {
            tracing::warn!(scope = limiter.scope, subject = %subject, "Rate limit exceeded");
            Err(AppError::RateLimited)
        }
        Err(e) => {
            tracing::error!("Rate limiter unavailable, allowing request: {}", e);
            Ok(next.run(req).await)
        }
    }
}
