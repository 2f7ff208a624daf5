//! Rate limiting middleware
//!
//! Fixed-window counters in Redis, keyed by user. Requests pass through
//! untouched when Redis is not configured or unreachable.

use axum::{
    body::Body,
    extract::{Request, State},
    http::Method,
    middleware::Next,
    response::Response,
};
use redis::AsyncCommands;

use crate::{
    constants::rate_limits, error::AppError, middleware::auth::AuthenticatedUser,
    state::AppState,
};

/// Rate limit middleware; runs after authentication
pub async fn rate_limit_middleware(
    State(state): State<AppState>,
    request: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    let Some(mut redis) = state.redis() else {
        return Ok(next.run(request).await);
    };

    let subject = request
        .extensions()
        .get::<AuthenticatedUser>()
        .map(|user| user.id.to_string())
        .unwrap_or_else(|| "anonymous".to_string());

    let bucket = bucket(request.method());
    let (limit, window) = limits(bucket);
    let key = format!("rate_limit:{}:{}", subject, bucket);

    let count: i64 = match redis.incr(&key, 1).await {
        Ok(count) => count,
        Err(e) => {
            tracing::warn!(error = %e, "Rate limiter unavailable");
            return Ok(next.run(request).await);
        }
    };

    if count == 1 {
        let expired: Result<(), _> = redis.expire(&key, window).await;
        if let Err(e) = expired {
            tracing::warn!(key = %key, error = %e, "Failed to set rate limit window");
        }
    }

    if count > limit {
        tracing::debug!(key = %key, count, limit, "Rate limit exceeded");
        return Err(AppError::TooManyRequests);
    }

    Ok(next.run(request).await)
}

/// Actions (POST) share a tighter bucket than reads
fn bucket(method: &Method) -> &'static str {
    if method == Method::POST {
        "actions"
    } else {
        "general"
    }
}

fn limits(bucket: &str) -> (i64, i64) {
    match bucket {
        "actions" => (
            rate_limits::SUBMISSION_MAX_REQUESTS,
            rate_limits::SUBMISSION_WINDOW_SECS,
        ),
        _ => (
            rate_limits::GENERAL_MAX_REQUESTS,
            rate_limits::GENERAL_WINDOW_SECS,
        ),
    }
}
