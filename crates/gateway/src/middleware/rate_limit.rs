//! Rate limiting middleware using token bucket algorithm
//!
//! Applied to the credential endpoints only (sign-in and sign-up, page and API).

use axum::{extract::Request, middleware::Next, response::Response};
use fooddrop_common::errors::AppError;
use governor::{
    clock::QuantaClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use std::num::NonZeroU32;
use std::sync::Arc;

/// Rate limiter using governor crate
pub type GlobalRateLimiter = RateLimiter<NotKeyed, InMemoryState, QuantaClock>;

/// Limiter shared by the credential routes, with its configured rate
#[derive(Clone)]
pub struct CredentialLimiter {
    limiter: Arc<GlobalRateLimiter>,
    requests_per_second: u32,
}

/// Create a new rate limiter. Zero values are raised to one.
pub fn create_rate_limiter(requests_per_second: u32, burst: u32) -> CredentialLimiter {
    let rate = NonZeroU32::new(requests_per_second).unwrap_or(NonZeroU32::MIN);
    let quota = Quota::per_second(rate).allow_burst(NonZeroU32::new(burst).unwrap_or(NonZeroU32::MIN));

    CredentialLimiter {
        limiter: Arc::new(RateLimiter::direct(quota)),
        requests_per_second: rate.get(),
    }
}

/// Rate limiting middleware; passes everything through when no limiter is configured
pub async fn rate_limit_middleware(
    request: Request,
    next: Next,
    limiter: Option<CredentialLimiter>,
) -> Result<Response, AppError> {
    let Some(limiter) = limiter else {
        return Ok(next.run(request).await);
    };

    match limiter.limiter.check() {
        Ok(_) => Ok(next.run(request).await),
        Err(_) => {
            tracing::warn!(path = %request.uri().path(), "Rate limit exceeded");
            Err(AppError::RateLimited {
                limit: limiter.requests_per_second,
            })
        }
    }
}
