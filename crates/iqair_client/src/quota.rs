//! Client-side call budget for the IQAir API.

use governor::{Quota, RateLimiter};
use std::num::NonZeroU32;
use std::sync::Arc;

type DirectLimiter = RateLimiter<
    governor::state::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

/// Non-blocking quota guard; callers that find it empty degrade instead of waiting.
#[derive(Debug, Clone)]
pub struct QuotaGuard {
    limiter: Arc<DirectLimiter>,
}

impl QuotaGuard {
    /// Allow `requests_per_minute` calls per minute (at least one).
    pub fn per_minute(requests_per_minute: u32) -> Self {
        let quota = Quota::per_minute(NonZeroU32::new(requests_per_minute).unwrap_or(NonZeroU32::MIN));
        Self {
            limiter: Arc::new(RateLimiter::direct(quota)),
        }
    }

    /// Try to take a slot without waiting. Returns true if acquired.
    pub fn try_acquire(&self) -> bool {
        self.limiter.check().is_ok()
    }
}
