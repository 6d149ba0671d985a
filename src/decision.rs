use std::time::{SystemTime, UNIX_EPOCH};

use crate::RequestLimit;

/// Quota header names, in the order [`RateLimitDecision::headers`] yields them.
pub const LIMIT_HEADER: &str = "X-RateLimit-Limit";
/// Remaining calls in the current window.
pub const REMAINING_HEADER: &str = "X-RateLimit-Remaining";
/// Epoch milliseconds at which the current window ends.
pub const RESET_HEADER: &str = "X-RateLimit-Reset";

/// Admission decision for one counted call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitDecision {
    /// Configured limit.
    pub limit: u64,
    /// Counter value after this call.
    pub count: u64,
    /// Calls left in the window, never below 0.
    pub remaining: u64,
    /// Seconds until the window ends.
    pub ttl_seconds: u64,
    /// Epoch milliseconds at which the window ends.
    pub reset_at_ms: u64,
    /// Whether the call is admitted (`count <= limit`).
    pub allowed: bool,
}

impl RateLimitDecision {
    /// Apply `limit` to a `(count, ttl)` pair read now.
    pub fn evaluate(count: u64, ttl_seconds: u64, limit: RequestLimit) -> Self {
        Self::evaluate_at(count, ttl_seconds, limit, now_ms())
    }

    /// Apply `limit` to a `(count, ttl)` pair read at `now_ms`.
    pub fn evaluate_at(count: u64, ttl_seconds: u64, limit: RequestLimit, now_ms: u64) -> Self {
        let limit = *limit;

        Self {
            limit,
            count,
            remaining: limit.saturating_sub(count),
            ttl_seconds,
            reset_at_ms: now_ms.saturating_add(ttl_seconds.saturating_mul(1000)),
            allowed: count <= limit,
        }
    }

    /// Quota headers for this decision.
    pub fn headers(&self) -> [(&'static str, String); 3] {
        [
            (LIMIT_HEADER, self.limit.to_string()),
            (REMAINING_HEADER, self.remaining.to_string()),
            (RESET_HEADER, self.reset_at_ms.to_string()),
        ]
    }

    /// `Ok(self)` if admitted, otherwise the quota-exceeded condition.
    pub fn into_result(self) -> Result<Self, QuotaExceeded> {
        if self.allowed {
            Ok(self)
        } else {
            Err(QuotaExceeded {
                count: self.count,
                limit: self.limit,
                ttl_seconds: self.ttl_seconds,
                reset_at_ms: self.reset_at_ms,
            })
        }
    }
}

/// A counted call that went over its limit.
///
/// This is a policy outcome, not a store failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("API rate limit exceeded.")]
pub struct QuotaExceeded {
    /// Counter value after the rejected call.
    pub count: u64,
    /// Configured limit.
    pub limit: u64,
    /// Seconds until the window ends.
    pub ttl_seconds: u64,
    /// Epoch milliseconds at which the window ends.
    pub reset_at_ms: u64,
}

impl QuotaExceeded {
    /// Always `true`; marks this error as a rate-limit rejection.
    pub fn is_rate_limit(&self) -> bool {
        true
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or(0)
}
