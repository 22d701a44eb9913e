//! Rate Limit Detection
//!
//! Classifies provider failures as rate-limit or quota conditions. The pool
//! only sees error text, so both the HTTP layer and the pool use these checks.

const RATE_LIMIT_MARKERS: &[&str] = &[
    "rate limit",
    "rate_limit",
    "ratelimit",
    "too many requests",
    "quota",
    "resource_exhausted",
    "resource exhausted",
];

/// Detect if a response indicates a rate limit error
pub fn is_rate_limit_error(status: u16, body: &str) -> bool {
    // HTTP 429 Too Many Requests
    if status == 429 {
        return true;
    }

    // Some providers return 400 or 403 with quota messages
    is_rate_limit_message(body)
}

/// Detect a rate-limit or quota condition from free-form error text
pub fn is_rate_limit_message(text: &str) -> bool {
    let lower = text.to_lowercase();
    RATE_LIMIT_MARKERS.iter().any(|marker| lower.contains(marker))
}
