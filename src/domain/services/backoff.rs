//! Backoff Strategies
//!
//! Delay tables used by the retry writer between write attempts.

use rand::Rng;
use std::time::Duration;

/// Attempt at which the exponential table stops growing (~35 minutes).
pub const MAX_EXPONENT: u32 = 22;

/// Exponential backoff with +/-10% jitter.
///
/// Attempt 0 waits 1ms. Attempt `k >= 1` waits `2^(k-1)` ms, capped at
/// `k = 22`, jittered uniformly within a tenth of that base. Summed over
/// attempts 1..=22 the delays total roughly one hour.
pub fn exponential(attempt: u32) -> Duration {
    if attempt == 0 {
        return Duration::from_millis(1);
    }

    let base = base_delay(attempt);
    let base_ns = base.as_nanos() as i64;
    let spread = base_ns / 10;
    let jitter = if spread > 0 {
        rand::thread_rng().gen_range(-spread..=spread)
    } else {
        0
    };

    Duration::from_nanos((base_ns + jitter) as u64)
}

/// Un-jittered delay for an attempt.
pub fn base_delay(attempt: u32) -> Duration {
    if attempt == 0 {
        return Duration::from_millis(1);
    }
    let exp = attempt.min(MAX_EXPONENT) - 1;
    Duration::from_millis(1u64 << exp)
}

/// Constant delay; handy for tests and tight local retries.
pub fn constant_millis(ms: u64) -> impl Fn(u32) -> Duration + Send + Sync + Clone {
    move |_| Duration::from_millis(ms)
}
