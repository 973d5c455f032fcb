//! Exponential backoff with optional jitter.

use std::time::Duration;
use rand::Rng;

/// `base * 2^retry_count`, capped at `max_ms`.
///
/// Retry zero waits exactly `base_ms`.
pub fn exponential_delay(retry_count: u32, base_ms: u64, max_ms: u64) -> Duration {
    let factor = 2u64.saturating_pow(retry_count);
    Duration::from_millis(base_ms.saturating_mul(factor).min(max_ms))
}

/// Add 0 to 10% jitter on top of a planned delay.
pub fn with_jitter(delay: Duration) -> Duration {
    let delay_ms = delay.as_millis() as u64;
    let jitter_range = delay_ms / 10;
    let jitter = if jitter_range > 0 {
        rand::thread_rng().gen_range(0..jitter_range)
    } else {
        0
    };
    Duration::from_millis(delay_ms + jitter)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exponential_delay() {
        assert_eq!(exponential_delay(0, 1000, 30_000), Duration::from_millis(1000));
        assert_eq!(exponential_delay(1, 1000, 30_000), Duration::from_millis(2000));
        assert_eq!(exponential_delay(3, 1000, 30_000), Duration::from_millis(8000));
        assert_eq!(exponential_delay(10, 1000, 30_000), Duration::from_millis(30_000));
        assert_eq!(exponential_delay(200, 1000, 30_000), Duration::from_millis(30_000));
    }

    #[test]
    fn test_jitter_bounds() {
        for _ in 0..100 {
            let delay = with_jitter(Duration::from_millis(1000));
            assert!(delay >= Duration::from_millis(1000));
            assert!(delay < Duration::from_millis(1100));
        }
        assert_eq!(with_jitter(Duration::from_millis(5)), Duration::from_millis(5));
    }
}
