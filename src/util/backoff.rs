//! Exponential backoff with jitter, shared by the Fetcher (§4.2), the Stage
//! Mover (§4.7), and watch-mode retries (§4.9).
//!
//! Grounded on the delay shape used throughout
//! `examples/original_source/.../extractors/http_extractor.py`
//! (`(2**attempt) * 1` seconds) and on the Stage Mover's own retry constants.

use std::time::Duration;

/// Delay before retry attempt `attempt` (0-indexed: `attempt == 0` is the
/// first retry after the initial failure), as `base * 2^attempt`, plus a
/// pseudo-random jitter in `[0, jitter_max)`.
///
/// Jitter uses a simple xorshift seeded from the attempt number and a
/// caller-supplied salt rather than pulling in a random-number crate for a
/// single bounded draw — this function is deterministic for a given
/// `(attempt, salt)` pair, which also makes it trivially testable.
pub fn delay(base: Duration, attempt: u32, jitter_max: Duration, salt: u64) -> Duration {
    let multiplier = 1u64 << attempt.min(16);
    let scaled = base.saturating_mul(multiplier as u32);
    if jitter_max.is_zero() {
        return scaled;
    }
    let mut x = salt ^ (attempt as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15);
    x ^= x << 13;
    x ^= x >> 7;
    x ^= x << 17;
    let jitter_nanos = (x % (jitter_max.as_nanos() as u64).max(1)) as u32;
    scaled + Duration::from_nanos(jitter_nanos as u64)
}

/// The Fetcher's fixed retry schedule: 1s/2s/4s base delays, max 3 attempts,
/// plus 0-1s jitter (§4.2).
pub fn fetcher_delay(attempt: u32, salt: u64) -> Duration {
    delay(
        Duration::from_secs(1),
        attempt,
        Duration::from_secs(1),
        salt,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn doubles_each_attempt_before_jitter() {
        let base = Duration::from_secs(1);
        let a0 = delay(base, 0, Duration::ZERO, 0);
        let a1 = delay(base, 1, Duration::ZERO, 0);
        let a2 = delay(base, 2, Duration::ZERO, 0);
        assert_eq!(a0, Duration::from_secs(1));
        assert_eq!(a1, Duration::from_secs(2));
        assert_eq!(a2, Duration::from_secs(4));
    }

    #[test]
    fn jitter_stays_within_bound() {
        let base = Duration::from_secs(1);
        for salt in 0..50u64 {
            let d = delay(base, 0, Duration::from_secs(1), salt);
            assert!(d >= base);
            assert!(d < base + Duration::from_secs(1));
        }
    }

    #[test]
    fn fetcher_delay_matches_spec_schedule() {
        assert!(fetcher_delay(0, 1).as_secs_f64() >= 1.0);
        assert!(fetcher_delay(0, 1).as_secs_f64() < 2.0);
        assert!(fetcher_delay(2, 1).as_secs_f64() >= 4.0);
        assert!(fetcher_delay(2, 1).as_secs_f64() < 5.0);
    }
}
