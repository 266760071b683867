//! Latency measurement.

use std::time::{Duration, Instant};

/// Round a duration to the nearest whole millisecond.
pub fn round_ms(elapsed: Duration) -> u64 {
    let micros = elapsed.as_micros();
    u64::try_from((micros + 500) / 1000).unwrap_or(u64::MAX)
}

/// Milliseconds since `start`, rounded to the nearest millisecond.
pub fn elapsed_ms(start: Instant) -> u64 {
    round_ms(start.elapsed())
}
