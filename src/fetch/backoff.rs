//! Retry backoff schedule.
//!
//! Delays between attempts follow the Fibonacci sequence in seconds:
//! attempt 0 runs immediately, the wait before attempt `n` is `fib(n)`
//! seconds.

use std::time::Duration;

/// One Fibonacci step of delay.
pub const BASE_UNIT: Duration = Duration::from_secs(1);

/// Iterative Fibonacci with `fib(0) = 0`, `fib(1) = 1`.
pub fn fibonacci(n: u32) -> u64 {
    let (mut a, mut b) = (0u64, 1u64);
    for _ in 0..n {
        let next = a.saturating_add(b);
        a = b;
        b = next;
    }
    a
}

/// Delay to sleep before attempt `n` (attempts numbered from 0).
pub fn delay_before_attempt(n: u32) -> Duration {
    let steps = fibonacci(n).min(u32::MAX as u64) as u32;
    BASE_UNIT.saturating_mul(steps)
}
